//! Helper functions for integration tests

use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use sensu_bridge::{
    AlertEvent, Configuration, Publisher, TransportError,
    config::*,
    MessageSummary,
};
use serde_json::json;

/// Flat configuration as a host would hand it over.
pub fn create_test_configuration() -> Configuration {
    [
        (CHECK_NAME, json!("test_check_name")),
        (CHECK_CLIENT, json!("test_check_client")),
        (CHECK_HANDLERS, json!("test_check_handler1,test_check_handler2")),
        (CHECK_SEVERITY, json!("2")),
        (CHECK_SUBSCRIBERS, json!("test_check_subscribers")),
        (RABBITMQ_USER, json!("test_rabbitmq_user")),
        (RABBITMQ_PASSWORD, json!("test_rabbitmq_password")),
        (RABBITMQ_VIRTUAL_HOST, json!("test_rabbitmq_virtual_host")),
        (RABBITMQ_HOSTNAME, json!("127.0.0.1")),
        (RABBITMQ_PORT, json!(5671)),
        (RABBITMQ_USE_SSL, json!(false)),
    ]
    .into_iter()
    .collect()
}

pub fn create_test_event(messages: &[(&str, &str)]) -> AlertEvent {
    AlertEvent {
        stream_id: "5628f4503b0c5756a8eebc4d".to_string(),
        stream_title: "Stream title".to_string(),
        result_description: "Result description".to_string(),
        triggered_at: Utc.with_ymd_and_hms(2015, 11, 18, 12, 7, 0).unwrap(),
        matching_messages: messages
            .iter()
            .map(|(source, message)| MessageSummary {
                source: source.to_string(),
                message: message.to_string(),
            })
            .collect(),
        triggered_condition_params: Default::default(),
    }
}

/// Publisher that keeps every payload instead of talking to a broker.
#[derive(Default)]
pub struct RecordingPublisher {
    pub sent: Mutex<Vec<String>>,
}

impl RecordingPublisher {
    pub fn payloads(&self) -> Vec<serde_json::Value> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .map(|payload| serde_json::from_str(payload).expect("payload must be complete JSON"))
            .collect()
    }
}

#[async_trait]
impl Publisher for RecordingPublisher {
    async fn send(&self, payload: &str) -> Result<(), TransportError> {
        self.sent.lock().unwrap().push(payload.to_string());
        Ok(())
    }
}

/// A localhost port with nothing listening on it.
pub fn closed_port() -> u16 {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap().port()
}
