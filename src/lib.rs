pub mod callback;
pub mod config;
pub mod error;
pub mod rabbitmq;
pub mod report;
pub mod sensu;
pub mod util;

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub use callback::{AlarmCallback, SensuCallback};
pub use config::{AdapterConfig, Configuration, Severity};
pub use error::{ConfigError, DispatchError, EncodingError, TransportError};
pub use rabbitmq::{Publisher, RabbitMqClient};

/// Alert raised by the log platform, as handed to the callback.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertEvent {
    pub stream_id: String,
    pub stream_title: String,
    pub result_description: String,
    pub triggered_at: DateTime<Utc>,

    /// Messages that matched the triggering condition, oldest first.
    #[serde(default)]
    pub matching_messages: Vec<MessageSummary>,

    /// Parameters of the condition that fired (e.g. the `time` window in minutes).
    #[serde(default)]
    pub triggered_condition_params: BTreeMap<String, serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageSummary {
    pub source: String,
    pub message: String,
}
