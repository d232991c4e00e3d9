use chrono::{DateTime, Duration, SecondsFormat, Utc};
use serde_json::Value;

use crate::AlertEvent;
use crate::config::{AdapterConfig, CheckClient, CheckName, DASHBOARD_URL, FALLBACK_CLIENT};

/// Window used for the dashboard link when the condition carries no `time` parameter.
pub const DEFAULT_WINDOW_MINUTES: i64 = 5;

/// Human readable alert report plus the names the check is filed under.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Report {
    pub text: String,
    pub client: String,
    pub check_name: String,
}

pub fn format(event: &AlertEvent, config: &AdapterConfig) -> Report {
    let mut text = format!("Stream \"{}\" raised alert. \n", event.stream_title);
    text.push_str(&format!(
        "Alert description: {}\n",
        event.result_description
    ));
    text.push_str(&format!("Triggered at: {}\n", iso8601(event.triggered_at)));
    text.push_str(&stream_url_line(event, config.dashboard_base_url.as_deref()));
    text.push_str(&backlog_section(event));

    Report {
        text,
        client: resolve_client(event, &config.check_client),
        check_name: resolve_check_name(event, &config.check_name),
    }
}

pub fn resolve_client(event: &AlertEvent, client: &CheckClient) -> String {
    match client {
        CheckClient::Literal(name) => name.clone(),
        CheckClient::FromFirstBacklogSource => event
            .matching_messages
            .first()
            .map(|message| message.source.clone())
            .unwrap_or_else(|| FALLBACK_CLIENT.to_string()),
    }
}

pub fn resolve_check_name(event: &AlertEvent, name: &CheckName) -> String {
    match name {
        CheckName::Literal(name) => name.clone(),
        CheckName::FromStreamTitle => event.stream_title.clone(),
    }
}

fn iso8601(time: DateTime<Utc>) -> String {
    time.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn stream_url_line(event: &AlertEvent, base_url: Option<&str>) -> String {
    match base_url {
        Some(base) => format!("Stream URL: {}\n\n", stream_details_url(base, event)),
        None => format!(
            "Stream URL: Parameter {DASHBOARD_URL} not set in Sensu Alarm Callback Plugin\n\n"
        ),
    }
}

/// Link to the stream's messages in the window that led up to the alert.
pub fn stream_details_url(base: &str, event: &AlertEvent) -> String {
    let end = event.triggered_at;
    let start = Duration::try_minutes(window_minutes(event))
        .and_then(|window| end.checked_sub_signed(window))
        .unwrap_or(end);

    format!(
        "{}/streams/{}/messages?rangetype=absolute&from={}&to={}&q=*",
        base.trim_end_matches('/'),
        event.stream_id,
        iso8601(start),
        iso8601(end)
    )
}

fn window_minutes(event: &AlertEvent) -> i64 {
    match event.triggered_condition_params.get("time") {
        Some(Value::Number(n)) => n.as_i64(),
        Some(Value::String(s)) => s.trim().parse().ok(),
        _ => None,
    }
    .unwrap_or(DEFAULT_WINDOW_MINUTES)
}

fn backlog_section(event: &AlertEvent) -> String {
    let mut section = String::from("Last messages accounting for this alert: \n");
    if event.matching_messages.is_empty() {
        section.push_str("No message backlog available.\n");
    } else {
        for message in &event.matching_messages {
            section.push_str(&message.message);
            section.push_str("\n\n\n");
        }
    }
    section
}
