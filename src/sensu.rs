//! Sensu check-result documents
//!
//! A check result is the JSON object Sensu servers consume from the `results`
//! queue. The field rules here are relied upon by existing Sensu handlers:
//!
//! - `handler` (raw string) and `handlers` (array) are mutually exclusive; the
//!   array form is used iff the configured value contains a comma.
//! - `subscribers` and `tags` are always arrays and are left out when empty.

use serde::Serialize;

use crate::config::Severity;
use crate::error::EncodingError;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CheckResult {
    pub client: String,
    pub check: Check,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Check {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub command: &'static str,
    pub standalone: bool,
    pub status: u8,
    pub output: String,
    pub issued: i64,
    pub executed: i64,
    #[serde(flatten)]
    pub handlers: Handlers,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub subscribers: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    pub publish: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Handlers {
    #[serde(rename = "handler")]
    Single(String),
    #[serde(rename = "handlers")]
    Multiple(Vec<String>),
}

impl Handlers {
    /// A value without a comma is kept verbatim, including surrounding whitespace.
    pub fn parse(raw: &str) -> Self {
        if raw.contains(',') {
            Handlers::Multiple(raw.split(',').map(|h| h.trim().to_string()).collect())
        } else {
            Handlers::Single(raw.to_string())
        }
    }
}

/// Split a comma separated list; an empty input yields no elements.
pub fn split_list(raw: &str) -> Vec<String> {
    if raw.contains(',') {
        raw.split(',').map(|s| s.trim().to_string()).collect()
    } else if raw.is_empty() {
        Vec::new()
    } else {
        vec![raw.trim().to_string()]
    }
}

pub struct CheckResultBuilder {
    name: String,
    client: String,
    status: Severity,
    output: String,
    handlers: String,
    timestamp: i64,
    subscribers: String,
    tags: String,
}

impl CheckResultBuilder {
    pub fn new(name: impl ToString, client: impl ToString) -> Self {
        Self {
            name: name.to_string(),
            client: client.to_string(),
            status: Severity::default(),
            output: String::new(),
            handlers: String::new(),
            timestamp: 0,
            subscribers: String::new(),
            tags: String::new(),
        }
    }

    pub fn status(mut self, status: Severity) -> Self {
        self.status = status;
        self
    }

    pub fn output(mut self, output: impl ToString) -> Self {
        self.output = output.to_string();
        self
    }

    pub fn handlers(mut self, handlers: impl ToString) -> Self {
        self.handlers = handlers.to_string();
        self
    }

    /// Unix seconds, used for both `issued` and `executed`.
    pub fn timestamp(mut self, timestamp: i64) -> Self {
        self.timestamp = timestamp;
        self
    }

    pub fn subscribers(mut self, subscribers: impl ToString) -> Self {
        self.subscribers = subscribers.to_string();
        self
    }

    pub fn tags(mut self, tags: impl ToString) -> Self {
        self.tags = tags.to_string();
        self
    }

    pub fn build(self) -> CheckResult {
        CheckResult {
            client: self.client.trim().to_string(),
            check: Check {
                name: self.name.trim().to_string(),
                kind: "standard",
                command: "none",
                standalone: true,
                status: self.status.code(),
                output: self.output.trim().to_string(),
                issued: self.timestamp,
                executed: self.timestamp,
                handlers: Handlers::parse(&self.handlers),
                subscribers: split_list(&self.subscribers),
                tags: split_list(&self.tags),
                publish: false,
            },
        }
    }
}

impl CheckResult {
    pub fn to_json(&self) -> Result<String, EncodingError> {
        Ok(serde_json::to_string(self)?)
    }
}

/// Build and serialize a check result in one go.
#[allow(clippy::too_many_arguments)]
pub fn encode(
    name: &str,
    status: Severity,
    output: &str,
    handlers: &str,
    timestamp: i64,
    client: &str,
    subscribers: &str,
    tags: Option<&str>,
) -> Result<String, EncodingError> {
    CheckResultBuilder::new(name, client)
        .status(status)
        .output(output)
        .handlers(handlers)
        .timestamp(timestamp)
        .subscribers(subscribers)
        .tags(tags.unwrap_or_default())
        .build()
        .to_json()
}
