//! Error types for configuration, encoding and delivery

use thiserror::Error;

/// Errors raised while loading or validating the callback configuration.
///
/// Every variant names the offending configuration field so the host can point
/// the operator at it.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("{field} is mandatory and must not be null or empty")]
    Missing { field: &'static str },

    #[error("{field} must not contain empty elements")]
    BlankListElement { field: &'static str },

    #[error("invalid value for {field}: {message}")]
    InvalidValue {
        field: &'static str,
        message: String,
    },

    #[error("failed to load configuration: {0}")]
    Load(String),
}

impl ConfigError {
    /// Name of the field that failed validation, if the error is tied to one.
    pub fn field(&self) -> Option<&'static str> {
        match self {
            ConfigError::Missing { field }
            | ConfigError::BlankListElement { field }
            | ConfigError::InvalidValue { field, .. } => Some(field),
            ConfigError::Load(_) => None,
        }
    }
}

/// Errors raised while talking to the message broker.
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("failed to connect to broker: {0}")]
    Connection(String),

    #[error("failed to open channel: {0}")]
    Channel(String),

    #[error("failed to declare topology for '{name}': {message}")]
    Topology { name: &'static str, message: String },

    #[error("failed to publish result: {0}")]
    Publish(String),

    #[error("broker did not respond within {0:?}")]
    Timeout(std::time::Duration),

    #[error("send was cancelled")]
    Cancelled,
}

/// The check result could not be serialized.
#[derive(Error, Debug)]
#[error("failed to encode check result: {0}")]
pub struct EncodingError(#[from] pub serde_json::Error);

/// Errors surfaced by a single alert dispatch.
#[derive(Error, Debug)]
pub enum DispatchError {
    #[error(transparent)]
    Encoding(#[from] EncodingError),

    #[error("failed to deliver check result: {0}")]
    Delivery(#[from] TransportError),
}
