use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;
use tracing::{debug, error, info, instrument};

use crate::AlertEvent;
use crate::config::{AdapterConfig, Configuration};
use crate::error::{ConfigError, DispatchError};
use crate::rabbitmq::{Publisher, RabbitMqClient};
use crate::report;
use crate::sensu::CheckResultBuilder;

pub const CALLBACK_NAME: &str = "Sensu Alarm Callback";

/// Lifecycle the host platform drives: initialize once, then dispatch per alert.
#[async_trait]
pub trait AlarmCallback: Send + Sync {
    fn initialize(config: Configuration) -> Result<Self, ConfigError>
    where
        Self: Sized;

    fn validate_config(&self) -> Result<(), ConfigError>;

    async fn dispatch(&self, event: &AlertEvent) -> Result<(), DispatchError>;

    fn name(&self) -> &str;

    /// Configured fields safe for display.
    fn attributes(&self) -> BTreeMap<String, Value>;
}

/// Where dispatched payloads go.
#[derive(Clone)]
enum Delivery {
    Broker(RabbitMqClient),
    Injected(Arc<dyn Publisher>),
}

impl Delivery {
    fn publisher(&self) -> &dyn Publisher {
        match self {
            Delivery::Broker(client) => client,
            Delivery::Injected(publisher) => publisher.as_ref(),
        }
    }
}

/// Forwards alerts to Sensu as check results.
#[derive(Clone)]
pub struct SensuCallback {
    configuration: Arc<Configuration>,
    config: Arc<AdapterConfig>,
    delivery: Delivery,
}

impl SensuCallback {
    /// Replace the broker publisher, e.g. with a pooled or recording one.
    pub fn with_publisher(mut self, publisher: Arc<dyn Publisher>) -> Self {
        self.delivery = Delivery::Injected(publisher);
        self
    }

    /// Bound every broker send by `timeout` instead of the default.
    ///
    /// Only the built-in broker client is affected; a publisher passed to
    /// [`with_publisher`](Self::with_publisher) owns its own timeouts and is kept.
    pub fn with_send_timeout(mut self, timeout: Duration) -> Self {
        self.delivery = match self.delivery {
            Delivery::Broker(client) => Delivery::Broker(client.with_timeout(timeout)),
            injected => injected,
        };
        self
    }

    pub fn config(&self) -> &AdapterConfig {
        &self.config
    }

    /// Build the JSON payload for `event` without sending it.
    pub fn encode(&self, event: &AlertEvent, timestamp: i64) -> Result<String, DispatchError> {
        let report = report::format(event, &self.config);

        let payload = CheckResultBuilder::new(&report.check_name, &report.client)
            .status(self.config.check_severity)
            .output(&report.text)
            .handlers(&self.config.check_handlers)
            .timestamp(timestamp)
            .subscribers(&self.config.check_subscribers)
            .tags(&self.config.check_tags)
            .build()
            .to_json()?;

        Ok(payload)
    }
}

#[async_trait]
impl AlarmCallback for SensuCallback {
    fn initialize(configuration: Configuration) -> Result<Self, ConfigError> {
        let config = AdapterConfig::from_configuration(&configuration)?;
        let client = RabbitMqClient::new(config.broker.clone());

        Ok(Self {
            configuration: Arc::new(configuration),
            config: Arc::new(config),
            delivery: Delivery::Broker(client),
        })
    }

    fn validate_config(&self) -> Result<(), ConfigError> {
        AdapterConfig::from_configuration(&self.configuration).map(|_| ())
    }

    #[instrument(skip_all, fields(stream = %event.stream_title))]
    async fn dispatch(&self, event: &AlertEvent) -> Result<(), DispatchError> {
        let payload = self.encode(event, Utc::now().timestamp())?;
        debug!("encoded check result ({} bytes)", payload.len());

        match self.delivery.publisher().send(&payload).await {
            Ok(()) => {
                info!("forwarded alert to sensu");
                Ok(())
            }
            Err(e) => {
                error!("failed to forward alert to sensu: {e}");
                Err(e.into())
            }
        }
    }

    fn name(&self) -> &str {
        CALLBACK_NAME
    }

    fn attributes(&self) -> BTreeMap<String, Value> {
        self.configuration.attributes()
    }
}

impl std::fmt::Debug for SensuCallback {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SensuCallback")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
