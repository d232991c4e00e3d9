use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::trace;

use crate::error::ConfigError;

pub const CHECK_NAME: &str = "check_name";
pub const CHECK_CLIENT: &str = "check_client";
pub const CHECK_HANDLERS: &str = "check_handlers";
pub const CHECK_SEVERITY: &str = "check_severity";
pub const CHECK_SUBSCRIBERS: &str = "check_subscribers";
pub const CHECK_TAGS: &str = "check_tags";

pub const DASHBOARD_URL: &str = "transport_email_web_interface_url";

pub const RABBITMQ_USER: &str = "rabbitmq_user";
pub const RABBITMQ_PASSWORD: &str = "rabbitmq_password";
pub const RABBITMQ_VIRTUAL_HOST: &str = "rabbitmq_virtual_host";
pub const RABBITMQ_HOSTNAME: &str = "rabbitmq_hostname";
pub const RABBITMQ_PORT: &str = "rabbitmq_port";
pub const RABBITMQ_USE_SSL: &str = "rabbitmq_use_ssl";

/// Token in `check_name` that is replaced by the stream title.
pub const STREAM_TOKEN: &str = "[stream]";

/// Token in `check_client` that is replaced by the source of the first backlog message.
pub const SOURCE_TOKEN: &str = "[source]";

/// Client name used for `[source]` when the alert carries no backlog.
pub const FALLBACK_CLIENT: &str = "graylog";

const PASSWORD_MASK: &str = "****";

fn default_fields() -> [(&'static str, Value); 6] {
    [
        (RABBITMQ_PORT, Value::from(5671)),
        (RABBITMQ_USER, Value::from("sensu")),
        (RABBITMQ_VIRTUAL_HOST, Value::from("/sensu")),
        (RABBITMQ_USE_SSL, Value::from(false)),
        (CHECK_HANDLERS, Value::from("default")),
        (CHECK_SEVERITY, Value::from("2")),
    ]
}

/// Flat field mapping as supplied by the host.
///
/// Values are kept as raw JSON so validation can tell "unset" apart from
/// "set to something unusable".
#[derive(Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Configuration {
    source: BTreeMap<String, Value>,
}

impl Configuration {
    pub fn new(source: BTreeMap<String, Value>) -> Self {
        Self { source }
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.source.insert(key.into(), value.into());
    }

    /// Fill every missing field that has a documented default.
    pub fn with_defaults(mut self) -> Self {
        for (key, value) in default_fields() {
            self.source.entry(key.to_string()).or_insert(value);
        }
        self
    }

    pub fn get_string(&self, key: &str) -> Option<&str> {
        self.source.get(key).and_then(Value::as_str)
    }

    pub fn string_is_set(&self, key: &str) -> bool {
        self.get_string(key).is_some_and(|s| !s.trim().is_empty())
    }

    pub fn get_int(&self, key: &str) -> Option<i64> {
        match self.source.get(key)? {
            Value::Number(n) => n.as_i64(),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    pub fn int_is_set(&self, key: &str) -> bool {
        self.get_int(key).is_some()
    }

    pub fn get_bool(&self, key: &str) -> Option<bool> {
        match self.source.get(key)? {
            Value::Bool(b) => Some(*b),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    /// All configured fields, with the broker password masked.
    pub fn attributes(&self) -> BTreeMap<String, Value> {
        self.source
            .iter()
            .map(|(key, value)| {
                if key == RABBITMQ_PASSWORD {
                    (key.clone(), Value::from(PASSWORD_MASK))
                } else {
                    (key.clone(), value.clone())
                }
            })
            .collect()
    }
}

impl fmt::Debug for Configuration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.attributes()).finish()
    }
}

impl<K: Into<String>> FromIterator<(K, Value)> for Configuration {
    fn from_iter<I: IntoIterator<Item = (K, Value)>>(iter: I) -> Self {
        Self {
            source: iter.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        }
    }
}

/// Password wrapper that never shows up in logs or debug output.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct SecretString(String);

impl SecretString {
    pub fn new(secret: impl Into<String>) -> Self {
        Self(secret.into())
    }

    /// Use with care: the returned value must never reach a log line.
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for SecretString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(PASSWORD_MASK)
    }
}

impl fmt::Display for SecretString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(PASSWORD_MASK)
    }
}

/// Severity of the emitted check result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Severity {
    Ok,
    Warning,
    #[default]
    Critical,
}

impl Severity {
    /// Exit-status style code understood by Sensu.
    pub fn code(self) -> u8 {
        match self {
            Severity::Ok => 0,
            Severity::Warning => 1,
            Severity::Critical => 2,
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Severity::Ok => "OK",
            Severity::Warning => "Warning",
            Severity::Critical => "Critical",
        };
        f.write_str(label)
    }
}

impl FromStr for Severity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "0" | "ok" => Ok(Severity::Ok),
            "1" | "warning" => Ok(Severity::Warning),
            "2" | "critical" => Ok(Severity::Critical),
            other => Err(format!(
                "'{other}' is not a severity (expected 0/OK, 1/Warning or 2/Critical)"
            )),
        }
    }
}

/// How the check name is derived for each alert.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckName {
    Literal(String),
    FromStreamTitle,
}

impl CheckName {
    pub fn parse(raw: &str) -> Self {
        if raw == STREAM_TOKEN {
            CheckName::FromStreamTitle
        } else {
            CheckName::Literal(raw.to_string())
        }
    }
}

/// How the client name is derived for each alert.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckClient {
    Literal(String),
    FromFirstBacklogSource,
}

impl CheckClient {
    pub fn parse(raw: &str) -> Self {
        if raw == SOURCE_TOKEN {
            CheckClient::FromFirstBacklogSource
        } else {
            CheckClient::Literal(raw.to_string())
        }
    }
}

/// Connection parameters for the AMQP broker.
#[derive(Debug, Clone, PartialEq)]
pub struct BrokerSettings {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: SecretString,
    pub virtual_host: String,
    pub use_tls: bool,
}

/// Validated, immutable adapter configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct AdapterConfig {
    pub check_name: CheckName,
    pub check_client: CheckClient,
    /// Raw handler list, split by the encoder.
    pub check_handlers: String,
    pub check_severity: Severity,
    /// Raw subscriber list, may be empty.
    pub check_subscribers: String,
    /// Raw tag list, may be empty.
    pub check_tags: String,
    pub broker: BrokerSettings,
    pub dashboard_base_url: Option<String>,
}

impl AdapterConfig {
    /// Validate the host mapping and resolve it into typed settings.
    ///
    /// Rules are checked in a fixed order and the first failure is returned.
    pub fn from_configuration(config: &Configuration) -> Result<Self, ConfigError> {
        for field in [CHECK_HANDLERS, CHECK_SUBSCRIBERS, CHECK_TAGS] {
            check_list(config, field)?;
        }

        for field in [
            CHECK_NAME,
            CHECK_CLIENT,
            CHECK_HANDLERS,
            CHECK_SEVERITY,
            RABBITMQ_USER,
            RABBITMQ_VIRTUAL_HOST,
            RABBITMQ_HOSTNAME,
        ] {
            if !config.string_is_set(field) {
                return Err(ConfigError::Missing { field });
            }
        }

        let port = config.get_int(RABBITMQ_PORT).ok_or(ConfigError::Missing {
            field: RABBITMQ_PORT,
        })?;
        let port = u16::try_from(port)
            .ok()
            .filter(|port| *port != 0)
            .ok_or_else(|| ConfigError::InvalidValue {
                field: RABBITMQ_PORT,
                message: format!("{port} is not a valid TCP port"),
            })?;

        let check_severity = required(config, CHECK_SEVERITY)?
            .parse::<Severity>()
            .map_err(|message| ConfigError::InvalidValue {
                field: CHECK_SEVERITY,
                message,
            })?;

        let dashboard_base_url = match config.get_string(DASHBOARD_URL).map(str::trim) {
            Some(raw) if !raw.is_empty() => {
                url::Url::parse(raw).map_err(|e| ConfigError::InvalidValue {
                    field: DASHBOARD_URL,
                    message: e.to_string(),
                })?;
                Some(raw.to_string())
            }
            _ => None,
        };

        let adapter = AdapterConfig {
            check_name: CheckName::parse(required(config, CHECK_NAME)?),
            check_client: CheckClient::parse(required(config, CHECK_CLIENT)?),
            check_handlers: required(config, CHECK_HANDLERS)?.to_string(),
            check_severity,
            check_subscribers: config.get_string(CHECK_SUBSCRIBERS).unwrap_or_default().to_string(),
            check_tags: config.get_string(CHECK_TAGS).unwrap_or_default().to_string(),
            broker: BrokerSettings {
                host: required(config, RABBITMQ_HOSTNAME)?.trim().to_string(),
                port,
                user: required(config, RABBITMQ_USER)?.to_string(),
                password: SecretString::new(
                    config.get_string(RABBITMQ_PASSWORD).unwrap_or_default(),
                ),
                virtual_host: required(config, RABBITMQ_VIRTUAL_HOST)?.to_string(),
                use_tls: config.get_bool(RABBITMQ_USE_SSL).unwrap_or(false),
            },
            dashboard_base_url,
        };

        trace!("resolved adapter config: {adapter:?}");
        Ok(adapter)
    }
}

fn required<'a>(config: &'a Configuration, field: &'static str) -> Result<&'a str, ConfigError> {
    config
        .get_string(field)
        .filter(|s| !s.trim().is_empty())
        .ok_or(ConfigError::Missing { field })
}

/// A comma separated list may not contain blank elements.
fn check_list(config: &Configuration, field: &'static str) -> Result<(), ConfigError> {
    let Some(raw) = config.get_string(field) else {
        return Ok(());
    };

    if raw.contains(',') && raw.split(',').any(|element| element.trim().is_empty()) {
        return Err(ConfigError::BlankListElement { field });
    }

    Ok(())
}

/// Read a flat JSON object of configuration fields and fill in defaults.
pub fn read_config_file(path: &str) -> Result<Configuration, ConfigError> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| ConfigError::Load(format!("{path}: {e}")))?;
    serde_json::from_str::<Configuration>(&content)
        .map(Configuration::with_defaults)
        .map_err(|e| ConfigError::Load(format!("{path}: {e}")))
        .inspect(|config| trace!("loaded config: {config:?}"))
}
