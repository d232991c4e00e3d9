use std::time::Duration;

use crate::rabbitmq::DEFAULT_SEND_TIMEOUT;

const CONFIG_PATH: &str = "SENSU_BRIDGE_CONFIG";

const DEFAULT_CONFIG_PATH: &str = "./sensu-bridge.json";

pub fn get_config_path() -> String {
    std::env::var(CONFIG_PATH).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string())
}

const SEND_TIMEOUT_SECS: &str = "SENSU_BRIDGE_TIMEOUT_SECS";

pub fn get_send_timeout() -> Duration {
    let timeout_from_env = std::env::var(SEND_TIMEOUT_SECS);
    timeout_from_env.map_or(DEFAULT_SEND_TIMEOUT, |res| {
        res.parse().map_or(DEFAULT_SEND_TIMEOUT, Duration::from_secs)
    })
}

const RABBITMQ_PASSWORD: &str = "RABBITMQ_PASSWORD";

/// Broker password from the environment, so it can stay out of config files.
pub fn get_password() -> Option<String> {
    let password_from_env = std::env::var(RABBITMQ_PASSWORD);
    password_from_env.ok()
}
