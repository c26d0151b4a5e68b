use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::tftp::client::{DEFAULT_PORT, DEFAULT_TIMEOUT};

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct TftpcConfigFile {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub get: Option<ClientConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub put: Option<ClientConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ClientConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub server: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none", with = "humantime_serde")]
    pub timeout: Option<Duration>,
}

impl ClientConfig {
    pub fn new(server: String, port: u16) -> Self {
        Self {
            server: Some(server),
            port: Some(port),
            timeout: Some(DEFAULT_TIMEOUT),
        }
    }

    pub fn merge_cli(
        mut self,
        cli_server: String,
        cli_port: Option<u16>,
        cli_timeout: Option<Duration>,
    ) -> Self {
        // SERVER is a required positional; port and timeout fall back to
        // the file, then to the defaults
        self.server = Some(cli_server);
        self.port = cli_port.or(self.port).or(Some(DEFAULT_PORT));
        self.timeout = cli_timeout.or(self.timeout).or(Some(DEFAULT_TIMEOUT));
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}
