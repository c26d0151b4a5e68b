use log::info;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::batch::config::BatchConfig;
use crate::tftp::client::config::ClientConfig;
use crate::tftp::client::config::TftpcConfigFile;

/// Configuration file looked up in the current directory.
pub const CONFIG_FILE: &str = ".tftpfleet.toml";

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AppConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tftpc: Option<TftpcConfigFile>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub batch: Option<BatchConfig>,
}

impl AppConfig {
    pub fn load_from_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let content = fs::read_to_string(path)?;
        let config: AppConfig = toml::from_str(&content)?;
        Ok(config)
    }

    pub fn generate_config_file(force: bool) -> anyhow::Result<()> {
        Self::generate_config_file_at(Path::new(CONFIG_FILE), force)
    }

    pub fn generate_config_file_at(path: &Path, force: bool) -> anyhow::Result<()> {
        if path.exists() && !force {
            anyhow::bail!(
                "Configuration file {} already exists. Use --force to overwrite.",
                path.display()
            );
        }

        let config_content = Self::generate_full_config()?;
        fs::write(path, config_content)?;

        info!("Configuration file generated: {}", path.display());
        info!("Contains full configuration (client + batch)");
        info!("Please edit this file to customize configuration");
        Ok(())
    }

    pub fn generate_full_config() -> anyhow::Result<String> {
        let config = AppConfig {
            tftpc: Some(TftpcConfigFile {
                get: Some(ClientConfig::new("127.0.0.1".to_string(), 69)),
                put: Some(ClientConfig::new("127.0.0.1".to_string(), 69)),
            }),
            batch: Some(BatchConfig::with_defaults()),
        };
        let toml_content = toml::to_string_pretty(&config)?;
        Ok(format!(
            "# tftpfleet configuration file\n# All fields are optional. Values given on the command line override this file.\n\n{}",
            toml_content
        ))
    }
}
