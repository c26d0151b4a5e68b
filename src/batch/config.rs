use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use super::pool::default_worker_count;
use crate::tftp::client::{DEFAULT_PORT, DEFAULT_TIMEOUT};
use crate::tftp::core::TftpError;

/// What to do with the remaining files of a host once one succeeded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum SchedulePolicy {
    /// Move on to the next host after the first successful transfer.
    #[default]
    StopAtFirstSuccess,
    /// Attempt every file on every host.
    AttemptAll,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// Download each file from each host into `<working>/<host>/<file>`.
    #[default]
    Get,
    /// Upload `<working>/<file>` to each host.
    Put,
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Direction::Get => f.write_str("get"),
            Direction::Put => f.write_str("put"),
        }
    }
}

/// `[batch]` table of the configuration file. Every field is optional;
/// command line arguments fill the gaps.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct BatchConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hosts: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub files: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub working_folder: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none", with = "humantime_serde")]
    pub timeout: Option<Duration>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub workers: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prefix: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extension: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub policy: Option<SchedulePolicy>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub direction: Option<Direction>,
}

impl BatchConfig {
    pub fn with_defaults() -> Self {
        Self {
            hosts: Some("hosts.txt".to_string()),
            files: Some("files.txt".to_string()),
            working_folder: Some(PathBuf::from(".")),
            port: Some(DEFAULT_PORT),
            timeout: Some(DEFAULT_TIMEOUT),
            workers: Some(default_worker_count()),
            prefix: Some(String::new()),
            extension: Some(String::new()),
            policy: Some(SchedulePolicy::default()),
            direction: Some(Direction::default()),
        }
    }

    /// Overlays values given on the command line; those win over the file.
    pub fn merge(mut self, cli: BatchConfig) -> Self {
        macro_rules! overlay {
            ($($field:ident),*) => {
                $(if cli.$field.is_some() {
                    self.$field = cli.$field;
                })*
            };
        }
        overlay!(
            hosts,
            files,
            working_folder,
            port,
            timeout,
            workers,
            prefix,
            extension,
            policy,
            direction
        );
        self
    }

    /// Applies defaults and checks the values that can be checked without
    /// touching the network or the host list.
    pub fn resolve(self) -> Result<BatchOptions, TftpError> {
        let hosts = self
            .hosts
            .filter(|h| !h.trim().is_empty())
            .ok_or_else(|| TftpError::config("Host address cannot be empty"))?;
        let files = self
            .files
            .filter(|f| !f.trim().is_empty())
            .ok_or_else(|| TftpError::config("Filename cannot be empty"))?;
        let workers = self.workers.unwrap_or_else(default_worker_count);
        if workers == 0 {
            return Err(TftpError::config("Worker count must be at least 1"));
        }
        let timeout = self.timeout.unwrap_or(DEFAULT_TIMEOUT);
        if timeout.is_zero() {
            return Err(TftpError::config("Read timeout must be greater than zero"));
        }

        Ok(BatchOptions {
            hosts,
            files,
            working_folder: self.working_folder.unwrap_or_else(|| PathBuf::from(".")),
            port: self.port.unwrap_or(DEFAULT_PORT),
            timeout,
            workers,
            prefix: self.prefix.unwrap_or_default(),
            extension: self.extension.unwrap_or_default(),
            policy: self.policy.unwrap_or_default(),
            direction: self.direction.unwrap_or_default(),
        })
    }
}

/// Fully resolved batch settings consumed by the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchOptions {
    pub hosts: String,
    pub files: String,
    pub working_folder: PathBuf,
    pub port: u16,
    pub timeout: Duration,
    pub workers: usize,
    pub prefix: String,
    pub extension: String,
    pub policy: SchedulePolicy,
    pub direction: Direction,
}

impl BatchOptions {
    pub fn new(hosts: impl Into<String>, files: impl Into<String>, working_folder: impl Into<PathBuf>) -> Self {
        Self {
            hosts: hosts.into(),
            files: files.into(),
            working_folder: working_folder.into(),
            port: DEFAULT_PORT,
            timeout: DEFAULT_TIMEOUT,
            workers: default_worker_count(),
            prefix: String::new(),
            extension: String::new(),
            policy: SchedulePolicy::default(),
            direction: Direction::default(),
        }
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    pub fn with_policy(mut self, policy: SchedulePolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_direction(mut self, direction: Direction) -> Self {
        self.direction = direction;
        self
    }

    pub fn with_affixes(mut self, prefix: impl Into<String>, extension: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self.extension = extension.into();
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_defaults() {
        let opts = BatchConfig {
            hosts: Some("10.0.0.1".to_string()),
            files: Some("a.cfg".to_string()),
            ..Default::default()
        }
        .resolve()
        .unwrap();

        assert_eq!(opts.port, 69);
        assert_eq!(opts.timeout, Duration::from_millis(1000));
        assert!(opts.workers >= 4);
        assert_eq!(opts.policy, SchedulePolicy::StopAtFirstSuccess);
        assert_eq!(opts.direction, Direction::Get);
        assert_eq!(opts.working_folder, PathBuf::from("."));
    }

    #[test]
    fn test_resolve_rejects_bad_values() {
        assert!(BatchConfig::default().resolve().is_err());
        assert!(
            BatchConfig {
                hosts: Some("10.0.0.1".to_string()),
                files: Some("  ".to_string()),
                ..Default::default()
            }
            .resolve()
            .is_err()
        );
        assert!(
            BatchConfig {
                hosts: Some("10.0.0.1".to_string()),
                files: Some("a".to_string()),
                workers: Some(0),
                ..Default::default()
            }
            .resolve()
            .is_err()
        );
    }

    #[test]
    fn test_cli_overrides_file() {
        let file = BatchConfig {
            hosts: Some("hosts.txt".to_string()),
            port: Some(6969),
            workers: Some(8),
            ..Default::default()
        };
        let cli = BatchConfig {
            hosts: Some("10.0.0.1".to_string()),
            files: Some("a.cfg".to_string()),
            ..Default::default()
        };
        let merged = file.merge(cli);
        assert_eq!(merged.hosts.as_deref(), Some("10.0.0.1"));
        assert_eq!(merged.files.as_deref(), Some("a.cfg"));
        assert_eq!(merged.port, Some(6969));
        assert_eq!(merged.workers, Some(8));
    }

    #[test]
    fn test_toml_format() {
        let cfg: BatchConfig = toml::from_str(
            r#"
            hosts = "10.0.0.1"
            files = "files.txt"
            timeout = "1500ms"
            policy = "attempt-all"
            direction = "put"
            "#,
        )
        .unwrap();
        assert_eq!(cfg.timeout, Some(Duration::from_millis(1500)));
        assert_eq!(cfg.policy, Some(SchedulePolicy::AttemptAll));
        assert_eq!(cfg.direction, Some(Direction::Put));
    }
}
