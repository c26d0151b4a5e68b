//! TFTP client implementation
//!
//! This module provides TFTP client functionality:
//! - File download (GET/RRQ)
//! - File upload (PUT/WRQ)
//! - The lock-step transfer state machine shared with the batch engine
//!
//! Transfers are strict RFC 1350 exchanges with 512 byte blocks and no
//! option negotiation. A missing reply or an out of order block fails the
//! transfer; there is no retransmission.
//!
//! # Usage Examples
//!
//! ## Download file
//!
//! ```rust,no_run
//! use tftpfleet::tftp::client::Client;
//! use tftpfleet::tftp::client::config::ClientConfig;
//! use std::path::Path;
//!
//! let config = ClientConfig::new("192.168.1.100".to_string(), 69);
//! let client = Client::new(config).unwrap();
//! client.get("remote.txt", Path::new("local.txt")).unwrap();
//! ```
//!
//! ## Upload file
//!
//! ```rust,no_run
//! use tftpfleet::tftp::client::Client;
//! use tftpfleet::tftp::client::config::ClientConfig;
//! use std::path::Path;
//!
//! let config = ClientConfig::new("192.168.1.100".to_string(), 69);
//! let client = Client::new(config).unwrap();
//! client.put(Path::new("local.txt"), "remote.txt").unwrap();
//! ```
//!
//! # Command Line Usage
//!
//! ```bash
//! # Download file
//! tftpfleet tftpc get 192.168.1.100 remote.txt [local.txt]
//!
//! # Upload file
//! tftpfleet tftpc put 192.168.1.100 local.txt [remote.txt]
//! ```

mod client_impl;
pub mod config;
pub mod transfer;

use anyhow::Result;
use clap::Subcommand;
use std::path::PathBuf;
use std::time::Duration;

pub use client_impl::Client;

/// Well-known TFTP server port.
pub const DEFAULT_PORT: u16 = 69;

/// How long to wait for each reply before giving up on a transfer.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(1000);

#[derive(Subcommand)]
pub enum TftpcAction {
    /// Download a file from TFTP server (RRQ)
    Get {
        /// Server IPv4 address
        server: String,

        /// Remote file name on server
        remote_file: String,

        /// Local file path (defaults to remote file name)
        #[arg(value_name = "LOCAL_FILE")]
        local_file: Option<PathBuf>,

        /// Server port [default: 69]
        #[arg(short, long)]
        port: Option<u16>,

        /// Read timeout in milliseconds [default: 1000]
        #[arg(short, long, value_name = "MS")]
        timeout: Option<u64>,
    },

    /// Upload a file to TFTP server (WRQ)
    Put {
        /// Server IPv4 address
        server: String,

        /// Local file path to upload
        local_file: PathBuf,

        /// Remote file name on server (defaults to local file name)
        #[arg(value_name = "REMOTE_FILE")]
        remote_file: Option<String>,

        /// Server port [default: 69]
        #[arg(short, long)]
        port: Option<u16>,

        /// Read timeout in milliseconds [default: 1000]
        #[arg(short, long, value_name = "MS")]
        timeout: Option<u64>,
    },
}

/// Builds a client from the `[tftpc.get]` / `[tftpc.put]` table and the
/// command line values, which take precedence.
fn connect(
    file_config: Option<&config::ClientConfig>,
    server: String,
    port: Option<u16>,
    timeout_ms: Option<u64>,
) -> Result<Client> {
    let cfg = file_config.cloned().unwrap_or_default().merge_cli(
        server,
        port,
        timeout_ms.map(Duration::from_millis),
    );
    Client::new(cfg)
}

/// Run TFTP client command with configuration
pub fn run_with_config(
    action: TftpcAction,
    config: Option<&config::TftpcConfigFile>,
) -> Result<()> {
    match action {
        TftpcAction::Get {
            server,
            remote_file,
            local_file,
            port,
            timeout,
        } => {
            let client = connect(config.and_then(|c| c.get.as_ref()), server, port, timeout)?;
            let local_path = match local_file {
                Some(path) => path,
                None => transfer::validate_remote_name(&remote_file)?.to_path_buf(),
            };

            log::info!("GET {} from {} -> {}", remote_file, client.server(), local_path.display());
            let bytes = client.get(&remote_file, &local_path)?;
            log::info!("Download completed ({} bytes)", bytes);
        }

        TftpcAction::Put {
            server,
            local_file,
            remote_file,
            port,
            timeout,
        } => {
            let client = connect(config.and_then(|c| c.put.as_ref()), server, port, timeout)?;
            let remote_name = match remote_file {
                Some(name) => name,
                None => local_file
                    .file_name()
                    .and_then(|n| n.to_str())
                    .map(str::to_string)
                    .ok_or_else(|| {
                        anyhow::anyhow!(
                            "Cannot derive a remote name from {}, pass REMOTE_FILE",
                            local_file.display()
                        )
                    })?,
            };

            log::info!("PUT {} to {} as {}", local_file.display(), client.server(), remote_name);
            let bytes = client.put(&local_file, &remote_name)?;
            log::info!("Upload completed ({} bytes)", bytes);
        }
    }
    Ok(())
}
