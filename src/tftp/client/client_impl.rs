use std::fs;
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::path::Path;
use std::time::Duration;

use super::config::ClientConfig;
use super::transfer;
use super::{DEFAULT_PORT, DEFAULT_TIMEOUT};
use crate::tftp::core::{TftpError, bind_any};

/// TFTP client
///
/// Supports single file upload (PUT) and download (GET) operations. Every
/// call binds its own ephemeral socket; batch runs use the worker pool
/// instead, which reuses one socket per slot.
pub struct Client {
    server: SocketAddr,
    timeout: Duration,
}

impl Client {
    /// Create a new TFTP client
    pub fn new(config: ClientConfig) -> anyhow::Result<Self> {
        let server_str = config
            .server
            .ok_or_else(|| anyhow::anyhow!("Server address not specified"))?;
        let server_ip: Ipv4Addr = server_str
            .trim()
            .parse()
            .map_err(|e| anyhow::anyhow!("Invalid server address '{}': {}", server_str, e))?;

        Ok(Self {
            server: SocketAddrV4::new(server_ip, config.port.unwrap_or(DEFAULT_PORT)).into(),
            timeout: config.timeout.unwrap_or(DEFAULT_TIMEOUT),
        })
    }

    pub fn server(&self) -> SocketAddr {
        self.server
    }

    /// Download a file from the server (RRQ - Read Request)
    ///
    /// The local file is only created once the whole transfer succeeded.
    pub fn get(&self, remote_file: &str, local_file: &Path) -> Result<u64, TftpError> {
        log::info!("Downloading {} to {}", remote_file, local_file.display());

        let socket = bind_any()?;
        let content = transfer::download(&socket, self.server, remote_file, self.timeout)?;

        if let Some(parent) = local_file.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)
                .map_err(|e| TftpError::filesystem("Cannot create directory", parent, e))?;
        }
        if local_file.exists() {
            log::warn!("Overwriting existing file {}", local_file.display());
        }
        transfer::write_file(local_file, &content)?;

        Ok(content.len() as u64)
    }

    /// Upload a file to the server (WRQ - Write Request)
    pub fn put(&self, local_file: &Path, remote_file: &str) -> Result<u64, TftpError> {
        log::info!("Uploading {} to {}", local_file.display(), remote_file);

        let data = transfer::read_upload_source(local_file)?;
        let socket = bind_any()?;
        transfer::upload(&socket, self.server, remote_file, &data, self.timeout)?;

        Ok(data.len() as u64)
    }
}
