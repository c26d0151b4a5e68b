//! Lock-step transfer state machine.
//!
//! One call drives one download or upload over a caller-owned socket. The
//! exchange is strictly sequential: every DATA block must carry the next
//! expected block number and every ACK must acknowledge the block just
//! sent. Any deviation, a missing reply, or a short write ends the transfer
//! immediately; nothing is retransmitted.
//!
//! ```text
//! get: REQUESTING -> AWAIT_DATA -> (ACKING -> AWAIT_DATA)* -> DONE
//! put: REQUESTING -> AWAIT_ACK0 -> (SENDING_DATA -> AWAIT_ACK)* -> DONE
//! ```

use std::fs::{self, File};
use std::io::Write;
use std::net::SocketAddr;
use std::path::{Component, Path, PathBuf};
use std::time::{Duration, Instant};

use crate::tftp::core::{BLOCK_SIZE, Opcode, Packet, Socket, TftpError};

/// Remote end of a transfer. The request goes to the well-known port; the
/// first reply from the same host fixes the transfer identifier (source
/// port) that the rest of the exchange is bound to.
struct Peer {
    server: SocketAddr,
    tid: Option<SocketAddr>,
}

impl Peer {
    fn new(server: SocketAddr) -> Self {
        Self { server, tid: None }
    }

    fn addr(&self) -> SocketAddr {
        self.tid.unwrap_or(self.server)
    }

    fn accept(&mut self, src: SocketAddr) -> bool {
        match self.tid {
            Some(tid) => tid == src,
            None if src.ip() == self.server.ip() => {
                self.tid = Some(src);
                true
            }
            None => false,
        }
    }
}

fn await_packet<S: Socket + ?Sized>(
    socket: &S,
    peer: &mut Peer,
    timeout: Duration,
) -> Result<Packet, TftpError> {
    let deadline = Instant::now() + timeout;
    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        let no_response = || TftpError::NoResponse {
            peer: peer.addr(),
            timeout,
        };
        if remaining.is_zero() {
            return Err(no_response());
        }

        let Some((bytes, src)) = socket.recv_from(remaining)? else {
            return Err(no_response());
        };
        if !peer.accept(src) {
            log::debug!("Discarding datagram from unexpected source {}", src);
            continue;
        }
        return Packet::deserialize(&bytes);
    }
}

fn expect_data(packet: Packet, expected: u16) -> Result<Vec<u8>, TftpError> {
    match packet {
        Packet::Data { block_num, data } if block_num == expected => Ok(data),
        Packet::Data { block_num, .. } => Err(TftpError::OutOfSequence {
            expected,
            found: block_num,
        }),
        other => Err(unexpected(other, Opcode::Data)),
    }
}

fn expect_ack(packet: Packet, expected: u16) -> Result<(), TftpError> {
    match packet {
        Packet::Ack(block_num) if block_num == expected => Ok(()),
        Packet::Ack(block_num) => Err(TftpError::OutOfSequence {
            expected,
            found: block_num,
        }),
        other => Err(unexpected(other, Opcode::Ack)),
    }
}

fn unexpected(packet: Packet, expected: Opcode) -> TftpError {
    match packet {
        Packet::Error { code, msg } => TftpError::Remote { code, message: msg },
        other => TftpError::UnexpectedOpcode {
            expected: expected.as_u16(),
            found: other.opcode().as_u16(),
        },
    }
}

/// Downloads `filename` from `server` and returns the file content.
///
/// Stale datagrams left on the socket by a previous transfer are discarded
/// before the read request goes out. The transfer ends with the first block
/// shorter than [`BLOCK_SIZE`], which may be empty when the file size is an
/// exact multiple of the block size.
pub fn download<S: Socket + ?Sized>(
    socket: &S,
    server: SocketAddr,
    filename: &str,
    timeout: Duration,
) -> Result<Vec<u8>, TftpError> {
    let stale = socket.drain()?;
    if stale > 0 {
        log::debug!("Discarded {} stale datagram(s) before requesting {}", stale, filename);
    }

    let mut peer = Peer::new(server);
    socket.send_to(
        &Packet::Rrq {
            filename: filename.to_string(),
        },
        &server,
    )?;

    let mut content = Vec::new();
    let mut expected: u16 = 1;
    loop {
        let packet = await_packet(socket, &mut peer, timeout)?;
        let data = expect_data(packet, expected)?;
        let last = data.len() < BLOCK_SIZE;
        content.extend_from_slice(&data);

        socket.send_to(&Packet::Ack(expected), &peer.addr())?;

        if last {
            break;
        }
        expected = expected.wrapping_add(1);
    }

    log::debug!(
        "Received {} ({} bytes) from {}",
        filename,
        content.len(),
        peer.addr()
    );
    Ok(content)
}

/// Uploads `data` to `server` as `filename` and returns the number of DATA
/// blocks sent.
///
/// An empty buffer is rejected before any network I/O. When the length is an
/// exact multiple of [`BLOCK_SIZE`] an empty block terminates the transfer.
pub fn upload<S: Socket + ?Sized>(
    socket: &S,
    server: SocketAddr,
    filename: &str,
    data: &[u8],
    timeout: Duration,
) -> Result<u64, TftpError> {
    if data.is_empty() {
        return Err(TftpError::config(format!("Input file {} is empty", filename)));
    }

    let stale = socket.drain()?;
    if stale > 0 {
        log::debug!("Discarded {} stale datagram(s) before sending {}", stale, filename);
    }

    let mut peer = Peer::new(server);
    socket.send_to(
        &Packet::Wrq {
            filename: filename.to_string(),
        },
        &server,
    )?;

    let mut block: u16 = 0;
    let mut offset = 0;
    let mut sent: u64 = 0;
    let mut finished = false;
    loop {
        let packet = await_packet(socket, &mut peer, timeout)?;
        expect_ack(packet, block)?;
        if finished {
            break;
        }

        let end = (offset + BLOCK_SIZE).min(data.len());
        let chunk = &data[offset..end];
        finished = chunk.len() < BLOCK_SIZE;
        block = block.wrapping_add(1);

        socket.send_to(
            &Packet::Data {
                block_num: block,
                data: chunk.to_vec(),
            },
            &peer.addr(),
        )?;
        offset = end;
        sent += 1;
    }

    log::debug!(
        "Sent {} ({} bytes, {} blocks) to {}",
        filename,
        data.len(),
        sent,
        peer.addr()
    );
    Ok(sent)
}

/// Checks that a remote filename maps to a path below the per-host folder.
pub fn validate_remote_name(filename: &str) -> Result<&Path, TftpError> {
    if filename.trim().is_empty() {
        return Err(TftpError::config("Filename cannot be empty"));
    }
    let path = Path::new(filename);
    let escapes = path
        .components()
        .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
    if escapes {
        return Err(TftpError::config(format!(
            "Filename {} must be a relative path without '..'",
            filename
        )));
    }
    Ok(path)
}

/// Where a downloaded file ended up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SavedFile {
    pub path: PathBuf,
    pub overwritten: bool,
}

/// Writes downloaded content to `<working>/<host>/<filename>`, creating the
/// host folder on demand. A failed write removes the partial file.
pub fn save_download(
    working: &Path,
    host: &str,
    filename: &str,
    content: &[u8],
) -> Result<SavedFile, TftpError> {
    let relative = validate_remote_name(filename)?;
    let path = working.join(host).join(relative);
    let path = std::path::absolute(&path)
        .map_err(|e| TftpError::filesystem("Cannot resolve path", &path, e))?;

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .map_err(|e| TftpError::filesystem("Cannot create directory", parent, e))?;
    }

    let overwritten = path.exists();
    if overwritten {
        log::warn!("Overwriting existing file {}", path.display());
    }

    write_file(&path, content)?;
    Ok(SavedFile { path, overwritten })
}

/// Creates (or truncates) `path` and writes `content` to it, removing the
/// file again if the write does not complete.
pub fn write_file(path: &Path, content: &[u8]) -> Result<(), TftpError> {
    let mut file = File::create(path)
        .map_err(|e| TftpError::filesystem("Cannot open file for writing", path, e))?;

    if let Err(e) = file.write_all(content).and_then(|_| file.flush()) {
        drop(file);
        if let Err(rm) = fs::remove_file(path) {
            log::warn!("Cannot remove partial file {}: {}", path.display(), rm);
        }
        return Err(TftpError::filesystem(
            "Cannot write received content to",
            path,
            e,
        ));
    }

    Ok(())
}

/// Reads a whole upload source into memory. Empty files are rejected.
pub fn read_upload_source(path: &Path) -> Result<Vec<u8>, TftpError> {
    let data = fs::read(path)
        .map_err(|e| TftpError::filesystem("Cannot open file for reading", path, e))?;
    if data.is_empty() {
        return Err(TftpError::config(format!(
            "Input file {} is empty",
            path.display()
        )));
    }
    Ok(data)
}
