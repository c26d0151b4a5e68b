//! TFTP packet serialization and deserialization (RFC 1350).
//!
//! Only the five classic opcodes are understood. Every packet starts with a
//! two byte big-endian opcode; since all opcodes are below 256 the first byte
//! on the wire is always zero, which is the framing check applied before
//! anything else is read.
//!
//! ```text
//!  RRQ/WRQ | 00 01/02 | filename | 0 | "octet" | 0 |
//!  DATA    | 00 03    | block #  | 0..512 bytes    |
//!  ACK     | 00 04    | block #  |
//!  ERROR   | 00 05    | code     | message | 0 |
//! ```

use super::error::TftpError;

/// Fixed payload size of a DATA packet. A shorter payload ends a transfer.
pub const BLOCK_SIZE: usize = 512;

/// Largest datagram a peer may legally send us: opcode + block + payload.
pub const MAX_PACKET_SIZE: usize = BLOCK_SIZE + 4;

/// The only transfer mode this client speaks.
pub const MODE_OCTET: &str = "octet";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum Opcode {
    Rrq = 1,
    Wrq = 2,
    Data = 3,
    Ack = 4,
    Error = 5,
}

impl Opcode {
    pub fn from_u16(value: u16) -> Option<Self> {
        match value {
            1 => Some(Opcode::Rrq),
            2 => Some(Opcode::Wrq),
            3 => Some(Opcode::Data),
            4 => Some(Opcode::Ack),
            5 => Some(Opcode::Error),
            _ => None,
        }
    }

    pub fn as_u16(self) -> u16 {
        self as u16
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Packet {
    Rrq { filename: String },
    Wrq { filename: String },
    Data { block_num: u16, data: Vec<u8> },
    Ack(u16),
    Error { code: u16, msg: String },
}

impl Packet {
    pub fn opcode(&self) -> Opcode {
        match self {
            Packet::Rrq { .. } => Opcode::Rrq,
            Packet::Wrq { .. } => Opcode::Wrq,
            Packet::Data { .. } => Opcode::Data,
            Packet::Ack(_) => Opcode::Ack,
            Packet::Error { .. } => Opcode::Error,
        }
    }

    /// Encodes the packet into its wire representation. No I/O.
    pub fn serialize(&self) -> Result<Vec<u8>, TftpError> {
        let mut buf = Vec::with_capacity(MAX_PACKET_SIZE);
        buf.extend_from_slice(&self.opcode().as_u16().to_be_bytes());

        match self {
            Packet::Rrq { filename } | Packet::Wrq { filename } => {
                if filename.is_empty() {
                    return Err(TftpError::config("Filename cannot be empty"));
                }
                push_latin1(&mut buf, filename)?;
                buf.push(0);
                buf.extend_from_slice(MODE_OCTET.as_bytes());
                buf.push(0);
            }
            Packet::Data { block_num, data } => {
                if data.len() > BLOCK_SIZE {
                    return Err(TftpError::Malformed(format!(
                        "data block of {} bytes exceeds {} bytes",
                        data.len(),
                        BLOCK_SIZE
                    )));
                }
                buf.extend_from_slice(&block_num.to_be_bytes());
                buf.extend_from_slice(data);
            }
            Packet::Ack(block_num) => {
                buf.extend_from_slice(&block_num.to_be_bytes());
            }
            Packet::Error { code, msg } => {
                buf.extend_from_slice(&code.to_be_bytes());
                push_latin1(&mut buf, msg)?;
                buf.push(0);
            }
        }

        Ok(buf)
    }

    /// Decodes a datagram. The framing byte is validated before anything
    /// else in the buffer is looked at.
    pub fn deserialize(buf: &[u8]) -> Result<Packet, TftpError> {
        match buf.first() {
            None => return Err(TftpError::Truncated { len: 0 }),
            Some(&0) => {}
            Some(&byte) => return Err(TftpError::InvalidFirstByte(byte)),
        }
        if buf.len() < 2 {
            return Err(TftpError::Truncated { len: buf.len() });
        }

        let raw = u16::from_be_bytes([buf[0], buf[1]]);
        let opcode = Opcode::from_u16(raw).ok_or(TftpError::UnknownOpcode(raw))?;
        let body = &buf[2..];

        match opcode {
            Opcode::Rrq | Opcode::Wrq => {
                let (filename, rest) = read_cstr(body)?;
                let (mode, _) = read_cstr(rest)?;
                if !mode.eq_ignore_ascii_case(MODE_OCTET) {
                    return Err(TftpError::Malformed(format!("unsupported mode '{}'", mode)));
                }
                if opcode == Opcode::Rrq {
                    Ok(Packet::Rrq { filename })
                } else {
                    Ok(Packet::Wrq { filename })
                }
            }
            Opcode::Data => {
                let block_num = read_u16(buf)?;
                let data = &buf[4..];
                if data.len() > BLOCK_SIZE {
                    return Err(TftpError::Malformed(format!(
                        "data block of {} bytes exceeds {} bytes",
                        data.len(),
                        BLOCK_SIZE
                    )));
                }
                Ok(Packet::Data {
                    block_num,
                    data: data.to_vec(),
                })
            }
            Opcode::Ack => Ok(Packet::Ack(read_u16(buf)?)),
            Opcode::Error => {
                let code = read_u16(buf)?;
                // Some servers omit the trailing NUL on the message
                let msg = match read_cstr(&buf[4..]) {
                    Ok((msg, _)) => msg,
                    Err(_) => from_latin1(&buf[4..]),
                };
                Ok(Packet::Error { code, msg })
            }
        }
    }
}

/// Reads the block number (or error code) that follows the opcode.
fn read_u16(buf: &[u8]) -> Result<u16, TftpError> {
    if buf.len() < 4 {
        return Err(TftpError::Truncated { len: buf.len() });
    }
    Ok(u16::from_be_bytes([buf[2], buf[3]]))
}

fn read_cstr(buf: &[u8]) -> Result<(String, &[u8]), TftpError> {
    let end = buf
        .iter()
        .position(|&b| b == 0)
        .ok_or_else(|| TftpError::Malformed("missing string terminator".to_string()))?;
    Ok((from_latin1(&buf[..end]), &buf[end + 1..]))
}

fn from_latin1(bytes: &[u8]) -> String {
    bytes.iter().map(|&b| b as char).collect()
}

fn push_latin1(buf: &mut Vec<u8>, s: &str) -> Result<(), TftpError> {
    for c in s.chars() {
        let code = c as u32;
        if code == 0 {
            return Err(TftpError::config(format!("'{}' contains a NUL character", s)));
        }
        if code > 0xFF {
            return Err(TftpError::config(format!(
                "'{}' cannot be encoded as Latin-1 (character '{}')",
                s, c
            )));
        }
        buf.push(code as u8);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rrq_layout() {
        let bytes = Packet::Rrq {
            filename: "boot.cfg".to_string(),
        }
        .serialize()
        .unwrap();

        assert_eq!(bytes, b"\x00\x01boot.cfg\x00octet\x00");
    }

    #[test]
    fn test_wrq_layout() {
        let bytes = Packet::Wrq {
            filename: "a".to_string(),
        }
        .serialize()
        .unwrap();

        assert_eq!(bytes, b"\x00\x02a\x00octet\x00");
    }

    #[test]
    fn test_latin1_filename() {
        let bytes = Packet::Rrq {
            filename: "caf\u{e9}".to_string(),
        }
        .serialize()
        .unwrap();
        assert_eq!(&bytes[2..6], &[b'c', b'a', b'f', 0xE9]);

        let packet = Packet::deserialize(&bytes).unwrap();
        assert_eq!(
            packet,
            Packet::Rrq {
                filename: "caf\u{e9}".to_string()
            }
        );
    }

    #[test]
    fn test_request_rejects_unencodable_names() {
        let empty = Packet::Rrq {
            filename: String::new(),
        };
        assert!(matches!(empty.serialize(), Err(TftpError::Config(_))));

        let wide = Packet::Wrq {
            filename: "\u{4e2d}.txt".to_string(),
        };
        assert!(matches!(wide.serialize(), Err(TftpError::Config(_))));

        let nul = Packet::Rrq {
            filename: "a\0b".to_string(),
        };
        assert!(matches!(nul.serialize(), Err(TftpError::Config(_))));
    }

    #[test]
    fn test_block_number_is_big_endian() {
        let bytes = Packet::Ack(0x1234).serialize().unwrap();
        assert_eq!(bytes, vec![0x00, 0x04, 0x12, 0x34]);

        let bytes = Packet::Data {
            block_num: 0xFF01,
            data: vec![9, 8],
        }
        .serialize()
        .unwrap();
        assert_eq!(bytes, vec![0x00, 0x03, 0xFF, 0x01, 9, 8]);

        assert_eq!(
            Packet::deserialize(&[0x00, 0x04, 0xAB, 0xCD]).unwrap(),
            Packet::Ack(0xABCD)
        );
    }

    #[test]
    fn test_data_payload_limits() {
        let full = Packet::Data {
            block_num: 1,
            data: vec![0xAA; BLOCK_SIZE],
        };
        assert_eq!(full.serialize().unwrap().len(), MAX_PACKET_SIZE);

        let oversized = Packet::Data {
            block_num: 1,
            data: vec![0xAA; BLOCK_SIZE + 1],
        };
        assert!(matches!(oversized.serialize(), Err(TftpError::Malformed(_))));

        let mut wire = vec![0x00, 0x03, 0x00, 0x01];
        wire.extend(vec![0u8; BLOCK_SIZE + 1]);
        assert!(matches!(
            Packet::deserialize(&wire),
            Err(TftpError::Malformed(_))
        ));

        let empty = Packet::deserialize(&[0x00, 0x03, 0x00, 0x07]).unwrap();
        assert_eq!(
            empty,
            Packet::Data {
                block_num: 7,
                data: Vec::new()
            }
        );
    }

    #[test]
    fn test_invalid_first_byte_is_checked_first() {
        // A non-zero first byte fails even when the rest is garbage or short
        assert!(matches!(
            Packet::deserialize(&[0x01]),
            Err(TftpError::InvalidFirstByte(1))
        ));
        assert!(matches!(
            Packet::deserialize(&[0xFF, 0x03, 0x00, 0x01, 1, 2, 3]),
            Err(TftpError::InvalidFirstByte(0xFF))
        ));
    }

    #[test]
    fn test_truncated_and_unknown() {
        assert!(matches!(
            Packet::deserialize(&[]),
            Err(TftpError::Truncated { len: 0 })
        ));
        assert!(matches!(
            Packet::deserialize(&[0x00]),
            Err(TftpError::Truncated { len: 1 })
        ));
        assert!(matches!(
            Packet::deserialize(&[0x00, 0x04, 0x01]),
            Err(TftpError::Truncated { len: 3 })
        ));
        assert!(matches!(
            Packet::deserialize(&[0x00, 0x06, 0x00, 0x00]),
            Err(TftpError::UnknownOpcode(6))
        ));
    }

    #[test]
    fn test_error_packet() {
        let bytes = Packet::Error {
            code: 1,
            msg: "File not found".to_string(),
        }
        .serialize()
        .unwrap();
        assert_eq!(bytes, b"\x00\x05\x00\x01File not found\x00");

        assert_eq!(
            Packet::deserialize(b"\x00\x05\x00\x02denied").unwrap(),
            Packet::Error {
                code: 2,
                msg: "denied".to_string()
            }
        );
    }

    #[test]
    fn test_request_requires_octet_mode() {
        assert!(matches!(
            Packet::deserialize(b"\x00\x01f\x00netascii\x00"),
            Err(TftpError::Malformed(_))
        ));
        assert!(matches!(
            Packet::deserialize(b"\x00\x02f\x00OCTET\x00").unwrap(),
            Packet::Wrq { .. }
        ));
    }
}
