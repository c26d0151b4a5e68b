//! TFTP 核心协议实现
//!
//! 本模块包含 TFTP 协议的核心组件：
//! - `packet`: 协议包的序列化和反序列化（RRQ/WRQ/DATA/ACK/ERROR）
//! - `socket`: Socket 抽象层
//! - `error`: 错误类型及分类

mod error;
mod packet;
mod socket;

// 公开核心类型
pub use error::{ErrorKind, TftpError};
pub use packet::{BLOCK_SIZE, MAX_PACKET_SIZE, MODE_OCTET, Opcode, Packet};
pub use socket::{Socket, bind_any};
