//! TFTP (Trivial File Transfer Protocol) 客户端实现
//!
//! 基于 [RFC 1350](https://www.rfc-editor.org/rfc/rfc1350) TFTP 协议版本 2，
//! 仅支持 octet 模式和固定 512 字节块大小，不进行选项协商。
//!
//! ## 模块结构
//!
//! ```text
//! tftp/
//! ├── core/           # 核心协议实现
//! │   ├── packet      # 协议包序列化/反序列化
//! │   ├── socket      # Socket 抽象层
//! │   └── error       # 错误类型
//! │
//! └── client/         # TFTP 客户端
//!     ├── transfer    # 锁步传输状态机（下载/上传）
//!     ├── client_impl # 单文件客户端
//!     └── config      # 客户端配置
//! ```
//!
//! 批量传输（主机范围 × 文件列表）见 [`crate::batch`]。

pub mod client;
pub mod core;
