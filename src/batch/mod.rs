//! Batch TFTP transfers across many hosts.
//!
//! A batch expands a host list (single IPv4 addresses and inclusive ranges)
//! and a file manifest, then runs lock-step TFTP transfers for every
//! (host, file) pair on a fixed pool of worker slots. Each slot owns one UDP
//! socket for the life of the engine.
//!
//! - [`targets`]: host list and file manifest expansion
//! - [`pool`]: worker slots and the dispatcher that feeds them
//! - [`engine`]: scheduler, cancellation and the start/stop entry points
//! - [`results`]: outcome aggregation and the `stats.txt` report
//! - [`events`]: observer seam for progress, info and error messages
//!
//! # Command Line Usage
//!
//! ```bash
//! # Download every file in files.txt from every host in hosts.txt
//! tftpfleet batch --hosts hosts.txt --files files.txt --working-folder ./out
//!
//! # Single host, literal file name, try every file
//! tftpfleet batch --hosts 10.0.0.5 --files boot.cfg --policy attempt-all
//! ```

mod cli;
pub mod config;
pub mod engine;
pub mod events;
pub mod pool;
pub mod results;
pub mod state;
pub mod targets;

pub use cli::{BatchArgs, run_with_config};
pub use config::{BatchConfig, BatchOptions, Direction, SchedulePolicy};
pub use engine::BatchEngine;
pub use events::{BatchEvent, BatchObserver, ChannelObserver, LogObserver, NoopObserver};
pub use results::{BatchReport, OutcomeStatus, ResultAggregator, TransferOutcome, REPORT_FILE};
pub use state::{BatchProgress, BatchState};
pub use targets::{AddressRange, FileManifest, TargetList};
