//! Events the batch engine publishes to presentation layers.
//!
//! The engine never talks to a UI directly. It publishes [`BatchEvent`]s to
//! a [`BatchObserver`]; the CLI renders them as a progress bar, tests
//! collect them through a [`ChannelObserver`].

use std::net::Ipv4Addr;
use std::sync::Mutex;
use std::sync::mpsc::Sender;

use super::results::{BatchReport, TransferOutcome};

#[derive(Debug, Clone)]
pub enum BatchEvent {
    /// Targets and manifest have been expanded and scheduling begins.
    Started { address_count: u64, file_count: usize },
    /// The scheduler moved on to a new address.
    Progress {
        processed: u64,
        address_count: u64,
        address: Ipv4Addr,
    },
    /// A worker slot picked up a transfer.
    JobStarted {
        slot: usize,
        host: Ipv4Addr,
        filename: String,
    },
    /// A worker slot finished a transfer, successfully or not.
    JobFinished(TransferOutcome),
    /// Informational message for the user.
    Info(String),
    /// Error with a short title and a detailed message.
    Error { title: String, message: String },
    /// The batch ended, completed or cancelled.
    Finished(BatchReport),
}

/// Receiver of engine events.
///
/// Called from the scheduler thread and from worker threads; implementations
/// must not block for long.
pub trait BatchObserver: Send + Sync {
    fn on_event(&self, event: &BatchEvent);
}

/// Discards every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopObserver;

impl BatchObserver for NoopObserver {
    fn on_event(&self, _event: &BatchEvent) {}
}

/// Mirrors events into the `log` facade.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogObserver;

impl BatchObserver for LogObserver {
    fn on_event(&self, event: &BatchEvent) {
        match event {
            BatchEvent::Started {
                address_count,
                file_count,
            } => log::info!(
                "Batch started: {} address(es) x {} file(s)",
                address_count,
                file_count
            ),
            BatchEvent::Progress {
                processed,
                address_count,
                address,
            } => log::debug!("[{}/{}] {}", processed, address_count, address),
            BatchEvent::JobStarted {
                slot,
                host,
                filename,
            } => log::debug!("Worker {} -> {} {}", slot, host, filename),
            BatchEvent::JobFinished(outcome) => log::debug!("Worker {} done: {}", outcome.slot, outcome),
            BatchEvent::Info(msg) => log::info!("{}", msg),
            BatchEvent::Error { title, message } => log::error!("{}: {}", title, message),
            BatchEvent::Finished(report) => log::info!("Batch finished: {}", report),
        }
    }
}

/// Forwards clones of every event over an mpsc channel. Events published
/// after the receiver is dropped are discarded.
pub struct ChannelObserver {
    tx: Mutex<Sender<BatchEvent>>,
}

impl ChannelObserver {
    pub fn new(tx: Sender<BatchEvent>) -> Self {
        Self { tx: Mutex::new(tx) }
    }
}

impl BatchObserver for ChannelObserver {
    fn on_event(&self, event: &BatchEvent) {
        if let Ok(tx) = self.tx.lock() {
            let _ = tx.send(event.clone());
        }
    }
}
