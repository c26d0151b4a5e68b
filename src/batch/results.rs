use std::fmt;
use std::fs;
use std::net::Ipv4Addr;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use super::config::Direction;
use crate::tftp::core::{ErrorKind, TftpError};

/// Name of the report written into the working folder after each batch.
pub const REPORT_FILE: &str = "stats.txt";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutcomeStatus {
    Downloaded(PathBuf),
    Uploaded,
    Failed { kind: ErrorKind, message: String },
}

/// Result of one transfer job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferOutcome {
    pub slot: usize,
    pub host: Ipv4Addr,
    pub filename: String,
    pub direction: Direction,
    pub status: OutcomeStatus,
}

impl TransferOutcome {
    pub fn failed(slot: usize, host: Ipv4Addr, filename: &str, direction: Direction, err: &TftpError) -> Self {
        Self {
            slot,
            host,
            filename: filename.to_string(),
            direction,
            status: OutcomeStatus::Failed {
                kind: err.kind(),
                message: err.to_string(),
            },
        }
    }

    pub fn is_success(&self) -> bool {
        !matches!(self.status, OutcomeStatus::Failed { .. })
    }

    pub fn local_path(&self) -> Option<&Path> {
        match &self.status {
            OutcomeStatus::Downloaded(path) => Some(path),
            _ => None,
        }
    }

    pub fn error(&self) -> Option<&str> {
        match &self.status {
            OutcomeStatus::Failed { message, .. } => Some(message),
            _ => None,
        }
    }
}

impl fmt::Display for TransferOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.status {
            OutcomeStatus::Downloaded(path) => {
                write!(f, "{} {} -> {}", self.host, self.filename, path.display())
            }
            OutcomeStatus::Uploaded => write!(f, "{} <- {}", self.host, self.filename),
            OutcomeStatus::Failed { message, .. } => {
                write!(f, "{} {} failed: {}", self.host, self.filename, message)
            }
        }
    }
}

/// Summary handed back when a batch ends.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchReport {
    pub direction: Direction,
    pub cancelled: bool,
    pub targets: u64,
    pub files: usize,
    pub attempted: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub report_path: Option<PathBuf>,
    pub summary: String,
}

impl fmt::Display for BatchReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({} attempted, {} failed{})",
            self.summary,
            self.attempted,
            self.failed,
            if self.cancelled { ", cancelled" } else { "" }
        )
    }
}

/// Thread-safe collection of transfer outcomes for the current batch.
#[derive(Debug, Default)]
pub struct ResultAggregator {
    outcomes: Mutex<Vec<TransferOutcome>>,
}

impl ResultAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<TransferOutcome>> {
        // A panicking worker must not take the results down with it
        self.outcomes
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn record(&self, outcome: TransferOutcome) {
        self.lock().push(outcome);
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    pub fn outcomes(&self) -> Vec<TransferOutcome> {
        self.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Successful outcomes ordered by host address, then filename.
    pub fn successes(&self) -> Vec<TransferOutcome> {
        let mut ok: Vec<_> = self.lock().iter().filter(|o| o.is_success()).cloned().collect();
        ok.sort_by(|a, b| {
            u32::from(a.host)
                .cmp(&u32::from(b.host))
                .then_with(|| a.filename.cmp(&b.filename))
        });
        ok
    }

    pub fn success_count(&self) -> usize {
        self.lock().iter().filter(|o| o.is_success()).count()
    }

    pub fn summary(&self, direction: Direction) -> String {
        let verb = match direction {
            Direction::Get => "downloaded",
            Direction::Put => "uploaded",
        };
        match self.success_count() {
            0 => format!("No files have been {}", verb),
            n => format!("{} files have been {}", n, verb),
        }
    }

    /// Writes `<dir>/stats.txt` with one `address: path` line per success.
    /// Uploads list the remote filename instead of a local path.
    pub fn write_report(&self, dir: &Path) -> Result<PathBuf, TftpError> {
        fs::create_dir_all(dir)
            .map_err(|e| TftpError::filesystem("Cannot create directory", dir, e))?;

        let mut content = String::new();
        for outcome in self.successes() {
            let target = match outcome.local_path() {
                Some(path) => path.display().to_string(),
                None => outcome.filename.clone(),
            };
            content.push_str(&format!("{}: {}\n", outcome.host, target));
        }

        let path = dir.join(REPORT_FILE);
        fs::write(&path, content)
            .map_err(|e| TftpError::filesystem("Cannot write report", &path, e))?;
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn downloaded(host: &str, file: &str, path: &str) -> TransferOutcome {
        TransferOutcome {
            slot: 0,
            host: host.parse().unwrap(),
            filename: file.to_string(),
            direction: Direction::Get,
            status: OutcomeStatus::Downloaded(PathBuf::from(path)),
        }
    }

    #[test]
    fn test_summary_counts_successes_only() {
        let results = ResultAggregator::new();
        assert_eq!(results.summary(Direction::Get), "No files have been downloaded");

        results.record(TransferOutcome::failed(
            1,
            "10.0.0.3".parse().unwrap(),
            "a",
            Direction::Get,
            &TftpError::InvalidFirstByte(9),
        ));
        assert_eq!(results.summary(Direction::Get), "No files have been downloaded");

        results.record(downloaded("10.0.0.2", "a", "/w/10.0.0.2/a"));
        results.record(downloaded("10.0.0.1", "a", "/w/10.0.0.1/a"));
        assert_eq!(results.summary(Direction::Get), "2 files have been downloaded");
        assert_eq!(results.len(), 3);

        results.clear();
        assert!(results.is_empty());
    }

    #[test]
    fn test_report_is_sorted_by_address() {
        let dir = tempfile::tempdir().unwrap();
        let results = ResultAggregator::new();
        results.record(downloaded("10.0.0.10", "a", "/w/10.0.0.10/a"));
        results.record(downloaded("10.0.0.9", "b", "/w/10.0.0.9/b"));
        results.record(TransferOutcome::failed(
            0,
            "10.0.0.1".parse().unwrap(),
            "a",
            Direction::Get,
            &TftpError::config("nope"),
        ));

        let path = results.write_report(dir.path()).unwrap();
        assert_eq!(path, dir.path().join(REPORT_FILE));
        let text = fs::read_to_string(path).unwrap();
        assert_eq!(text, "10.0.0.9: /w/10.0.0.9/b\n10.0.0.10: /w/10.0.0.10/a\n");
    }

    #[test]
    fn test_failed_outcome_keeps_context() {
        let outcome = TransferOutcome::failed(
            2,
            "10.0.0.1".parse().unwrap(),
            "a",
            Direction::Get,
            &TftpError::OutOfSequence {
                expected: 2,
                found: 5,
            },
        );
        assert!(!outcome.is_success());
        assert_eq!(
            outcome.error(),
            Some("Error on incoming packet number 5 vs expected 2")
        );
        assert!(matches!(
            outcome.status,
            OutcomeStatus::Failed {
                kind: ErrorKind::Protocol,
                ..
            }
        ));
    }
}
