use std::net::{Ipv4Addr, SocketAddr};
use std::ops::Range;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};

use anyhow::anyhow;

use super::config::{BatchOptions, Direction, SchedulePolicy};
use super::events::{BatchEvent, BatchObserver};
use super::pool::{Dispatcher, WorkerPool, WorkerSlot};
use super::results::{BatchReport, OutcomeStatus, ResultAggregator, TransferOutcome};
use super::state::{BatchProgress, BatchState};
use super::targets::{FileManifest, TargetList};
use crate::tftp::client::transfer;
use crate::tftp::core::TftpError;

/// Work handed to one worker slot: a host and the manifest entries to try
/// on it, in order.
struct Assignment {
    host: Ipv4Addr,
    files: Arc<[String]>,
    indices: Range<usize>,
}

/// Batch TFTP engine.
///
/// Owns the worker pool for its whole lifetime and runs one batch at a time
/// on a dedicated thread. The two entry points are [`BatchEngine::start`]
/// and [`BatchEngine::stop`]; progress is observable through
/// [`BatchEngine::state`] and the configured [`BatchObserver`].
///
/// # Example
///
/// ```rust,no_run
/// use std::sync::Arc;
/// use tftpfleet::batch::{BatchEngine, BatchOptions, LogObserver};
///
/// let options = BatchOptions::new("hosts.txt", "files.txt", "/tmp/tftp");
/// let engine = BatchEngine::new(options, Arc::new(LogObserver)).unwrap();
/// let report = engine.run().unwrap();
/// println!("{}", report.summary);
/// ```
pub struct BatchEngine {
    options: BatchOptions,
    observer: Arc<dyn BatchObserver>,
    state: Arc<BatchState>,
    results: Arc<ResultAggregator>,
    pool: Arc<WorkerPool>,
    handle: Mutex<Option<JoinHandle<BatchReport>>>,
}

impl BatchEngine {
    /// Creates the engine and binds one socket per worker slot.
    pub fn new(options: BatchOptions, observer: Arc<dyn BatchObserver>) -> Result<Self, TftpError> {
        let pool = WorkerPool::new(options.workers)?;
        Ok(Self {
            options,
            observer,
            state: Arc::new(BatchState::new()),
            results: Arc::new(ResultAggregator::new()),
            pool: Arc::new(pool),
            handle: Mutex::new(None),
        })
    }

    pub fn options(&self) -> &BatchOptions {
        &self.options
    }

    /// Shared batch state; clone the `Arc` to stop the batch from elsewhere.
    pub fn state(&self) -> &Arc<BatchState> {
        &self.state
    }

    pub fn progress(&self) -> BatchProgress {
        self.state.snapshot()
    }

    pub fn is_running(&self) -> bool {
        self.state.is_running()
    }

    /// Outcomes recorded so far in the current (or last) batch.
    pub fn outcomes(&self) -> Vec<TransferOutcome> {
        self.results.outcomes()
    }

    pub fn worker_count(&self) -> usize {
        self.pool.len()
    }

    /// Local addresses of the worker sockets, one per slot.
    pub fn local_addrs(&self) -> &[SocketAddr] {
        self.pool.local_addrs()
    }

    /// Last error of worker slot `index`, empty if it never failed.
    pub fn last_error(&self, index: usize) -> Option<String> {
        self.pool.last_error(index)
    }

    /// Rebuilds every worker slot with a fresh socket. Refused while a batch
    /// is running.
    pub fn set_worker_count(&mut self, count: usize) -> Result<(), TftpError> {
        if self.is_running() {
            return Err(TftpError::config(
                "Cannot change the worker count while a batch is running",
            ));
        }
        self.pool = Arc::new(WorkerPool::new(count)?);
        self.options.workers = count;
        log::info!("Worker pool rebuilt with {} slot(s)", count);
        Ok(())
    }

    fn handle(&self) -> MutexGuard<'_, Option<JoinHandle<BatchReport>>> {
        self.handle
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Starts a batch on a dedicated thread and returns immediately.
    pub fn start(&self) -> Result<(), TftpError> {
        let mut handle = self.handle();
        if !self.state.try_begin() {
            return Err(TftpError::config("A batch is already running"));
        }
        // Reap a finished batch nobody waited for
        if let Some(previous) = handle.take()
            && previous.join().is_err()
        {
            log::error!("Previous batch thread panicked");
        }
        self.results.clear();

        let run = BatchRun {
            options: self.options.clone(),
            observer: Arc::clone(&self.observer),
            state: Arc::clone(&self.state),
            results: Arc::clone(&self.results),
            pool: Arc::clone(&self.pool),
        };
        let spawned = thread::Builder::new()
            .name("tftp-batch".to_string())
            .spawn(move || run.execute());
        match spawned {
            Ok(join) => {
                *handle = Some(join);
                Ok(())
            }
            Err(e) => {
                self.state.stop();
                Err(TftpError::Io(e))
            }
        }
    }

    /// Requests cancellation. In-flight transfers finish; no new host or
    /// file is started.
    pub fn stop(&self) {
        if self.state.is_running() {
            log::info!("Stopping batch");
        }
        self.state.stop();
    }

    /// Blocks until the current batch ends and returns its report.
    pub fn wait(&self) -> anyhow::Result<BatchReport> {
        let handle = self
            .handle()
            .take()
            .ok_or_else(|| anyhow!("No batch has been started"))?;
        handle.join().map_err(|_| {
            self.state.stop();
            anyhow!("Batch thread panicked")
        })
    }

    /// Runs a batch to completion on the dedicated thread.
    pub fn run(&self) -> anyhow::Result<BatchReport> {
        self.start()?;
        self.wait()
    }
}

/// Everything the batch thread needs, detached from the engine.
struct BatchRun {
    options: BatchOptions,
    observer: Arc<dyn BatchObserver>,
    state: Arc<BatchState>,
    results: Arc<ResultAggregator>,
    pool: Arc<WorkerPool>,
}

impl BatchRun {
    fn publish(&self, event: BatchEvent) {
        self.observer.on_event(&event);
    }

    fn publish_error(&self, err: &TftpError, context: &str) {
        let message = format!("{}: {}", context, err);
        log::error!("{}", message);
        self.publish(BatchEvent::Error {
            title: err.kind().to_string(),
            message,
        });
    }

    fn execute(self) -> BatchReport {
        let opts = &self.options;
        let expanded = TargetList::from_spec(&opts.hosts).and_then(|targets| {
            FileManifest::from_spec(&opts.files, &opts.prefix, &opts.extension)
                .map(|manifest| (targets, manifest))
        });

        let (targets, manifest) = match expanded {
            Ok(expanded) => expanded,
            Err(e) => {
                self.publish_error(&e, "Cannot start batch");
                self.state.reset(0, 0);
                // Keep the report of the last batch that actually ran
                return self.finish(0, 0, false, None);
            }
        };

        self.state.reset(targets.len(), manifest.len());
        self.publish(BatchEvent::Started {
            address_count: targets.len(),
            file_count: manifest.len(),
        });
        self.publish(BatchEvent::Info(format!(
            "Processing {} address(es) x {} file(s) with {} worker(s)",
            targets.len(),
            manifest.len(),
            self.pool.len()
        )));

        let interrupted = self.pool.run(
            |slot, assignment| self.work(slot, assignment),
            |dispatcher| self.schedule(dispatcher, &targets, &manifest),
        );
        let cancelled = interrupted || !self.state.is_running();
        if cancelled {
            self.publish(BatchEvent::Info("Batch cancelled".to_string()));
        }

        let report_path = self.write_report();
        self.finish(targets.len(), manifest.len(), cancelled, report_path)
    }

    /// Walks every address and hands work to idle slots. Returns `true` if
    /// the batch was cancelled before everything was submitted.
    fn schedule(
        &self,
        dispatcher: &Dispatcher<Assignment>,
        targets: &TargetList,
        manifest: &FileManifest,
    ) -> bool {
        let files: Arc<[String]> = manifest.names().into();
        let keep_going = || self.state.is_running();

        for host in targets.iter() {
            if !keep_going() {
                return true;
            }
            self.state.set_current_address(host);
            self.publish(BatchEvent::Progress {
                processed: self.state.processed(),
                address_count: self.state.address_count(),
                address: host,
            });

            match self.options.policy {
                SchedulePolicy::StopAtFirstSuccess => {
                    self.state.set_current_file(0, &files[0]);
                    let assignment = Assignment {
                        host,
                        files: Arc::clone(&files),
                        indices: 0..files.len(),
                    };
                    if dispatcher.submit(assignment, keep_going).is_err() {
                        return true;
                    }
                }
                SchedulePolicy::AttemptAll => {
                    for (index, name) in files.iter().enumerate() {
                        if !keep_going() {
                            return true;
                        }
                        self.state.set_current_file(index, name);
                        let assignment = Assignment {
                            host,
                            files: Arc::clone(&files),
                            indices: index..index + 1,
                        };
                        if dispatcher.submit(assignment, keep_going).is_err() {
                            return true;
                        }
                    }
                }
            }

            self.state.address_done();
        }

        false
    }

    /// Runs on a worker thread with exclusive use of `slot`.
    fn work(&self, slot: &mut WorkerSlot, assignment: Assignment) {
        let stop_on_success = self.options.policy == SchedulePolicy::StopAtFirstSuccess;

        for index in assignment.indices.clone() {
            if !self.state.is_running() {
                break;
            }
            let filename = &assignment.files[index];
            self.publish(BatchEvent::JobStarted {
                slot: slot.index(),
                host: assignment.host,
                filename: filename.clone(),
            });

            let outcome = self.transfer(slot, assignment.host, filename);
            let success = outcome.is_success();
            if let Some(err) = outcome.error() {
                slot.set_last_error(err);
            }
            self.results.record(outcome.clone());
            self.publish(BatchEvent::JobFinished(outcome));

            if success && stop_on_success {
                break;
            }
        }
    }

    fn transfer(&self, slot: &WorkerSlot, host: Ipv4Addr, filename: &str) -> TransferOutcome {
        let opts = &self.options;
        let server = SocketAddr::from((host, opts.port));
        let host_name = host.to_string();

        let result = match opts.direction {
            Direction::Get => transfer::validate_remote_name(filename)
                .and_then(|_| transfer::download(slot.socket(), server, filename, opts.timeout))
                .and_then(|content| {
                    transfer::save_download(&opts.working_folder, &host_name, filename, &content)
                })
                .map(|saved| {
                    if saved.overwritten {
                        self.publish(BatchEvent::Info(format!(
                            "Overwrote existing file {}",
                            saved.path.display()
                        )));
                    }
                    OutcomeStatus::Downloaded(saved.path)
                }),
            Direction::Put => transfer::validate_remote_name(filename)
                .and_then(|name| transfer::read_upload_source(&opts.working_folder.join(name)))
                .and_then(|data| {
                    transfer::upload(slot.socket(), server, filename, &data, opts.timeout)
                })
                .map(|_| OutcomeStatus::Uploaded),
        };

        match result {
            Ok(status) => {
                let outcome = TransferOutcome {
                    slot: slot.index(),
                    host,
                    filename: filename.to_string(),
                    direction: opts.direction,
                    status,
                };
                log::info!("{}", outcome);
                self.publish(BatchEvent::Info(match opts.direction {
                    Direction::Get => format!("Downloaded {} from {}", filename, host),
                    Direction::Put => format!("Uploaded {} to {}", filename, host),
                }));
                outcome
            }
            Err(e) => {
                self.publish_error(&e, &format!("{} {}", host, filename));
                TransferOutcome::failed(slot.index(), host, filename, opts.direction, &e)
            }
        }
    }

    fn write_report(&self) -> Option<PathBuf> {
        match self.results.write_report(&self.options.working_folder) {
            Ok(path) => Some(path),
            Err(e) => {
                self.publish_error(&e, "Cannot write report");
                None
            }
        }
    }

    /// Lowers the running flag and publishes the result.
    fn finish(
        &self,
        targets: u64,
        files: usize,
        cancelled: bool,
        report_path: Option<PathBuf>,
    ) -> BatchReport {
        let opts = &self.options;

        let outcomes = self.results.outcomes();
        let succeeded = outcomes.iter().filter(|o| o.is_success()).count();
        let summary = self.results.summary(opts.direction);
        self.publish(BatchEvent::Info(summary.clone()));

        let report = BatchReport {
            direction: opts.direction,
            cancelled,
            targets,
            files,
            attempted: outcomes.len(),
            succeeded,
            failed: outcomes.len() - succeeded,
            report_path,
            summary,
        };

        self.state.stop();
        self.publish(BatchEvent::Finished(report.clone()));
        report
    }
}
