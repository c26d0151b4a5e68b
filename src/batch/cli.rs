use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use anyhow::Result;
use clap::Args;
use indicatif::{ProgressBar, ProgressStyle};

use super::config::{BatchConfig, Direction, SchedulePolicy};
use super::engine::BatchEngine;
use super::events::{BatchEvent, BatchObserver};
use super::state::BatchState;

#[derive(Args, Debug, Default)]
pub struct BatchArgs {
    /// Single IPv4 address or a host list file (one address or `a - b` range per line)
    #[arg(short = 'H', long)]
    pub hosts: Option<String>,

    /// Single file name or a manifest file (one name per line)
    #[arg(short, long)]
    pub files: Option<String>,

    /// Folder downloads are saved under (`<folder>/<host>/<file>`) and uploads read from
    #[arg(short, long, value_name = "PATH")]
    pub working_folder: Option<PathBuf>,

    /// Server port [default: 69]
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Read timeout in milliseconds [default: 1000]
    #[arg(short, long, value_name = "MS")]
    pub timeout: Option<u64>,

    /// Number of worker slots [default: CPU count, at least 4]
    #[arg(short = 'j', long)]
    pub workers: Option<usize>,

    /// Prefix prepended to every manifest entry
    #[arg(long)]
    pub prefix: Option<String>,

    /// Extension appended to every manifest entry
    #[arg(short, long)]
    pub extension: Option<String>,

    /// Stop at the first successful file per host, or attempt every file
    #[arg(long, value_enum)]
    pub policy: Option<SchedulePolicy>,

    /// Download from or upload to every host
    #[arg(short, long, value_enum)]
    pub direction: Option<Direction>,

    /// Do not show the progress bar
    #[arg(short, long)]
    pub quiet: bool,
}

impl BatchArgs {
    fn into_config(self) -> BatchConfig {
        BatchConfig {
            hosts: self.hosts,
            files: self.files,
            working_folder: self.working_folder,
            port: self.port,
            timeout: self.timeout.map(Duration::from_millis),
            workers: self.workers,
            prefix: self.prefix,
            extension: self.extension,
            policy: self.policy,
            direction: self.direction,
        }
    }
}

/// Renders engine events on a progress bar, routing messages through the
/// logger without tearing the bar.
struct ProgressObserver {
    bar: ProgressBar,
}

impl ProgressObserver {
    fn new() -> Self {
        let bar = ProgressBar::new(0);
        let style = ProgressStyle::with_template(
            "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}",
        )
        .map(|s| s.progress_chars("=>-"))
        .unwrap_or_else(|_| ProgressStyle::default_bar());
        bar.set_style(style);
        bar.enable_steady_tick(Duration::from_millis(120));
        Self { bar }
    }
}

impl BatchObserver for ProgressObserver {
    fn on_event(&self, event: &BatchEvent) {
        match event {
            BatchEvent::Started { address_count, .. } => self.bar.set_length(*address_count),
            BatchEvent::Progress {
                processed, address, ..
            } => {
                self.bar.set_position(*processed);
                self.bar.set_message(address.to_string());
            }
            BatchEvent::JobStarted { .. } => {}
            BatchEvent::JobFinished(outcome) => {
                if outcome.is_success() {
                    self.bar.suspend(|| log::info!("{}", outcome));
                }
            }
            BatchEvent::Info(msg) => self.bar.suspend(|| log::debug!("{}", msg)),
            BatchEvent::Error { title, message } => {
                self.bar.suspend(|| log::warn!("{}: {}", title, message))
            }
            BatchEvent::Finished(report) => {
                self.bar.set_position(self.bar.length().unwrap_or(report.targets));
                self.bar.finish_and_clear();
            }
        }
    }
}

/// Lowers the running flag on Ctrl+C. The listener lives on its own thread
/// with a single-threaded runtime; it is left behind when the batch ends.
fn spawn_ctrl_c_stopper(state: Arc<BatchState>) -> Result<()> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    thread::Builder::new()
        .name("ctrl-c".to_string())
        .spawn(move || {
            if runtime.block_on(tokio::signal::ctrl_c()).is_ok() {
                log::warn!("Interrupted, waiting for in-flight transfers");
                state.stop();
            }
        })?;
    Ok(())
}

/// Run a batch from command line arguments and the `[batch]` config table
pub fn run_with_config(args: BatchArgs, config: Option<&BatchConfig>) -> Result<()> {
    let quiet = args.quiet;
    let options = config
        .cloned()
        .unwrap_or_default()
        .merge(args.into_config())
        .resolve()?;

    log::info!(
        "Batch {} from {} with files {} ({} worker(s), {:?} timeout, {:?})",
        options.direction,
        options.hosts,
        options.files,
        options.workers,
        options.timeout,
        options.policy
    );

    let observer: Arc<dyn BatchObserver> = if quiet {
        Arc::new(super::events::LogObserver)
    } else {
        Arc::new(ProgressObserver::new())
    };
    let engine = BatchEngine::new(options, observer)?;
    spawn_ctrl_c_stopper(Arc::clone(engine.state()))?;

    let report = engine.run()?;
    if let Some(path) = &report.report_path {
        log::info!("Report written to {}", path.display());
    }
    if report.cancelled {
        log::warn!("Batch cancelled after {} transfer(s)", report.attempted);
    }
    println!("{}", report.summary);
    Ok(())
}
