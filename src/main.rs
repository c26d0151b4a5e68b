use anyhow::Result;
use clap::{Parser, Subcommand};
use log::{error, info};
use std::path::Path;

use tftpfleet::{batch, config, tftp};

#[derive(Parser)]
#[command(name = "tftpfleet")]
#[command(about = "Batch TFTP client for device fleets", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// TFTP client - download or upload a single file
    Tftpc {
        #[command(subcommand)]
        action: tftp::client::TftpcAction,
    },

    /// Transfer files to or from every host of an address list
    Batch(batch::BatchArgs),

    /// Generate configuration file (.tftpfleet.toml) in current directory
    Genconfig {
        /// Force overwrite existing configuration file
        #[arg(long)]
        force: bool,
    },
}

fn main() -> Result<()> {
    // Initialize logger, default info level, display file line number and time
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format(|buf, record| {
            use std::io::Write;
            let level_style = buf.default_level_style(record.level());
            writeln!(
                buf,
                "[{} {level_style}{}{level_style:#} {}:{}] {level_style}{}{level_style:#}",
                chrono::Local::now().format("%H:%M:%S"),
                record.level(),
                record.target(),
                record.line().unwrap_or(0),
                record.args()
            )
        })
        .init();

    let cli = Cli::parse();

    // Try to load configuration file
    let config_path = config::CONFIG_FILE;
    let app_config = if Path::new(config_path).exists() {
        match config::AppConfig::load_from_file(config_path) {
            Ok(cfg) => {
                let abs_path = std::fs::canonicalize(config_path)
                    .unwrap_or_else(|_| std::path::PathBuf::from(config_path));
                info!("Using configuration file: {}", abs_path.display());
                Some(cfg)
            }
            Err(e) => {
                error!("Failed to load configuration file: {}, using defaults", e);
                None
            }
        }
    } else {
        None
    };

    match cli.command {
        Commands::Tftpc { action } => {
            // Client configuration merging is handled inside client::run_with_config
            tftp::client::run_with_config(
                action,
                app_config.as_ref().and_then(|c| c.tftpc.as_ref()),
            )?;
        }

        Commands::Batch(args) => {
            batch::run_with_config(args, app_config.as_ref().and_then(|c| c.batch.as_ref()))?;
        }

        Commands::Genconfig { force } => {
            if let Err(e) = config::AppConfig::generate_config_file(force) {
                error!("Error: {}", e);
                std::process::exit(1);
            }
        }
    }

    Ok(())
}
