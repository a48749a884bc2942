use clap::{Parser, Subcommand};
use hungry_backup::backup::coordinator::{BackupCoordinator, RestoreReport};
use hungry_backup::backup::result_error::result::Result;
use hungry_backup::backup::result_error::WithMsg;
use hungry_backup::backup::storage::StorageLocations;
use std::path::PathBuf;
use std::process::exit;
use tracing::{error, info};

/// Export or restore HungryApp's recipes and images
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Location of config file
    #[arg(short, long)]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create a backup archive in the staging directory
    Export {
        /// Copy the finished archive here (file or directory)
        #[arg(short, long)]
        out: Option<PathBuf>,
    },
    /// Restore database and images from an archive
    Import { archive: PathBuf },
}

fn run(args: Args) -> Result<()> {
    let locations = StorageLocations::from_yaml_file(&args.config)?;
    let coordinator = BackupCoordinator::new(locations);

    match args.command {
        Command::Export { out } => {
            let bundle = coordinator.request_backup()?;
            match out {
                Some(out) => {
                    let dest = bundle.copy_to(&out)?;
                    info!("Backup written to {:?}", dest);
                }
                None => info!("Backup written to {:?}", bundle.path()),
            }
        }
        Command::Import { archive } => {
            let RestoreReport {
                database_replaced,
                images_replaced,
            } = coordinator
                .import_file(&archive)
                .with_msg(format!("Import of {:?} failed", archive))?;
            info!(
                "Restore done: database replaced: {}, images replaced: {}",
                database_replaced, images_replaced
            );
        }
    }
    Ok(())
}

fn main() {
    tracing_subscriber::fmt::init();
    let args = Args::parse();

    if let Err(e) = run(args) {
        error!("{e}");
        if e.is_mixed_state() {
            error!("Live data may be partially restored, import a known good backup again");
        }
        exit(1);
    }
}
