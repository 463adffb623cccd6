//! rootimg - device image builder.
//!
//! Turns a prepared root file system tree into:
//! - a partitioned device image (FAT boot, ext4 data, ext4 root)
//! - a standalone image of the root partition
#![allow(dead_code)]

mod artifact;
mod commands;
mod common;
mod config;
mod interrupt;
mod preflight;
mod process;
mod timing;

use clap::{Parser, Subcommand};
use owo_colors::OwoColorize;
use std::path::PathBuf;
use std::process::ExitCode;

use artifact::disk::BuildError;
use config::Config;

#[derive(Parser)]
#[command(name = "rootimg")]
#[command(about = "Build a partitioned device image from a root file system tree")]
#[command(
    after_help = "QUICK START:\n  rootimg preflight                       Check host tools and privilege\n  rootimg show geometry --source rootfs/  Preview partition layout\n  sudo rootimg build --source rootfs/ --image device.img --partition-image root.img"
)]
struct Cli {
    /// Verbose logging (every external command)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build the device image and the root partition image (requires root)
    Build {
        /// Root file system tree to copy into the root partition
        #[arg(long)]
        source: PathBuf,
        /// Output device image
        #[arg(long)]
        image: PathBuf,
        /// Output root partition image
        #[arg(long)]
        partition_image: PathBuf,
        /// Directory for the temporary mount workspace (default: current directory)
        #[arg(long)]
        work_dir: Option<PathBuf>,
    },

    /// Run preflight checks (host tools, privilege, working directory)
    Preflight {
        /// Fail if any checks fail (exit code 1)
        #[arg(long)]
        strict: bool,
        /// Working directory to check
        #[arg(long)]
        work_dir: Option<PathBuf>,
    },

    /// Show information
    Show {
        #[command(subcommand)]
        what: ShowTarget,
    },
}

#[derive(Subcommand)]
enum ShowTarget {
    /// Show current configuration
    Config,
    /// Show the partition layout a source tree would produce
    Geometry {
        /// Root file system tree to measure
        #[arg(long)]
        source: PathBuf,
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },
}

fn init_logging(verbose: bool) {
    env_logger::Builder::new()
        .filter_level(if verbose {
            log::LevelFilter::Debug
        } else {
            log::LevelFilter::Info
        })
        .parse_default_env()
        .format_timestamp(None)
        .format_target(false)
        .init();
}

fn run(cli: Cli, config: &Config) -> anyhow::Result<()> {
    match cli.command {
        Commands::Build {
            source,
            image,
            partition_image,
            work_dir,
        } => {
            let args = commands::build::BuildArgs {
                source,
                image,
                partition_image,
                work_dir,
                verbose: cli.verbose,
            };
            commands::cmd_build(args, config)?;
        }

        Commands::Preflight { strict, work_dir } => {
            let work_dir = work_dir
                .or_else(|| config.work_dir.clone())
                .unwrap_or_else(|| PathBuf::from("."));
            commands::cmd_preflight(&work_dir, strict)?;
        }

        Commands::Show { what } => {
            let show_target = match what {
                ShowTarget::Config => commands::show::ShowTarget::Config,
                ShowTarget::Geometry { source, json } => {
                    commands::show::ShowTarget::Geometry { source, json }
                }
            };
            commands::cmd_show(show_target, config)?;
        }
    }

    Ok(())
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    let config = Config::load(&std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")));
    init_logging(cli.verbose || config.verbose);

    match run(cli, &config) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{} {:#}", "error:".red().bold(), e);
            let aborted = e
                .downcast_ref::<BuildError>()
                .is_some_and(BuildError::is_abort);
            if aborted {
                eprintln!("{}", "Build terminated abnormally.".yellow());
            }
            ExitCode::FAILURE
        }
    }
}
