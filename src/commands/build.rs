//! Build command - builds the device image and root partition image.

use anyhow::{Context, Result};
use std::path::PathBuf;
use tokio::signal::unix::{signal, Signal, SignalKind};

use crate::artifact::disk::{BuildError, BuildReport, BuildRequest, ImageBuilder, SystemHost};
use crate::config::Config;
use crate::interrupt::Interrupt;
use crate::preflight;

/// Parameters of the build command.
pub struct BuildArgs {
    pub source: PathBuf,
    pub image: PathBuf,
    pub partition_image: PathBuf,
    pub work_dir: Option<PathBuf>,
    pub verbose: bool,
}

/// Execute the build command.
pub fn cmd_build(args: BuildArgs, config: &Config) -> Result<()> {
    let work_dir = args.work_dir.or_else(|| config.work_dir.clone());
    let request = BuildRequest::new(
        &args.source,
        &args.image,
        &args.partition_image,
        work_dir.as_deref(),
        args.verbose || config.verbose,
    )?;

    let missing = preflight::missing_host_tools();
    if !missing.is_empty() {
        return Err(BuildError::Input(format!(
            "required host tools not found: {} (run 'rootimg preflight')",
            missing.join(", ")
        ))
        .into());
    }
    if !preflight::is_privileged() {
        return Err(BuildError::Privilege(
            "loop devices and mounts require root; run with sudo".to_string(),
        )
        .into());
    }

    let report = build_with_signals(request)?;
    report.print();
    Ok(())
}

/// Run the blocking build while watching for termination signals.
fn build_with_signals(request: BuildRequest) -> Result<BuildReport> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("Failed to start the signal handling runtime")?;

    runtime.block_on(run_build(request))
}

async fn run_build(request: BuildRequest) -> Result<BuildReport> {
    let interrupt = Interrupt::new();
    // Installed before the build thread starts so no signal gets the default action
    let signals = [
        (signal(SignalKind::interrupt())?, "SIGINT"),
        (signal(SignalKind::terminate())?, "SIGTERM"),
        (signal(SignalKind::hangup())?, "SIGHUP"),
    ];
    let watcher = tokio::spawn(forward_signals(signals, interrupt.clone()));

    let build = tokio::task::spawn_blocking(move || {
        let host = SystemHost::new(interrupt.clone());
        ImageBuilder::new(&host, request)
            .with_interrupt(interrupt)
            .build()
    })
    .await;
    watcher.abort();

    match build {
        Ok(result) => result.map_err(anyhow::Error::from),
        Err(e) if e.is_panic() => std::panic::resume_unwind(e.into_panic()),
        Err(e) => Err(anyhow::Error::new(e).context("Build task failed")),
    }
}

async fn forward_signals(signals: [(Signal, &'static str); 3], interrupt: Interrupt) {
    let [(mut sigint, int_name), (mut sigterm, term_name), (mut sighup, hup_name)] = signals;
    loop {
        let name = tokio::select! {
            _ = sigint.recv() => int_name,
            _ = sigterm.recv() => term_name,
            _ = sighup.recv() => hup_name,
        };
        log::warn!("Received {}, aborting build", name);
        interrupt.trigger(name);
    }
}
