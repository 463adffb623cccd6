//! Preflight checks for a device image build.
//!
//! Validates host tools, privilege and the working directory before a
//! build starts. Run with `rootimg preflight` to check everything is ready.

mod environment;
mod host_tools;
mod types;

use std::path::Path;

use anyhow::{bail, Result};

pub use environment::is_privileged;
pub use host_tools::missing_host_tools;
pub use types::{CheckResult, CheckStatus, PreflightReport};

/// Run all preflight checks.
pub fn run_preflight(work_dir: &Path) -> PreflightReport {
    let mut checks = Vec::new();

    log::info!("Checking host tools...");
    checks.extend(host_tools::check_host_tools());

    log::info!("Checking build environment...");
    checks.extend(environment::check_build_environment(work_dir));

    PreflightReport { checks }
}

/// Run preflight and bail if any checks fail.
pub fn run_preflight_or_fail(work_dir: &Path) -> Result<()> {
    let report = run_preflight(work_dir);
    report.print();

    if !report.all_passed() {
        bail!(
            "Preflight failed: {} check(s) failed. Fix the issues above before building.",
            report.fail_count()
        );
    }

    println!("All preflight checks passed!\n");
    Ok(())
}
