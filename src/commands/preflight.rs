//! Preflight command - runs preflight checks.

use anyhow::Result;
use std::path::Path;

use crate::preflight;

/// Execute the preflight command.
pub fn cmd_preflight(work_dir: &Path, strict: bool) -> Result<()> {
    if strict {
        preflight::run_preflight_or_fail(work_dir)?;
    } else {
        let report = preflight::run_preflight(work_dir);
        report.print();
        if !report.all_passed() {
            println!("Some checks failed. Use --strict to exit with an error.");
        }
    }
    Ok(())
}
