//! Build environment checks (privilege, working directory, disk space).

use std::path::Path;

use crate::process::Cmd;

use super::types::CheckResult;

/// True when running with effective uid 0.
pub fn is_privileged() -> bool {
    // SAFETY: geteuid(2) cannot fail and has no preconditions.
    unsafe { libc::geteuid() == 0 }
}

/// Check privilege, working directory and free space.
pub fn check_build_environment(work_dir: &Path) -> Vec<CheckResult> {
    let mut results = Vec::new();

    if is_privileged() {
        results.push(CheckResult::pass("root privilege"));
    } else {
        results.push(CheckResult::fail(
            "root privilege",
            "Loop devices and mounts require root. Run with sudo.",
        ));
    }

    let name = format!("{} writable", work_dir.display());
    let test_file = work_dir.join(".rootimg-preflight");
    match std::fs::write(&test_file, "test") {
        Ok(_) => {
            let _ = std::fs::remove_file(&test_file);
            results.push(CheckResult::pass(&name));
        }
        Err(e) => {
            results.push(CheckResult::fail(&name, &format!("Cannot write: {}", e)));
        }
    }

    // Use df command to avoid a statvfs binding
    if let Ok(result) = Cmd::new("df")
        .args(["--output=avail", "-B1"])
        .arg_path(work_dir)
        .allow_fail()
        .run()
    {
        if result.success() {
            // Skip header line, get available bytes
            if let Some(avail_str) = result.stdout.lines().nth(1) {
                if let Ok(avail_bytes) = avail_str.trim().parse::<u64>() {
                    let free_mb = avail_bytes / (1024 * 1024);
                    // firmware + data partitions alone take 385 MiB
                    if free_mb < 1024 {
                        results.push(CheckResult::warn(
                            "disk space",
                            &format!("{} MiB free - images need at least the source size plus 385 MiB", free_mb),
                        ));
                    } else {
                        results.push(CheckResult::pass_with(
                            "disk space",
                            &format!("{} MiB free", free_mb),
                        ));
                    }
                }
            }
        }
    }

    results
}
