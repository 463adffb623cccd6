//! Host tool availability checks.

use crate::artifact::disk::REQUIRED_TOOLS;
use crate::process;

use super::types::CheckResult;

/// Check every tool the build shells out to.
pub fn check_host_tools() -> Vec<CheckResult> {
    REQUIRED_TOOLS
        .iter()
        .map(|(tool, package)| check_tool_exists(tool, package))
        .collect()
}

/// Names of required tools that are not in PATH.
pub fn missing_host_tools() -> Vec<&'static str> {
    REQUIRED_TOOLS
        .iter()
        .filter(|(tool, _)| process::which(tool).is_none())
        .map(|(tool, _)| *tool)
        .collect()
}

/// Check if a tool exists in PATH.
fn check_tool_exists(tool: &str, package: &str) -> CheckResult {
    match process::which(tool) {
        Some(path) => CheckResult::pass_with(tool, &path),
        None => CheckResult::fail(
            tool,
            &format!("Not found. Install the '{}' package.", package),
        ),
    }
}
