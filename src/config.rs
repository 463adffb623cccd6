//! Configuration management for rootimg.
//!
//! Reads configuration from a .env file and environment variables.
//! Environment variables take precedence over the .env file, and command
//! line flags take precedence over both.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// rootimg configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Directory the build workspace is created in (ROOTIMG_WORK_DIR)
    pub work_dir: Option<PathBuf>,
    /// Verbose logging without passing --verbose (ROOTIMG_VERBOSE)
    pub verbose: bool,
}

fn parse_bool(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

impl Config {
    /// Load configuration from `.env` in `base_dir` and the environment.
    pub fn load(base_dir: &Path) -> Self {
        let mut env_vars = HashMap::new();

        let env_path = base_dir.join(".env");
        if let Ok(iter) = dotenvy::from_path_iter(&env_path) {
            for (key, value) in iter.flatten() {
                env_vars.insert(key, value);
            }
        }

        // Environment variables override .env file
        for (key, value) in std::env::vars() {
            env_vars.insert(key, value);
        }

        Self::from_vars(&env_vars)
    }

    fn from_vars(vars: &HashMap<String, String>) -> Self {
        let work_dir = vars
            .get("ROOTIMG_WORK_DIR")
            .filter(|s| !s.trim().is_empty())
            .map(PathBuf::from);

        let verbose = vars
            .get("ROOTIMG_VERBOSE")
            .map(|v| parse_bool(v))
            .unwrap_or(false);

        Self { work_dir, verbose }
    }

    /// Print configuration for debugging.
    pub fn print(&self) {
        println!("Configuration:");
        match &self.work_dir {
            Some(dir) => println!("  ROOTIMG_WORK_DIR: {}", dir.display()),
            None => println!("  ROOTIMG_WORK_DIR: (current directory)"),
        }
        println!("  ROOTIMG_VERBOSE: {}", self.verbose);
    }
}
