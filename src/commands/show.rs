//! Show command - displays information.

use anyhow::{Context, Result};
use std::path::PathBuf;

use crate::artifact::disk::{usage, PartitionGeometry};
use crate::config::Config;

/// Show target for the show command.
pub enum ShowTarget {
    /// Show configuration
    Config,
    /// Measure a source tree and show the image geometry it yields
    Geometry { source: PathBuf, json: bool },
}

/// Execute the show command.
pub fn cmd_show(target: ShowTarget, config: &Config) -> Result<()> {
    match target {
        ShowTarget::Config => config.print(),
        ShowTarget::Geometry { source, json } => {
            let size_kb = usage::disk_usage_kb(&source)
                .with_context(|| format!("Failed to measure {}", source.display()))?;
            let geometry = PartitionGeometry::compute(size_kb);
            if json {
                println!("{}", serde_json::to_string_pretty(&geometry)?);
            } else {
                geometry.print();
            }
        }
    }
    Ok(())
}
