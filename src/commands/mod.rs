//! CLI command handlers.
//!
//! Each submodule handles a specific CLI command:
//! - `build` - Build the device image and root partition image
//! - `show` - Display configuration or computed geometry
//! - `preflight` - Run preflight checks

pub mod build;
mod preflight;
pub mod show;

pub use build::cmd_build;
pub use preflight::cmd_preflight;
pub use show::cmd_show;
