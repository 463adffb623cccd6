//! Build artifacts.
//!
//! - `disk` - Partitioned device image and standalone root partition image

pub mod disk;

pub use disk::{BuildReport, BuildRequest, ImageBuilder, SystemHost};
