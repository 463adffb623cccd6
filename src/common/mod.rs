//! Shared utilities across rootimg modules.

pub mod temp;

pub use temp::{cleanup_work_dir, create_unique_work_dir};
