//! rootimg library exports for testing.
//!
//! This module exposes internal components for integration testing.

pub mod artifact;
pub mod common;
pub mod interrupt;
pub mod process;
pub mod timing;
