//! Partitioned device image builder.
//!
//! Turns a root file system tree into:
//! - a device image: DOS partition table, FAT firmware partition, ext4 data
//!   partition and ext4 root partition
//! - a root partition image: the raw ext4 root file system on its own
//!
//! The partitions are created inside loop-mounted regions of the device image,
//! so the build needs root. See [`builder`] for the step sequence.

pub mod builder;
pub mod error;
pub mod geometry;
pub mod guard;
pub mod host;
pub mod request;
pub mod resources;
pub mod table;
pub mod usage;

pub use builder::{BuildReport, ImageBuilder, EXCLUDED_PATTERNS};
pub use error::BuildError;
pub use geometry::{PartitionGeometry, Region, SECTOR_SIZE};
pub use guard::FailureGuard;
pub use host::{DiskHost, FsType, SystemHost, REQUIRED_TOOLS};
pub use request::BuildRequest;
pub use resources::{ResourceKind, ResourceSet, Slot};
pub use table::PartitionTable;
