//! Tracking of loop devices and mount points held by a build.
//!
//! The set always mirrors what the build really holds on the host: a handle
//! becomes attached only after the acquiring command succeeded, and goes back
//! to unused only after the releasing command succeeded.

use std::fmt;
use std::path::{Path, PathBuf};

/// The three partitions a build manages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Slot {
    Firmware,
    Data,
    Root,
}

impl Slot {
    pub const ALL: [Slot; 3] = [Slot::Firmware, Slot::Data, Slot::Root];

    /// Unmount order: nested mounts before the root they live in.
    pub const UNMOUNT_ORDER: [Slot; 3] = [Slot::Data, Slot::Firmware, Slot::Root];

    /// Detach order: reverse of attach order.
    pub const DETACH_ORDER: [Slot; 3] = [Slot::Root, Slot::Data, Slot::Firmware];

    fn index(self) -> usize {
        match self {
            Slot::Firmware => 0,
            Slot::Data => 1,
            Slot::Root => 2,
        }
    }
}

impl fmt::Display for Slot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Slot::Firmware => "firmware",
            Slot::Data => "data",
            Slot::Root => "root",
        })
    }
}

/// A single loop device or mount point, unused or attached at a path.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Handle {
    #[default]
    Unused,
    Attached(PathBuf),
}

impl Handle {
    pub fn is_attached(&self) -> bool {
        matches!(self, Handle::Attached(_))
    }

    pub fn path(&self) -> Option<&Path> {
        match self {
            Handle::Attached(path) => Some(path),
            Handle::Unused => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceKind {
    Loop,
    Mount,
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ResourceKind::Loop => "loop device",
            ResourceKind::Mount => "mount",
        })
    }
}

/// Attaching a handle that is already attached.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{slot} {kind} already attached at {}", .existing.display())]
pub struct AlreadyAttached {
    pub slot: Slot,
    pub kind: ResourceKind,
    pub existing: PathBuf,
}

/// Loop device and mount handles for firmware, data and root.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResourceSet {
    loops: [Handle; 3],
    mounts: [Handle; 3],
}

impl ResourceSet {
    pub fn new() -> Self {
        Self::default()
    }

    fn handles_mut(&mut self, kind: ResourceKind) -> &mut [Handle; 3] {
        match kind {
            ResourceKind::Loop => &mut self.loops,
            ResourceKind::Mount => &mut self.mounts,
        }
    }

    fn handles(&self, kind: ResourceKind) -> &[Handle; 3] {
        match kind {
            ResourceKind::Loop => &self.loops,
            ResourceKind::Mount => &self.mounts,
        }
    }

    /// Mark a handle attached. Fails, leaving the set unchanged, if it already is.
    pub fn attach(
        &mut self,
        kind: ResourceKind,
        slot: Slot,
        path: impl Into<PathBuf>,
    ) -> Result<(), AlreadyAttached> {
        let handle = &mut self.handles_mut(kind)[slot.index()];
        if let Handle::Attached(existing) = handle {
            return Err(AlreadyAttached {
                slot,
                kind,
                existing: existing.clone(),
            });
        }
        *handle = Handle::Attached(path.into());
        Ok(())
    }

    /// Mark a handle unused, returning the path it was attached at.
    ///
    /// Releasing an unused handle is a no-op returning `None`.
    pub fn release(&mut self, kind: ResourceKind, slot: Slot) -> Option<PathBuf> {
        match std::mem::take(&mut self.handles_mut(kind)[slot.index()]) {
            Handle::Attached(path) => Some(path),
            Handle::Unused => None,
        }
    }

    pub fn get(&self, kind: ResourceKind, slot: Slot) -> Option<&Path> {
        self.handles(kind)[slot.index()].path()
    }

    pub fn loop_device(&self, slot: Slot) -> Option<&Path> {
        self.get(ResourceKind::Loop, slot)
    }

    pub fn mount_point(&self, slot: Slot) -> Option<&Path> {
        self.get(ResourceKind::Mount, slot)
    }

    pub fn any_mounted(&self) -> bool {
        self.mounts.iter().any(Handle::is_attached)
    }

    /// True when every handle is unused.
    pub fn is_clear(&self) -> bool {
        self.loops.iter().chain(&self.mounts).all(|h| !h.is_attached())
    }

    /// Attached handles in teardown order: mounts first, then loop devices.
    pub fn attached_in_teardown_order(&self) -> Vec<(ResourceKind, Slot, PathBuf)> {
        let mounts = Slot::UNMOUNT_ORDER
            .iter()
            .map(|&slot| (ResourceKind::Mount, slot));
        let loops = Slot::DETACH_ORDER
            .iter()
            .map(|&slot| (ResourceKind::Loop, slot));

        mounts
            .chain(loops)
            .filter_map(|(kind, slot)| {
                self.get(kind, slot)
                    .map(|path| (kind, slot, path.to_path_buf()))
            })
            .collect()
    }
}
