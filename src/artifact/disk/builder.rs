//! Device image assembly.
//!
//! Build process (each step requires the previous one):
//! 1. Allocate the zero-filled backing file
//! 2. Write the DOS partition table
//! 3. Attach firmware, data and root loop devices
//! 4. Format (FAT, ext4, ext4)
//! 5. Label (boot, data, primary)
//! 6. Mount root, then firmware and data below it
//! 7. Copy the source tree into the root mount
//! 8. Unmount data, firmware, root
//! 9. Zero unused blocks of the root file system
//! 10. Copy the root partition into the partition image
//! 11. Detach loop devices and remove the workspace
//!
//! Any failure, panic or interruption in between unwinds through the
//! [`FailureGuard`], which leaves no loop device, mount or output behind.

use std::fs;
use std::path::{Path, PathBuf};

use super::error::BuildError;
use super::geometry::{PartitionGeometry, Region};
use super::guard::FailureGuard;
use super::host::{DiskHost, FsType};
use super::request::BuildRequest;
use super::resources::{ResourceKind, ResourceSet, Slot};
use super::table::PartitionTable;
use crate::common::temp;
use crate::interrupt::Interrupt;
use crate::timing::Timer;

/// Package changelogs are never copied into the image.
pub const EXCLUDED_PATTERNS: [&str; 2] = [
    "usr/share/doc/*/changelog.Debian.gz",
    "usr/share/doc/*/changelog.gz",
];

/// Workspace directory name prefix.
const WORKSPACE_PREFIX: &str = "rootimg";

/// File system and label of each partition.
fn partition_format(slot: Slot) -> (FsType, &'static str) {
    match slot {
        Slot::Firmware => (FsType::Fat, "boot"),
        Slot::Data => (FsType::Ext4, "data"),
        Slot::Root => (FsType::Ext4, "primary"),
    }
}

/// Where each partition is mounted, relative to the root mount.
fn nested_mount_dir(slot: Slot) -> Option<&'static str> {
    match slot {
        Slot::Firmware => Some("boot/firmware"),
        Slot::Data => Some("data"),
        Slot::Root => None,
    }
}

/// Outcome of a successful build.
#[derive(Debug, Clone)]
pub struct BuildReport {
    pub geometry: PartitionGeometry,
    pub image: PathBuf,
    pub partition_image: PathBuf,
    /// Resource state after release; always clear.
    pub resources: ResourceSet,
    /// Workspace the build used; removed by the time the report exists.
    pub workspace: PathBuf,
}

impl BuildReport {
    pub fn print(&self) {
        println!("=== Device Image Built ===");
        self.geometry.print();
        for path in [&self.image, &self.partition_image] {
            match fs::metadata(path) {
                Ok(meta) => println!("  {} ({} MiB)", path.display(), meta.len() / 1024 / 1024),
                Err(_) => println!("  {}", path.display()),
            }
        }
    }
}

/// Drives one build of a device image and its root partition image.
pub struct ImageBuilder<'h, H: DiskHost + ?Sized> {
    host: &'h H,
    request: BuildRequest,
    interrupt: Interrupt,
}

impl<'h, H: DiskHost + ?Sized> ImageBuilder<'h, H> {
    pub fn new(host: &'h H, request: BuildRequest) -> Self {
        Self {
            host,
            request,
            interrupt: Interrupt::default(),
        }
    }

    /// Abort between steps once `interrupt` has been triggered.
    pub fn with_interrupt(mut self, interrupt: Interrupt) -> Self {
        self.interrupt = interrupt;
        self
    }

    pub fn request(&self) -> &BuildRequest {
        &self.request
    }

    /// Measure the source tree and compute the image geometry.
    pub fn measure(&self) -> Result<PartitionGeometry, BuildError> {
        let source = self.request.source();
        let size_kb = self.host.disk_usage_kb(source).map_err(|e| {
            BuildError::Input(format!("cannot measure {}: {:#}", source.display(), e))
        })?;
        log::info!("Source tree {}: {} KiB", source.display(), size_kb);
        Ok(PartitionGeometry::compute(size_kb))
    }

    /// Run the whole pipeline once.
    pub fn build(self) -> Result<BuildReport, BuildError> {
        let geometry = self.measure()?;
        self.checkpoint()?;

        let mut guard = FailureGuard::arm(self.host, &self.request.outputs());
        let workspace = self.run(&mut guard, &geometry)?;
        let resources = guard.disarm();

        Ok(BuildReport {
            geometry,
            image: self.request.image().to_path_buf(),
            partition_image: self.request.partition_image().to_path_buf(),
            resources,
            workspace,
        })
    }

    fn run(
        &self,
        guard: &mut FailureGuard<'h, H>,
        geometry: &PartitionGeometry,
    ) -> Result<PathBuf, BuildError> {
        let image = self.request.image();

        let timer = Timer::start("Allocating device image");
        self.step(self.host.allocate(image, geometry.image_bytes()), |e| {
            BuildError::io(format!("allocating {}", image.display()), e)
        })?;
        timer.finish();

        self.checkpoint()?;
        let timer = Timer::start("Writing partition table");
        let table = PartitionTable::for_geometry(geometry);
        self.step(self.host.write_partition_table(image, &table), |e| {
            BuildError::format("writing the partition table", e)
        })?;
        timer.finish();

        self.checkpoint()?;
        self.attach_loops(guard, geometry)?;

        self.checkpoint()?;
        let timer = Timer::start("Creating file systems");
        for slot in Slot::ALL {
            let device = self.loop_device(guard, slot)?;
            let (fs_type, _) = partition_format(slot);
            self.step(self.host.format(&device, fs_type), |e| {
                BuildError::format(format!("formatting the {} partition", slot), e)
            })?;
        }
        for slot in Slot::ALL {
            let device = self.loop_device(guard, slot)?;
            let (fs_type, label) = partition_format(slot);
            self.step(self.host.label(&device, fs_type, label), |e| {
                BuildError::format(format!("labeling the {} partition '{}'", slot, label), e)
            })?;
        }
        timer.finish();

        self.checkpoint()?;
        let workspace = self.step(
            temp::create_unique_work_dir(self.request.work_dir(), WORKSPACE_PREFIX),
            |e| BuildError::io("creating the workspace", e),
        )?;
        guard.set_workspace(workspace.clone());
        let root_mount = self.mount_all(guard, &workspace)?;

        self.checkpoint()?;
        let timer = Timer::start("Copying root file system");
        self.step(
            self.host
                .copy_tree(self.request.source(), &root_mount, &EXCLUDED_PATTERNS),
            |e| BuildError::io("copying the root file system", e),
        )?;
        timer.finish();

        self.checkpoint()?;
        for slot in Slot::UNMOUNT_ORDER {
            self.checked_release(guard, ResourceKind::Mount, slot)?;
        }

        self.checkpoint()?;
        let root_device = self.loop_device(guard, Slot::Root)?;
        let timer = Timer::start("Zeroing unused blocks");
        self.step(self.host.zero_free_blocks(&root_device), |e| {
            BuildError::io("zeroing unused blocks of the root partition", e)
        })?;
        timer.finish();

        self.checkpoint()?;
        let partition_image = self.request.partition_image();
        let timer = Timer::start("Extracting root partition image");
        self.step(self.host.copy_device(&root_device, partition_image), |e| {
            BuildError::io(format!("extracting {}", partition_image.display()), e)
        })?;
        timer.finish();

        for slot in Slot::DETACH_ORDER {
            self.checked_release(guard, ResourceKind::Loop, slot)?;
        }
        guard.remove_workspace()?;

        Ok(workspace)
    }

    fn attach_loops(
        &self,
        guard: &mut FailureGuard<'h, H>,
        geometry: &PartitionGeometry,
    ) -> Result<(), BuildError> {
        let image = self.request.image();
        let bindings: [(Slot, Region, bool); 3] = [
            (Slot::Firmware, geometry.firmware, true),
            (Slot::Data, geometry.data, true),
            // root runs to the end of the file
            (Slot::Root, geometry.root, false),
        ];

        for (slot, region, limited) in bindings {
            let size_limit = limited.then(|| region.size_bytes());
            let device = self.step(
                self.host
                    .attach_loop(image, region.offset_bytes(), size_limit),
                |e| BuildError::resource(format!("attaching the {} loop device", slot), e),
            )?;
            log::info!("{} partition: {}", slot, device.display());
            guard.track(ResourceKind::Loop, slot, device)?;
        }
        Ok(())
    }

    /// Mount root inside the workspace, then firmware and data inside root.
    fn mount_all(
        &self,
        guard: &mut FailureGuard<'h, H>,
        workspace: &Path,
    ) -> Result<PathBuf, BuildError> {
        let root_mount = workspace.join("root");

        for slot in [Slot::Root, Slot::Firmware, Slot::Data] {
            let target = match nested_mount_dir(slot) {
                Some(dir) => root_mount.join(dir),
                None => root_mount.clone(),
            };
            self.step(
                fs::create_dir_all(&target).map_err(anyhow::Error::from),
                |e| BuildError::io(format!("creating mount point {}", target.display()), e),
            )?;

            let device = self.loop_device(guard, slot)?;
            let (fs_type, _) = partition_format(slot);
            self.step(self.host.mount(&device, &target, fs_type), |e| {
                BuildError::resource(format!("mounting the {} partition", slot), e)
            })?;
            guard.track(ResourceKind::Mount, slot, target)?;
        }

        Ok(root_mount)
    }

    fn loop_device(&self, guard: &FailureGuard<'h, H>, slot: Slot) -> Result<PathBuf, BuildError> {
        guard
            .resources()
            .loop_device(slot)
            .map(Path::to_path_buf)
            .ok_or_else(|| {
                BuildError::resource(
                    format!("looking up the {} loop device", slot),
                    anyhow::anyhow!("not attached"),
                )
            })
    }

    fn checked_release(
        &self,
        guard: &mut FailureGuard<'h, H>,
        kind: ResourceKind,
        slot: Slot,
    ) -> Result<(), BuildError> {
        let result = guard.release(kind, slot);
        if result.is_err() {
            if let Some(signal) = self.interrupt.signal() {
                return Err(BuildError::Interrupted(signal));
            }
        }
        result
    }

    /// Map a step failure, reporting an interruption in its place when the
    /// step died because of one.
    fn step<T>(
        &self,
        result: anyhow::Result<T>,
        to_error: impl FnOnce(anyhow::Error) -> BuildError,
    ) -> Result<T, BuildError> {
        result.map_err(|e| match self.interrupt.signal() {
            Some(signal) => {
                log::debug!("Step failed after {}: {:#}", signal, e);
                BuildError::Interrupted(signal)
            }
            None => to_error(e),
        })
    }

    fn checkpoint(&self) -> Result<(), BuildError> {
        match self.interrupt.signal() {
            Some(signal) => Err(BuildError::Interrupted(signal)),
            None => Ok(()),
        }
    }
}
