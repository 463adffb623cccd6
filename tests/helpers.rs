//! Shared test utilities for rootimg tests.
#![allow(dead_code)]

use anyhow::{anyhow, bail, Result};
use rootimg::artifact::disk::{BuildRequest, DiskHost, FsType, PartitionTable};
use rootimg::interrupt::Interrupt;
use std::cell::{Cell, RefCell};
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Test environment with a source tree, an output directory and a work directory.
pub struct TestEnv {
    /// Temporary directory (kept alive for lifetime of TestEnv)
    pub _temp_dir: TempDir,
    pub rootfs: PathBuf,
    pub out_dir: PathBuf,
    pub work_dir: PathBuf,
}

impl TestEnv {
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let base = temp_dir.path();

        let rootfs = base.join("rootfs");
        let out_dir = base.join("out");
        let work_dir = base.join("work");
        for dir in [&rootfs, &out_dir, &work_dir] {
            fs::create_dir_all(dir).expect("Failed to create test dir");
        }

        Self {
            _temp_dir: temp_dir,
            rootfs,
            out_dir,
            work_dir,
        }
    }

    pub fn image(&self) -> PathBuf {
        self.out_dir.join("device.img")
    }

    pub fn partition_image(&self) -> PathBuf {
        self.out_dir.join("root.img")
    }

    pub fn request(&self) -> BuildRequest {
        BuildRequest::new(
            &self.rootfs,
            &self.image(),
            &self.partition_image(),
            Some(&self.work_dir),
            false,
        )
        .expect("Failed to build request")
    }

    /// Entries left in the work directory (leftover workspaces).
    pub fn work_dir_entries(&self) -> Vec<PathBuf> {
        fs::read_dir(&self.work_dir)
            .expect("Failed to read work dir")
            .map(|e| e.expect("Failed to read entry").path())
            .collect()
    }

    pub fn assert_outputs_absent(&self) {
        assert!(!self.image().exists(), "device image left behind");
        assert!(!self.partition_image().exists(), "partition image left behind");
    }
}

/// Create a minimal root file system tree.
pub fn create_mock_rootfs(rootfs: &Path) {
    fs::create_dir_all(rootfs.join("etc")).expect("Failed to create etc");
    fs::write(rootfs.join("etc/hostname"), "x").expect("Failed to write hostname");
    fs::create_dir_all(rootfs.join("usr/share/doc/foo")).expect("Failed to create doc dir");
    fs::write(rootfs.join("usr/share/doc/foo/README"), "readme").expect("Failed to write README");
    fs::write(rootfs.join("usr/share/doc/foo/changelog.Debian.gz"), "debian")
        .expect("Failed to write changelog");
    fs::write(rootfs.join("usr/share/doc/foo/changelog.gz"), "upstream")
        .expect("Failed to write changelog");
}

/// A [`DiskHost`] that records every call and simulates host state.
///
/// Loop devices and mounts it hands out are tracked so tests can check that
/// the build released exactly what it acquired. It refuses operations a real
/// host would refuse: unmounting a mount with nested mounts still below it,
/// detaching an unknown device, zeroing a mounted file system.
#[derive(Default)]
pub struct FakeHost {
    calls: RefCell<Vec<String>>,
    fail_on: RefCell<Vec<String>>,
    panic_on: RefCell<Option<String>>,
    interrupt_on: RefCell<Option<(String, Interrupt)>>,
    loops: RefCell<Vec<PathBuf>>,
    mounts: RefCell<Vec<PathBuf>>,
    next_loop: Cell<u32>,
    scripts: RefCell<Vec<String>>,
}

impl FakeHost {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail every call whose record starts with `prefix`.
    pub fn fail_on(self, prefix: &str) -> Self {
        self.fail_on.borrow_mut().push(prefix.to_string());
        self
    }

    /// Panic on the first call whose record starts with `prefix`.
    pub fn panic_on(self, prefix: &str) -> Self {
        *self.panic_on.borrow_mut() = Some(prefix.to_string());
        self
    }

    /// Trigger `interrupt` and fail the call whose record starts with `prefix`,
    /// like a tool killed by a forwarded signal. Afterwards every call other
    /// than a release is refused.
    pub fn interrupt_on(self, prefix: &str, interrupt: &Interrupt) -> Self {
        *self.interrupt_on.borrow_mut() = Some((prefix.to_string(), interrupt.clone()));
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.borrow().clone()
    }

    pub fn attached_loops(&self) -> Vec<PathBuf> {
        self.loops.borrow().clone()
    }

    pub fn active_mounts(&self) -> Vec<PathBuf> {
        self.mounts.borrow().clone()
    }

    pub fn partition_scripts(&self) -> Vec<String> {
        self.scripts.borrow().clone()
    }

    /// Position of the first call starting with `prefix`.
    pub fn position(&self, prefix: &str) -> Option<usize> {
        self.calls.borrow().iter().position(|c| c.starts_with(prefix))
    }

    pub fn assert_host_clear(&self) {
        assert!(
            self.loops.borrow().is_empty(),
            "loop devices still attached: {:?}",
            self.loops.borrow()
        );
        assert!(
            self.mounts.borrow().is_empty(),
            "mounts still active: {:?}",
            self.mounts.borrow()
        );
    }

    fn record(&self, call: String) -> Result<()> {
        self.calls.borrow_mut().push(call.clone());

        if let Some(prefix) = self.panic_on.borrow().as_deref() {
            if call.starts_with(prefix) {
                panic!("injected panic at '{}'", call);
            }
        }
        if let Some((prefix, interrupt)) = self.interrupt_on.borrow().as_ref() {
            // Like SystemHost: once interrupted, only release steps still run
            let release = call.starts_with("umount") || call.starts_with("detach");
            if interrupt.is_triggered() && !release {
                bail!("'{}' not started: build interrupted", call);
            }
            if call.starts_with(prefix.as_str()) {
                interrupt.trigger("SIGINT");
                bail!("'{}' terminated by signal", call);
            }
        }
        if self.fail_on.borrow().iter().any(|p| call.starts_with(p.as_str())) {
            bail!("injected failure at '{}'", call);
        }
        Ok(())
    }

    fn require_loop(&self, device: &Path) -> Result<()> {
        if !self.loops.borrow().iter().any(|d| d == device) {
            bail!("{} is not an attached loop device", device.display());
        }
        Ok(())
    }
}

fn fs_name(fs: FsType) -> &'static str {
    match fs {
        FsType::Fat => "vfat",
        FsType::Ext4 => "ext4",
    }
}

impl DiskHost for FakeHost {
    fn disk_usage_kb(&self, path: &Path) -> Result<u64> {
        self.record(format!("du {}", path.display()))?;
        rootimg::artifact::disk::usage::disk_usage_kb(path)
    }

    fn allocate(&self, path: &Path, bytes: u64) -> Result<()> {
        self.record(format!("allocate {}", bytes))?;
        let file = fs::File::create(path)?;
        file.set_len(bytes)?;
        Ok(())
    }

    fn write_partition_table(&self, image: &Path, table: &PartitionTable) -> Result<()> {
        self.record(format!("sfdisk {}", image.display()))?;
        self.scripts.borrow_mut().push(table.to_sfdisk_script());
        Ok(())
    }

    fn attach_loop(&self, image: &Path, offset: u64, size_limit: Option<u64>) -> Result<PathBuf> {
        let limit = size_limit.map_or("none".to_string(), |l| l.to_string());
        self.record(format!("losetup offset={} sizelimit={}", offset, limit))?;
        if !image.exists() {
            bail!("{} does not exist", image.display());
        }
        let device = PathBuf::from(format!("/dev/loop{}", self.next_loop.get()));
        self.next_loop.set(self.next_loop.get() + 1);
        self.loops.borrow_mut().push(device.clone());
        Ok(device)
    }

    fn detach_loop(&self, device: &Path) -> Result<()> {
        self.record(format!("detach {}", device.display()))?;
        self.require_loop(device)?;
        self.loops.borrow_mut().retain(|d| d != device);
        Ok(())
    }

    fn format(&self, device: &Path, fs: FsType) -> Result<()> {
        self.record(format!("mkfs.{} {}", fs_name(fs), device.display()))?;
        self.require_loop(device)
    }

    fn label(&self, device: &Path, fs: FsType, label: &str) -> Result<()> {
        self.record(format!("label.{} {} {}", fs_name(fs), device.display(), label))?;
        self.require_loop(device)
    }

    fn mount(&self, device: &Path, target: &Path, fs: FsType) -> Result<()> {
        self.record(format!("mount.{} {} {}", fs_name(fs), device.display(), target.display()))?;
        self.require_loop(device)?;
        if !target.is_dir() {
            bail!("mount point {} does not exist", target.display());
        }
        self.mounts.borrow_mut().push(target.to_path_buf());
        Ok(())
    }

    fn unmount(&self, target: &Path) -> Result<()> {
        self.record(format!("umount {}", target.display()))?;
        let mounts = self.mounts.borrow();
        if !mounts.iter().any(|m| m == target) {
            return Err(anyhow!("{} is not mounted", target.display()));
        }
        if mounts.iter().any(|m| m != target && m.starts_with(target)) {
            return Err(anyhow!("{}: target is busy", target.display()));
        }
        drop(mounts);
        self.mounts.borrow_mut().retain(|m| m != target);
        Ok(())
    }

    fn copy_tree(&self, source: &Path, dest: &Path, excludes: &[&str]) -> Result<()> {
        self.record(format!("rsync {} {} exclude={}", source.display(), dest.display(), excludes.join(",")))?;
        if !self.mounts.borrow().iter().any(|m| m == dest) {
            bail!("copy destination {} is not mounted", dest.display());
        }
        Ok(())
    }

    fn zero_free_blocks(&self, device: &Path) -> Result<()> {
        self.record(format!("zerofree {}", device.display()))?;
        self.require_loop(device)?;
        if !self.mounts.borrow().is_empty() {
            bail!("{} is still mounted", device.display());
        }
        Ok(())
    }

    fn copy_device(&self, device: &Path, dest: &Path) -> Result<()> {
        self.record(format!("dd {}", device.display()))?;
        self.require_loop(device)?;
        fs::write(dest, b"ext4 root partition")?;
        Ok(())
    }
}

/// Assert that a file contains expected content.
pub fn assert_file_contains(path: &Path, expected: &str) {
    let content = fs::read_to_string(path)
        .unwrap_or_else(|e| panic!("Failed to read file {}: {}", path.display(), e));
    assert!(
        content.contains(expected),
        "File {} does not contain expected content.\nExpected to find: {}\nActual content: {}",
        path.display(),
        expected,
        content
    );
}

/// True when the test runs as root.
pub fn is_root() -> bool {
    // SAFETY: geteuid(2) has no preconditions.
    unsafe { libc::geteuid() == 0 }
}
