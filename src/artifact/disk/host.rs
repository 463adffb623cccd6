//! Host capabilities the image build depends on.
//!
//! The build never formats, mounts or partitions anything itself. It asks a
//! [`DiskHost`] to do so with fixed parameters. [`SystemHost`] does that with
//! the standard tools (util-linux, dosfstools, e2fsprogs, rsync, zerofree).

use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};

use super::table::PartitionTable;
use super::usage;
use crate::interrupt::Interrupt;
use crate::process::Cmd;

/// File systems the build creates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FsType {
    Fat,
    Ext4,
}

/// Host tools used by [`SystemHost`], with the package that provides them.
pub const REQUIRED_TOOLS: &[(&str, &str)] = &[
    ("sfdisk", "util-linux"),
    ("losetup", "util-linux"),
    ("mount", "util-linux"),
    ("umount", "util-linux"),
    ("mkfs.vfat", "dosfstools"),
    ("fatlabel", "dosfstools"),
    ("mkfs.ext4", "e2fsprogs"),
    ("e2label", "e2fsprogs"),
    ("rsync", "rsync"),
    ("zerofree", "zerofree"),
    ("dd", "coreutils"),
];

pub trait DiskHost {
    /// Allocated size of the tree in KiB.
    fn disk_usage_kb(&self, path: &Path) -> Result<u64> {
        usage::disk_usage_kb(path)
    }

    /// Create (or truncate) `path` as a zero-filled file of `bytes` bytes.
    fn allocate(&self, path: &Path, bytes: u64) -> Result<()> {
        let file = fs::File::create(path)
            .with_context(|| format!("Failed to create {}", path.display()))?;
        file.set_len(bytes)
            .with_context(|| format!("Failed to size {} to {} bytes", path.display(), bytes))?;
        Ok(())
    }

    fn write_partition_table(&self, image: &Path, table: &PartitionTable) -> Result<()>;

    /// Bind a loop device to `image` starting at byte `offset`.
    ///
    /// Without `size_limit` the device extends to the end of the file.
    fn attach_loop(&self, image: &Path, offset: u64, size_limit: Option<u64>) -> Result<PathBuf>;

    fn detach_loop(&self, device: &Path) -> Result<()>;

    fn format(&self, device: &Path, fs: FsType) -> Result<()>;

    fn label(&self, device: &Path, fs: FsType, label: &str) -> Result<()>;

    fn mount(&self, device: &Path, target: &Path, fs: FsType) -> Result<()>;

    fn unmount(&self, target: &Path) -> Result<()>;

    /// Copy the tree under `source` into `dest`, preserving permissions,
    /// ownership, timestamps and hard links.
    ///
    /// `excludes` are glob patterns relative to the root of `source`.
    fn copy_tree(&self, source: &Path, dest: &Path, excludes: &[&str]) -> Result<()>;

    /// Zero the blocks an unmounted ext4 file system does not use.
    fn zero_free_blocks(&self, device: &Path) -> Result<()>;

    /// Copy the full content of a block device into a regular file.
    fn copy_device(&self, device: &Path, dest: &Path) -> Result<()>;
}

/// [`DiskHost`] backed by the standard Linux tools.
#[derive(Debug, Clone, Default)]
pub struct SystemHost {
    interrupt: Interrupt,
}

impl SystemHost {
    pub fn new(interrupt: Interrupt) -> Self {
        Self { interrupt }
    }

    /// A forward build step: refused once interrupted, killed by a signal.
    fn cmd(&self, program: &str) -> Cmd {
        Cmd::new(program).interruptible(&self.interrupt)
    }

    /// A release step. Teardown runs after a signal and must not be refused.
    fn release_cmd(&self, program: &str) -> Cmd {
        Cmd::new(program)
    }
}

/// Trailing slash so rsync copies the directory's content, not the directory.
fn dir_contents_arg(path: &Path) -> String {
    let mut arg = path.to_string_lossy().into_owned();
    if !arg.ends_with('/') {
        arg.push('/');
    }
    arg
}

impl DiskHost for SystemHost {
    fn write_partition_table(&self, image: &Path, table: &PartitionTable) -> Result<()> {
        self.cmd("sfdisk")
            .arg("--quiet")
            .arg_path(image)
            .stdin(table.to_sfdisk_script())
            .error_msg("sfdisk rejected the partition table")
            .run()?;
        Ok(())
    }

    fn attach_loop(&self, image: &Path, offset: u64, size_limit: Option<u64>) -> Result<PathBuf> {
        let mut cmd = self
            .cmd("losetup")
            .args(["--find", "--show"])
            .arg(format!("--offset={}", offset));
        if let Some(limit) = size_limit {
            cmd = cmd.arg(format!("--sizelimit={}", limit));
        }
        let result = cmd
            .arg_path(image)
            .error_msg("losetup failed to attach a loop device")
            .run()?;

        let device = result.stdout_trimmed();
        if device.is_empty() {
            anyhow::bail!("losetup did not report a loop device");
        }
        Ok(PathBuf::from(device))
    }

    fn detach_loop(&self, device: &Path) -> Result<()> {
        self.release_cmd("losetup")
            .arg("--detach")
            .arg_path(device)
            .error_msg(format!("losetup failed to detach {}", device.display()))
            .run()?;
        Ok(())
    }

    fn format(&self, device: &Path, fs: FsType) -> Result<()> {
        let cmd = match fs {
            FsType::Fat => self.cmd("mkfs.vfat").args(["-F", "32"]),
            FsType::Ext4 => self.cmd("mkfs.ext4").args(["-q", "-F"]),
        };
        cmd.arg_path(device).run()?;
        Ok(())
    }

    fn label(&self, device: &Path, fs: FsType, label: &str) -> Result<()> {
        let program = match fs {
            FsType::Fat => "fatlabel",
            FsType::Ext4 => "e2label",
        };
        self.cmd(program).arg_path(device).arg(label).run()?;
        Ok(())
    }

    fn mount(&self, device: &Path, target: &Path, fs: FsType) -> Result<()> {
        let mut cmd = self.cmd("mount");
        if fs == FsType::Fat {
            // FAT cannot store ownership; let the copy's chown calls succeed
            cmd = cmd.args(["-o", "quiet"]);
        }
        cmd.arg_path(device)
            .arg_path(target)
            .error_msg(format!(
                "Failed to mount {} on {}",
                device.display(),
                target.display()
            ))
            .run()?;
        Ok(())
    }

    fn unmount(&self, target: &Path) -> Result<()> {
        self.release_cmd("umount").arg_path(target).run()?;
        Ok(())
    }

    fn copy_tree(&self, source: &Path, dest: &Path, excludes: &[&str]) -> Result<()> {
        let mut cmd = self.cmd("rsync").args(["-aHAX", "--numeric-ids"]);
        for pattern in excludes {
            // Leading slash anchors the pattern at the transfer root
            cmd = cmd.arg(format!("--exclude=/{}", pattern.trim_start_matches('/')));
        }
        cmd.arg(dir_contents_arg(source))
            .arg(dir_contents_arg(dest))
            .error_msg("rsync failed to copy the root file system")
            .run()?;
        Ok(())
    }

    fn zero_free_blocks(&self, device: &Path) -> Result<()> {
        self.cmd("zerofree").arg_path(device).run()?;
        Ok(())
    }

    fn copy_device(&self, device: &Path, dest: &Path) -> Result<()> {
        self.cmd("dd")
            .arg(format!("if={}", device.display()))
            .arg(format!("of={}", dest.display()))
            .args(["bs=4M", "conv=fsync", "status=none"])
            .run()?;
        Ok(())
    }
}
