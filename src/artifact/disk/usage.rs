//! Disk usage of the source tree, measured the way `du -sk` does.

use anyhow::{Context, Result};
use std::collections::HashSet;
use std::os::unix::fs::MetadataExt;
use std::path::Path;
use walkdir::WalkDir;

/// Allocated size of the tree under `path` in KiB.
///
/// Counts allocated blocks rather than apparent length, counts each
/// hard-linked inode once, and does not follow symlinks.
pub fn disk_usage_kb(path: &Path) -> Result<u64> {
    let mut seen = HashSet::new();
    let mut blocks: u64 = 0;

    for entry in WalkDir::new(path).follow_links(false) {
        let entry = entry.with_context(|| format!("Failed to walk {}", path.display()))?;
        let meta = entry
            .metadata()
            .with_context(|| format!("Failed to stat {}", entry.path().display()))?;

        if meta.nlink() > 1 && !meta.is_dir() && !seen.insert((meta.dev(), meta.ino())) {
            continue;
        }
        // st_blocks is always in 512-byte units
        blocks += meta.blocks();
    }

    Ok(blocks_to_kb(blocks))
}

/// 512-byte blocks to KiB, rounded up like `du -k`.
fn blocks_to_kb(blocks: u64) -> u64 {
    blocks.div_ceil(2)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_odd_block_count_rounds_up() {
        assert_eq!(blocks_to_kb(0), 0);
        assert_eq!(blocks_to_kb(1), 1);
        assert_eq!(blocks_to_kb(3), 2);
        assert_eq!(blocks_to_kb(4), 2);
    }

    #[test]
    fn test_matches_du() {
        if crate::process::which("du").is_none() {
            return;
        }
        let temp = TempDir::new().unwrap();
        fs::create_dir_all(temp.path().join("etc")).unwrap();
        fs::write(temp.path().join("etc/hostname"), "x").unwrap();
        fs::write(temp.path().join("blob"), vec![0xa5u8; 100 * 1024 + 1]).unwrap();
        std::os::unix::fs::symlink("blob", temp.path().join("link")).unwrap();

        let result = crate::process::Cmd::new("du")
            .arg("-sk")
            .arg_path(temp.path())
            .run()
            .unwrap();
        let expected: u64 = result.stdout.split_whitespace().next().unwrap().parse().unwrap();

        assert_eq!(disk_usage_kb(temp.path()).unwrap(), expected);
    }

    #[test]
    fn test_missing_path_fails() {
        assert!(disk_usage_kb(Path::new("/nonexistent_path_12345")).is_err());
    }

    #[test]
    fn test_counts_written_data() {
        let temp = TempDir::new().unwrap();
        let empty = disk_usage_kb(temp.path()).unwrap();

        fs::write(temp.path().join("blob"), vec![0xa5u8; 256 * 1024]).unwrap();
        let filled = disk_usage_kb(temp.path()).unwrap();

        assert!(filled >= empty + 256, "{} -> {}", empty, filled);
    }

    #[test]
    fn test_hard_links_counted_once() {
        let temp = TempDir::new().unwrap();
        let original = temp.path().join("original");
        fs::write(&original, vec![0x5au8; 128 * 1024]).unwrap();
        let before = disk_usage_kb(temp.path()).unwrap();

        fs::hard_link(&original, temp.path().join("link")).unwrap();
        let after = disk_usage_kb(temp.path()).unwrap();

        assert_eq!(before, after);
    }
}
