//! Sector geometry of the device image.
//!
//! Layout, in ascending order:
//!
//! ```text
//! | table (1 MiB) | firmware (128 MiB) | data (256 MiB) | root (source + 25%) |
//! ```
//!
//! All arithmetic is integer with truncating division in a fixed order.
//! Downstream consumers depend on the exact resulting image sizes.

use serde::Serialize;

/// Sector size in bytes
pub const SECTOR_SIZE: u64 = 512;

/// Space reserved in front of the first partition for the partition table
pub const TABLE_SIZE_MB: u64 = 1;

/// Firmware (FAT boot) partition size
pub const FIRMWARE_SIZE_MB: u64 = 128;

/// Data (ext4) partition size
pub const DATA_SIZE_MB: u64 = 256;

/// Extra space for journal and reserved blocks, as a percentage of the source size
pub const ROOT_OVERHEAD_PERCENT: u64 = 25;

/// A contiguous run of sectors inside the image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Region {
    pub start_sector: u64,
    pub sectors: u64,
}

impl Region {
    pub fn end_sector(&self) -> u64 {
        self.start_sector + self.sectors
    }

    pub fn offset_bytes(&self) -> u64 {
        self.start_sector * SECTOR_SIZE
    }

    pub fn size_bytes(&self) -> u64 {
        self.sectors * SECTOR_SIZE
    }
}

/// Computed placement of the partition table and the three partitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PartitionGeometry {
    pub source_size_kb: u64,
    pub table: Region,
    pub firmware: Region,
    pub data: Region,
    pub root: Region,
    pub image_sectors: u64,
}

fn mib_to_sectors(size_mb: u64) -> u64 {
    size_mb * 1024 * 1024 / SECTOR_SIZE
}

/// Root partition sectors for a source tree of `source_size_kb` KiB.
pub fn root_sectors(source_size_kb: u64) -> u64 {
    let with_overhead = source_size_kb + source_size_kb * ROOT_OVERHEAD_PERCENT / 100;
    with_overhead * 1024 / SECTOR_SIZE
}

impl PartitionGeometry {
    /// Geometry for the fixed partition sizes.
    pub fn compute(source_size_kb: u64) -> Self {
        Self::with_sizes(source_size_kb, TABLE_SIZE_MB, FIRMWARE_SIZE_MB, DATA_SIZE_MB)
    }

    pub fn with_sizes(source_size_kb: u64, table_mb: u64, firmware_mb: u64, data_mb: u64) -> Self {
        let table_sectors = mib_to_sectors(table_mb);
        let firmware_sectors = mib_to_sectors(firmware_mb);
        let data_sectors = mib_to_sectors(data_mb);
        let root_sectors = root_sectors(source_size_kb);

        let data_offset = table_sectors + firmware_sectors;
        let root_offset = data_offset + data_sectors;

        Self {
            source_size_kb,
            table: Region {
                start_sector: 0,
                sectors: table_sectors,
            },
            firmware: Region {
                start_sector: table_sectors,
                sectors: firmware_sectors,
            },
            data: Region {
                start_sector: data_offset,
                sectors: data_sectors,
            },
            root: Region {
                start_sector: root_offset,
                sectors: root_sectors,
            },
            image_sectors: table_sectors + firmware_sectors + data_sectors + root_sectors,
        }
    }

    /// Size of the backing file in bytes.
    pub fn image_bytes(&self) -> u64 {
        self.image_sectors * SECTOR_SIZE
    }

    /// Print a human-readable summary.
    pub fn print(&self) {
        println!("Geometry (source: {} KiB):", self.source_size_kb);
        for (name, region) in [
            ("table", &self.table),
            ("firmware", &self.firmware),
            ("data", &self.data),
            ("root", &self.root),
        ] {
            println!(
                "  {:<9} start={:<10} sectors={:<10} ({} MiB)",
                name,
                region.start_sector,
                region.sectors,
                region.size_bytes() / 1024 / 1024
            );
        }
        println!(
            "  image     sectors={} ({} bytes)",
            self.image_sectors,
            self.image_bytes()
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixed_region_sizes() {
        let geometry = PartitionGeometry::compute(0);
        assert_eq!(geometry.table.sectors, 2048);
        assert_eq!(geometry.firmware.sectors, 262_144);
        assert_eq!(geometry.data.sectors, 524_288);
    }

    #[test]
    fn test_one_gigabyte_source() {
        let geometry = PartitionGeometry::compute(1_000_000);
        assert_eq!(geometry.root.sectors, 2_500_000);
        assert_eq!(geometry.firmware.start_sector, 2048);
        assert_eq!(geometry.data.start_sector, 264_192);
        assert_eq!(geometry.root.start_sector, 788_480);
        assert_eq!(geometry.image_sectors, 3_288_480);
        assert_eq!(geometry.image_bytes(), 1_683_701_760);
    }

    #[test]
    fn test_overhead_truncates_before_conversion() {
        // 3 * 25 / 100 == 0, so no overhead is added for tiny trees
        assert_eq!(root_sectors(3), 6);
        // 7 + 7 * 25 / 100 = 8 KiB -> 16 sectors
        assert_eq!(root_sectors(7), 16);
        assert_eq!(root_sectors(0), 0);
    }

    #[test]
    fn test_regions_chain_and_sum() {
        for kb in (0..5_000u64).chain([65_535, 1 << 20, 12_345_678, 1 << 32]) {
            let g = PartitionGeometry::compute(kb);
            assert_eq!(g.table.start_sector, 0);
            assert_eq!(g.firmware.start_sector, g.table.end_sector());
            assert_eq!(g.data.start_sector, g.firmware.end_sector());
            assert_eq!(g.root.start_sector, g.data.end_sector());
            assert_eq!(
                g.image_sectors,
                g.table.sectors + g.firmware.sectors + g.data.sectors + g.root.sectors
            );
            assert_eq!(g.root.end_sector(), g.image_sectors);
        }
    }

    #[test]
    fn test_large_source_does_not_overflow_32_bits() {
        // 4 TiB tree: sector counts exceed u32
        let g = PartitionGeometry::compute(4 * 1024 * 1024 * 1024);
        assert!(g.image_sectors > u32::MAX as u64);
        assert_eq!(g.root.sectors, 10_737_418_240);
    }

    #[test]
    fn test_byte_offsets() {
        let g = PartitionGeometry::compute(1_000_000);
        assert_eq!(g.firmware.offset_bytes(), 1024 * 1024);
        assert_eq!(g.firmware.size_bytes(), 128 * 1024 * 1024);
        assert_eq!(g.data.offset_bytes(), 129 * 1024 * 1024);
        assert_eq!(g.root.offset_bytes(), 385 * 1024 * 1024);
    }

    #[test]
    fn test_serializes_to_json() {
        let json = serde_json::to_value(PartitionGeometry::compute(1_000_000)).unwrap();
        assert_eq!(json["image_sectors"], 3_288_480);
        assert_eq!(json["root"]["start_sector"], 788_480);
    }
}
