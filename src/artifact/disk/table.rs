//! DOS (MBR) partition table description, rendered as an `sfdisk` script.

use super::geometry::{PartitionGeometry, Region};

/// MBR partition type codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PartitionType {
    /// W95 FAT32 (LBA)
    Fat32Lba,
    /// Linux native
    Linux,
}

impl PartitionType {
    pub fn code(self) -> &'static str {
        match self {
            Self::Fat32Lba => "c",
            Self::Linux => "83",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PartitionEntry {
    pub region: Region,
    pub kind: PartitionType,
    pub bootable: bool,
}

/// The three-partition table written to every device image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartitionTable {
    pub entries: [PartitionEntry; 3],
}

impl PartitionTable {
    pub fn for_geometry(geometry: &PartitionGeometry) -> Self {
        Self {
            entries: [
                PartitionEntry {
                    region: geometry.firmware,
                    kind: PartitionType::Fat32Lba,
                    bootable: true,
                },
                PartitionEntry {
                    region: geometry.data,
                    kind: PartitionType::Linux,
                    bootable: false,
                },
                PartitionEntry {
                    region: geometry.root,
                    kind: PartitionType::Linux,
                    bootable: false,
                },
            ],
        }
    }

    /// Render as sfdisk input. Start and size are in 512-byte sectors.
    pub fn to_sfdisk_script(&self) -> String {
        let mut script = String::from("label: dos\nunit: sectors\n\n");
        for entry in &self.entries {
            script.push_str(&format!(
                "start={}, size={}, type={}",
                entry.region.start_sector,
                entry.region.sectors,
                entry.kind.code()
            ));
            if entry.bootable {
                script.push_str(", bootable");
            }
            script.push('\n');
        }
        script
    }
}
