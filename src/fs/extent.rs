//! Decodes `EXTENT_DATA` payloads into file-extent records (spec §3
//! "File-extent item", §4.7 reassembly rules).

use zerocopy::FromBytes;

use crate::structures::{self, FileExtentDisk, FileExtentPrefix};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtentKind {
    Inline,
    Regular,
    Prealloc,
    Unknown(u8),
}

#[derive(Debug, Clone)]
pub struct ExtentRecord {
    /// Byte offset within the file this extent starts at (`key.offset`).
    pub file_offset: u64,
    pub kind: ExtentKind,
    pub compression: u8,
    /// Uncompressed size of the data this item describes.
    pub ram_bytes: u64,
    /// Present only for `Inline` extents: the literal (possibly
    /// compressed) bytes stored directly in the item.
    pub inline_data: Option<Vec<u8>>,
    /// Present only for `Regular`/`Prealloc` extents.
    pub disk: Option<DiskExtent>,
}

#[derive(Debug, Clone, Copy)]
pub struct DiskExtent {
    pub disk_bytenr: u64,
    pub disk_num_bytes: u64,
    /// Offset into the disk extent where this file's data starts —
    /// nonzero when several files share one on-disk extent (clones).
    pub offset: u64,
    pub num_bytes: u64,
}

impl ExtentRecord {
    pub fn decode(file_offset: u64, payload: &[u8]) -> Option<ExtentRecord> {
        let (prefix, rest) = FileExtentPrefix::ref_from_prefix(payload).ok()?;
        let kind = match prefix.extent_type {
            structures::FILE_EXTENT_INLINE => ExtentKind::Inline,
            structures::FILE_EXTENT_REGULAR => ExtentKind::Regular,
            structures::FILE_EXTENT_PREALLOC => ExtentKind::Prealloc,
            other => ExtentKind::Unknown(other),
        };

        let (inline_data, disk) = match kind {
            ExtentKind::Inline => (Some(rest.to_vec()), None),
            ExtentKind::Regular | ExtentKind::Prealloc => {
                let disk_raw = FileExtentDisk::ref_from_bytes(rest).ok()?;
                (
                    None,
                    Some(DiskExtent {
                        disk_bytenr: disk_raw.disk_bytenr.get(),
                        disk_num_bytes: disk_raw.disk_num_bytes.get(),
                        offset: disk_raw.offset.get(),
                        num_bytes: disk_raw.num_bytes.get(),
                    }),
                )
            }
            ExtentKind::Unknown(_) => (None, None),
        };

        Some(ExtentRecord {
            file_offset,
            kind,
            compression: prefix.compression,
            ram_bytes: prefix.ram_bytes.get(),
            inline_data,
            disk,
        })
    }

    /// Number of file bytes this extent covers, used to decide which
    /// extent answers a read at a given file offset (spec §4.7).
    pub fn len_in_file(&self) -> u64 {
        match &self.disk {
            Some(d) => d.num_bytes,
            None => self.ram_bytes,
        }
    }

    /// A disk-extent whose `disk_bytenr` is zero is a sparse hole (spec
    /// §4.7 "sparse hole" edge case): no data is stored, reads return
    /// zero bytes.
    pub fn is_hole(&self) -> bool {
        matches!(&self.disk, Some(d) if d.disk_bytenr == 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode_regular(ram_bytes: u64, disk_bytenr: u64, disk_num_bytes: u64, offset: u64, num_bytes: u64) -> Vec<u8> {
        let mut buf = vec![0u8; FileExtentPrefix::SIZE + FileExtentDisk::SIZE];
        buf[8..16].copy_from_slice(&ram_bytes.to_le_bytes());
        buf[20] = structures::FILE_EXTENT_REGULAR;
        let disk_off = FileExtentPrefix::SIZE;
        buf[disk_off..disk_off + 8].copy_from_slice(&disk_bytenr.to_le_bytes());
        buf[disk_off + 8..disk_off + 16].copy_from_slice(&disk_num_bytes.to_le_bytes());
        buf[disk_off + 16..disk_off + 24].copy_from_slice(&offset.to_le_bytes());
        buf[disk_off + 24..disk_off + 32].copy_from_slice(&num_bytes.to_le_bytes());
        buf
    }

    #[test]
    fn decodes_regular_extent() {
        let buf = encode_regular(4096, 0x1000, 4096, 0, 4096);
        let rec = ExtentRecord::decode(0, &buf).unwrap();
        assert_eq!(rec.kind, ExtentKind::Regular);
        assert_eq!(rec.len_in_file(), 4096);
        assert!(!rec.is_hole());
    }

    #[test]
    fn zero_bytenr_regular_extent_is_a_hole() {
        let buf = encode_regular(4096, 0, 4096, 0, 4096);
        let rec = ExtentRecord::decode(0, &buf).unwrap();
        assert!(rec.is_hole());
    }

    #[test]
    fn decodes_inline_extent() {
        let mut buf = vec![0u8; FileExtentPrefix::SIZE];
        buf[8..16].copy_from_slice(&5u64.to_le_bytes());
        buf[20] = structures::FILE_EXTENT_INLINE;
        buf.extend_from_slice(b"hello");
        let rec = ExtentRecord::decode(0, &buf).unwrap();
        assert_eq!(rec.inline_data.as_deref(), Some(b"hello".as_slice()));
    }
}
