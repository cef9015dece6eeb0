//! On-disk struct layouts, decoded with `zerocopy` instead of the raw
//! pointer transmutes a C-derived reader would reach for (see DESIGN.md).
//!
//! Every struct here corresponds 1:1 to a byte layout spec.md §3 names.
//! Fields that can hold an arbitrary byte pattern without that being a
//! corruption signal (item kind, checksum/compression tags) are kept as
//! plain integers and classified by a separate function — never as an
//! enum embedded in one of these structs, which `zerocopy::FromBytes`
//! could otherwise accept for a bit pattern with no valid variant.

use zerocopy::byteorder::little_endian::{U16, U32, U64};
use zerocopy::{FromBytes, Immutable, KnownLayout};

pub const CSUM_SIZE: usize = 32;
pub const FSID_SIZE: usize = 16;
pub const UUID_SIZE: usize = 16;
pub const SUPER_INFO_OFFSET: u64 = 0x10000;
pub const SUPER_INFO_SIZE: usize = 4096;
pub const SYSTEM_CHUNK_ARRAY_SIZE: usize = 2048;
pub const LABEL_SIZE: usize = 256;
pub const NUM_BACKUP_ROOTS: usize = 4;

pub const MAGIC: u64 = 0x4D5F53665248425F; // "_BHRfS_M", little-endian

pub type Csum = [u8; CSUM_SIZE];
pub type Fsid = [u8; FSID_SIZE];
pub type Uuid = [u8; UUID_SIZE];

/// Tree-block header: the first 101 bytes of every node, leaf or internal
/// (spec §3 "Tree-block header").
#[derive(FromBytes, KnownLayout, Immutable)]
#[repr(C)]
pub struct TreeHeader {
    pub csum: Csum,
    pub fsid: Fsid,
    pub bytenr: U64,
    pub flags: U64,
    pub chunk_tree_uuid: Uuid,
    pub generation: U64,
    pub owner: U64,
    pub nritems: U32,
    pub level: u8,
}

impl TreeHeader {
    pub const SIZE: usize = 101;
}
static_assertions::assert_eq_size!(TreeHeader, [u8; TreeHeader::SIZE]);

/// One 25-byte leaf item descriptor: `(key, rel_offset, size)`.
/// `rel_offset` is relative to the end of `TreeHeader` (spec §3).
#[derive(FromBytes, KnownLayout, Immutable)]
#[repr(C)]
pub struct LeafItemDescriptor {
    pub objectid: U64,
    pub kind: u8,
    pub offset: U64,
    pub rel_offset: U32,
    pub size: U32,
}

impl LeafItemDescriptor {
    pub const SIZE: usize = 25;
}
static_assertions::assert_eq_size!(LeafItemDescriptor, [u8; LeafItemDescriptor::SIZE]);

/// One 33-byte internal-node entry: `(key, child_logical_addr, generation)`.
#[derive(FromBytes, KnownLayout, Immutable)]
#[repr(C)]
pub struct KeyPtr {
    pub objectid: U64,
    pub kind: u8,
    pub offset: U64,
    pub blockptr: U64,
    pub generation: U64,
}

impl KeyPtr {
    pub const SIZE: usize = 33;
}
static_assertions::assert_eq_size!(KeyPtr, [u8; KeyPtr::SIZE]);

/// One 32-byte chunk stripe: `(devid, offset, dev_uuid)`.
#[derive(FromBytes, KnownLayout, Immutable, Clone, Copy)]
#[repr(C)]
pub struct Stripe {
    pub devid: U64,
    pub offset: U64,
    pub dev_uuid: Uuid,
}

impl Stripe {
    pub const SIZE: usize = 32;
}
static_assertions::assert_eq_size!(Stripe, [u8; Stripe::SIZE]);

/// 48-byte chunk item head, followed by `num_stripes` [`Stripe`]s.
#[derive(FromBytes, KnownLayout, Immutable)]
#[repr(C)]
pub struct ChunkHead {
    pub length: U64,
    pub owner: U64,
    pub stripe_len: U64,
    pub kind_flags: U64,
    pub io_align: U32,
    pub io_width: U32,
    pub sector_size: U32,
    pub num_stripes: U16,
    pub sub_stripes: U16,
}

impl ChunkHead {
    pub const SIZE: usize = 48;
}
static_assertions::assert_eq_size!(ChunkHead, [u8; ChunkHead::SIZE]);

/// 12-byte timespec: `(sec, nsec)`.
#[derive(FromBytes, KnownLayout, Immutable, Clone, Copy)]
#[repr(C)]
pub struct Timespec {
    pub sec: U64,
    pub nsec: U32,
}

impl Timespec {
    pub const SIZE: usize = 12;

    /// `(sec, nsec)` pair; callers fall back to the epoch for
    /// out-of-range values per spec §6.
    pub fn as_secs_nsec(&self) -> (i64, u32) {
        (self.sec.get() as i64, self.nsec.get())
    }
}

/// 160-byte inode item (spec §3 "Inode item").
#[derive(FromBytes, KnownLayout, Immutable)]
#[repr(C)]
pub struct InodeItem {
    pub generation: U64,
    pub transid: U64,
    pub size: U64,
    pub nbytes: U64,
    pub block_group: U64,
    pub nlink: U32,
    pub uid: U32,
    pub gid: U32,
    pub mode: U32,
    pub rdev: U64,
    pub flags: U64,
    pub sequence: U64,
    pub reserved: [u8; 32],
    pub atime: Timespec,
    pub ctime: Timespec,
    pub mtime: Timespec,
    pub otime: Timespec,
}

impl InodeItem {
    pub const SIZE: usize = 160;
}
static_assertions::assert_eq_size!(InodeItem, [u8; InodeItem::SIZE]);

/// Prefix of the root item this crate needs: the embedded inode, the
/// root's own generation/root_dirid, and — at byte offset 176 — the
/// `bytenr` of that tree's root node (spec §3 "Root item"). Trailing
/// fields (refs, uuids, backup timestamps) aren't consumed by anything
/// in scope, so they aren't modeled; `zerocopy::ref_from_prefix` only
/// needs this prefix to be present in the source buffer.
#[derive(FromBytes, KnownLayout, Immutable)]
#[repr(C)]
pub struct RootItemPrefix {
    pub inode: InodeItem,
    pub generation: U64,
    pub root_dirid: U64,
    pub bytenr: U64,
}

impl RootItemPrefix {
    pub const SIZE: usize = 184;
}
static_assertions::assert_eq_size!(RootItemPrefix, [u8; RootItemPrefix::SIZE]);

/// 30-byte directory/xattr item prefix, followed by `name` then
/// (for xattrs) `data_len` bytes of attribute value (spec §3).
#[derive(FromBytes, KnownLayout, Immutable)]
#[repr(C)]
pub struct DirItemPrefix {
    pub location_objectid: U64,
    pub location_kind: u8,
    pub location_offset: U64,
    pub transid: U64,
    pub data_len: U16,
    pub name_len: U16,
    pub file_type: u8,
}

impl DirItemPrefix {
    pub const SIZE: usize = 30;
}
static_assertions::assert_eq_size!(DirItemPrefix, [u8; DirItemPrefix::SIZE]);

/// 21-byte file-extent item prefix (spec §3 "File-extent item").
#[derive(FromBytes, KnownLayout, Immutable)]
#[repr(C)]
pub struct FileExtentPrefix {
    pub generation: U64,
    pub ram_bytes: U64,
    pub compression: u8,
    pub encryption: u8,
    pub other_encoding: U16,
    pub extent_type: u8,
}

impl FileExtentPrefix {
    pub const SIZE: usize = 21;
}
static_assertions::assert_eq_size!(FileExtentPrefix, [u8; FileExtentPrefix::SIZE]);

/// The extra 32 bytes present when `extent_type` is `regular` or
/// `prealloc`.
#[derive(FromBytes, KnownLayout, Immutable)]
#[repr(C)]
pub struct FileExtentDisk {
    pub disk_bytenr: U64,
    pub disk_num_bytes: U64,
    pub offset: U64,
    pub num_bytes: U64,
}

impl FileExtentDisk {
    pub const SIZE: usize = 32;
}
static_assertions::assert_eq_size!(FileExtentDisk, [u8; FileExtentDisk::SIZE]);

pub const FILE_EXTENT_INLINE: u8 = 0;
pub const FILE_EXTENT_REGULAR: u8 = 1;
pub const FILE_EXTENT_PREALLOC: u8 = 2;

/// 10-byte inode-ref prefix, followed by `name_len` bytes of name. An
/// `INODE_REF` item's key is `(child_objectid, INODE_REF, parent_objectid)`
/// — this prefix plus the name is everything needed to recover one
/// directory entry's name from the child's side (spec §3 "Inode ref").
#[derive(FromBytes, KnownLayout, Immutable)]
#[repr(C)]
pub struct InodeRefPrefix {
    pub index: U64,
    pub name_len: U16,
}

impl InodeRefPrefix {
    pub const SIZE: usize = 10;
}
static_assertions::assert_eq_size!(InodeRefPrefix, [u8; InodeRefPrefix::SIZE]);

/// Superblock fields the core consumes (spec §3 "Superblock fields"),
/// laid out with the full field set of the real on-disk superblock so
/// that `sys_chunk_array`'s offset — and therefore its contents — lines
/// up correctly. The teacher's `structures.rs` carries the same
/// reasoning; this is the one struct in the crate big enough that
/// trimming unused trailing fields would be false economy, since the
/// array we actually need (`sys_chunk_array`) comes after them.
#[derive(FromBytes, KnownLayout, Immutable)]
#[repr(C)]
pub struct Superblock {
    pub csum: Csum,
    pub fsid: Fsid,
    pub bytenr: U64,
    pub flags: U64,
    pub magic: U64,
    pub generation: U64,
    pub root: U64,
    pub chunk_root: U64,
    pub log_root: U64,
    pub log_root_transid_unused: U64,
    pub total_bytes: U64,
    pub bytes_used: U64,
    pub root_dir_objectid: U64,
    pub num_devices: U64,
    pub sectorsize: U32,
    pub nodesize: U32,
    pub leafsize_unused: U32,
    pub stripesize: U32,
    pub sys_chunk_array_size: U32,
    pub chunk_root_generation: U64,
    pub compat_flags: U64,
    pub compat_ro_flags: U64,
    pub incompat_flags: U64,
    pub csum_type: U16,
    pub root_level: u8,
    pub chunk_root_level: u8,
    pub log_root_level: u8,
    pub dev_item: DevItem,
    pub label: [u8; LABEL_SIZE],
    pub cache_generation: U64,
    pub uuid_tree_generation: U64,
    pub metadata_uuid: Fsid,
    pub nr_global_roots: U64,
    pub reserved: [U64; 27],
    pub sys_chunk_array: [u8; SYSTEM_CHUNK_ARRAY_SIZE],
    pub super_roots: [RootBackup; NUM_BACKUP_ROOTS],
    pub padding: [u8; 565],
}

impl Superblock {
    pub const SIZE: usize = SUPER_INFO_SIZE;

    pub fn label_str(&self) -> String {
        let end = self.label.iter().position(|&b| b == 0).unwrap_or(self.label.len());
        String::from_utf8_lossy(&self.label[..end]).into_owned()
    }
}
static_assertions::assert_eq_size!(Superblock, [u8; Superblock::SIZE]);

#[derive(FromBytes, KnownLayout, Immutable)]
#[repr(C)]
pub struct DevItem {
    pub devid: U64,
    pub total_bytes: U64,
    pub bytes_used: U64,
    pub io_align: U32,
    pub io_width: U32,
    pub sector_size: U32,
    pub kind: U64,
    pub generation: U64,
    pub start_offset: U64,
    pub dev_group: U32,
    pub seek_speed: u8,
    pub bandwidth: u8,
    pub uuid: Uuid,
    pub fsid: Fsid,
}

impl DevItem {
    pub const SIZE: usize = 98;
}
static_assertions::assert_eq_size!(DevItem, [u8; DevItem::SIZE]);

#[derive(FromBytes, KnownLayout, Immutable, Clone, Copy)]
#[repr(C)]
pub struct RootBackup {
    pub tree_root: U64,
    pub tree_root_gen: U64,
    pub chunk_root: U64,
    pub chunk_root_gen: U64,
    pub extent_root: U64,
    pub extent_root_gen: U64,
    pub fs_root: U64,
    pub fs_root_gen: U64,
    pub dev_root: U64,
    pub dev_root_gen: U64,
    pub csum_root: U64,
    pub csum_root_gen: U64,
    pub total_bytes: U64,
    pub bytes_used: U64,
    pub num_devices: U64,
    pub unused_64: [U64; 4],
    pub tree_root_level: u8,
    pub chunk_root_level: u8,
    pub extent_root_level: u8,
    pub fs_root_level: u8,
    pub dev_root_level: u8,
    pub csum_root_level: u8,
    pub unused_8: [u8; 10],
}

impl RootBackup {
    pub const SIZE: usize = 168;
}
static_assertions::assert_eq_size!(RootBackup, [u8; RootBackup::SIZE]);

/// `CsumType::Crc32` is the only algorithm this crate validates directly
/// (matching the teacher); anything else is logged and skipped rather
/// than treated as corruption, since hash algorithms are pluggable
/// (spec §1 "Out of scope").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CsumType {
    Crc32,
    Other(u16),
}

impl CsumType {
    pub fn from_raw(raw: u16) -> CsumType {
        match raw {
            0 => CsumType::Crc32,
            other => CsumType::Other(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn struct_sizes_match_spec() {
        assert_eq!(TreeHeader::SIZE, 101);
        assert_eq!(LeafItemDescriptor::SIZE, 25);
        assert_eq!(KeyPtr::SIZE, 33);
        assert_eq!(Stripe::SIZE, 32);
        assert_eq!(ChunkHead::SIZE, 48);
        assert_eq!(InodeItem::SIZE, 160);
        assert_eq!(DirItemPrefix::SIZE, 30);
        assert_eq!(FileExtentPrefix::SIZE, 21);
        assert_eq!(FileExtentDisk::SIZE, 32);
        assert_eq!(Superblock::SIZE, 4096);
        assert_eq!(InodeRefPrefix::SIZE, 10);
    }
}
