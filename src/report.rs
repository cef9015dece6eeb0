//! Assembles the record emitted per inode (spec §6): path, metadata,
//! owner names when available, and human-readable mode/flag strings.
//!
//! Timestamp formatting is plain civil-calendar math rather than a
//! date/time crate — nothing in the retrieved corpus pulls one in for
//! this, and the computation is self-contained enough not to need one
//! (see DESIGN.md).

use crate::fs::inode::{FileKind, InodeRecord};
use crate::fs::FileSystem;
use crate::key::UniqueInode;
use crate::passwd::NameTable;
use crate::path;

/// One emitted file/directory record (spec §6 "Emitted records"): the
/// minimum field set the core hands to whichever renderer (console,
/// JSON, CSV — all out of scope, spec §1) a caller builds on top of
/// this crate.
#[derive(Debug, Clone)]
pub struct Record {
    pub path: Option<String>,
    pub unique_inode: UniqueInode,
    pub subvol_id: u64,
    pub inode_objectid: u64,
    pub name: Option<String>,
    pub file_type: &'static str,
    pub mode: u32,
    pub mode_str: String,
    pub flags: u64,
    pub flags_str: String,
    pub uid: u32,
    pub uid_name: Option<String>,
    pub gid: u32,
    pub gid_name: Option<String>,
    pub size: u64,
    pub nbytes: u64,
    pub nlink: u32,
    pub atime: String,
    pub ctime: String,
    pub mtime: String,
    pub otime: String,
    pub parent_inode: Option<u64>,
    pub generation: u64,
    pub transid: u64,
    pub xattr_count: u64,
    pub extent_count: u64,
    /// Sum of `disk_num_bytes` over this inode's on-disk extents — the
    /// compressed/on-disk footprint, distinct from `size` (spec §6
    /// `disk_bytes`).
    pub disk_bytes: u64,
    /// Physical offset of the first on-disk (non-hole) extent, if any
    /// (spec §6 `physical_offset`; original_source `filesystem.py`
    /// "Phase 6").
    pub physical_offset: Option<u64>,
    pub checksum_count: u64,
    /// Populated only by the optional hashing post-pass (Open Question 4,
    /// DESIGN.md) — absent means "not computed", not "empty file".
    pub content_hash: Option<String>,
    /// MD5 counterpart of `content_hash`, populated by the same post-pass
    /// (spec §6 optional `md5` field).
    pub content_hash_md5: Option<String>,
}

pub fn build_record(
    fs: &FileSystem,
    resolver: &dyn crate::btree::AddressResolver,
    uniq: UniqueInode,
    inode: &InodeRecord,
    users: &NameTable,
    groups: &NameTable,
) -> Record {
    let (subvol_id, inode_objectid) = crate::key::split_unique_inode(uniq);
    let extents = fs.extents.get(&uniq).map(|v| v.as_slice()).unwrap_or(&[]);
    let disk_bytes: u64 = extents.iter().filter_map(|e| e.disk.as_ref()).map(|d| d.disk_num_bytes).sum();
    let physical_offset = extents
        .iter()
        .filter_map(|e| e.disk.as_ref())
        .find(|d| d.disk_bytenr != 0)
        .and_then(|d| resolver.resolve(d.disk_bytenr));
    let checksum_count: u64 = extents
        .iter()
        .filter_map(|e| e.disk.as_ref())
        .filter(|d| d.disk_bytenr != 0)
        .map(|d| crate::reader::checksum_coverage(fs, d.disk_bytenr, d.disk_num_bytes))
        .sum();

    Record {
        path: path::build_path(fs, uniq),
        unique_inode: uniq,
        subvol_id,
        inode_objectid,
        name: fs.name_of(uniq).map(str::to_string),
        file_type: file_type_str(inode.file_kind()),
        mode: inode.mode,
        mode_str: mode_str(inode),
        flags: inode.flags,
        flags_str: flags_str(inode.flags),
        uid: inode.uid,
        uid_name: users.name_for(inode.uid).map(str::to_string),
        gid: inode.gid,
        gid_name: groups.name_for(inode.gid).map(str::to_string),
        size: inode.size,
        nbytes: inode.nbytes,
        nlink: inode.nlink,
        atime: format_timestamp(inode.atime),
        ctime: format_timestamp(inode.ctime),
        mtime: format_timestamp(inode.mtime),
        otime: format_timestamp(inode.otime),
        parent_inode: fs.parent_of.get(&uniq).map(|&p| crate::key::split_unique_inode(p).1),
        generation: inode.generation,
        transid: inode.transid,
        xattr_count: fs.xattrs.get(&uniq).map(|v| v.len() as u64).unwrap_or(0),
        extent_count: extents.len() as u64,
        disk_bytes,
        physical_offset,
        checksum_count,
        content_hash: None,
        content_hash_md5: None,
    }
}

fn file_type_str(kind: FileKind) -> &'static str {
    match kind {
        FileKind::Regular => "file",
        FileKind::Directory => "directory",
        FileKind::Symlink => "symlink",
        FileKind::BlockDevice => "block_device",
        FileKind::CharDevice => "char_device",
        FileKind::Fifo => "fifo",
        FileKind::Socket => "socket",
        FileKind::Unknown => "unknown",
    }
}

/// `ls`-style ten-character mode string: file-type character followed by
/// three rwx triples.
fn mode_str(inode: &InodeRecord) -> String {
    let type_char = match inode.file_kind() {
        FileKind::Directory => 'd',
        FileKind::Symlink => 'l',
        FileKind::BlockDevice => 'b',
        FileKind::CharDevice => 'c',
        FileKind::Fifo => 'p',
        FileKind::Socket => 's',
        FileKind::Regular | FileKind::Unknown => '-',
    };
    let perm = inode.mode & 0o7777;
    let mut s = String::with_capacity(10);
    s.push(type_char);
    for shift in [6, 3, 0] {
        let bits = (perm >> shift) & 0o7;
        s.push(if bits & 0b100 != 0 { 'r' } else { '-' });
        s.push(if bits & 0b010 != 0 { 'w' } else { '-' });
        s.push(if bits & 0b001 != 0 { 'x' } else { '-' });
    }
    s
}

const FLAG_NAMES: &[(u64, &str)] = &[
    (0x1, "NODATASUM"),
    (0x2, "NODATACOW"),
    (0x4, "READONLY"),
    (0x8, "NOCOMPRESS"),
    (0x10, "PREALLOC"),
    (0x20, "SYNC"),
    (0x40, "IMMUTABLE"),
    (0x80, "APPEND"),
    (0x100, "NODUMP"),
    (0x200, "NOATIME"),
    (0x400, "DIRSYNC"),
    (0x800, "COMPRESS"),
];

fn flags_str(flags: u64) -> String {
    let names: Vec<&str> = FLAG_NAMES.iter().filter(|(bit, _)| flags & bit != 0).map(|(_, name)| *name).collect();
    if names.is_empty() {
        "NONE".to_string()
    } else {
        names.join("|")
    }
}

/// Computes a SHA-256 hex digest of `content` for the optional hashing
/// post-pass (Open Question 4, DESIGN.md): hashing is decoupled from
/// `build_record` since most callers enumerating metadata never need it,
/// and it requires a full, already-decompressed read of the file.
pub fn hash_file(content: &[u8]) -> String {
    use sha2::{Digest, Sha256};
    let digest = Sha256::digest(content);
    hex::encode(digest)
}

/// Computes an MD5 hex digest of `content` (spec §6 optional `md5`
/// field), alongside [`hash_file`]'s SHA-256. Kept as a separate function
/// rather than a combined call so a caller that only wants one digest
/// doesn't pay for both.
pub fn hash_file_md5(content: &[u8]) -> String {
    use md5::{Digest, Md5};
    let digest = Md5::digest(content);
    hex::encode(digest)
}

const DAYS_BEFORE_EPOCH_1970: i64 = 719_468;

/// Formats `(sec, nsec)` as an ISO-8601 UTC timestamp, falling back to
/// the epoch for a value civil-calendar math can't represent cleanly
/// (spec §6 "timestamp" edge case).
fn format_timestamp(ts: (i64, u32)) -> String {
    let (sec, nsec) = ts;
    match civil_from_unix(sec) {
        Some((y, m, d, hh, mm, ss)) => format!("{y:04}-{m:02}-{d:02}T{hh:02}:{mm:02}:{ss:02}.{nsec:09}Z"),
        None => "1970-01-01T00:00:00.000000000Z".to_string(),
    }
}

/// Howard Hinnant's civil-from-days algorithm, adapted to seconds.
/// Valid for any `i64` that doesn't overflow during the multiply; Btrfs
/// timestamps are always in that range in practice, but a value that
/// would overflow falls back to the epoch rather than panicking.
fn civil_from_unix(unix_seconds: i64) -> Option<(i64, u32, u32, u32, u32, u32)> {
    let days = unix_seconds.div_euclid(86_400);
    let secs_of_day = unix_seconds.rem_euclid(86_400);
    let hh = (secs_of_day / 3600) as u32;
    let mm = ((secs_of_day % 3600) / 60) as u32;
    let ss = (secs_of_day % 60) as u32;

    let z = days.checked_add(DAYS_BEFORE_EPOCH_1970)?;
    let era = if z >= 0 { z } else { z - 146_096 } / 146_097;
    let doe = (z - era * 146_097) as u64;
    let yoe = (doe - doe / 1460 + doe / 36524 - doe / 146_096) / 365;
    let y = yoe as i64 + era * 400;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
    let mp = (5 * doy + 2) / 153;
    let d = (doy - (153 * mp + 2) / 5 + 1) as u32;
    let m = if mp < 10 { mp + 3 } else { mp - 9 } as u32;
    let y = if m <= 2 { y + 1 } else { y };

    Some((y, m, d, hh, mm, ss))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_inode(mode: u32, flags: u64) -> InodeRecord {
        InodeRecord {
            generation: 1,
            transid: 1,
            size: 0,
            nbytes: 0,
            nlink: 1,
            uid: 1000,
            gid: 1000,
            mode,
            rdev: 0,
            flags,
            sequence: 0,
            atime: (0, 0),
            ctime: (0, 0),
            mtime: (0, 0),
            otime: (0, 0),
        }
    }

    #[test]
    fn mode_str_matches_ls_style() {
        let inode = sample_inode(0o100755, 0);
        assert_eq!(mode_str(&inode), "-rwxr-xr-x");
        let dir = sample_inode(0o040750, 0);
        assert_eq!(mode_str(&dir), "drwxr-x---");
    }

    #[test]
    fn flags_str_lists_set_bits() {
        assert_eq!(flags_str(0), "NONE");
        assert_eq!(flags_str(0x1 | 0x40), "NODATASUM|IMMUTABLE");
    }

    #[test]
    fn epoch_formats_as_expected() {
        assert_eq!(format_timestamp((0, 0)), "1970-01-01T00:00:00.000000000Z");
    }

    #[test]
    fn known_date_formats_correctly() {
        // 2021-01-01T00:00:00Z
        assert_eq!(format_timestamp((1_609_459_200, 0)), "2021-01-01T00:00:00.000000000Z");
    }

    #[test]
    fn hash_file_is_deterministic() {
        assert_eq!(hash_file(b"hello"), hash_file(b"hello"));
        assert_ne!(hash_file(b"hello"), hash_file(b"world"));
    }

    #[test]
    fn hash_file_md5_is_deterministic() {
        assert_eq!(hash_file_md5(b"hello"), hash_file_md5(b"hello"));
        assert_ne!(hash_file_md5(b"hello"), hash_file(b"hello"));
    }

    struct FlatResolver;
    impl crate::btree::AddressResolver for FlatResolver {
        fn resolve(&self, logical: u64) -> Option<u64> {
            Some(logical + 0x1000)
        }
    }

    #[test]
    fn build_record_fills_extent_and_xattr_derived_fields() {
        use crate::fs::extent::{DiskExtent, ExtentKind, ExtentRecord};
        use crate::fs::dirent::XattrEntry;
        use crate::key::unique_inode;

        let mut fs = FileSystem::new();
        let uniq = unique_inode(5, 260);
        fs.inodes.insert(uniq, sample_inode(0o100644, 0));
        fs.names.insert(uniq, "readme.txt".to_string());
        fs.xattrs.insert(uniq, vec![XattrEntry { name: "user.foo".to_string(), value: b"bar".to_vec() }]);
        fs.extents.insert(
            uniq,
            vec![ExtentRecord {
                file_offset: 0,
                kind: ExtentKind::Regular,
                compression: 0,
                ram_bytes: 4096,
                inline_data: None,
                disk: Some(DiskExtent { disk_bytenr: 0x2000, disk_num_bytes: 4096, offset: 0, num_bytes: 4096 }),
            }],
        );

        let users = NameTable::default();
        let groups = NameTable::default();
        let inode = fs.inode(uniq).unwrap().clone();
        let resolver = FlatResolver;
        let record = build_record(&fs, &resolver, uniq, &inode, &users, &groups);

        assert_eq!(record.name.as_deref(), Some("readme.txt"));
        assert_eq!(record.file_type, "file");
        assert_eq!(record.xattr_count, 1);
        assert_eq!(record.extent_count, 1);
        assert_eq!(record.disk_bytes, 4096);
        assert_eq!(record.physical_offset, Some(0x3000));
        assert_eq!(record.subvol_id, 5);
        assert_eq!(record.inode_objectid, 260);
    }
}
