//! Decodes `INODE_ITEM` payloads into host-friendly records.

use zerocopy::FromBytes;

use crate::structures::InodeItem as RawInodeItem;

/// One inode's metadata (spec §3 "Inode item", §6 emitted fields).
#[derive(Debug, Clone)]
pub struct InodeRecord {
    pub generation: u64,
    pub transid: u64,
    pub size: u64,
    pub nbytes: u64,
    pub nlink: u32,
    pub uid: u32,
    pub gid: u32,
    pub mode: u32,
    pub rdev: u64,
    pub flags: u64,
    pub sequence: u64,
    pub atime: (i64, u32),
    pub ctime: (i64, u32),
    pub mtime: (i64, u32),
    pub otime: (i64, u32),
}

impl InodeRecord {
    pub fn decode(payload: &[u8]) -> Option<InodeRecord> {
        let raw = RawInodeItem::ref_from_bytes(payload).ok()?;
        Some(InodeRecord {
            generation: raw.generation.get(),
            transid: raw.transid.get(),
            size: raw.size.get(),
            nbytes: raw.nbytes.get(),
            nlink: raw.nlink.get(),
            uid: raw.uid.get(),
            gid: raw.gid.get(),
            mode: raw.mode.get(),
            rdev: raw.rdev.get(),
            flags: raw.flags.get(),
            sequence: raw.sequence.get(),
            atime: raw.atime.as_secs_nsec(),
            ctime: raw.ctime.as_secs_nsec(),
            mtime: raw.mtime.as_secs_nsec(),
            otime: raw.otime.as_secs_nsec(),
        })
    }

    /// POSIX file-type bits, per spec §6's `mode_str` classification.
    pub fn file_kind(&self) -> FileKind {
        const S_IFMT: u32 = 0o170000;
        match self.mode & S_IFMT {
            0o040000 => FileKind::Directory,
            0o100000 => FileKind::Regular,
            0o120000 => FileKind::Symlink,
            0o060000 => FileKind::BlockDevice,
            0o020000 => FileKind::CharDevice,
            0o010000 => FileKind::Fifo,
            0o140000 => FileKind::Socket,
            _ => FileKind::Unknown,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    Regular,
    Directory,
    Symlink,
    BlockDevice,
    CharDevice,
    Fifo,
    Socket,
    Unknown,
}
