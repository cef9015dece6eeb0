//! Decodes `DIR_ITEM`/`DIR_INDEX`/`XATTR_ITEM` and `INODE_REF` payloads.
//!
//! A single leaf item's payload can hold more than one packed entry — the
//! real format packs colliding hash buckets back to back — so every
//! parser here loops until the buffer is exhausted rather than assuming
//! one entry per item.

use zerocopy::FromBytes;

use crate::key::Key;
use crate::structures::{DirItemPrefix, InodeRefPrefix};

/// One `DIR_ITEM`/`DIR_INDEX` entry: a name plus the key of the inode it
/// points at (spec §3 "Directory/xattr item").
#[derive(Debug, Clone)]
pub struct DirEntry {
    pub name: String,
    pub location: Key,
    pub file_type: u8,
}

/// One `XATTR_ITEM` entry: a name plus its raw attribute value.
#[derive(Debug, Clone)]
pub struct XattrEntry {
    pub name: String,
    pub value: Vec<u8>,
}

/// One `INODE_REF` entry: the name a parent directory uses for this
/// inode. `parent` comes from the item's key (`key.offset`), not the
/// payload.
#[derive(Debug, Clone)]
pub struct InodeRef {
    pub parent: u64,
    pub name: String,
}

pub fn parse_dir_entries(payload: &[u8]) -> Vec<DirEntry> {
    let mut out = Vec::new();
    let mut pos = 0usize;
    while pos < payload.len() {
        let Some(rest) = payload.get(pos..) else { break };
        let Ok((prefix, after)) = DirItemPrefix::ref_from_prefix(rest) else {
            break;
        };
        let name_len = prefix.name_len.get() as usize;
        let data_len = prefix.data_len.get() as usize;
        let Some(name_bytes) = after.get(..name_len) else { break };
        let name = String::from_utf8_lossy(name_bytes).into_owned();
        let location = Key::new(prefix.location_objectid.get(), prefix.location_kind, prefix.location_offset.get());
        out.push(DirEntry { name, location, file_type: prefix.file_type });
        pos += DirItemPrefix::SIZE + name_len + data_len;
    }
    out
}

pub fn parse_xattr_entries(payload: &[u8]) -> Vec<XattrEntry> {
    let mut out = Vec::new();
    let mut pos = 0usize;
    while pos < payload.len() {
        let Some(rest) = payload.get(pos..) else { break };
        let Ok((prefix, after)) = DirItemPrefix::ref_from_prefix(rest) else {
            break;
        };
        let name_len = prefix.name_len.get() as usize;
        let data_len = prefix.data_len.get() as usize;
        let Some(name_bytes) = after.get(..name_len) else { break };
        let Some(value_bytes) = after.get(name_len..name_len + data_len) else { break };
        out.push(XattrEntry {
            name: String::from_utf8_lossy(name_bytes).into_owned(),
            value: value_bytes.to_vec(),
        });
        pos += DirItemPrefix::SIZE + name_len + data_len;
    }
    out
}

pub fn parse_inode_refs(payload: &[u8], parent: u64) -> Vec<InodeRef> {
    let mut out = Vec::new();
    let mut pos = 0usize;
    while pos < payload.len() {
        let Some(rest) = payload.get(pos..) else { break };
        let Ok((prefix, after)) = InodeRefPrefix::ref_from_prefix(rest) else {
            break;
        };
        let name_len = prefix.name_len.get() as usize;
        let Some(name_bytes) = after.get(..name_len) else { break };
        out.push(InodeRef { parent, name: String::from_utf8_lossy(name_bytes).into_owned() });
        pos += InodeRefPrefix::SIZE + name_len;
    }
    out
}
