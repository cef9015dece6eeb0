//! Decodes `ROOT_ITEM` and `ROOT_REF` payloads from the root tree: the
//! starting point for walking each subvolume's own fs tree (spec §4.5),
//! plus the display name the root tree records for it.

use zerocopy::FromBytes;

use crate::structures::RootItemPrefix;

/// One subvolume (or the root tree's other well-known trees, if walked
/// without filtering): its id, the logical address of its tree root,
/// and the objectid of its top-level directory.
#[derive(Debug, Clone)]
pub struct SubvolumeInfo {
    pub id: u64,
    pub bytenr: u64,
    pub root_dirid: u64,
    pub generation: u64,
    /// The name recorded in a `ROOT_REF` pointing at this subvolume, if
    /// any was found (spec §4.5 Phase 1). `None` for the default tree,
    /// which has no parent `ROOT_REF` to name it.
    pub name: Option<String>,
}

pub fn decode_root_item(id: u64, payload: &[u8]) -> Option<SubvolumeInfo> {
    let raw = RootItemPrefix::ref_from_prefix(payload).ok()?.0;
    Some(SubvolumeInfo {
        id,
        bytenr: raw.bytenr.get(),
        root_dirid: raw.root_dirid.get(),
        generation: raw.generation.get(),
        name: None,
    })
}

/// Decodes a `ROOT_REF` payload: `dirid(8) + seq(8) + name_len(2) +
/// name` (spec §4.5 Phase 1). The child subvolume's id comes from the
/// item's key (`key.offset`), not the payload, so it isn't returned here.
pub fn decode_root_ref(payload: &[u8]) -> Option<String> {
    if payload.len() < 18 {
        return None;
    }
    let name_len = u16::from_le_bytes(payload[16..18].try_into().ok()?) as usize;
    let name_bytes = payload.get(18..18 + name_len)?;
    Some(String::from_utf8_lossy(name_bytes).into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_bytenr_at_offset_176() {
        let mut buf = vec![0u8; RootItemPrefix::SIZE + 40];
        buf[176..184].copy_from_slice(&0xdead_beefu64.to_le_bytes());
        let info = decode_root_item(5, &buf).unwrap();
        assert_eq!(info.bytenr, 0xdead_beef);
    }

    #[test]
    fn short_payload_fails() {
        assert!(decode_root_item(5, &[0u8; 10]).is_none());
    }

    #[test]
    fn decodes_root_ref_name() {
        let mut buf = vec![0u8; 18];
        buf[16..18].copy_from_slice(&5u16.to_le_bytes());
        buf.extend_from_slice(b"snap1");
        assert_eq!(decode_root_ref(&buf).as_deref(), Some("snap1"));
    }

    #[test]
    fn short_root_ref_payload_fails() {
        assert!(decode_root_ref(&[0u8; 10]).is_none());
    }
}
