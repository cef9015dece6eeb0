//! C3: the logical-to-physical address translator.

use log::debug;
use zerocopy::FromBytes;

use crate::btree::{walk_filtered, AddressResolver, TreeCtx};
use crate::error::Result;
use crate::key::{ItemKind, Key, FIRST_CHUNK_TREE_OBJECTID};
use crate::structures::{ChunkHead, Stripe};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkMapState {
    Empty,
    Seeded,
    Complete,
}

struct Range {
    logical_start: u64,
    length: u64,
    physical_start: u64,
}

pub struct ChunkMap {
    ranges: Vec<Range>,
    partition_offset: u64,
    state: ChunkMapState,
}

impl ChunkMap {
    pub fn new(partition_offset: u64) -> ChunkMap {
        ChunkMap { ranges: Vec::new(), partition_offset, state: ChunkMapState::Empty }
    }

    pub fn state(&self) -> ChunkMapState {
        self.state
    }

    /// Seeds the map from the superblock's embedded system-chunk array
    /// (spec §4.3). `bytes` is the raw `sys_chunk_array`, truncated to
    /// `size` valid bytes; a truncated trailing pair is simply not
    /// returned (not an error — the array is padded with zeros).
    pub fn seed_from_sys_array(&mut self, bytes: &[u8], size: usize) {
        let size = size.min(bytes.len());
        let mut pos = 0usize;
        while pos < size {
            let Some(pair) = parse_chunk_pair(&bytes[pos..size]) else {
                break;
            };
            let (key, head, stripes, consumed) = pair;
            self.insert(key.offset, head.length.get(), stripes[0].offset.get());
            pos += consumed;
        }
        if self.state == ChunkMapState::Empty {
            self.state = ChunkMapState::Seeded;
        }
    }

    /// Completes the map by walking the chunk tree (spec §4.3). The chunk
    /// tree's own root is reachable through the seeded ranges — that is
    /// the bootstrap invariant spec §4.3 names.
    pub fn complete_from_tree(&mut self, ctx: &TreeCtx, chunk_tree_addr: u64) -> Result<()> {
        for (key, payload) in walk_filtered(ctx, self, chunk_tree_addr, None, Some(ItemKind::ChunkItem.raw())) {
            let Ok((head, rest)) = ChunkHead::ref_from_prefix(&payload) else {
                continue;
            };
            let num_stripes = head.num_stripes.get() as usize;
            if num_stripes == 0 || rest.len() < num_stripes * Stripe::SIZE {
                continue;
            }
            let Ok((stripes, _)) = <[Stripe]>::ref_from_prefix_with_elems(rest, num_stripes) else {
                continue;
            };
            self.insert(key.offset, head.length.get(), stripes[0].offset.get());
        }
        self.state = ChunkMapState::Complete;
        Ok(())
    }

    /// Later writes supersede earlier ones for the same logical start,
    /// matching B-tree semantics where later generations win (spec §4.3
    /// "Policy").
    fn insert(&mut self, logical_start: u64, length: u64, physical_start: u64) {
        if let Some(existing) = self.ranges.iter_mut().find(|r| r.logical_start == logical_start) {
            existing.length = length;
            existing.physical_start = physical_start;
        } else {
            self.ranges.push(Range { logical_start, length, physical_start });
        }
    }

    /// Resolves a logical address to an absolute physical offset in the
    /// image file. Linear search (Open Question 1, DESIGN.md).
    pub fn lookup(&self, logical: u64) -> Option<u64> {
        for r in &self.ranges {
            if logical >= r.logical_start && logical < r.logical_start + r.length {
                return Some(self.partition_offset + r.physical_start + (logical - r.logical_start));
            }
        }
        debug!("no chunk range covers logical address {logical:#x}");
        None
    }

    #[cfg(test)]
    pub fn range_count(&self) -> usize {
        self.ranges.len()
    }
}

impl AddressResolver for ChunkMap {
    fn resolve(&self, logical: u64) -> Option<u64> {
        self.lookup(logical)
    }
}

/// Parses one `(key, chunk_item_head, stripes)` triple from the start of
/// `buf`, returning the number of bytes consumed. Returns `None` if
/// `buf` doesn't hold a complete pair (a truncated trailing entry in the
/// system-chunk array, which is not an error — see spec §4.3).
fn parse_chunk_pair(buf: &[u8]) -> Option<(Key, ChunkHeadOwned, Vec<Stripe>, usize)> {
    if buf.len() < Key::SIZE {
        return None;
    }
    let objectid = u64::from_le_bytes(buf[0..8].try_into().ok()?);
    let kind = buf[8];
    let offset = u64::from_le_bytes(buf[9..17].try_into().ok()?);
    let key = Key::new(objectid, kind, offset);

    let rest = &buf[Key::SIZE..];
    if rest.len() < ChunkHead::SIZE {
        return None;
    }
    let (head, after_head) = ChunkHead::ref_from_prefix(rest).ok()?;
    let num_stripes = head.num_stripes.get() as usize;
    if num_stripes == 0 || after_head.len() < num_stripes * Stripe::SIZE {
        return None;
    }
    let (stripes, _) = <[Stripe]>::ref_from_prefix_with_elems(after_head, num_stripes).ok()?;

    let owned_head = ChunkHeadOwned { length: head.length.get() };
    let consumed = Key::SIZE + ChunkHead::SIZE + num_stripes * Stripe::SIZE;
    Some((key, owned_head, stripes.to_vec(), consumed))
}

/// Just the field `seed_from_sys_array` needs, copied out so the
/// borrowed `ChunkHead` doesn't have to outlive the loop in the caller.
struct ChunkHeadOwned {
    length: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode_chunk_pair(objectid: u64, kind: u8, offset: u64, length: u64, physical: u64) -> Vec<u8> {
        let mut buf = Vec::new();
        buf.extend_from_slice(&objectid.to_le_bytes());
        buf.push(kind);
        buf.extend_from_slice(&offset.to_le_bytes());
        // ChunkHead: length, owner, stripe_len, kind_flags, io_align, io_width, sector_size, num_stripes, sub_stripes
        buf.extend_from_slice(&length.to_le_bytes());
        buf.extend_from_slice(&0u64.to_le_bytes()); // owner
        buf.extend_from_slice(&0u64.to_le_bytes()); // stripe_len
        buf.extend_from_slice(&0u64.to_le_bytes()); // kind_flags
        buf.extend_from_slice(&0u32.to_le_bytes()); // io_align
        buf.extend_from_slice(&0u32.to_le_bytes()); // io_width
        buf.extend_from_slice(&4096u32.to_le_bytes()); // sector_size
        buf.extend_from_slice(&1u16.to_le_bytes()); // num_stripes
        buf.extend_from_slice(&0u16.to_le_bytes()); // sub_stripes
        // one stripe: devid, offset, dev_uuid
        buf.extend_from_slice(&1u64.to_le_bytes());
        buf.extend_from_slice(&physical.to_le_bytes());
        buf.extend_from_slice(&[0u8; 16]);
        buf
    }

    #[test]
    fn seed_resolves_logical_address() {
        let mut map = ChunkMap::new(0);
        let bytes = encode_chunk_pair(FIRST_CHUNK_TREE_OBJECTID, ItemKind::ChunkItem.raw(), 0x4000_0000, 0x10_0000, 0x200_0000);
        let size = bytes.len();
        map.seed_from_sys_array(&bytes, size);
        assert_eq!(map.state(), ChunkMapState::Seeded);
        assert_eq!(map.lookup(0x4000_0000), Some(0x200_0000));
        assert_eq!(map.lookup(0x4000_0000 + 0x10), Some(0x200_0010));
        assert_eq!(map.lookup(0x5000_0000), None);
    }

    #[test]
    fn truncated_trailing_pair_is_not_an_error() {
        let mut map = ChunkMap::new(0);
        let mut bytes = encode_chunk_pair(FIRST_CHUNK_TREE_OBJECTID, ItemKind::ChunkItem.raw(), 0, 0x1000, 0);
        bytes.truncate(bytes.len() - 5);
        let size = bytes.len();
        map.seed_from_sys_array(&bytes, size);
        assert_eq!(map.range_count(), 0);
    }
}
