//! C4: the generic B-tree walker shared by every tree this crate reads
//! (chunk tree, root tree, each subvolume's fs tree, the checksum tree).
//!
//! Walks are iterative — an explicit work-stack, never recursion — and
//! track visited block addresses so a corrupt back-reference can't spin
//! the walk forever. Depth is capped defensively; real Btrfs trees are a
//! handful of levels deep, so `MAX_TREE_DEPTH` is generous, not tight.

use std::collections::HashSet;

use log::warn;
use zerocopy::FromBytes;

use crate::image::Image;
use crate::key::Key;
use crate::structures::{KeyPtr, LeafItemDescriptor, TreeHeader};

/// Anything that can resolve a logical (virtual) address to an absolute
/// byte offset in the image file. Implemented by [`crate::chunkmap::ChunkMap`].
pub trait AddressResolver {
    fn resolve(&self, logical: u64) -> Option<u64>;
}

pub struct TreeCtx<'a> {
    pub image: &'a Image,
    pub nodesize: u32,
}

impl<'a> TreeCtx<'a> {
    pub fn new(image: &'a Image, nodesize: u32) -> TreeCtx<'a> {
        TreeCtx { image, nodesize }
    }
}

const MAX_TREE_DEPTH: usize = 64;

/// Walks every item reachable from `root_logical`, regardless of key.
pub fn walk_all(ctx: &TreeCtx, resolver: &dyn AddressResolver, root_logical: u64) -> Vec<(Key, Vec<u8>)> {
    walk_filtered(ctx, resolver, root_logical, None, None)
}

/// Walks every item reachable from `root_logical`, keeping only those
/// whose key matches `objectid_filter` / `kind_filter` when given. Leaves
/// and internal nodes that fail to decode are skipped and logged, not
/// treated as fatal — spec §4.4's "best effort" recovery policy.
pub fn walk_filtered(
    ctx: &TreeCtx,
    resolver: &dyn AddressResolver,
    root_logical: u64,
    objectid_filter: Option<u64>,
    kind_filter: Option<u8>,
) -> Vec<(Key, Vec<u8>)> {
    let mut out = Vec::new();
    let mut visited: HashSet<u64> = HashSet::new();
    let mut stack: Vec<(u64, usize)> = vec![(root_logical, 0)];

    while let Some((logical, depth)) = stack.pop() {
        if depth > MAX_TREE_DEPTH {
            warn!("tree walk exceeded max depth {MAX_TREE_DEPTH} at logical {logical:#x}; pruning");
            continue;
        }
        if !visited.insert(logical) {
            continue;
        }

        let Some(physical) = resolver.resolve(logical) else {
            warn!("tree block at logical {logical:#x} has no chunk mapping; skipping");
            continue;
        };

        let block = match ctx.image.read_at(physical, ctx.nodesize as usize) {
            Ok(b) => b,
            Err(e) => {
                warn!("failed to read tree block at {logical:#x} (physical {physical:#x}): {e}");
                continue;
            }
        };

        let Ok((header, body)) = TreeHeader::ref_from_prefix(&block) else {
            warn!("tree block at {logical:#x} is too small to hold a header; skipping");
            continue;
        };

        // spec §3 invariant 1: a tree block's header always records the
        // logical address it was fetched by. A mismatch is a `CorruptNode`
        // (spec §7) — skip the block rather than trust its contents.
        if header.bytenr.get() != logical {
            warn!(
                "tree block at {logical:#x} has header.bytenr {:#x}; treating as corrupt, skipping",
                header.bytenr.get()
            );
            continue;
        }

        let nritems = header.nritems.get() as usize;

        if header.level == 0 {
            parse_leaf(body, nritems, objectid_filter, kind_filter, logical, &mut out);
        } else {
            parse_internal(body, nritems, logical, depth, &mut stack);
        }
    }

    out
}

/// Like [`walk_filtered`], but stops at the first item matching `target`
/// exactly and also returns the logical address of the leaf block that
/// holds it — useful for diagnostics that need to locate a specific
/// on-disk block rather than enumerate a whole subtree (see `demos/`).
pub fn locate_item(ctx: &TreeCtx, resolver: &dyn AddressResolver, root_logical: u64, target: Key) -> Option<(u64, Vec<u8>)> {
    let mut visited: HashSet<u64> = HashSet::new();
    let mut stack: Vec<(u64, usize)> = vec![(root_logical, 0)];

    while let Some((logical, depth)) = stack.pop() {
        if depth > MAX_TREE_DEPTH || !visited.insert(logical) {
            continue;
        }
        let Some(physical) = resolver.resolve(logical) else { continue };
        let Ok(block) = ctx.image.read_at(physical, ctx.nodesize as usize) else { continue };
        let Ok((header, body)) = TreeHeader::ref_from_prefix(&block) else { continue };
        if header.bytenr.get() != logical {
            warn!(
                "tree block at {logical:#x} has header.bytenr {:#x}; treating as corrupt, skipping",
                header.bytenr.get()
            );
            continue;
        }
        let nritems = header.nritems.get() as usize;

        if header.level == 0 {
            let mut found = Vec::new();
            parse_leaf(body, nritems, Some(target.objectid), Some(target.kind), logical, &mut found);
            if let Some((_, payload)) = found.into_iter().find(|(key, _)| *key == target) {
                return Some((logical, payload));
            }
        } else {
            parse_internal(body, nritems, logical, depth, &mut stack);
        }
    }
    None
}

fn parse_leaf(
    body: &[u8],
    nritems: usize,
    objectid_filter: Option<u64>,
    kind_filter: Option<u8>,
    logical: u64,
    out: &mut Vec<(Key, Vec<u8>)>,
) {
    for i in 0..nritems {
        let desc_start = i * LeafItemDescriptor::SIZE;
        let Some(desc_bytes) = body.get(desc_start..desc_start + LeafItemDescriptor::SIZE) else {
            warn!("leaf at {logical:#x} item descriptor {i} out of bounds; stopping leaf");
            break;
        };
        let Ok(desc) = LeafItemDescriptor::ref_from_bytes(desc_bytes) else {
            continue;
        };

        let key = Key::new(desc.objectid.get(), desc.kind, desc.offset.get());
        if let Some(wanted) = objectid_filter {
            if key.objectid != wanted {
                continue;
            }
        }
        if let Some(wanted) = kind_filter {
            if key.kind != wanted {
                continue;
            }
        }

        let rel_offset = desc.rel_offset.get() as usize;
        let size = desc.size.get() as usize;
        let Some(payload) = body.get(rel_offset..rel_offset + size) else {
            warn!("leaf at {logical:#x} item {i} payload out of bounds; skipping item");
            continue;
        };
        out.push((key, payload.to_vec()));
    }
}

fn parse_internal(body: &[u8], nritems: usize, logical: u64, depth: usize, stack: &mut Vec<(u64, usize)>) {
    for i in 0..nritems {
        let start = i * KeyPtr::SIZE;
        let Some(entry_bytes) = body.get(start..start + KeyPtr::SIZE) else {
            warn!("internal node at {logical:#x} entry {i} out of bounds; stopping node");
            break;
        };
        let Ok(entry) = KeyPtr::ref_from_bytes(entry_bytes) else {
            continue;
        };
        stack.push((entry.blockptr.get(), depth + 1));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    struct FlatResolver;
    impl AddressResolver for FlatResolver {
        fn resolve(&self, logical: u64) -> Option<u64> {
            Some(logical)
        }
    }

    /// Layout: csum[32] fsid[16] bytenr(8) flags(8) chunk_tree_uuid[16]
    /// generation(8) owner(8) nritems(4) level(1) = 101 bytes.
    fn encode_header(level: u8, nritems: u32) -> Vec<u8> {
        let mut h = vec![0u8; TreeHeader::SIZE];
        let nritems_off = 32 + 16 + 8 + 8 + 16 + 8 + 8;
        h[nritems_off..nritems_off + 4].copy_from_slice(&nritems.to_le_bytes());
        h[nritems_off + 4] = level;
        h
    }

    #[test]
    fn walks_a_single_leaf_block() {
        let nodesize = 4096usize;
        let mut block = encode_header(0, 1);
        block.resize(nodesize, 0);

        let desc_start = TreeHeader::SIZE;
        block[desc_start..desc_start + 8].copy_from_slice(&42u64.to_le_bytes());
        block[desc_start + 8] = 0x01;
        block[desc_start + 9..desc_start + 17].copy_from_slice(&0u64.to_le_bytes());
        let rel_offset = nodesize - TreeHeader::SIZE - 4;
        block[desc_start + 17..desc_start + 21].copy_from_slice(&(rel_offset as u32).to_le_bytes());
        block[desc_start + 21..desc_start + 25].copy_from_slice(&4u32.to_le_bytes());
        block[TreeHeader::SIZE + rel_offset..TreeHeader::SIZE + rel_offset + 4].copy_from_slice(b"data");

        let mut tmp = tempfile::NamedTempFile::new().unwrap();
        tmp.write_all(&block).unwrap();
        let image = Image::open(tmp.path()).unwrap();
        let ctx = TreeCtx::new(&image, nodesize as u32);
        let resolver = FlatResolver;

        let items = walk_all(&ctx, &resolver, 0);
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].0.objectid, 42);
        assert_eq!(items[0].1, b"data");
    }

    #[test]
    fn locate_item_finds_exact_key_and_block() {
        let nodesize = 4096usize;
        let mut block = encode_header(0, 1);
        block.resize(nodesize, 0);

        let desc_start = TreeHeader::SIZE;
        block[desc_start..desc_start + 8].copy_from_slice(&42u64.to_le_bytes());
        block[desc_start + 8] = 0x01;
        block[desc_start + 9..desc_start + 17].copy_from_slice(&7u64.to_le_bytes());
        let rel_offset = nodesize - TreeHeader::SIZE - 4;
        block[desc_start + 17..desc_start + 21].copy_from_slice(&(rel_offset as u32).to_le_bytes());
        block[desc_start + 21..desc_start + 25].copy_from_slice(&4u32.to_le_bytes());
        block[TreeHeader::SIZE + rel_offset..TreeHeader::SIZE + rel_offset + 4].copy_from_slice(b"data");

        let mut tmp = tempfile::NamedTempFile::new().unwrap();
        tmp.write_all(&block).unwrap();
        let image = Image::open(tmp.path()).unwrap();
        let ctx = TreeCtx::new(&image, nodesize as u32);
        let resolver = FlatResolver;

        let target = Key::new(42, 0x01, 7);
        let (block_addr, payload) = locate_item(&ctx, &resolver, 0, target).unwrap();
        assert_eq!(block_addr, 0);
        assert_eq!(payload, b"data");

        assert!(locate_item(&ctx, &resolver, 0, Key::new(42, 0x01, 8)).is_none());
    }

    #[test]
    fn mismatched_header_bytenr_is_treated_as_corrupt_and_skipped() {
        let nodesize = 4096usize;
        let mut block = encode_header(0, 1);
        // bytenr sits right after csum[32] + fsid[16]; set it to something
        // other than the logical address (0) this block is fetched by below.
        let bytenr_off = 32 + 16;
        block[bytenr_off..bytenr_off + 8].copy_from_slice(&0xdead_beefu64.to_le_bytes());
        block.resize(nodesize, 0);

        let mut tmp = tempfile::NamedTempFile::new().unwrap();
        tmp.write_all(&block).unwrap();
        let image = Image::open(tmp.path()).unwrap();
        let ctx = TreeCtx::new(&image, nodesize as u32);
        let resolver = FlatResolver;

        let items = walk_all(&ctx, &resolver, 0);
        assert!(items.is_empty());
        assert!(locate_item(&ctx, &resolver, 0, Key::new(42, 0x01, 0)).is_none());
    }
}
