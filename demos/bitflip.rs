//! Locates the on-disk block holding a known-bad extent-tree item and
//! saves a read-only copy of it for offline inspection.
//!
//! This is a diagnostic, not a repair tool: writing a corrected block
//! back to the filesystem (recomputing its checksum and updating every
//! RAID copy) is out of scope for a read-only forensic reader. The
//! corrupted key below is illustrative: `(21866556112896 EXTENT_ITEM
//! 4503599627378688)`, where the offset `4503599627378688` is 4 PiB + 8
//! KiB (`0x10000000002000`) and is known to have suffered a single-bit
//! flip in the 52nd bit of what should be an 8 KiB extent length.

use std::fs::File;
use std::io::prelude::*;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context};
use clap::Parser;

use btrfs_forensics::btree::TreeCtx;
use btrfs_forensics::key::{self, Key};
use btrfs_forensics::{btree, fs, image::Image};

/// `EXTENT_ITEM`'s key kind byte; not modeled in [`key::ItemKind`] since
/// nothing else in this crate decodes extent-tree items.
const EXTENT_ITEM_KIND: u8 = 0xa8;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about)]
struct Params {
    image: PathBuf,
    #[arg(long)]
    offset: Option<u64>,
}

fn write_backup(data: &[u8], path: &Path) -> anyhow::Result<()> {
    let mut file = File::create(path)?;
    file.write_all(data)?;
    Ok(())
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let args = Params::parse();

    let image = Image::open(&args.image)?;
    let partition_offset = args.offset.unwrap_or(0);
    let (sb, chunk_map, filesystem) = fs::build(&image, partition_offset).context("reconstructing filesystem")?;

    let extent_tree_root = filesystem
        .subvolume(key::EXTENT_TREE_OBJECTID)
        .map(|s| s.bytenr)
        .ok_or_else(|| anyhow!("couldn't find extent tree root"))?;
    println!("root of extent tree: {extent_tree_root:#x}");

    let bad_key = Key::new(21_866_556_112_896, EXTENT_ITEM_KIND, 4_503_599_627_378_688);

    let ctx = TreeCtx::new(&image, sb.nodesize.get());
    let (corrupt_block_addr, payload) = btree::locate_item(&ctx, &chunk_map, extent_tree_root, bad_key)
        .ok_or_else(|| anyhow!("didn't find leaf block containing the bad key"))?;

    println!(
        "leaf holding key ({} EXTENT_ITEM {}), payload {} bytes, at block {corrupt_block_addr:#x}",
        bad_key.objectid,
        bad_key.offset,
        payload.len()
    );

    let physical = chunk_map.lookup(corrupt_block_addr).ok_or_else(|| anyhow!("corrupt block address is unmapped"))?;
    let corrupt_block = image.read_at(physical, sb.nodesize.get() as usize)?;

    let backup_filename = format!("offset_{corrupt_block_addr:#x}_backup.bin");
    write_backup(&corrupt_block, Path::new(&backup_filename))?;
    println!("wrote read-only copy to {backup_filename}");

    Ok(())
}
