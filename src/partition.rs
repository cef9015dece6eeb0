//! C1: locates candidate partitions inside a raw disk image by reading
//! whichever partition table is present, then probes each one for a
//! Btrfs superblock.
//!
//! MBR and GPT are both just byte layouts at well-known offsets; this
//! reads them directly with slice indexing rather than the zerocopy
//! structs in [`crate::structures`] — those model Btrfs's own on-disk
//! format, not the surrounding partition table, and a hand-rolled
//! field-offset table reads just as plainly for something this small.

use log::debug;

use crate::error::Result;
use crate::image::Image;
use crate::structures::Superblock;
use crate::superblock;

const SECTOR_SIZE: u64 = 512;
const MBR_SIGNATURE_OFFSET: usize = 0x1FE;
const MBR_TABLE_OFFSET: usize = 0x1BE;
const MBR_ENTRY_SIZE: usize = 16;
const MBR_ENTRY_COUNT: usize = 4;
const GPT_PROTECTIVE_TYPE: u8 = 0xEE;
const GPT_SIGNATURE: &[u8; 8] = b"EFI PART";
/// Defensive cap on GPT partition entries even if the header claims more
/// — a corrupt or adversarial header shouldn't make this crate allocate
/// without bound.
const MAX_GPT_ENTRIES: u32 = 4096;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PartitionScheme {
    Mbr,
    Gpt,
    /// No partition table was recognized; the whole image is treated as
    /// one filesystem starting at byte 0 (spec §4.1 "bare" fallback).
    BareFs,
}

#[derive(Debug, Clone)]
pub struct Partition {
    pub index: u32,
    pub offset: u64,
    pub size: u64,
    pub scheme: PartitionScheme,
    pub label: Option<String>,
}

/// Locates candidate partitions and keeps only those with a valid Btrfs
/// superblock at their start (spec §4.1 contract: "each returned entry
/// has a valid filesystem superblock"). MBR is preferred outright — if
/// any MBR entry validates, GPT is never even consulted; GPT is only
/// tried when MBR yields no validating entry. Falls back to treating
/// the whole image as a bare filesystem at offset 0 when neither scheme
/// turns up a validating candidate.
pub fn detect(image: &Image) -> Result<Vec<Partition>> {
    let mbr_valid = validate(image, try_mbr(image)?);
    if !mbr_valid.is_empty() {
        return Ok(mbr_valid);
    }
    if let Some(gpt_parts) = try_gpt(image)? {
        let gpt_valid = validate(image, gpt_parts);
        if !gpt_valid.is_empty() {
            return Ok(gpt_valid);
        }
    }
    Ok(vec![Partition { index: 0, offset: 0, size: image.len, scheme: PartitionScheme::BareFs, label: None }])
}

fn validate(image: &Image, candidates: Vec<Partition>) -> Vec<Partition> {
    candidates.into_iter().filter(|p| superblock::probe(image, p.offset).is_some()).collect()
}

/// Lists every raw MBR/GPT partition table entry found, paired with
/// whatever superblock (if any) was found at its start — the combined
/// C1+C2 entry point `main.rs` calls for the `partitions` subcommand,
/// which (unlike [`detect`]) shows non-filesystem partitions too rather
/// than silently dropping them.
pub fn scan(image: &Image) -> Result<Vec<(Partition, Option<Superblock>)>> {
    let mut all = try_mbr(image)?;
    if let Some(gpt_parts) = try_gpt(image)? {
        all.extend(gpt_parts);
    }
    if all.is_empty() {
        all.push(Partition { index: 0, offset: 0, size: image.len, scheme: PartitionScheme::BareFs, label: None });
    }
    Ok(all.into_iter().map(|p| { let sb = superblock::probe(image, p.offset); (p, sb) }).collect())
}

fn try_mbr(image: &Image) -> Result<Vec<Partition>> {
    if image.len < SECTOR_SIZE {
        return Ok(Vec::new());
    }
    let sector = image.read_at(0, SECTOR_SIZE as usize)?;
    if sector[MBR_SIGNATURE_OFFSET] != 0x55 || sector[MBR_SIGNATURE_OFFSET + 1] != 0xAA {
        return Ok(Vec::new());
    }

    let mut out = Vec::new();
    for i in 0..MBR_ENTRY_COUNT {
        let entry = &sector[MBR_TABLE_OFFSET + i * MBR_ENTRY_SIZE..MBR_TABLE_OFFSET + (i + 1) * MBR_ENTRY_SIZE];
        let partition_type = entry[4];
        if partition_type == 0 {
            continue;
        }
        let lba_start = u32::from_le_bytes(entry[8..12].try_into().unwrap()) as u64;
        let sector_count = u32::from_le_bytes(entry[12..16].try_into().unwrap()) as u64;
        if sector_count == 0 {
            continue;
        }
        out.push(Partition {
            index: i as u32,
            offset: lba_start * SECTOR_SIZE,
            size: sector_count * SECTOR_SIZE,
            scheme: PartitionScheme::Mbr,
            label: None,
        });
    }
    debug!("MBR scan found {} partition(s)", out.len());
    Ok(out)
}

fn try_gpt(image: &Image) -> Result<Option<Vec<Partition>>> {
    if image.len < SECTOR_SIZE * 2 {
        return Ok(None);
    }
    let protective = image.read_at(0, SECTOR_SIZE as usize)?;
    if protective[MBR_SIGNATURE_OFFSET] != 0x55
        || protective[MBR_SIGNATURE_OFFSET + 1] != 0xAA
        || protective[MBR_TABLE_OFFSET + 4] != GPT_PROTECTIVE_TYPE
    {
        return Ok(None);
    }

    let header = image.read_at(SECTOR_SIZE, SECTOR_SIZE as usize)?;
    if &header[0..8] != GPT_SIGNATURE {
        return Ok(None);
    }

    let entry_lba = u64::from_le_bytes(header[72..80].try_into().unwrap());
    let num_entries = u32::from_le_bytes(header[80..84].try_into().unwrap()).min(MAX_GPT_ENTRIES);
    let entry_size = u32::from_le_bytes(header[84..88].try_into().unwrap()) as usize;
    if entry_size == 0 || entry_size < 56 {
        return Ok(None);
    }

    let table_offset = entry_lba * SECTOR_SIZE;
    let table_bytes = image.read_at(table_offset, entry_size * num_entries as usize)?;

    let mut out = Vec::new();
    for i in 0..num_entries as usize {
        let entry = &table_bytes[i * entry_size..(i + 1) * entry_size];
        let type_guid = &entry[0..16];
        if type_guid.iter().all(|&b| b == 0) {
            continue;
        }
        let starting_lba = u64::from_le_bytes(entry[32..40].try_into().unwrap());
        let ending_lba = u64::from_le_bytes(entry[40..48].try_into().unwrap());
        if ending_lba < starting_lba {
            continue;
        }
        let name = if entry.len() >= 128 { Some(decode_utf16le_name(&entry[56..128])) } else { None };
        out.push(Partition {
            index: i as u32,
            offset: starting_lba * SECTOR_SIZE,
            size: (ending_lba - starting_lba + 1) * SECTOR_SIZE,
            scheme: PartitionScheme::Gpt,
            label: name.filter(|s| !s.is_empty()),
        });
    }
    debug!("GPT scan found {} partition(s)", out.len());
    Ok(Some(out))
}

fn decode_utf16le_name(bytes: &[u8]) -> String {
    let units: Vec<u16> = bytes.chunks_exact(2).map(|c| u16::from_le_bytes([c[0], c[1]])).take_while(|&u| u != 0).collect();
    String::from_utf16_lossy(&units)
}
