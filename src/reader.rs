//! C7: file content reassembly.
//!
//! Extents are read in `file_offset` order; gaps between them (and the
//! implicit gap between the end of the last extent and the inode's
//! recorded `size`) are sparse holes, filled with zero bytes (spec §4.7
//! "sparse hole"). A compressed extent with no registered decoder, or an
//! extent whose disk address can't be mapped, is skipped in place —
//! its span of `out` stays zero-filled — so one bad extent shortens the
//! file instead of failing the whole read (spec §7 recovery policy).

use crate::btree::AddressResolver;
use crate::compress::DecompressorRegistry;
use crate::error::{BtrfsError, Result};
use crate::fs::extent::ExtentKind;
use crate::fs::FileSystem;
use crate::image::Image;
use crate::key::UniqueInode;

/// Reassembles the full content of the regular file at `uniq`.
pub fn read_file(
    fs: &FileSystem,
    image: &Image,
    resolver: &dyn AddressResolver,
    registry: &DecompressorRegistry,
    uniq: UniqueInode,
) -> Result<Vec<u8>> {
    let inode = fs
        .inode(uniq)
        .ok_or_else(|| BtrfsError::CorruptNode(uniq, "no inode record for this unique inode".into()))?;

    let mut extents: Vec<_> = fs.extents.get(&uniq).map(|v| v.as_slice()).unwrap_or(&[]).to_vec();
    extents.sort_by_key(|e| e.file_offset);

    let mut out = vec![0u8; inode.size as usize];
    for extent in &extents {
        let start = extent.file_offset as usize;
        if start >= out.len() {
            continue;
        }
        let claimed_len = extent.len_in_file() as usize;
        let end = (start + claimed_len).min(out.len());
        if end <= start {
            continue;
        }

        match extent.kind {
            ExtentKind::Inline => {
                let Some(raw) = &extent.inline_data else { continue };
                // spec §4.6/§7: a missing or failing decoder skips this
                // extent — the file is returned short, never an aborted read.
                let bytes = match registry.decode(extent.compression, raw, extent.ram_bytes as usize) {
                    Ok(Some(decoded)) => decoded,
                    Ok(None) => raw.clone(),
                    Err(_) => continue,
                };
                let copy_len = bytes.len().min(end - start);
                out[start..start + copy_len].copy_from_slice(&bytes[..copy_len]);
            }
            ExtentKind::Regular | ExtentKind::Prealloc => {
                let Some(disk) = &extent.disk else { continue };
                if disk.disk_bytenr == 0 {
                    // Sparse hole: the zero-filled buffer already represents it.
                    continue;
                }
                // An unmappable disk extent degrades this one extent, not
                // the whole file (spec §7 recovery policy for content reads).
                let bytes = if extent.compression == crate::compress::COMPRESS_NONE {
                    // Uncompressed: `offset` addresses directly into the disk
                    // extent, and only the file's span of it is read.
                    let Some(physical) = resolver.resolve(disk.disk_bytenr + disk.offset) else {
                        continue;
                    };
                    let read_len = end - start;
                    let Ok(raw) = image.read_at(physical, read_len) else { continue };
                    raw
                } else {
                    // Compressed: the whole `disk_num_bytes`-sized blob lives
                    // at `disk_bytenr` with no `offset` addend — `offset` is
                    // a post-decompression slice into the `ram_bytes` result
                    // (spec §4.6: "read disk_num_bytes").
                    let Some(physical) = resolver.resolve(disk.disk_bytenr) else { continue };
                    let Ok(raw) = image.read_at(physical, disk.disk_num_bytes as usize) else { continue };
                    let decoded = match registry.decode(extent.compression, &raw, extent.ram_bytes as usize) {
                        Ok(Some(decoded)) => decoded,
                        Ok(None) => raw,
                        Err(_) => continue,
                    };
                    let slice_start = (disk.offset as usize).min(decoded.len());
                    let slice_end = (slice_start + disk.num_bytes as usize).min(decoded.len());
                    decoded[slice_start..slice_end].to_vec()
                };
                let copy_len = bytes.len().min(end - start);
                out[start..start + copy_len].copy_from_slice(&bytes[..copy_len]);
            }
            ExtentKind::Unknown(_) => continue,
        }
    }

    Ok(out)
}

/// Counts how many recorded checksum sectors intersect `[logical_start,
/// logical_start + len)` — used to report checksum coverage without
/// verifying the hash algorithm itself (Open Question 3, DESIGN.md).
pub fn checksum_coverage(fs: &FileSystem, logical_start: u64, len: u64) -> u64 {
    let end = logical_start.saturating_add(len);
    let mut covered = 0u64;
    for range in &fs.checksums {
        if range.sectorsize == 0 {
            continue;
        }
        let num_sectors = range.data.len() / 4;
        for i in 0..num_sectors {
            let sector_start = range.logical_start + i as u64 * range.sectorsize as u64;
            let sector_end = sector_start + range.sectorsize as u64;
            if sector_start < end && sector_end > logical_start {
                covered += 1;
            }
        }
    }
    covered
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::extent::{DiskExtent, ExtentRecord};
    use crate::fs::inode::InodeRecord;
    use std::io::Write;

    struct FlatResolver;
    impl AddressResolver for FlatResolver {
        fn resolve(&self, logical: u64) -> Option<u64> {
            Some(logical)
        }
    }

    fn sample_inode(size: u64) -> InodeRecord {
        InodeRecord {
            generation: 1,
            transid: 1,
            size,
            nbytes: size,
            nlink: 1,
            uid: 0,
            gid: 0,
            mode: 0o100644,
            rdev: 0,
            flags: 0,
            sequence: 0,
            atime: (0, 0),
            ctime: (0, 0),
            mtime: (0, 0),
            otime: (0, 0),
        }
    }

    #[test]
    fn reassembles_inline_extent() {
        let mut fs = FileSystem::new();
        let uniq = 1u64;
        fs.inodes.insert(uniq, sample_inode(5));
        fs.extents.insert(
            uniq,
            vec![ExtentRecord {
                file_offset: 0,
                kind: ExtentKind::Inline,
                compression: 0,
                ram_bytes: 5,
                inline_data: Some(b"hello".to_vec()),
                disk: None,
            }],
        );

        let mut tmp = tempfile::NamedTempFile::new().unwrap();
        tmp.write_all(&[0u8; 16]).unwrap();
        let image = Image::open(tmp.path()).unwrap();
        let registry = DecompressorRegistry::new();
        let resolver = FlatResolver;

        let content = read_file(&fs, &image, &resolver, &registry, uniq).unwrap();
        assert_eq!(content, b"hello");
    }

    #[test]
    fn leaves_sparse_hole_zero_filled() {
        let mut fs = FileSystem::new();
        let uniq = 1u64;
        fs.inodes.insert(uniq, sample_inode(8192));
        fs.extents.insert(
            uniq,
            vec![
                ExtentRecord {
                    file_offset: 0,
                    kind: ExtentKind::Regular,
                    compression: 0,
                    ram_bytes: 4096,
                    inline_data: None,
                    disk: Some(DiskExtent { disk_bytenr: 0, disk_num_bytes: 4096, offset: 0, num_bytes: 4096 }),
                },
                ExtentRecord {
                    file_offset: 4096,
                    kind: ExtentKind::Regular,
                    compression: 0,
                    ram_bytes: 4096,
                    inline_data: None,
                    disk: Some(DiskExtent { disk_bytenr: 0x1000, disk_num_bytes: 4096, offset: 0, num_bytes: 4096 }),
                },
            ],
        );

        let mut tmp = tempfile::NamedTempFile::new().unwrap();
        let mut data = vec![0u8; 0x1000];
        data.extend(vec![0xAAu8; 4096]);
        tmp.write_all(&data).unwrap();
        let image = Image::open(tmp.path()).unwrap();
        let registry = DecompressorRegistry::new();
        let resolver = FlatResolver;

        let content = read_file(&fs, &image, &resolver, &registry, uniq).unwrap();
        assert_eq!(&content[0..4096], &[0u8; 4096][..]);
        assert_eq!(&content[4096..8192], &[0xAAu8; 4096][..]);
    }

    #[test]
    fn missing_decoder_skips_extent_without_failing_the_read() {
        // spec.md §8 E6: a compressed extent with no registered decoder
        // yields an empty (zero-filled) result, not an error.
        let mut fs = FileSystem::new();
        let uniq = 1u64;
        fs.inodes.insert(uniq, sample_inode(5));
        fs.extents.insert(
            uniq,
            vec![ExtentRecord {
                file_offset: 0,
                kind: ExtentKind::Inline,
                compression: crate::compress::COMPRESS_ZSTD,
                ram_bytes: 5,
                inline_data: Some(b"xxxxx".to_vec()),
                disk: None,
            }],
        );

        let mut tmp = tempfile::NamedTempFile::new().unwrap();
        tmp.write_all(&[0u8; 16]).unwrap();
        let image = Image::open(tmp.path()).unwrap();
        let registry = DecompressorRegistry::new();
        let resolver = FlatResolver;

        let content = read_file(&fs, &image, &resolver, &registry, uniq).unwrap();
        assert_eq!(content, vec![0u8; 5]);
    }

    #[test]
    fn registered_zstd_decoder_decompresses_inline_extent() {
        // spec.md §8 E6: with a decoder registered, the extent decodes.
        let mut fs = FileSystem::new();
        let uniq = 1u64;
        fs.inodes.insert(uniq, sample_inode(5));
        fs.extents.insert(
            uniq,
            vec![ExtentRecord {
                file_offset: 0,
                kind: ExtentKind::Inline,
                compression: crate::compress::COMPRESS_ZSTD,
                ram_bytes: 5,
                inline_data: Some(b"hello".to_vec()),
                disk: None,
            }],
        );

        let mut tmp = tempfile::NamedTempFile::new().unwrap();
        tmp.write_all(&[0u8; 16]).unwrap();
        let image = Image::open(tmp.path()).unwrap();
        let mut registry = DecompressorRegistry::new();
        registry.register(crate::compress::COMPRESS_ZSTD, |data, _len| Some(data.to_vec()));
        let resolver = FlatResolver;

        let content = read_file(&fs, &image, &resolver, &registry, uniq).unwrap();
        assert_eq!(content, b"hello");
    }

    #[test]
    fn unmappable_disk_extent_is_skipped_not_fatal() {
        let mut fs = FileSystem::new();
        let uniq = 1u64;
        fs.inodes.insert(uniq, sample_inode(4096));
        fs.extents.insert(
            uniq,
            vec![ExtentRecord {
                file_offset: 0,
                kind: ExtentKind::Regular,
                compression: 0,
                ram_bytes: 4096,
                inline_data: None,
                disk: Some(DiskExtent { disk_bytenr: 0xdead_beef, disk_num_bytes: 4096, offset: 0, num_bytes: 4096 }),
            }],
        );

        struct NoResolver;
        impl AddressResolver for NoResolver {
            fn resolve(&self, _logical: u64) -> Option<u64> {
                None
            }
        }

        let mut tmp = tempfile::NamedTempFile::new().unwrap();
        tmp.write_all(&[0u8; 16]).unwrap();
        let image = Image::open(tmp.path()).unwrap();
        let registry = DecompressorRegistry::new();

        let content = read_file(&fs, &image, &NoResolver, &registry, uniq).unwrap();
        assert_eq!(content, vec![0u8; 4096]);
    }

    #[test]
    fn compressed_regular_extent_reads_disk_num_bytes_and_slices_by_offset() {
        // spec §4.6: for a compressed extent the on-disk blob is the full
        // `disk_num_bytes` at `disk_bytenr` (no `offset` addend on the disk
        // address); `offset` instead slices the decompressed `ram_bytes`
        // result.
        let mut fs = FileSystem::new();
        let uniq = 1u64;
        fs.inodes.insert(uniq, sample_inode(5));
        fs.extents.insert(
            uniq,
            vec![ExtentRecord {
                file_offset: 0,
                kind: ExtentKind::Regular,
                compression: crate::compress::COMPRESS_ZSTD,
                ram_bytes: 11,
                inline_data: None,
                disk: Some(DiskExtent { disk_bytenr: 0x1000, disk_num_bytes: 7, offset: 6, num_bytes: 5 }),
            }],
        );

        let mut tmp = tempfile::NamedTempFile::new().unwrap();
        let mut data = vec![0u8; 0x1000];
        // The "compressed" blob at disk_bytenr; the decoder below just
        // returns it unchanged but padded to ram_bytes, so this stands in
        // for the decompressed "hello world" with `offset=6` slicing "world".
        data.extend(b"HELLO!!");
        tmp.write_all(&data).unwrap();
        let image = Image::open(tmp.path()).unwrap();

        let mut registry = DecompressorRegistry::new();
        registry.register(crate::compress::COMPRESS_ZSTD, |_data, _len| Some(b"hello world".to_vec()));
        let resolver = FlatResolver;

        let content = read_file(&fs, &image, &resolver, &registry, uniq).unwrap();
        assert_eq!(content, b"world");
    }

    #[test]
    fn checksum_coverage_counts_intersecting_sectors() {
        let mut fs = FileSystem::new();
        fs.checksums.push(crate::fs::ChecksumRange { logical_start: 0, sectorsize: 4096, data: vec![0u8; 4 * 3] });
        assert_eq!(checksum_coverage(&fs, 0, 4096), 1);
        assert_eq!(checksum_coverage(&fs, 4096, 8192), 2);
        assert_eq!(checksum_coverage(&fs, 100_000, 4096), 0);
    }
}
