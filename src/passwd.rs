//! Resolves uid/gid to names from `/etc/passwd` and `/etc/group` —
//! located and read *inside the decoded image itself* via C6/C7, never
//! from the host filesystem (spec §6 "uid_name/gid_name": "resolved by
//! locating /etc/passwd and /etc/group (also under /root/etc/…) in the
//! decoded filesystem, reading them via C7, and parsing colon-separated
//! fields"). Absence of either file just means those fields are omitted
//! — this is not an error condition.

use std::collections::HashMap;

use crate::btree::AddressResolver;
use crate::compress::DecompressorRegistry;
use crate::fs::FileSystem;
use crate::image::Image;
use crate::path;
use crate::reader;

/// Candidate in-image paths for the user database, tried in order. The
/// `/root/etc/…` form covers images where the convention spec §6 names
/// puts a copy under a top-level `root` directory rather than directly
/// under `/etc`.
const PASSWD_CANDIDATES: &[&str] = &["/etc/passwd", "/root/etc/passwd"];
const GROUP_CANDIDATES: &[&str] = &["/etc/group", "/root/etc/group"];

#[derive(Debug, Default)]
pub struct NameTable {
    by_id: HashMap<u32, String>,
}

impl NameTable {
    pub fn name_for(&self, id: u32) -> Option<&str> {
        self.by_id.get(&id).map(|s| s.as_str())
    }

    /// Parses a colon-delimited `passwd`- or `group`-style file: `name:
    /// passwd:id:...`. Malformed lines are skipped, not fatal.
    pub fn parse_into(&mut self, contents: &str) {
        for line in contents.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let fields: Vec<&str> = line.split(':').collect();
            if fields.len() < 3 {
                continue;
            }
            let Ok(id) = fields[2].parse::<u32>() else {
                continue;
            };
            self.by_id.insert(id, fields[0].to_string());
        }
    }
}

/// Locates and reads `/etc/passwd` and `/etc/group` inside the decoded
/// image (falling back to `/root/etc/…`) and parses them into a pair of
/// [`NameTable`]s. Either or both may come back empty if the image has
/// no user database at those paths — spec §6 treats that as absent
/// metadata, not a parse failure.
pub fn load_uid_gid_tables(
    fs: &FileSystem,
    image: &Image,
    resolver: &dyn AddressResolver,
    registry: &DecompressorRegistry,
) -> (NameTable, NameTable) {
    (
        load_table_from_candidates(fs, image, resolver, registry, PASSWD_CANDIDATES),
        load_table_from_candidates(fs, image, resolver, registry, GROUP_CANDIDATES),
    )
}

fn load_table_from_candidates(
    fs: &FileSystem,
    image: &Image,
    resolver: &dyn AddressResolver,
    registry: &DecompressorRegistry,
    candidates: &[&str],
) -> NameTable {
    let mut table = NameTable::default();
    for &uniq in fs.inodes.keys() {
        let Some(p) = path::build_path(fs, uniq) else { continue };
        if !candidates.contains(&p.as_str()) {
            continue;
        }
        if let Ok(bytes) = reader::read_file(fs, image, resolver, registry, uniq) {
            if let Ok(text) = String::from_utf8(bytes) {
                table.parse_into(&text);
                return table;
            }
        }
    }
    table
}
