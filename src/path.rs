//! C6: reconstructs an absolute path for an inode by walking
//! `parent_of` back to the subvolume's root directory, then prefixing
//! the subvolume's own name (spec §4.5 "Path construction": `/<subvol>/
//! …/<name>`, or plain `/…/<name>` for the default tree).

use std::collections::HashSet;

use crate::fs::FileSystem;
use crate::key::{split_unique_inode, unique_inode, UniqueInode, FS_TREE_OBJECTID};

/// Resolves the absolute path of `uniq`, rooted at `/` for the default
/// subvolume (objectid 5) or `/<name>` for any other subvolume — the
/// "subvolume root sentinel" spec §4.5 describes, here expressed as a
/// literal prefix rather than a synthetic parent-chain entry, since this
/// crate keeps one `FileSystem` per image rather than splicing every
/// subvolume into a single cross-tree parent chain. Guards against a
/// cyclic `parent_of` chain (corruption, not a real Btrfs state) with a
/// seen-set rather than looping forever — spec §4.6 "Edge cases".
pub fn build_path(fs: &FileSystem, uniq: UniqueInode) -> Option<String> {
    let (subvol_id, _) = split_unique_inode(uniq);
    let subvol = fs.subvolumes.iter().find(|s| s.id == subvol_id)?;
    let root_uniq = unique_inode(subvol_id, subvol.root_dirid);

    let prefix = if subvol_id == FS_TREE_OBJECTID {
        String::new()
    } else {
        format!("/{}", subvol.name.clone().unwrap_or_else(|| subvol_id.to_string()))
    };

    if uniq == root_uniq {
        return Some(if prefix.is_empty() { "/".to_string() } else { prefix });
    }

    let mut components = Vec::new();
    let mut current = uniq;
    let mut seen = HashSet::new();

    loop {
        if !seen.insert(current) {
            return None;
        }
        if current == root_uniq {
            break;
        }
        let name = fs.name_of(current)?;
        components.push(name.to_string());
        current = *fs.parent_of.get(&current)?;
    }

    components.reverse();
    Some(format!("{prefix}/{}", components.join("/")))
}
