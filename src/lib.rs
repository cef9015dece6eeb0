//! Read-only forensic parser for Btrfs filesystem images.
//!
//! The pipeline runs in stages, each named after the module that
//! implements it: [`partition`] finds candidate partitions, [`superblock`]
//! validates the Btrfs superblock within one, [`chunkmap`] resolves
//! logical addresses to physical ones, [`btree`] walks any tree given a
//! resolved root, [`fs`] joins the root/subvolume/checksum trees into a
//! queryable view, [`path`] and [`reader`] answer per-inode questions
//! against that view, and [`report`] formats what's found.

pub mod btree;
pub mod chunkmap;
pub mod compress;
pub mod error;
pub mod fs;
pub mod image;
pub mod key;
pub mod partition;
pub mod passwd;
pub mod path;
pub mod reader;
pub mod report;
pub mod structures;
pub mod superblock;

pub use error::{BtrfsError, Result};
