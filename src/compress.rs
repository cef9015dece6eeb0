//! Pluggable decompressor registry.
//!
//! Codec implementations are explicitly out of scope (spec §1 "Out of
//! scope"): this crate recognizes the compression tags Btrfs defines
//! (zlib, lzo, zstd) but ships no decoder for any of them. A caller that
//! needs file content for compressed extents registers one.

use std::collections::HashMap;

use crate::error::{BtrfsError, Result};

pub const COMPRESS_NONE: u8 = 0;
pub const COMPRESS_ZLIB: u8 = 1;
pub const COMPRESS_LZO: u8 = 2;
pub const COMPRESS_ZSTD: u8 = 3;

type Decompressor = dyn Fn(&[u8], usize) -> Option<Vec<u8>> + Send + Sync;

#[derive(Default)]
pub struct DecompressorRegistry {
    decoders: HashMap<u8, Box<Decompressor>>,
}

impl DecompressorRegistry {
    pub fn new() -> DecompressorRegistry {
        DecompressorRegistry::default()
    }

    /// Registers a decoder for compression tag `kind`. `decoded_len` is
    /// the expected uncompressed size (`ram_bytes`); implementations may
    /// use it to preallocate or to validate the result.
    pub fn register<F>(&mut self, kind: u8, decoder: F)
    where
        F: Fn(&[u8], usize) -> Option<Vec<u8>> + Send + Sync + 'static,
    {
        self.decoders.insert(kind, Box::new(decoder));
    }

    pub fn is_registered(&self, kind: u8) -> bool {
        kind == COMPRESS_NONE || self.decoders.contains_key(&kind)
    }

    /// Decompresses `data` using the decoder registered for `kind`.
    /// `Ok(None)` is returned for `COMPRESS_NONE` — the caller should use
    /// `data` unchanged.
    pub fn decode(&self, kind: u8, data: &[u8], decoded_len: usize) -> Result<Option<Vec<u8>>> {
        if kind == COMPRESS_NONE {
            return Ok(None);
        }
        match self.decoders.get(&kind) {
            Some(f) => f(data, decoded_len).map(Some).ok_or(BtrfsError::DecompressionFailed(kind)),
            None => Err(BtrfsError::DecompressionUnavailable(kind)),
        }
    }
}
