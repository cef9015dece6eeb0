//! Positioned reads against the raw image file.
//!
//! Replaces the teacher's `mmap`-based `MappedFile`: spec §5 states the
//! pipeline is single-threaded and synchronous, with every read preceded
//! by an absolute seek, and that no memory-mapping is required. `Image`
//! wraps the file handle in a `RefCell` so that discipline is enforced by
//! the type itself — there is exactly one logical cursor, and the borrow
//! checker refuses concurrent use rather than merely documenting it.

use std::cell::RefCell;
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;

use crate::error::{BtrfsError, Result};

pub struct Image {
    file: RefCell<File>,
    pub len: u64,
}

impl Image {
    pub fn open(path: &Path) -> Result<Image> {
        let file = File::open(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                BtrfsError::ImageNotFound(path.display().to_string())
            } else {
                BtrfsError::Io(e)
            }
        })?;
        let len = file.metadata()?.len();
        Ok(Image { file: RefCell::new(file), len })
    }

    /// Reads exactly `len` bytes starting at absolute byte `offset`.
    pub fn read_at(&self, offset: u64, len: usize) -> Result<Vec<u8>> {
        let mut buf = vec![0u8; len];
        let mut f = self.file.borrow_mut();
        f.seek(SeekFrom::Start(offset))?;
        f.read_exact(&mut buf)?;
        Ok(buf)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn read_at_returns_requested_bytes() {
        let mut tmp = tempfile::NamedTempFile::new().unwrap();
        tmp.write_all(b"0123456789abcdef").unwrap();
        let image = Image::open(tmp.path()).unwrap();
        assert_eq!(image.read_at(4, 6).unwrap(), b"456789");
    }

    #[test]
    fn open_missing_file_is_image_not_found() {
        let err = Image::open(Path::new("/nonexistent/path/does-not-exist")).unwrap_err();
        assert!(matches!(err, BtrfsError::ImageNotFound(_)));
    }
}
