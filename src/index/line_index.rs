//! Line Index: builds and owns the `physical_line -> byte_offset` table
//! over a memory-mapped, read-only file.

use std::fs::File;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use memmap2::Mmap;

use crate::error::{EngineError, EngineResult};

/// Byte-offset table for every physical line in a file, plus the mapping
/// it was built from.
pub struct LineIndex {
    pub mmap: Arc<Mmap>,
    pub offsets: Vec<u64>,
    pub size: u64,
}

impl LineIndex {
    /// Number of physical lines.
    pub fn line_count(&self) -> usize {
        self.offsets.len()
    }

    /// Byte span `[start, end)` for physical line `phys`, or `None` if out of range.
    pub fn line_span(&self, phys: usize) -> Option<(u64, u64)> {
        let start = *self.offsets.get(phys)?;
        let end = self
            .offsets
            .get(phys + 1)
            .copied()
            .unwrap_or(self.size);
        Some((start, end))
    }
}

/// Opens and memory-maps `path`, then scans it for newline positions.
///
/// `cancel` is polled between chunks of work; if it becomes `true` the
/// partial offset table is discarded and `Ok(None)` is returned (the
/// caller treats this as a terminated operation, not a failure).
pub fn build_line_index(path: &Path, cancel: &AtomicBool) -> EngineResult<Option<LineIndex>> {
    let file = File::open(path).map_err(|source| EngineError::OpenFailure {
        path: path.to_path_buf(),
        source,
    })?;

    // SAFETY: the file is opened read-only immediately above and is not
    // concurrently truncated by this process; external mutation of a log
    // file while it is being mapped is the same hazard `tail -f` accepts.
    let mmap = unsafe {
        Mmap::map(&file).map_err(|source| EngineError::OpenFailure {
            path: path.to_path_buf(),
            source,
        })?
    };

    let size = mmap.len() as u64;

    if mmap.is_empty() {
        return Ok(Some(LineIndex {
            mmap: Arc::new(mmap),
            offsets: Vec::new(),
            size: 0,
        }));
    }

    let mut offsets = Vec::with_capacity(size as usize / 64 + 1);
    offsets.push(0u64);

    const CHUNK_CHECK_INTERVAL: usize = 1 << 20;
    let mut since_check = 0usize;

    for pos in memchr::memchr_iter(b'\n', &mmap[..]) {
        let next = pos as u64 + 1;
        if next < size {
            offsets.push(next);
        }

        since_check += 1;
        if since_check >= CHUNK_CHECK_INTERVAL {
            since_check = 0;
            if cancel.load(Ordering::Relaxed) {
                return Ok(None);
            }
        }
    }

    Ok(Some(LineIndex {
        mmap: Arc::new(mmap),
        offsets,
        size,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::sync::atomic::AtomicBool;
    use tempfile::NamedTempFile;

    fn write_temp(content: &[u8]) -> NamedTempFile {
        let mut f = NamedTempFile::new().unwrap();
        f.write_all(content).unwrap();
        f.flush().unwrap();
        f
    }

    #[test]
    fn empty_file_yields_empty_index() {
        let f = write_temp(b"");
        let cancel = AtomicBool::new(false);
        let index = build_line_index(f.path(), &cancel).unwrap().unwrap();
        assert_eq!(index.line_count(), 0);
        assert_eq!(index.size, 0);
    }

    #[test]
    fn offsets_point_at_line_starts() {
        let f = write_temp(b"alpha\nbeta\ngamma");
        let cancel = AtomicBool::new(false);
        let index = build_line_index(f.path(), &cancel).unwrap().unwrap();
        assert_eq!(index.offsets, vec![0, 6, 11]);
        assert_eq!(index.line_count(), 3);

        let (s, e) = index.line_span(1).unwrap();
        assert_eq!(&index.mmap[s as usize..e as usize], b"beta\n");
    }

    #[test]
    fn trailing_newline_does_not_add_empty_last_line() {
        let f = write_temp(b"only\n");
        let cancel = AtomicBool::new(false);
        let index = build_line_index(f.path(), &cancel).unwrap().unwrap();
        assert_eq!(index.offsets, vec![0]);
        assert_eq!(index.line_count(), 1);
    }

    #[test]
    fn missing_file_is_open_failure() {
        let cancel = AtomicBool::new(false);
        let result = build_line_index(Path::new("/nonexistent/path/nope.log"), &cancel);
        assert!(matches!(result, Err(EngineError::OpenFailure { .. })));
    }
}
