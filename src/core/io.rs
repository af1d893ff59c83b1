//! High-performance I/O abstraction layer
//!
//! Provides optimized file reading with configurable buffer sizes,
//! memory mapping for range-restricted readers, and the byte-sink
//! abstraction haplotype streams write through.

use crossbeam_channel::{bounded, Receiver, Sender};
use flate2::write::GzEncoder;
use flate2::Compression;
use memmap2::Mmap;
use std::fs::{File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::Path;
use std::sync::Arc;

/// Default buffer size for BufReader (128KB)
pub const DEFAULT_BUFFER_SIZE: usize = 128 * 1024;

/// Large buffer size for high-throughput I/O (1MB)
pub const LARGE_BUFFER_SIZE: usize = 1024 * 1024;

/// A memory-mapped file whose byte ranges can be shared across reader tasks
#[derive(Clone)]
pub struct MappedFile {
    map: Arc<Mmap>,
}

impl MappedFile {
    /// Map a file read-only
    pub fn open<P: AsRef<Path>>(path: P) -> io::Result<Self> {
        let file = File::open(path.as_ref())?;
        // SAFETY: We assume the file won't be modified while mapped
        let map = unsafe { Mmap::map(&file)? };
        Ok(Self { map: Arc::new(map) })
    }

    /// The whole file content
    pub fn as_bytes(&self) -> &[u8] {
        &self.map
    }

    /// File size in bytes
    pub fn len(&self) -> usize {
        self.map.len()
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}

/// Throttle for concurrently open output file descriptors.
///
/// A bounded channel pre-filled with tokens; opening a sink takes one,
/// closing the sink returns it.
#[derive(Clone)]
pub struct FileLimiter {
    slots: Receiver<()>,
    returns: Sender<()>,
}

/// A held open-file slot; returned to the limiter on drop
pub struct FileSlot {
    returns: Sender<()>,
}

impl FileLimiter {
    /// Create a limiter with the given number of slots
    pub fn new(limit: usize) -> Self {
        let (tx, rx) = bounded(limit.max(1));
        for _ in 0..limit.max(1) {
            tx.send(()).expect("fresh channel cannot be full");
        }
        Self {
            slots: rx,
            returns: tx,
        }
    }

    /// Block until an open-file slot is available
    pub fn acquire(&self) -> FileSlot {
        self.slots.recv().expect("limiter senders never all drop");
        FileSlot {
            returns: self.returns.clone(),
        }
    }
}

impl Drop for FileSlot {
    fn drop(&mut self) {
        // The paired receiver may already be gone during teardown.
        let _ = self.returns.send(());
    }
}

/// Abstract byte sink behind every haplotype stream
pub enum ByteSink {
    /// Plain buffered file output
    Plain(BufWriter<File>, Option<FileSlot>),
    /// Gzip-compressed file output
    Gzip(GzEncoder<BufWriter<File>>, Option<FileSlot>),
    /// In-memory output, used by tests
    Memory(Vec<u8>),
    /// Discards everything; keeps inactive haplotypes cheap during chunked
    /// output rounds
    Null,
}

impl ByteSink {
    /// Create a file-backed sink.
    ///
    /// With `overwrite` unset the call fails if the target already exists.
    pub fn create<P: AsRef<Path>>(
        path: P,
        overwrite: bool,
        compress: bool,
        slot: Option<FileSlot>,
    ) -> io::Result<Self> {
        let file = if overwrite {
            File::create(path.as_ref())?
        } else {
            OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(path.as_ref())?
        };
        let writer = BufWriter::with_capacity(DEFAULT_BUFFER_SIZE, file);
        if compress {
            Ok(ByteSink::Gzip(
                GzEncoder::new(writer, Compression::default()),
                slot,
            ))
        } else {
            Ok(ByteSink::Plain(writer, slot))
        }
    }

    /// Create an in-memory sink
    pub fn memory() -> Self {
        ByteSink::Memory(Vec::new())
    }

    /// Create a sink that discards everything
    pub fn null() -> Self {
        ByteSink::Null
    }

    /// Flush all buffered bytes and release the file slot
    pub fn finish(self) -> io::Result<()> {
        match self {
            ByteSink::Plain(mut w, slot) => {
                w.flush()?;
                drop(slot);
                Ok(())
            }
            ByteSink::Gzip(enc, slot) => {
                let mut inner = enc.finish()?;
                inner.flush()?;
                drop(slot);
                Ok(())
            }
            ByteSink::Memory(_) | ByteSink::Null => Ok(()),
        }
    }

    /// Take the accumulated bytes of a memory sink
    pub fn into_memory(self) -> Option<Vec<u8>> {
        match self {
            ByteSink::Memory(buf) => Some(buf),
            _ => None,
        }
    }
}

impl Write for ByteSink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            ByteSink::Plain(w, _) => w.write(buf),
            ByteSink::Gzip(w, _) => w.write(buf),
            ByteSink::Memory(v) => {
                v.extend_from_slice(buf);
                Ok(buf.len())
            }
            ByteSink::Null => Ok(buf.len()),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            ByteSink::Plain(w, _) => w.flush(),
            ByteSink::Gzip(w, _) => w.flush(),
            ByteSink::Memory(_) | ByteSink::Null => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;
    use tempfile::NamedTempFile;

    #[test]
    fn test_mapped_file() -> io::Result<()> {
        let mut temp = NamedTempFile::new()?;
        temp.write_all(b"line1\nline2\n")?;
        temp.flush()?;

        let map = MappedFile::open(temp.path())?;
        assert_eq!(map.len(), 12);
        assert_eq!(map.as_bytes(), b"line1\nline2\n");
        Ok(())
    }

    #[test]
    fn test_memory_sink() {
        let mut sink = ByteSink::memory();
        sink.write_all(b"ACGT").unwrap();
        assert_eq!(sink.into_memory().unwrap(), b"ACGT");
    }

    #[test]
    fn test_plain_sink_roundtrip() -> io::Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("out");

        let mut sink = ByteSink::create(&path, true, false, None)?;
        sink.write_all(b"ACGT")?;
        sink.finish()?;

        assert_eq!(std::fs::read(&path)?, b"ACGT");
        Ok(())
    }

    #[test]
    fn test_gzip_sink_roundtrip() -> io::Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("out.gz");

        let mut sink = ByteSink::create(&path, true, true, None)?;
        sink.write_all(b"ACGTACGT")?;
        sink.finish()?;

        let file = File::open(&path)?;
        let mut decoder = flate2::read::GzDecoder::new(file);
        let mut content = Vec::new();
        decoder.read_to_end(&mut content)?;
        assert_eq!(content, b"ACGTACGT");
        Ok(())
    }

    #[test]
    fn test_no_overwrite_fails_on_existing() -> io::Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("out");
        std::fs::write(&path, b"old")?;

        assert!(ByteSink::create(&path, false, false, None).is_err());
        assert!(ByteSink::create(&path, true, false, None).is_ok());
        Ok(())
    }

    #[test]
    fn test_file_limiter_recycles_slots() {
        let limiter = FileLimiter::new(2);
        let a = limiter.acquire();
        let _b = limiter.acquire();
        drop(a);
        // A third acquire succeeds because the first slot was returned.
        let _c = limiter.acquire();
    }
}
