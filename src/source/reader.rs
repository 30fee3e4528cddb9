//! Byte-counted file reading.
//!
//! The counter sits between the raw payload and the decompressor, so the
//! count reflects compressed bytes consumed: the on-the-wire work done,
//! not the logical row count.

use std::io::{Cursor, Read};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use bytes::Bytes;

use crate::source::compression::decompressing_reader;
use crate::spec::Compression;

/// A cloneable handle onto a byte counter's running total.
#[derive(Debug, Clone, Default)]
pub struct ReadCounter(Arc<AtomicU64>);

impl ReadCounter {
    pub fn get(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }
}

/// An `io::Read` wrapper counting every byte read through it.
pub struct ByteCounter<R> {
    inner: R,
    count: ReadCounter,
}

impl<R> ByteCounter<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            count: ReadCounter::default(),
        }
    }

    pub fn counter(&self) -> ReadCounter {
        self.count.clone()
    }
}

impl<R: Read> Read for ByteCounter<R> {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.count.0.fetch_add(n as u64, Ordering::Relaxed);
        Ok(n)
    }
}

/// A decompressing reader over one input file, tracking the fraction of
/// compressed bytes consumed.
pub struct FileReader {
    reader: Box<dyn Read + Send>,
    total: u64,
    count: ReadCounter,
}

impl FileReader {
    /// Wrap a raw compressed payload. `total` is the file's probed size,
    /// or zero when unknown.
    pub fn new(raw: Bytes, total: u64, name: &str, hint: Compression) -> Self {
        let counter = ByteCounter::new(Cursor::new(raw));
        let count = counter.counter();
        let reader = decompressing_reader(Box::new(counter), name, hint);
        Self {
            reader,
            total,
            count,
        }
    }

    /// Compressed bytes consumed so far.
    pub fn bytes_read(&self) -> u64 {
        self.count.get()
    }

    /// Handle onto the compressed-byte count.
    pub fn counter(&self) -> ReadCounter {
        self.count.clone()
    }

    /// Fraction of the file consumed, or 0.0 when the size is unknown.
    pub fn read_fraction(&self) -> f32 {
        if self.total == 0 {
            return 0.0;
        }
        self.count.get() as f32 / self.total as f32
    }
}

impl Read for FileReader {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        self.reader.read(buf)
    }
}
