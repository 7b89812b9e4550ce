//! Backing-object resolution and the multi-object driver loop.
//!
//! A request's time bucket may be stored as several objects, resolved in
//! order by a [`Catalog`] and opened (already decompressed) by an
//! [`ObjectSource`]. [`DatasetIterator`] feeds them through one
//! [`FilterEngine`] and stops early once an object ends with an `end` record.
use crate::error::{Error, Result};
use crate::filter::{FilterEngine, Outcome};
use flate2::read::MultiGzDecoder;
use std::fs::File;
use std::io::{self, BufRead, BufReader, Read};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// A decompressed object stream with an explicit, fallible release.
pub trait ObjectStream: BufRead {
    /// Release the stream, inner resources first.
    fn close(self: Box<Self>) -> io::Result<()> {
        Ok(())
    }
}

pub trait Catalog {
    /// Ordered object keys for `(exchange, bucket)`; empty when nothing is stored.
    fn resolve(&self, exchange: &str, bucket: i64) -> io::Result<Vec<String>>;
}

pub trait ObjectSource {
    fn open(&self, key: &str) -> io::Result<Box<dyn ObjectStream + '_>>;
}

pub struct DatasetIterator<'s> {
    catalog: &'s dyn Catalog,
    source: &'s dyn ObjectSource,
}

impl<'s> DatasetIterator<'s> {
    pub fn new(catalog: &'s dyn Catalog, source: &'s dyn ObjectSource) -> Self {
        Self { catalog, source }
    }

    /// Run every object of `(exchange, bucket)` through `engine`. Returns
    /// whether anything was found, independent of whether any line matched.
    pub fn run(&self, exchange: &str, bucket: i64, engine: &mut FilterEngine<'_>) -> Result<bool> {
        let keys = self
            .catalog
            .resolve(exchange, bucket)
            .map_err(|source| Error::Resource { key: format!("{exchange}_{bucket}"), source })?;
        if keys.is_empty() {
            debug!(exchange, bucket, "no objects");
            return Ok(false);
        }
        for key in &keys {
            let mut stream = self
                .source
                .open(key)
                .map_err(|source| Error::Resource { key: key.clone(), source })?;
            let result = engine.run(key, &mut *stream);
            let outcome = match (result, stream.close()) {
                (Ok(outcome), Ok(())) => outcome,
                (Ok(_), Err(source)) => return Err(Error::Close { key: key.clone(), source, original: None }),
                (Err(e), Ok(())) => return Err(e),
                (Err(e), Err(source)) => {
                    warn!(key = key.as_str(), error = %source, "close failed after processing error");
                    return Err(Error::Close { key: key.clone(), source, original: Some(Box::new(e)) });
                }
            };
            if outcome == Outcome::Ended {
                debug!(key = key.as_str(), "end record, not reading further objects");
                break;
            }
        }
        Ok(true)
    }
}

/// Capture objects stored as gzip files in one directory.
///
/// The first object of a bucket is `<exchange>_<bucket>.gz`; continuation
/// parts follow as `<exchange>_<bucket>.1.gz`, `<exchange>_<bucket>.2.gz`, ...
/// up to the first missing part.
#[derive(Debug, Clone)]
pub struct DirectoryStore {
    root: PathBuf,
}

impl DirectoryStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path { &self.root }

    pub fn object_key(exchange: &str, bucket: i64, part: u32) -> String {
        if part == 0 {
            format!("{exchange}_{bucket}.gz")
        } else {
            format!("{exchange}_{bucket}.{part}.gz")
        }
    }
}

impl Catalog for DirectoryStore {
    fn resolve(&self, exchange: &str, bucket: i64) -> io::Result<Vec<String>> {
        let mut keys = Vec::new();
        for part in 0.. {
            let key = Self::object_key(exchange, bucket, part);
            if !self.root.join(&key).try_exists()? {
                break;
            }
            keys.push(key);
        }
        Ok(keys)
    }
}

impl ObjectSource for DirectoryStore {
    fn open(&self, key: &str) -> io::Result<Box<dyn ObjectStream + '_>> {
        let file = File::open(self.root.join(key))?;
        Ok(Box::new(GzipStream { reader: BufReader::with_capacity(1 << 20, MultiGzDecoder::new(file)) }))
    }
}

/// Gzip-decoded file, buffered for line reads. Every concatenated member is
/// decoded; bytes after a member that do not start a new one are a read error.
pub struct GzipStream<R: Read> {
    reader: BufReader<MultiGzDecoder<R>>,
}

impl<R: Read> GzipStream<R> {
    pub fn new(inner: R) -> Self {
        Self { reader: BufReader::new(MultiGzDecoder::new(inner)) }
    }
}

impl<R: Read> Read for GzipStream<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.reader.read(buf)
    }
}

impl<R: Read> BufRead for GzipStream<R> {
    fn fill_buf(&mut self) -> io::Result<&[u8]> {
        self.reader.fill_buf()
    }

    fn consume(&mut self, amt: usize) {
        self.reader.consume(amt)
    }
}

// Dropping a read-only file cannot fail, so the default close applies.
impl<R: Read> ObjectStream for GzipStream<R> {}
