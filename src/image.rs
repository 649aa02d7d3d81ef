//! LC-3 object image format.
//!
//! An image is a stream of big-endian 16-bit words:
//! - word 0: origin address
//! - words 1..N: program/data, stored verbatim from the origin upwards
//!
//! Words that would run past `0xFFFF` are dropped, as is a trailing odd byte.

use crate::console::Console;
use crate::cpu::memory::{Memory, MEMORY_SIZE};
use std::io::Read;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// A parsed object image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Image {
    /// Load address of the first word.
    pub origin: u16,
    /// Program and data words.
    pub words: Vec<u16>,
}

impl Image {
    pub fn new(origin: u16, words: Vec<u16>) -> Self {
        Self { origin, words }
    }

    /// Parse an image from a byte stream.
    pub fn read_from<R: Read>(mut reader: R) -> Result<Self, ImageError> {
        let mut bytes = Vec::new();
        reader.read_to_end(&mut bytes)?;
        Self::from_bytes(&bytes)
    }

    /// Parse an image from a file on disk.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, ImageError> {
        let path = path.as_ref();
        let file = std::fs::File::open(path).map_err(|source| ImageError::Open {
            path: path.to_path_buf(),
            source,
        })?;
        Self::read_from(std::io::BufReader::new(file))
    }

    /// Parse an image from raw bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ImageError> {
        if bytes.len() < 2 {
            return Err(ImageError::MissingOrigin);
        }

        let origin = u16::from_be_bytes([bytes[0], bytes[1]]);
        let body = &bytes[2..];
        if body.len() % 2 != 0 {
            tracing::warn!(origin, "image has a trailing odd byte; ignoring it");
        }

        let capacity = MEMORY_SIZE - usize::from(origin);
        let available = body.len() / 2;
        if available > capacity {
            tracing::warn!(
                origin,
                words = available,
                capacity,
                "image runs past the top of memory; truncating"
            );
        }

        let words = body
            .chunks_exact(2)
            .take(capacity)
            .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
            .collect();

        Ok(Self { origin, words })
    }

    /// Number of program/data words.
    pub fn len(&self) -> usize {
        self.words.len()
    }

    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }

    /// Copy the image into memory at its origin. Returns the words stored.
    pub fn load_into<C: Console>(&self, mem: &mut Memory<C>) -> usize {
        let stored = mem.load(self.origin, &self.words);
        tracing::info!(
            origin = %format_args!("{:#06x}", self.origin),
            words = stored,
            "image loaded"
        );
        stored
    }
}

/// Errors that can occur while reading an image.
#[derive(Debug, Error)]
pub enum ImageError {
    #[error("cannot open image {}: {source}", path.display())]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("image is missing its origin word")]
    MissingOrigin,
}
