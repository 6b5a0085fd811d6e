//! Album data model and the storage backend seam.
//!
//! A backend enumerates captures per [`Storage`] location and reads their
//! bytes; the catalog never touches storage any other way except for the
//! directory scan that resolves a capture to its on-disk file name.

use crate::errors::GalleryError;
use async_trait::async_trait;
use bytes::Bytes;
use serde::Serialize;

pub mod directory;
pub mod layout;
#[cfg(test)]
pub mod memory;
pub mod titles;

pub use layout::{AlbumRoots, CaptureTime};

/// Physical storage location of a capture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Storage {
    Nand,
    Sd,
}

impl Storage {
    /// Enumeration order used when the catalog is built.
    pub const ALL: [Storage; 2] = [Storage::Nand, Storage::Sd];

    pub fn label(&self) -> &'static str {
        match self {
            Storage::Nand => "nand",
            Storage::Sd => "sd",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContentKind {
    Screenshot,
    Movie,
    ExtraScreenshot,
    ExtraMovie,
}

impl ContentKind {
    pub fn is_video(&self) -> bool {
        matches!(self, ContentKind::Movie | ContentKind::ExtraMovie)
    }
}

/// What a backend reports for one capture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AlbumFileId {
    pub storage: Storage,
    pub application_id: u64,
    pub captured_at: CaptureTime,
    pub kind: ContentKind,
}

impl AlbumFileId {
    /// `(storage, captured_at)` is unique across the album.
    #[cfg(test)]
    pub fn key(&self) -> (Storage, CaptureTime) {
        (self.storage, self.captured_at)
    }
}

#[async_trait]
pub trait AlbumBackend {
    async fn count(&self, storage: Storage) -> Result<u64, GalleryError>;

    /// Lists at most `capacity` entries, oldest capture first.
    async fn list(&self, storage: Storage, capacity: usize)
        -> Result<Vec<AlbumFileId>, GalleryError>;

    async fn file_size(&self, file: &AlbumFileId) -> Result<u64, GalleryError>;

    /// Single bounded read; fails when the thumbnail does not fit `limit`.
    async fn read_thumbnail(&self, file: &AlbumFileId, limit: usize)
        -> Result<Bytes, GalleryError>;

    /// Single bounded read of the whole capture; fails when it does not fit `limit`.
    async fn read_file(&self, file: &AlbumFileId, limit: usize) -> Result<Bytes, GalleryError>;

    async fn open_movie(
        &self,
        file: &AlbumFileId,
    ) -> Result<Box<dyn MovieStream + Send>, GalleryError>;
}

/// Backend handle for positional reads of a video. Dropping it releases the
/// handle.
#[async_trait]
pub trait MovieStream {
    /// Size as reported by the backend, unvalidated.
    fn size(&self) -> u64;

    /// Reads up to `buf.len()` bytes at `offset`. A short count means the
    /// backend had no more data there.
    async fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> Result<usize, GalleryError>;
}
