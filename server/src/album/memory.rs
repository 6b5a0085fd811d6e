//! In-memory album backend for tests.

use crate::album::{AlbumBackend, AlbumFileId, CaptureTime, ContentKind, MovieStream, Storage};
use crate::errors::GalleryError;
use async_trait::async_trait;
use bytes::Bytes;
use std::collections::HashMap;

#[derive(Debug, Default)]
pub struct MemoryBackend {
    files: HashMap<Storage, Vec<AlbumFileId>>,
    unavailable: Vec<Storage>,
    contents: HashMap<(Storage, CaptureTime), Bytes>,
    thumbnails: HashMap<(Storage, CaptureTime), Bytes>,
    /// Overrides the size a movie stream reports.
    reported_size: Option<u64>,
    /// Movie block reads at or past this offset fail.
    fail_reads_from: Option<u64>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        MemoryBackend::default()
    }

    /// Adds a capture; entries must be added oldest first per storage.
    pub fn with_file(mut self, file: AlbumFileId, content: impl Into<Bytes>) -> Self {
        self.contents.insert(file.key(), content.into());
        self.files.entry(file.storage).or_default().push(file);
        self
    }

    pub fn with_thumbnail(mut self, file: &AlbumFileId, thumbnail: impl Into<Bytes>) -> Self {
        self.thumbnails.insert(file.key(), thumbnail.into());
        self
    }

    pub fn with_unavailable(mut self, storage: Storage) -> Self {
        self.unavailable.push(storage);
        self
    }

    pub fn with_reported_size(mut self, size: u64) -> Self {
        self.reported_size = Some(size);
        self
    }

    pub fn with_failing_reads_from(mut self, offset: u64) -> Self {
        self.fail_reads_from = Some(offset);
        self
    }

    fn content(&self, file: &AlbumFileId) -> Result<Bytes, GalleryError> {
        self.contents
            .get(&file.key())
            .cloned()
            .ok_or_else(|| GalleryError::FileNotResolved(file.captured_at.file_prefix()))
    }
}

pub fn file(storage: Storage, captured_at: CaptureTime, kind: ContentKind) -> AlbumFileId {
    AlbumFileId {
        storage,
        application_id: 0x0100000000010000,
        captured_at,
        kind,
    }
}

#[async_trait]
impl AlbumBackend for MemoryBackend {
    async fn count(&self, storage: Storage) -> Result<u64, GalleryError> {
        if self.unavailable.contains(&storage) {
            return Err(GalleryError::BackendUnavailable(storage.label().to_string()));
        }
        Ok(self.files.get(&storage).map_or(0, |files| files.len() as u64))
    }

    async fn list(
        &self,
        storage: Storage,
        capacity: usize,
    ) -> Result<Vec<AlbumFileId>, GalleryError> {
        if self.unavailable.contains(&storage) {
            return Err(GalleryError::BackendUnavailable(storage.label().to_string()));
        }
        let files = self.files.get(&storage).cloned().unwrap_or_default();
        Ok(files.into_iter().take(capacity).collect())
    }

    async fn file_size(&self, file: &AlbumFileId) -> Result<u64, GalleryError> {
        Ok(self.content(file)?.len() as u64)
    }

    async fn read_thumbnail(
        &self,
        file: &AlbumFileId,
        limit: usize,
    ) -> Result<Bytes, GalleryError> {
        let thumbnail = self
            .thumbnails
            .get(&file.key())
            .cloned()
            .ok_or_else(|| GalleryError::StorageError("no thumbnail".to_string()))?;
        if thumbnail.len() > limit {
            return Err(GalleryError::StorageError("thumbnail too large".to_string()));
        }
        Ok(thumbnail)
    }

    async fn read_file(&self, file: &AlbumFileId, limit: usize) -> Result<Bytes, GalleryError> {
        let content = self.content(file)?;
        if content.len() > limit {
            return Err(GalleryError::StorageError("file too large".to_string()));
        }
        Ok(content)
    }

    async fn open_movie(
        &self,
        file: &AlbumFileId,
    ) -> Result<Box<dyn MovieStream + Send>, GalleryError> {
        let data = self.content(file)?;
        Ok(Box::new(MemoryMovieStream {
            size: self.reported_size.unwrap_or(data.len() as u64),
            data,
            fail_reads_from: self.fail_reads_from,
        }))
    }
}

pub struct MemoryMovieStream {
    pub data: Bytes,
    pub size: u64,
    pub fail_reads_from: Option<u64>,
}

impl MemoryMovieStream {
    pub fn new(data: impl Into<Bytes>) -> Self {
        let data = data.into();
        MemoryMovieStream {
            size: data.len() as u64,
            data,
            fail_reads_from: None,
        }
    }
}

#[async_trait]
impl MovieStream for MemoryMovieStream {
    fn size(&self) -> u64 {
        self.size
    }

    async fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> Result<usize, GalleryError> {
        if self.fail_reads_from.is_some_and(|from| offset >= from) {
            return Err(GalleryError::StreamReadFailed(format!("offset {}", offset)));
        }

        let start = (offset as usize).min(self.data.len());
        let end = (start + buf.len()).min(self.data.len());
        buf[..end - start].copy_from_slice(&self.data[start..end]);
        Ok(end - start)
    }
}
