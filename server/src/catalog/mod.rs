//! The media catalog: an immutable, newest-first index of every capture
//! across the storage backends, built once at startup.

use crate::album::layout::find_capture_file;
use crate::album::titles::{resolve_title, TitleDirectory};
use crate::album::{AlbumBackend, AlbumFileId, AlbumRoots, Storage};
use crate::errors::GalleryError;
use crate::stream::MediaStreamReader;
use bytes::Bytes;
use std::sync::Arc;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::OnceCell;
use tokio::time::Instant;
use tracing::{debug, error, info};

pub mod page;

pub use page::{CatalogPage, CatalogStats, ContentType, ResolvedEntry, Theme};

pub const DEFAULT_PAGE_SIZE: usize = 21;

/// Upper bound of a thumbnail read.
pub const THUMBNAIL_BUFFER_SIZE: usize = 64 * 1024;

/// Upper bound of a single-call screenshot read.
pub const SCREENSHOT_BUFFER_SIZE: usize = 512 * 1024;

/// One capture at a fixed position of the catalog.
#[derive(Debug)]
pub struct MediaEntry {
    pub id: usize,
    pub file: AlbumFileId,
    file_size: OnceCell<u64>,
}

impl MediaEntry {
    fn new(id: usize, file: AlbumFileId) -> Self {
        MediaEntry {
            id,
            file,
            file_size: OnceCell::new(),
        }
    }

    pub fn content_type(&self) -> ContentType {
        if self.file.kind.is_video() {
            ContentType::Video
        } else {
            ContentType::Screenshot
        }
    }

    /// Size in bytes, once it has been queried successfully.
    #[cfg(test)]
    pub fn file_size(&self) -> Option<u64> {
        self.file_size.get().copied()
    }
}

/// Full content of one capture, ready to be written out.
pub enum Content {
    Screenshot(Bytes),
    Movie(MediaStreamReader),
}

impl Content {
    /// Writes everything to `out`; a movie is pulled block by block.
    pub async fn copy_to<W>(self, out: &mut W) -> Result<u64, GalleryError>
    where
        W: AsyncWrite + Unpin + ?Sized,
    {
        match self {
            Content::Screenshot(data) => {
                out.write_all(&data)
                    .await
                    .map_err(|e| GalleryError::NetworkError(format!("write file: {}", e)))?;
                Ok(data.len() as u64)
            }
            Content::Movie(mut reader) => reader.copy_to(out).await,
        }
    }
}

#[derive(Debug, Clone)]
pub struct CatalogOptions {
    pub page_size: usize,
    pub theme: Option<Theme>,
}

impl Default for CatalogOptions {
    fn default() -> Self {
        CatalogOptions {
            page_size: DEFAULT_PAGE_SIZE,
            theme: None,
        }
    }
}

pub struct MediaCatalog {
    backend: Arc<dyn AlbumBackend + Send + Sync>,
    titles: Arc<dyn TitleDirectory + Send + Sync>,
    roots: AlbumRoots,
    options: CatalogOptions,
    entries: Vec<MediaEntry>,
    stats: CatalogStats,
}

impl MediaCatalog {
    /// Builds the catalog from every storage location. A location that fails
    /// to enumerate is logged and contributes nothing.
    pub async fn build(
        backend: Arc<dyn AlbumBackend + Send + Sync>,
        titles: Arc<dyn TitleDirectory + Send + Sync>,
        roots: AlbumRoots,
        mut options: CatalogOptions,
    ) -> Self {
        let start = Instant::now();
        let mut files = Vec::new();
        for storage in Storage::ALL {
            match list_storage(backend.as_ref(), storage).await {
                Ok(listed) => {
                    debug!("catalog: {} entries on {}", listed.len(), storage.label());
                    files.extend(listed);
                }
                Err(e) => error!("catalog: {}: {}", storage.label(), e),
            }
        }

        // Stable, so a single backend's listing keeps its own order; the
        // reverse then puts the newest capture at index 0.
        files.sort_by_key(|file| file.captured_at);
        files.reverse();

        let entries: Vec<MediaEntry> = files
            .into_iter()
            .enumerate()
            .map(|(id, file)| MediaEntry::new(id, file))
            .collect();

        let num_videos = entries.iter().filter(|e| e.file.kind.is_video()).count();
        let stats = CatalogStats {
            index_time: start.elapsed().as_secs_f64(),
            num_screenshots: entries.len() - num_videos,
            num_videos,
        };
        info!("catalog: indexed in {:.3}s", stats.index_time);

        options.page_size = options.page_size.max(1);
        MediaCatalog {
            backend,
            titles,
            roots,
            options,
            entries,
            stats,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[cfg(test)]
    pub fn entries(&self) -> &[MediaEntry] {
        &self.entries
    }

    pub fn stats(&self) -> CatalogStats {
        self.stats
    }

    pub fn page_count(&self) -> usize {
        self.entries.len().div_ceil(self.options.page_size)
    }

    pub fn entry(&self, id: i64) -> Result<&MediaEntry, GalleryError> {
        usize::try_from(id)
            .ok()
            .and_then(|index| self.entries.get(index))
            .ok_or(GalleryError::InvalidId(id))
    }

    pub fn title_name(&self, application_id: u64) -> String {
        resolve_title(self.titles.as_ref(), application_id)
    }

    /// Download name: `<title>_<YYYYMMDD>_<HHMMSS>_<ii>.<jpg|mp4>` with each
    /// whitespace run of the title replaced by `_`.
    pub fn download_name(&self, entry: &MediaEntry) -> String {
        let title = underscore_whitespace(&self.title_name(entry.file.application_id));
        let time = &entry.file.captured_at;
        format!(
            "{}_{}_{}_{:02}.{}",
            title,
            time.date_stamp(),
            time.time_stamp(),
            time.sequence,
            entry.content_type().extension()
        )
    }

    /// One page of the gallery; pages are 1-based. Entries whose file cannot
    /// be found on disk are left out of the page without an error.
    pub async fn page(&self, page: i64) -> CatalogPage {
        let mut resolved = Vec::new();
        if page >= 1 {
            let size = self.options.page_size as u64;
            let min = (page as u64 - 1).saturating_mul(size);
            let max = (page as u64).saturating_mul(size).min(self.entries.len() as u64);
            for index in min..max {
                if let Some(entry) = self.resolve(&self.entries[index as usize]).await {
                    resolved.push(entry);
                }
            }
        }

        CatalogPage {
            page_count: self.page_count(),
            theme: self.options.theme,
            stats: self.stats,
            entries: resolved,
        }
    }

    /// Projects an entry for the gallery, or `None` when no file in its day
    /// directory carries its timestamp.
    pub async fn resolve(&self, entry: &MediaEntry) -> Option<ResolvedEntry> {
        let time = &entry.file.captured_at;
        let dir = self.roots.day_dir(entry.file.storage, time);
        let file_name = match find_capture_file(&dir, time).await {
            Ok(Some(name)) => name,
            Ok(None) => {
                debug!(
                    "catalog: skipping entry {}: {}",
                    entry.id,
                    GalleryError::FileNotResolved(format!(
                        "{} in {}",
                        time.file_prefix(),
                        dir.display()
                    ))
                );
                return None;
            }
            Err(e) => {
                error!("catalog: scan {}: {}", dir.display(), e);
                return None;
            }
        };

        Some(ResolvedEntry {
            id: entry.id,
            stored_at: entry.file.storage,
            title_name: self.title_name(entry.file.application_id),
            file_size: self.file_size(entry).await,
            taken_at: time.unix_timestamp().unwrap_or_default(),
            content_type: entry.content_type(),
            download_name: self.download_name(entry),
            path: time.web_path(&file_name),
        })
    }

    async fn file_size(&self, entry: &MediaEntry) -> Option<u64> {
        let size = entry
            .file_size
            .get_or_try_init(|| self.backend.file_size(&entry.file))
            .await;
        match size {
            Ok(size) => Some(*size),
            Err(e) => {
                debug!("catalog: size of entry {}: {}", entry.id, e);
                None
            }
        }
    }

    pub async fn thumbnail(&self, id: i64) -> Result<Bytes, GalleryError> {
        let entry = self.entry(id)?;
        self.backend
            .read_thumbnail(&entry.file, THUMBNAIL_BUFFER_SIZE)
            .await
    }

    /// Screenshots are read in one bounded call; videos are opened as a
    /// stream to be pulled block by block.
    pub async fn content(&self, id: i64) -> Result<Content, GalleryError> {
        let entry = self.entry(id)?;
        if entry.file.kind.is_video() {
            let stream = self.backend.open_movie(&entry.file).await?;
            let reader = MediaStreamReader::new(stream);
            debug!("catalog: streaming entry {} ({} bytes)", id, reader.size());
            Ok(Content::Movie(reader))
        } else {
            let data = self
                .backend
                .read_file(&entry.file, SCREENSHOT_BUFFER_SIZE)
                .await?;
            Ok(Content::Screenshot(data))
        }
    }
}

async fn list_storage(
    backend: &(dyn AlbumBackend + Send + Sync),
    storage: Storage,
) -> Result<Vec<AlbumFileId>, GalleryError> {
    let count = backend.count(storage).await?;
    let capacity = usize::try_from(count)
        .map_err(|_| GalleryError::BackendUnavailable(format!("implausible count {}", count)))?;
    let mut files = Vec::with_capacity(capacity);
    files.extend(backend.list(storage, capacity).await?);
    Ok(files)
}

fn underscore_whitespace(title: &str) -> String {
    let mut out = String::with_capacity(title.len());
    let mut in_run = false;
    for c in title.chars() {
        if c.is_whitespace() {
            if !in_run {
                out.push('_');
            }
            in_run = true;
        } else {
            out.push(c);
            in_run = false;
        }
    }
    out
}
