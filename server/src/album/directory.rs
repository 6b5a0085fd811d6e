use crate::album::layout::{find_capture_file, TIMESTAMP_PREFIX_LEN};
use crate::album::{
    AlbumBackend, AlbumFileId, AlbumRoots, CaptureTime, ContentKind, MovieStream, Storage,
};
use crate::errors::GalleryError;
use async_trait::async_trait;
use bytes::Bytes;
use exif::{In, Tag};
use std::io::{Cursor, SeekFrom};
use std::path::{Path, PathBuf};
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tokio::sync::OnceCell;
use tracing::{debug, warn};
use walkdir::WalkDir;

/// Directory holding `<YYYY>/<MM>/<DD>/<file stem>.jpg` thumbnails, below
/// each album root.
pub const THUMBNAIL_DIR: &str = "thumbnails";

/// Screenshots larger than this are not searched for an embedded thumbnail.
const EXIF_SOURCE_LIMIT: usize = 4 * 1024 * 1024;

/// Album backend over plain directories laid out as
/// `<root>/<YYYY>/<MM>/<DD>/<YYYYMMDDHHMMSSii>-<suffix>.<jpg|mp4>`.
///
/// Each root is walked once; `count` and `list` share the result.
#[derive(Debug)]
pub struct DirectoryBackend {
    roots: AlbumRoots,
    nand_files: OnceCell<Vec<AlbumFileId>>,
    sd_files: OnceCell<Vec<AlbumFileId>>,
}

impl DirectoryBackend {
    pub fn new(roots: AlbumRoots) -> Self {
        DirectoryBackend {
            roots,
            nand_files: OnceCell::new(),
            sd_files: OnceCell::new(),
        }
    }

    async fn enumerate(&self, storage: Storage) -> Result<&[AlbumFileId], GalleryError> {
        let cell = match storage {
            Storage::Nand => &self.nand_files,
            Storage::Sd => &self.sd_files,
        };
        let files = cell.get_or_try_init(|| self.walk(storage)).await?;
        Ok(files.as_slice())
    }

    async fn walk(&self, storage: Storage) -> Result<Vec<AlbumFileId>, GalleryError> {
        let root = self.roots.root(storage).to_path_buf();
        if !root.is_dir() {
            return Err(GalleryError::BackendUnavailable(format!(
                "{} album root {} is not a directory",
                storage.label(),
                root.display()
            )));
        }

        let files = tokio::task::spawn_blocking(move || scan_root(&root, storage))
            .await
            .map_err(|e| GalleryError::BackendUnavailable(format!("album scan: {}", e)))?;
        debug!("album: {} captures on {}", files.len(), storage.label());
        Ok(files)
    }

    async fn locate(&self, file: &AlbumFileId) -> Result<PathBuf, GalleryError> {
        let dir = self.roots.day_dir(file.storage, &file.captured_at);
        let name = find_capture_file(&dir, &file.captured_at)
            .await
            .map_err(|e| GalleryError::StorageError(format!("{}: {}", dir.display(), e)))?;
        match name {
            Some(name) => Ok(dir.join(name)),
            None => Err(GalleryError::FileNotResolved(format!(
                "{} in {}",
                file.captured_at.file_prefix(),
                dir.display()
            ))),
        }
    }
}

#[async_trait]
impl AlbumBackend for DirectoryBackend {
    async fn count(&self, storage: Storage) -> Result<u64, GalleryError> {
        Ok(self.enumerate(storage).await?.len() as u64)
    }

    async fn list(
        &self,
        storage: Storage,
        capacity: usize,
    ) -> Result<Vec<AlbumFileId>, GalleryError> {
        let files = self.enumerate(storage).await?;
        Ok(files.iter().take(capacity).copied().collect())
    }

    async fn file_size(&self, file: &AlbumFileId) -> Result<u64, GalleryError> {
        let path = self.locate(file).await?;
        let meta = tokio::fs::metadata(&path)
            .await
            .map_err(|e| GalleryError::StorageError(format!("{}: {}", path.display(), e)))?;
        Ok(meta.len())
    }

    async fn read_thumbnail(
        &self,
        file: &AlbumFileId,
        limit: usize,
    ) -> Result<Bytes, GalleryError> {
        let path = self.locate(file).await?;
        let sidecar = thumbnail_path(self.roots.root(file.storage), &file.captured_at, &path);
        if let Some(sidecar) = sidecar.filter(|p| p.is_file()) {
            return read_bounded(&sidecar, limit).await;
        }

        if file.kind.is_video() {
            return Err(GalleryError::StorageError(format!(
                "no thumbnail for {}",
                path.display()
            )));
        }

        let data = read_bounded(&path, EXIF_SOURCE_LIMIT).await?;
        match exif_thumbnail(&data) {
            Some(thumbnail) if thumbnail.len() <= limit => Ok(thumbnail),
            _ if data.len() <= limit => Ok(data),
            _ => Err(GalleryError::StorageError(format!(
                "{} has no embedded thumbnail and is {} bytes, buffer holds {}",
                path.display(),
                data.len(),
                limit
            ))),
        }
    }

    async fn read_file(&self, file: &AlbumFileId, limit: usize) -> Result<Bytes, GalleryError> {
        let path = self.locate(file).await?;
        read_bounded(&path, limit).await
    }

    async fn open_movie(
        &self,
        file: &AlbumFileId,
    ) -> Result<Box<dyn MovieStream + Send>, GalleryError> {
        let path = self.locate(file).await?;
        let handle = tokio::fs::File::open(&path)
            .await
            .map_err(|e| GalleryError::StorageError(format!("{}: {}", path.display(), e)))?;
        let size = handle
            .metadata()
            .await
            .map_err(|e| GalleryError::StorageError(format!("{}: {}", path.display(), e)))?
            .len();

        Ok(Box::new(FileMovieStream { handle, size }))
    }
}

struct FileMovieStream {
    handle: tokio::fs::File,
    size: u64,
}

#[async_trait]
impl MovieStream for FileMovieStream {
    fn size(&self) -> u64 {
        self.size
    }

    async fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> Result<usize, GalleryError> {
        self.handle
            .seek(SeekFrom::Start(offset))
            .await
            .map_err(|e| GalleryError::StreamReadFailed(format!("seek {}: {}", offset, e)))?;

        let mut filled = 0;
        while filled < buf.len() {
            let n = self
                .handle
                .read(&mut buf[filled..])
                .await
                .map_err(|e| GalleryError::StreamReadFailed(format!("read {}: {}", offset, e)))?;
            if n == 0 {
                break;
            }
            filled += n;
        }
        Ok(filled)
    }
}

/// Parses a capture file name into its timestamp, application id and kind.
///
/// The suffix after the timestamp starts with the hex application id when
/// the producer knows it; a trailing `X` marks the Extra variants.
pub fn parse_file_name(name: &str) -> Option<(CaptureTime, u64, ContentKind)> {
    let (stem, ext) = name.rsplit_once('.')?;
    let video = match ext.to_ascii_lowercase().as_str() {
        "jpg" | "jpeg" => false,
        "mp4" => true,
        _ => return None,
    };

    let captured_at = CaptureTime::parse_prefix(stem)?;
    let suffix = &stem[TIMESTAMP_PREFIX_LEN..];
    let suffix = suffix.strip_prefix('-').unwrap_or(suffix);
    let extra = suffix.ends_with('X');
    let application_id = suffix
        .get(..16)
        .and_then(|hex| u64::from_str_radix(hex, 16).ok())
        .unwrap_or(0);

    let kind = match (video, extra) {
        (false, false) => ContentKind::Screenshot,
        (false, true) => ContentKind::ExtraScreenshot,
        (true, false) => ContentKind::Movie,
        (true, true) => ContentKind::ExtraMovie,
    };
    Some((captured_at, application_id, kind))
}

fn scan_root(root: &Path, storage: Storage) -> Vec<AlbumFileId> {
    let mut files: Vec<AlbumFileId> = WalkDir::new(root)
        .min_depth(4)
        .max_depth(4)
        .into_iter()
        .filter_map(|e| match e {
            Ok(entry) => Some(entry),
            Err(err) => {
                warn!("album: walk {}: {}", root.display(), err);
                None
            }
        })
        .filter(|entry| entry.file_type().is_file())
        .filter_map(|entry| {
            let name = entry.file_name().to_str()?;
            let (captured_at, application_id, kind) = parse_file_name(name)?;
            Some(AlbumFileId {
                storage,
                application_id,
                captured_at,
                kind,
            })
        })
        .collect();

    files.sort_by_key(|file| file.captured_at);
    files.dedup_by_key(|file| file.captured_at);
    files
}

/// The JPEG thumbnail stored in the EXIF IFD1 of a screenshot, if any.
fn exif_thumbnail(jpeg: &[u8]) -> Option<Bytes> {
    let exif = exif::Reader::new()
        .read_from_container(&mut Cursor::new(jpeg))
        .ok()?;
    let offset = exif
        .get_field(Tag::JPEGInterchangeFormat, In::THUMBNAIL)?
        .value
        .get_uint(0)? as usize;
    let len = exif
        .get_field(Tag::JPEGInterchangeFormatLength, In::THUMBNAIL)?
        .value
        .get_uint(0)? as usize;
    let thumbnail = exif.buf().get(offset..offset.checked_add(len)?)?;
    Some(Bytes::copy_from_slice(thumbnail))
}

fn thumbnail_path(root: &Path, time: &CaptureTime, file: &Path) -> Option<PathBuf> {
    let stem = file.file_stem()?;
    let mut name = stem.to_os_string();
    name.push(".jpg");
    Some(root.join(THUMBNAIL_DIR).join(time.day_dir()).join(name))
}

async fn read_bounded(path: &Path, limit: usize) -> Result<Bytes, GalleryError> {
    let meta = tokio::fs::metadata(path)
        .await
        .map_err(|e| GalleryError::StorageError(format!("{}: {}", path.display(), e)))?;
    if meta.len() > limit as u64 {
        return Err(GalleryError::StorageError(format!(
            "{} is {} bytes, buffer holds {}",
            path.display(),
            meta.len(),
            limit
        )));
    }

    let data = tokio::fs::read(path)
        .await
        .map_err(|e| GalleryError::StorageError(format!("{}: {}", path.display(), e)))?;
    Ok(Bytes::from(data))
}
