use crate::catalog::MediaCatalog;
use crate::errors::GalleryError;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tracing::{debug, error, warn};

const COMMON_HEADERS: [(&str, &str); 1] = [("Access-Control-Allow-Origin", "*")];
const JSON_HEADERS: [(&str, &str); 1] = [("Content-Type", "application/json")];
const THUMBNAIL_HEADERS: [(&str, &str); 1] = [("Content-Type", "image/jpeg")];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Ok,
    NotFound,
    InternalServerError,
    NotImplemented,
}

impl Status {
    pub fn code(&self) -> u16 {
        match self {
            Status::Ok => 200,
            Status::NotFound => 404,
            Status::InternalServerError => 500,
            Status::NotImplemented => 501,
        }
    }

    pub fn reason(&self) -> &'static str {
        match self {
            Status::Ok => "OK",
            Status::NotFound => "Not Found",
            Status::InternalServerError => "Internal Server Error",
            Status::NotImplemented => "Not Implemented",
        }
    }
}

/// Catalog endpoints. Static files are looked up before these.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    Gallery(i64),
    Thumbnail(i64),
    File(i64),
    NotFound,
}

impl Route {
    pub fn from_path(path: &str) -> Route {
        if let Some(page) = query_int(path, "/gallery?page=") {
            Route::Gallery(page)
        } else if let Some(id) = query_int(path, "/thumbnail?id=") {
            Route::Thumbnail(id)
        } else if let Some(id) = query_int(path, "/file?id=") {
            Route::File(id)
        } else {
            Route::NotFound
        }
    }
}

/// Leading integer after `prefix`; trailing characters are ignored.
fn query_int(path: &str, prefix: &str) -> Option<i64> {
    let rest = path.strip_prefix(prefix)?.trim_start();
    let sign_len = usize::from(rest.starts_with(['-', '+']));
    let digits = rest[sign_len..]
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(rest.len() - sign_len);
    if digits == 0 {
        return None;
    }
    rest[..sign_len + digits].parse().ok()
}

/// Answers one request: static files from the mount points first, then the
/// catalog endpoints.
#[derive(Clone)]
pub struct GalleryService {
    catalog: Arc<MediaCatalog>,
    mount_points: Vec<PathBuf>,
}

impl GalleryService {
    pub fn new(catalog: Arc<MediaCatalog>) -> Self {
        GalleryService {
            catalog,
            mount_points: Vec::new(),
        }
    }

    /// Mount points are searched in the order they were added.
    pub fn add_mount_point(&mut self, path: impl Into<PathBuf>) {
        self.mount_points.push(path.into());
    }

    pub async fn respond<W>(&self, path: &str, out: &mut W) -> Result<(), GalleryError>
    where
        W: AsyncWrite + Unpin + ?Sized,
    {
        let path = if path == "/" { "/index.html" } else { path };

        if let Some((file_path, mut file)) = self.open_static(path).await {
            let mut headers = Vec::new();
            if let Some(content_type) = static_content_type(&file_path) {
                headers.push(("Content-Type", content_type));
            }
            write_head(out, Status::Ok, &headers).await?;
            tokio::io::copy(&mut file, out)
                .await
                .map_err(|e| GalleryError::NetworkError(format!("static file: {}", e)))?;
            return Ok(());
        }

        match Route::from_path(path) {
            Route::Gallery(page) => self.gallery(page, out).await,
            Route::Thumbnail(id) => self.thumbnail(id, out).await,
            Route::File(id) => self.file(id, out).await,
            Route::NotFound => write_head(out, Status::NotFound, &[]).await,
        }
    }

    async fn gallery<W>(&self, page: i64, out: &mut W) -> Result<(), GalleryError>
    where
        W: AsyncWrite + Unpin + ?Sized,
    {
        let page = self.catalog.page(page).await;
        let body = match serde_json::to_vec(&page) {
            Ok(body) => body,
            Err(e) => {
                error!("gallery: serialize: {}", e);
                return write_cors_head(out, Status::InternalServerError, &[]).await;
            }
        };

        write_cors_head(out, Status::Ok, &JSON_HEADERS).await?;
        write_body(out, &body).await
    }

    async fn thumbnail<W>(&self, id: i64, out: &mut W) -> Result<(), GalleryError>
    where
        W: AsyncWrite + Unpin + ?Sized,
    {
        match self.catalog.thumbnail(id).await {
            Ok(data) => {
                write_cors_head(out, Status::Ok, &THUMBNAIL_HEADERS).await?;
                write_body(out, &data).await
            }
            Err(e) => {
                warn!("thumbnail {}: {}", id, e);
                write_cors_head(out, Status::InternalServerError, &[]).await
            }
        }
    }

    async fn file<W>(&self, id: i64, out: &mut W) -> Result<(), GalleryError>
    where
        W: AsyncWrite + Unpin + ?Sized,
    {
        let opened = match self.catalog.entry(id) {
            Ok(entry) => self
                .catalog
                .content(id)
                .await
                .map(|content| (entry, content)),
            Err(e) => Err(e),
        };
        let (entry, content) = match opened {
            Ok(opened) => opened,
            Err(e) => {
                warn!("file {}: {}", id, e);
                return write_cors_head(out, Status::InternalServerError, &[]).await;
            }
        };

        let disposition = format!(
            "attachment; filename=\"{}\"",
            self.catalog.download_name(entry).replace(['"', '\r', '\n'], "_")
        );
        let headers = [
            ("Content-Type", entry.content_type().mime()),
            ("Content-Disposition", disposition.as_str()),
        ];
        write_cors_head(out, Status::Ok, &headers).await?;

        // Headers are out; a failure from here on can only cut the body short.
        let sent = content.copy_to(out).await?;
        debug!("file {}: sent {} bytes", id, sent);
        Ok(())
    }

    async fn open_static(&self, path: &str) -> Option<(PathBuf, tokio::fs::File)> {
        let relative = static_relative_path(path)?;
        for mount_point in &self.mount_points {
            let candidate = mount_point.join(&relative);
            let is_file = tokio::fs::metadata(&candidate)
                .await
                .map(|meta| meta.is_file())
                .unwrap_or(false);
            if !is_file {
                continue;
            }

            match tokio::fs::File::open(&candidate).await {
                Ok(file) => return Some((candidate, file)),
                Err(e) => warn!("static: open {}: {}", candidate.display(), e),
            }
        }
        None
    }
}

/// Relative path below a mount point, or `None` for paths that could leave it.
fn static_relative_path(path: &str) -> Option<PathBuf> {
    if path.contains('\0') {
        return None;
    }

    let relative = Path::new(path.trim_start_matches('/'));
    let inside = relative
        .components()
        .all(|component| matches!(component, Component::Normal(_) | Component::CurDir));
    if !inside || relative.as_os_str().is_empty() {
        return None;
    }
    Some(relative.to_path_buf())
}

fn static_content_type(path: &Path) -> Option<&'static str> {
    let ext = path.extension()?.to_str()?.to_ascii_lowercase();
    let content_type = match ext.as_str() {
        "html" | "htm" => "text/html",
        "js" => "application/javascript",
        "css" => "text/css",
        "json" => "application/json",
        "svg" => "image/svg+xml",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "mp4" => "video/mp4",
        "ico" => "image/x-icon",
        _ => return None,
    };
    Some(content_type)
}

/// Writes an HTTP/1.0 status line and headers. No `Content-Length` is sent:
/// closing the connection ends the body.
pub async fn write_head<W>(
    out: &mut W,
    status: Status,
    headers: &[(&str, &str)],
) -> Result<(), GalleryError>
where
    W: AsyncWrite + Unpin + ?Sized,
{
    let mut head = format!("HTTP/1.0 {} {}\r\n", status.code(), status.reason());
    for (name, value) in headers {
        head.push_str(name);
        head.push_str(": ");
        head.push_str(value);
        head.push_str("\r\n");
    }
    head.push_str("\r\n");
    write_body(out, head.as_bytes()).await
}

async fn write_cors_head<W>(
    out: &mut W,
    status: Status,
    headers: &[(&str, &str)],
) -> Result<(), GalleryError>
where
    W: AsyncWrite + Unpin + ?Sized,
{
    let mut all = Vec::with_capacity(COMMON_HEADERS.len() + headers.len());
    all.extend_from_slice(headers);
    all.extend_from_slice(&COMMON_HEADERS);
    write_head(out, status, &all).await
}

async fn write_body<W>(out: &mut W, data: &[u8]) -> Result<(), GalleryError>
where
    W: AsyncWrite + Unpin + ?Sized,
{
    out.write_all(data)
        .await
        .map_err(|e| GalleryError::NetworkError(format!("write response: {}", e)))
}
