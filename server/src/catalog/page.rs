use crate::album::Storage;
use serde::{Deserialize, Serialize};

/// Host UI theme, passed through to the frontend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    Dark,
    Light,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentType {
    Screenshot,
    Video,
}

impl ContentType {
    pub fn mime(&self) -> &'static str {
        match self {
            ContentType::Screenshot => "image/jpeg",
            ContentType::Video => "video/mp4",
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            ContentType::Screenshot => "jpg",
            ContentType::Video => "mp4",
        }
    }
}

/// Whole-catalog figures, computed once when the catalog is built.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogStats {
    /// Seconds spent building the catalog.
    pub index_time: f64,
    pub num_screenshots: usize,
    pub num_videos: usize,
}

/// A catalog entry whose file was found on disk.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedEntry {
    pub id: usize,
    pub stored_at: Storage,
    #[serde(rename = "game")]
    pub title_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_size: Option<u64>,
    pub taken_at: i64,
    #[serde(rename = "type")]
    pub content_type: ContentType,
    #[serde(rename = "fileName")]
    pub download_name: String,
    /// URL path of the file below an album mount point.
    pub path: String,
}

/// Body of `/gallery?page=N`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CatalogPage {
    #[serde(rename = "pages")]
    pub page_count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub theme: Option<Theme>,
    pub stats: CatalogStats,
    #[serde(rename = "gallery")]
    pub entries: Vec<ResolvedEntry>,
}
