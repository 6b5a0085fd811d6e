use crate::catalog::{Theme, DEFAULT_PAGE_SIZE};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub runtime: Runtime,
    #[serde(default)]
    pub http: Http,
    pub album: Album,
    /// Hex application id to display name.
    #[serde(default)]
    pub titles: HashMap<String, String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct Runtime {
    pub threads: Option<usize>,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct Http {
    pub addr: String,
    #[serde(with = "humantime_serde")]
    pub recv_timeout: Duration,
    pub backlog: i32,
    /// Static roots, searched in this order.
    pub mount_points: Vec<PathBuf>,
    /// Also serve the album roots, after the static roots.
    pub mount_album: bool,
}

impl Default for Http {
    fn default() -> Self {
        Http {
            addr: "0.0.0.0:1234".to_string(),
            recv_timeout: Duration::from_secs(1),
            backlog: 10,
            mount_points: Vec::new(),
            mount_album: true,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct Album {
    pub nand: PathBuf,
    /// Removable storage candidates; the first existing directory is used.
    pub sd: Vec<PathBuf>,
    #[serde(default = "default_page_size")]
    pub page_size: usize,
    pub theme: Option<Theme>,
}

fn default_page_size() -> usize {
    DEFAULT_PAGE_SIZE
}
