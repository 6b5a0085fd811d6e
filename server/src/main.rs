mod album;
mod api;
mod catalog;
mod config;
mod errors;
mod stream;

use crate::album::directory::DirectoryBackend;
use crate::album::titles::ConfiguredTitles;
use crate::album::{AlbumBackend, AlbumRoots};
use crate::api::http::server::HttpServer;
use crate::api::http::service::GalleryService;
use crate::catalog::{CatalogOptions, MediaCatalog};
use crate::config::Settings;
use crate::errors::GalleryError;
use clap::Parser as ClapParser;
use std::fs;
use std::process;
use std::sync::Arc;
use tokio::sync::Notify;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, layer::SubscriberExt, EnvFilter};

#[derive(ClapParser, Debug)]
#[command(version)]
struct Cli {
    #[arg(short, long, default_value = "album.toml")]
    config: String,

    /// Overrides `[http] addr`.
    #[arg(short, long)]
    addr: Option<String>,
}

fn main() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = tracing_subscriber::registry().with(filter).with(
        fmt::Layer::default()
            .with_target(false)
            .with_thread_names(false)
            .with_ansi(true)
            .with_line_number(false)
            .with_file(false)
            .with_thread_ids(false),
    );
    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("unable to set a global logger instance: {}", e);
        process::exit(1);
    }

    let args = Cli::parse();
    let mut settings = match settings(&args.config) {
        Ok(settings) => settings,
        Err(e) => {
            error!("{}", e);
            process::exit(1);
        }
    };
    if let Some(addr) = args.addr {
        settings.http.addr = addr;
    }

    let runtime = match common::runtime::build(settings.runtime.threads) {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("failed to create runtime: {}", e);
            process::exit(1);
        }
    };

    if let Err(e) = runtime.block_on(start(settings)) {
        error!("{}", e);
        process::exit(1);
    }

    info!("done");
}

fn settings(path: &str) -> Result<Settings, GalleryError> {
    let data = fs::read_to_string(path)
        .map_err(|e| GalleryError::ConfigError(format!("read '{}': {}", path, e)))?;
    toml::from_str(&data).map_err(|e| GalleryError::ConfigError(format!("parse '{}': {}", path, e)))
}

async fn start(settings: Settings) -> Result<(), GalleryError> {
    let addr = common::socket::parse_address(settings.http.addr.clone()).map_err(|e| {
        GalleryError::ConfigError(format!("address '{}': {}", settings.http.addr, e))
    })?;
    let roots = AlbumRoots::detect(&settings.album.nand, &settings.album.sd)
        .ok_or_else(|| GalleryError::ConfigError("[album] sd lists no directory".to_string()))?;
    let titles = ConfiguredTitles::from_table(&settings.titles)?;

    let backend =
        Arc::new(DirectoryBackend::new(roots.clone())) as Arc<dyn AlbumBackend + Send + Sync>;
    let options = CatalogOptions {
        page_size: settings.album.page_size,
        theme: settings.album.theme,
    };
    let catalog = MediaCatalog::build(backend, Arc::new(titles), roots.clone(), options).await;
    if catalog.is_empty() {
        warn!("catalog: no captures found");
    } else {
        let stats = catalog.stats();
        info!(
            "catalog: {} entries ({} screenshots, {} videos) on {} pages",
            catalog.len(),
            stats.num_screenshots,
            stats.num_videos,
            catalog.page_count()
        );
    }

    let service = GalleryService::new(Arc::new(catalog));
    let mut server = HttpServer::new(
        addr,
        settings.http.backlog,
        settings.http.recv_timeout,
        service,
    );

    let mut mount_points = settings.http.mount_points.clone();
    if settings.http.mount_album {
        mount_points.push(roots.nand.clone());
        mount_points.push(roots.sd.clone());
    }
    for mount_point in mount_points {
        info!("http: mount point {}", mount_point.display());
        server.add_mount_point(mount_point);
    }

    server.start();
    if !server.is_running() {
        return Err(GalleryError::NetworkError(format!(
            "http server failed to start on {}",
            addr
        )));
    }

    let notifier = Arc::new(Notify::new());
    common::systemd::run(Arc::clone(&notifier));
    common::systemd::ready();

    server.run(notifier).await;
    Ok(())
}
