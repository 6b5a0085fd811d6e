use crate::api::http::request::{read_request, Request};
use crate::api::http::service::{write_head, GalleryService, Status};
use crate::errors::GalleryError;
use futures_util::FutureExt;
use std::io;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::pin;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Notify;
use tracing::{debug, error, info, warn};

/// Pause between bind attempts while `run` has no listener.
pub const REBIND_DELAY: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerState {
    Stopped,
    Starting,
    Running,
}

/// Sequential HTTP/1.0 server: one connection is accepted, its single
/// request answered and the connection closed before the next accept.
pub struct HttpServer {
    addr: SocketAddr,
    backlog: i32,
    recv_timeout: Duration,
    service: GalleryService,
    state: ServerState,
    listener: Option<TcpListener>,
}

impl HttpServer {
    pub fn new(
        addr: SocketAddr,
        backlog: i32,
        recv_timeout: Duration,
        service: GalleryService,
    ) -> Self {
        HttpServer {
            addr,
            backlog,
            recv_timeout,
            service,
            state: ServerState::Stopped,
            listener: None,
        }
    }

    pub fn state(&self) -> ServerState {
        self.state
    }

    pub fn is_running(&self) -> bool {
        self.state == ServerState::Running
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.listener.as_ref()?.local_addr().ok()
    }

    pub fn add_mount_point(&mut self, path: impl Into<PathBuf>) {
        self.service.add_mount_point(path);
    }

    /// Binds the listening socket. Failures are logged and leave the server
    /// stopped; check `is_running` afterwards.
    pub fn start(&mut self) {
        if self.state != ServerState::Stopped {
            return;
        }

        self.state = ServerState::Starting;
        match self.bind() {
            Ok(listener) => {
                self.listener = Some(listener);
                self.state = ServerState::Running;
                info!(
                    "http: listening on http://{}",
                    self.local_addr().unwrap_or(self.addr)
                );
            }
            Err(e) => {
                error!("http: {}", e);
                self.state = ServerState::Stopped;
            }
        }
    }

    fn bind(&self) -> Result<TcpListener, GalleryError> {
        let socket = common::socket::listen_reuse_socket(&self.addr, self.backlog)
            .map_err(|e| GalleryError::NetworkError(format!("bind {}: {}", self.addr, e)))?;
        TcpListener::from_std(socket.into())
            .map_err(|e| GalleryError::NetworkError(format!("register {}: {}", self.addr, e)))
    }

    pub fn stop(&mut self) {
        if self.listener.take().is_some() {
            info!("http: stopped listening on {}", self.addr);
        }
        self.state = ServerState::Stopped;
    }

    /// Serves one pending connection, if any, without waiting for one.
    /// Returns whether a connection was served.
    pub async fn serve_once(&mut self) -> bool {
        let Some(listener) = self.listener.as_ref() else {
            return false;
        };

        match listener.accept().now_or_never() {
            Some(accepted) => {
                let served = accepted.is_ok();
                self.handle_accept(accepted).await;
                served
            }
            None => false,
        }
    }

    /// Waits for the next connection and serves it.
    #[cfg(test)]
    pub async fn serve_next(&mut self) -> Result<(), GalleryError> {
        let accepted = match self.listener.as_ref() {
            Some(listener) => listener.accept().await,
            None => return Err(GalleryError::ListenSocketFault("not listening".to_string())),
        };
        self.handle_accept(accepted).await;
        Ok(())
    }

    /// Serves connections until `notifier` fires. While the server is
    /// stopped, binding is retried every `REBIND_DELAY`.
    pub async fn run(&mut self, notifier: Arc<Notify>) {
        let mut signal = pin::pin!(notifier.notified());

        loop {
            if self.state() == ServerState::Stopped {
                self.start();
            }
            if self.listener.is_none() {
                tokio::select! {
                    _ = tokio::time::sleep(REBIND_DELAY) => continue,
                    _ = &mut signal => break,
                }
            }
            let Some(listener) = self.listener.as_ref() else {
                continue;
            };

            let accepted = tokio::select! {
                accepted = listener.accept() => Some(accepted),
                _ = &mut signal => None,
            };

            match accepted {
                Some(accepted) => {
                    self.handle_accept(accepted).await;
                    // Take whatever queued up meanwhile before waiting again.
                    while self.serve_once().await {}
                }
                None => break,
            }
        }

        info!("http: shutting down");
        self.stop();
    }

    /// A connection-aborted accept on a running server means the listening
    /// socket is broken: it is dropped and bound again. If that fails the
    /// server is left stopped.
    async fn handle_accept(&mut self, accepted: io::Result<(TcpStream, SocketAddr)>) {
        match accepted {
            Ok((stream, peer)) => self.serve_connection(stream, peer).await,
            Err(e) if e.kind() == io::ErrorKind::ConnectionAborted && self.is_running() => {
                warn!(
                    "http: {}, rebinding",
                    GalleryError::ListenSocketFault(e.to_string())
                );
                self.stop();
                self.start();
                if !self.is_running() {
                    error!("http: rebind {} failed, server stopped", self.addr);
                }
            }
            Err(e) => warn!("http: accept: {}", e),
        }
    }

    async fn serve_connection(&self, mut stream: TcpStream, peer: SocketAddr) {
        let result = match read_request(&mut stream, self.recv_timeout).await {
            Request::Empty => {
                debug!("http: {}: nothing received", peer);
                Ok(())
            }
            Request::Unsupported => {
                debug!("http: {}: no GET request line", peer);
                write_head(&mut stream, Status::NotImplemented, &[]).await
            }
            Request::Get(path) => {
                debug!("http: {}: GET {}", peer, path);
                self.service.respond(&path, &mut stream).await
            }
        };

        if let Err(e) = result {
            warn!("http: {}: {}", peer, e);
        }
        if let Err(e) = stream.shutdown().await {
            debug!("http: {}: shutdown: {}", peer, e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::album::memory::MemoryBackend;
    use crate::album::titles::ConfiguredTitles;
    use crate::album::AlbumRoots;
    use crate::catalog::{CatalogOptions, MediaCatalog};
    use serde_json::Value;
    use tokio::io::AsyncReadExt;

    async fn service() -> GalleryService {
        let roots = AlbumRoots::new("/nonexistent/nand", "/nonexistent/sd");
        let catalog = MediaCatalog::build(
            Arc::new(MemoryBackend::new()),
            Arc::new(ConfiguredTitles::default()),
            roots,
            CatalogOptions::default(),
        )
        .await;
        GalleryService::new(Arc::new(catalog))
    }

    async fn server(mount_point: Option<PathBuf>) -> HttpServer {
        let addr = "127.0.0.1:0".parse().unwrap();
        let mut server = HttpServer::new(addr, 10, Duration::from_millis(200), service().await);
        if let Some(mount_point) = mount_point {
            server.add_mount_point(mount_point);
        }
        server.start();
        assert!(server.is_running());
        server
    }

    fn send(addr: SocketAddr, request: &'static [u8]) -> tokio::task::JoinHandle<Vec<u8>> {
        tokio::spawn(async move {
            let mut stream = TcpStream::connect(addr).await.unwrap();
            stream.write_all(request).await.unwrap();
            stream.shutdown().await.unwrap();
            let mut response = Vec::new();
            stream.read_to_end(&mut response).await.unwrap();
            response
        })
    }

    async fn exchange(server: &mut HttpServer, request: &'static [u8]) -> String {
        let client = send(server.local_addr().unwrap(), request);
        server.serve_next().await.unwrap();
        String::from_utf8(client.await.unwrap()).unwrap()
    }

    #[tokio::test]
    async fn serves_static_index() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("index.html"), b"<html>album</html>").unwrap();
        let mut server = server(Some(dir.path().to_path_buf())).await;

        let response = exchange(&mut server, b"GET / HTTP/1.0\r\n\r\n").await;
        assert!(response.starts_with("HTTP/1.0 200 OK\r\n"));
        assert!(response.contains("Content-Type: text/html\r\n"));
        assert!(response.ends_with("\r\n\r\n<html>album</html>"));
    }

    #[tokio::test]
    async fn empty_request_gets_no_response() {
        let mut server = server(None).await;
        assert_eq!(exchange(&mut server, b"").await, "");
    }

    #[tokio::test]
    async fn unsupported_method_is_501() {
        let mut server = server(None).await;
        let response = exchange(&mut server, b"POST /gallery?page=1 HTTP/1.0\r\n\r\n").await;
        assert_eq!(response, "HTTP/1.0 501 Not Implemented\r\n\r\n");
    }

    #[tokio::test]
    async fn unknown_path_is_404() {
        let mut server = server(None).await;
        let response = exchange(&mut server, b"GET /nope HTTP/1.1\r\nHost: x\r\n\r\n").await;
        assert_eq!(response, "HTTP/1.0 404 Not Found\r\n\r\n");
    }

    #[tokio::test]
    async fn empty_catalog_gallery_over_tcp() {
        let mut server = server(None).await;
        let response = exchange(&mut server, b"GET /gallery?page=1 HTTP/1.0\r\n\r\n").await;
        let (head, body) = response.split_once("\r\n\r\n").unwrap();
        assert!(head.starts_with("HTTP/1.0 200 OK"));
        assert!(head.contains("Access-Control-Allow-Origin: *"));
        assert!(!head.contains("Content-Length"));

        let body: Value = serde_json::from_str(body).unwrap();
        assert_eq!(body["pages"], 0);
        assert_eq!(body["gallery"], Value::Array(Vec::new()));
        assert_eq!(body["stats"]["numScreenshots"], 0);
        assert_eq!(body["stats"]["numVideos"], 0);
    }

    #[tokio::test]
    async fn serve_once_does_not_wait() {
        let mut server = server(None).await;
        assert!(!server.serve_once().await);

        let client = send(server.local_addr().unwrap(), b"GET /nope HTTP/1.0\r\n\r\n");
        let mut served = false;
        for _ in 0..200 {
            if server.serve_once().await {
                served = true;
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert!(served);
        let response = client.await.unwrap();
        assert!(response.starts_with(b"HTTP/1.0 404"));
    }

    #[tokio::test]
    async fn run_returns_on_notify() {
        let mut server = server(None).await;
        let notifier = Arc::new(Notify::new());
        let trigger = Arc::clone(&notifier);
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            trigger.notify_waiters();
        });

        server.run(notifier).await;
        assert_eq!(server.state(), ServerState::Stopped);
        assert!(server.local_addr().is_none());
    }

    #[tokio::test]
    async fn failed_start_stays_stopped() {
        // TEST-NET-1 is never assigned to a local interface.
        let addr = "192.0.2.1:1234".parse().unwrap();
        let mut server = HttpServer::new(addr, 10, Duration::from_secs(1), service().await);

        server.start();
        assert_eq!(server.state(), ServerState::Stopped);
        assert!(!server.serve_once().await);
        assert!(server.serve_next().await.is_err());
    }

    #[tokio::test]
    async fn run_keeps_retrying_bind_until_notified() {
        let addr = "192.0.2.1:1234".parse().unwrap();
        let mut server = HttpServer::new(addr, 10, Duration::from_secs(1), service().await);
        let notifier = Arc::new(Notify::new());
        let trigger = Arc::clone(&notifier);
        tokio::spawn(async move {
            tokio::time::sleep(REBIND_DELAY + Duration::from_millis(200)).await;
            trigger.notify_waiters();
        });

        server.run(notifier).await;
        assert_eq!(server.state(), ServerState::Stopped);
    }

    #[tokio::test]
    async fn run_serves_until_notified() {
        let mut server = server(None).await;
        let notifier = Arc::new(Notify::new());
        let trigger = Arc::clone(&notifier);
        let client = send(server.local_addr().unwrap(), b"GET /nope HTTP/1.0\r\n\r\n");
        let stopper = tokio::spawn(async move {
            let response = client.await.unwrap();
            trigger.notify_waiters();
            response
        });

        server.run(notifier).await;
        assert!(stopper.await.unwrap().starts_with(b"HTTP/1.0 404"));
        assert!(!server.is_running());
    }

    #[tokio::test]
    async fn aborted_accept_rebinds_listener() {
        let mut server = server(None).await;
        server
            .handle_accept(Err(io::ErrorKind::ConnectionAborted.into()))
            .await;
        assert!(server.is_running());

        let response = exchange(&mut server, b"GET /nope HTTP/1.0\r\n\r\n").await;
        assert_eq!(response, "HTTP/1.0 404 Not Found\r\n\r\n");
    }

    #[tokio::test]
    async fn aborted_accept_on_stopped_server_is_only_logged() {
        let mut server = server(None).await;
        server.stop();
        server
            .handle_accept(Err(io::ErrorKind::ConnectionAborted.into()))
            .await;
        assert_eq!(server.state(), ServerState::Stopped);
        assert!(server.local_addr().is_none());
    }

    #[tokio::test]
    async fn other_accept_errors_keep_listener() {
        let mut server = server(None).await;
        let before = server.local_addr();
        server
            .handle_accept(Err(io::ErrorKind::WouldBlock.into()))
            .await;
        assert!(server.is_running());
        assert_eq!(server.local_addr(), before);
    }

    #[tokio::test]
    async fn stop_then_start_rebinds() {
        let mut server = server(None).await;
        server.stop();
        assert!(!server.is_running());
        server.start();
        assert!(server.is_running());
    }
}
