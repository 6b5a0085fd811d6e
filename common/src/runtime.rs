use std::io;
use tokio::runtime::Runtime;
use tracing::info;

/// Builds the process runtime. Without an explicit thread count the runtime is
/// current-thread: the album server serves one request at a time and has no
/// use for worker threads.
pub fn build(threads: Option<usize>) -> io::Result<Runtime> {
    let mut builder = match threads {
        Some(threads) => {
            info!("custom runtime threads: {}", threads);
            let mut builder = tokio::runtime::Builder::new_multi_thread();
            builder.worker_threads(threads);
            builder
        }
        None => tokio::runtime::Builder::new_current_thread(),
    };

    builder.enable_all().build()
}
