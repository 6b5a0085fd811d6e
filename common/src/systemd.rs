use sd_notify::NotifyState;
use std::env;
use std::io;
use std::process::{Command, Stdio};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::Notify;
use tracing::{error, info};

/// Installs the signal handler. Every handled signal ends with
/// `notify_waiters`, which the serve loop treats as "stop accepting".
pub fn run(notifier: Arc<Notify>) {
    tokio::spawn(async move {
        if let Err(e) = handle_signals(notifier).await {
            error!("signal handler: {}", e);
        }
    });
}

/// Reports readiness once the listener is bound.
pub fn ready() {
    let r = sd_notify::notify(false, &[NotifyState::Ready]);
    if let Err(e) = r {
        error!("notify ready: {}", e);
    }
}

async fn handle_signals(notifier: Arc<Notify>) -> io::Result<()> {
    let mut interrupt = signal(SignalKind::interrupt())?;
    let mut terminate = signal(SignalKind::terminate())?;
    let mut quit = signal(SignalKind::quit())?;
    let mut hup = signal(SignalKind::hangup())?;

    let mut sighup = false;
    tokio::select! {
        _ = interrupt.recv() => {
            info!("received interrupt signal");
        },
        _ = hup.recv() => {
            info!("received hup signal");
            sighup = true;
        },
        _ = terminate.recv() => {
            info!("received terminate signal");
        },
        _ = quit.recv() => {
            info!("received quit signal");
        },
    }

    if sighup {
        // A fresh process rebuilds the catalog; ours is immutable once built.
        match respawn() {
            Ok(pid) => {
                let now = SystemTime::now()
                    .duration_since(UNIX_EPOCH)
                    .unwrap_or_default();
                let r = sd_notify::notify(
                    false,
                    &[
                        NotifyState::Reloading,
                        NotifyState::MonotonicUsec(now.as_micros() as i128),
                        NotifyState::MainPid(pid),
                    ],
                );
                if let Err(e) = r {
                    error!("notify reloading: {}", e);
                }
            }
            Err(e) => error!("respawn: {}", e),
        }
    } else {
        let _ = sd_notify::notify(true, &[NotifyState::Stopping]);
    }

    notifier.notify_waiters();
    Ok(())
}

fn respawn() -> Result<u32, Box<dyn std::error::Error>> {
    let exe = env::current_exe()?;
    let child = Command::new(exe)
        .args(env::args().skip(1))
        .stdin(Stdio::null())
        .stdout(Stdio::inherit())
        .stderr(Stdio::inherit())
        .spawn()?;

    Ok(child.id())
}
