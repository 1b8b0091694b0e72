use tokio::select;

use super::processing::handle::CounterHandle;

/// Detects termination requests sent to the process and starts the shutdown sequence. Also returns
/// when the shutdown was requested some other way.
pub async fn detect_shutdown(handle: CounterHandle) {
    select! {
        _ = tokio::signal::ctrl_c() => {
            handle.request_shutdown();
        },
        _ = terminate() => {
            handle.request_shutdown();
        },
        _ = handle.shutdown_requested() => (),
    };
}

#[cfg(unix)]
async fn terminate() {
    use tokio::signal::unix::{signal, SignalKind};

    match signal(SignalKind::terminate()) {
        Ok(mut signal) => {
            signal.recv().await;
        }
        Err(e) => {
            tracing::error!("Failed to listen for SIGTERM {e:?}");
            std::future::pending::<()>().await;
        }
    }
}

/// Detached processes on Windows don't receive signals, `keytally stop` terminates them instead.
#[cfg(not(unix))]
async fn terminate() {
    std::future::pending::<()>().await;
}
