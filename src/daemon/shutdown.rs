use tokio::select;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

/// Waits for a termination signal and turns it into a cancellation of `cancelation`. The actual
/// cleanup happens in the cancelled modules, this listener only asks for it.
///
/// Returns early if someone else cancels the token first. On Windows detached processes can't
/// detect signals sent to them, so this should be enhanced in the future to support another way
/// of sending signals.
pub async fn detect_shutdown(cancelation: CancellationToken) {
    select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Received interrupt");
            cancelation.cancel();
        },
        _ = terminate() => {
            info!("Received terminate");
            cancelation.cancel();
        },
        _ = cancelation.cancelled() => (),
    };
}

#[cfg(unix)]
async fn terminate() {
    use tokio::signal::unix::{signal, SignalKind};

    match signal(SignalKind::terminate()) {
        Ok(mut stream) => {
            stream.recv().await;
        }
        Err(e) => {
            error!("Can't listen for SIGTERM {e:?}");
            std::future::pending::<()>().await
        }
    }
}

#[cfg(not(unix))]
async fn terminate() {
    std::future::pending::<()>().await
}
