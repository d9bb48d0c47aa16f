//! Graceful shutdown: OS signals and the drain deadline.
//!
//! The signal future tells axum to stop accepting connections and flips a
//! `watch` flag. From that moment in-flight requests get a bounded window
//! before the server future is dropped.

use std::future::IntoFuture;
use std::time::Duration;
use tokio::sync::watch;

/// Resolves on Ctrl-C or SIGTERM.
pub async fn signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => tracing::info!(signal = "SIGINT", "shutting down server"),
        () = terminate => tracing::info!(signal = "SIGTERM", "shutting down server"),
    }
}

/// Resolves once the flag is set. Never resolves if the sender is dropped
/// without setting it.
async fn triggered(mut trigger: watch::Receiver<bool>) {
    if trigger.wait_for(|fired| *fired).await.is_err() {
        std::future::pending::<()>().await;
    }
}

/// Drive `server` to completion unless it is still running `grace` after
/// `trigger` fired. Returns `None` when the deadline cut it off.
pub async fn drain_with_deadline<S>(
    server: S,
    trigger: watch::Receiver<bool>,
    grace: Duration,
) -> Option<S::Output>
where
    S: IntoFuture,
{
    let deadline = async {
        triggered(trigger).await;
        tokio::time::sleep(grace).await;
    };

    tokio::select! {
        output = server.into_future() => Some(output),
        () = deadline => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    #[tokio::test]
    async fn test_finished_server_returns_its_output() {
        let (_tx, rx) = watch::channel(false);
        let output = drain_with_deadline(async { 7 }, rx, Duration::from_millis(10)).await;
        assert_eq!(output, Some(7));
    }

    #[tokio::test]
    async fn test_deadline_only_runs_after_the_signal() {
        let (_tx, rx) = watch::channel(false);
        let server = async {
            tokio::time::sleep(Duration::from_millis(50)).await;
            "drained"
        };
        let output = drain_with_deadline(server, rx, Duration::from_millis(5)).await;
        assert_eq!(output, Some("drained"));
    }

    #[tokio::test]
    async fn test_stuck_request_is_cut_off() {
        let (tx, rx) = watch::channel(false);
        let server = async {
            tokio::time::sleep(Duration::from_secs(60)).await;
        };

        let started = Instant::now();
        tx.send(true).unwrap();
        let output = drain_with_deadline(server, rx, Duration::from_millis(20)).await;

        assert!(output.is_none());
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_dropped_trigger_never_forces() {
        let (tx, rx) = watch::channel(false);
        drop(tx);
        let server = async {
            tokio::time::sleep(Duration::from_millis(30)).await;
        };
        let output = drain_with_deadline(server, rx, Duration::from_millis(1)).await;
        assert_eq!(output, Some(()));
    }
}
