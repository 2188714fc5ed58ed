//! Process supervision: run the reconcile loop until told to shut down.

use crate::error::{DdnsError, Result};
use crate::reconciler::DnsRecordReconciler;
use std::future::Future;

/// Run `reconciler` on a background task until `shutdown` resolves.
///
/// A second task waits on `shutdown` and requests a stop; both tasks are
/// joined before returning, so the loop has always observed the stop and
/// exited by the time this resolves. If the loop ends on its own, the
/// waiter is released without waiting for `shutdown`.
pub async fn run_service<F>(mut reconciler: DnsRecordReconciler, shutdown: F) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    tracing::info!("service started");

    let handle = reconciler.handle();
    let loop_task = tokio::spawn(async move { reconciler.run().await });

    let waiter_handle = handle.clone();
    let signal_task = tokio::spawn(async move {
        tokio::select! {
            _ = shutdown => {
                tracing::info!("Shutdown requested");
                waiter_handle.stop();
            }
            _ = waiter_handle.stopped() => {}
        }
    });

    let loop_result = loop_task.await;
    // Release the waiter if the loop ended without a shutdown request.
    handle.stop();
    let signal_result = signal_task.await;

    let result = match loop_result {
        Ok(result) => result,
        Err(e) => Err(DdnsError::Io(std::io::Error::other(format!(
            "reconcile loop task failed: {}",
            e
        )))),
    };
    if let Err(e) = &result {
        tracing::error!("Reconcile loop exited due to error: {}", e);
    }
    if let Err(e) = signal_result {
        tracing::error!("Shutdown waiter task failed: {}", e);
    }

    tracing::info!("service stopped");
    result
}

/// Resolves on SIGINT or SIGTERM.
#[cfg(unix)]
pub async fn shutdown_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    let (mut sigterm, mut sigint) = match (
        signal(SignalKind::terminate()),
        signal(SignalKind::interrupt()),
    ) {
        (Ok(term), Ok(int)) => (term, int),
        (Err(e), _) | (_, Err(e)) => {
            tracing::error!("Failed to install signal handlers, falling back to Ctrl-C: {}", e);
            let _ = tokio::signal::ctrl_c().await;
            return;
        }
    };

    tokio::select! {
        _ = sigterm.recv() => tracing::info!("Received shutdown signal: SIGTERM"),
        _ = sigint.recv() => tracing::info!("Received shutdown signal: SIGINT"),
    }
}

/// Resolves on Ctrl-C.
#[cfg(not(unix))]
pub async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to wait for Ctrl-C: {}", e);
        return;
    }
    tracing::info!("Received shutdown signal: SIGINT");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detector::MockExternalIpProvider;
    use std::time::Duration;
    use tokio::sync::oneshot;
    use tokio::time::timeout;

    fn idle_reconciler() -> DnsRecordReconciler {
        DnsRecordReconciler::builder()
            .ip_provider(Box::new(MockExternalIpProvider::new()))
            .interval(Duration::from_secs(5))
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn test_service_stops_on_shutdown() {
        let (tx, rx) = oneshot::channel::<()>();

        let service = tokio::spawn(run_service(idle_reconciler(), async move {
            let _ = rx.await;
        }));

        tokio::time::sleep(Duration::from_millis(20)).await;
        tx.send(()).unwrap();

        let result = timeout(Duration::from_secs(1), service).await.unwrap().unwrap();
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_service_returns_when_loop_stopped_directly() {
        let reconciler = idle_reconciler();
        let handle = reconciler.handle();

        let service = tokio::spawn(run_service(reconciler, std::future::pending()));
        tokio::time::sleep(Duration::from_millis(20)).await;
        handle.stop();

        let result = timeout(Duration::from_secs(1), service).await.unwrap().unwrap();
        assert!(result.is_ok());
    }
}
