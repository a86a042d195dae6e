//! Process lifecycle: `Starting → Serving → Draining → Stopped`.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use tokio::net::TcpListener;
use tokio::sync::{oneshot, watch};
use tracing::{error, info, warn};

use crate::http::{self, ProduceBridge};
use crate::kafka::{BrokerClient, ClientSettings};
use crate::{Config, Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Starting,
    Serving,
    Draining,
    Stopped,
}

/// Resolves on SIGINT or SIGTERM.
pub async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let (mut sigint, mut sigterm) =
            match (signal(SignalKind::interrupt()), signal(SignalKind::terminate())) {
                (Ok(sigint), Ok(sigterm)) => (sigint, sigterm),
                (Err(e), _) | (_, Err(e)) => {
                    error!(error = %e, "Failed to install signal handlers");
                    return std::future::pending().await;
                }
            };
        tokio::select! {
            _ = sigint.recv() => info!(signal = "SIGINT", "shutdown signal"),
            _ = sigterm.recv() => info!(signal = "SIGTERM", "shutdown signal"),
        }
    }

    #[cfg(not(unix))]
    {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            return std::future::pending().await;
        }
        info!("shutdown signal");
    }
}

/// Runs the gateway until SIGINT/SIGTERM.
pub async fn run(config: Config) -> Result<()> {
    let (phase, _) = watch::channel(Phase::Starting);
    run_until(config, shutdown_signal(), &phase).await
}

/// Runs the gateway until `shutdown` resolves, reporting progress on `phase`.
///
/// Once the broker client exists it is closed on every exit path.
pub async fn run_until<F>(config: Config, shutdown: F, phase: &watch::Sender<Phase>) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    phase.send_replace(Phase::Starting);

    let settings = ClientSettings::from_config(&config.kafka)?;
    let client = Arc::new(BrokerClient::connect(&settings).await?);

    let bridge = ProduceBridge::new(Arc::clone(&client), &config.server);
    let served = match TcpListener::bind(config.server.listen_addr).await {
        Ok(listener) => {
            serve(
                listener,
                http::router(bridge),
                shutdown,
                config.server.shutdown_timeout(),
                phase,
            )
            .await
        }
        Err(e) => {
            error!(addr = %config.server.listen_addr, error = %e, "Failed to bind listener");
            drop(bridge);
            Err(Error::Io(e))
        }
    };

    let flush_timeout = config.server.flush_timeout();
    match Arc::try_unwrap(client) {
        Ok(client) => client.close(flush_timeout).await,
        Err(shared) => {
            // Handlers abandoned by the drain deadline still hold a handle.
            warn!("Requests still in flight at shutdown, flushing shared client");
            shared.flush(flush_timeout).await;
        }
    }

    phase.send_replace(Phase::Stopped);
    info!("Shutdown complete");
    served
}

/// Serves `app` on `listener` until `shutdown` resolves, then stops accepting
/// and gives in-flight requests up to `drain_timeout` to finish.
pub async fn serve<F>(
    listener: TcpListener,
    app: Router,
    shutdown: F,
    drain_timeout: Duration,
    phase: &watch::Sender<Phase>,
) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let addr = listener.local_addr()?;
    let (drain_tx, drain_rx) = oneshot::channel::<()>();

    let mut server = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = drain_rx.await;
            })
            .await
    });

    phase.send_replace(Phase::Serving);
    info!(%addr, "Started server");

    tokio::select! {
        finished = &mut server => {
            // The server only ends on its own when something broke.
            let err = match finished {
                Ok(Ok(())) => Error::Server("server stopped unexpectedly".to_string()),
                Ok(Err(e)) => Error::Io(e),
                Err(e) => Error::Server(e.to_string()),
            };
            error!(error = %err, "HTTP server failed");
            return Err(err);
        }
        _ = shutdown => {}
    }

    phase.send_replace(Phase::Draining);
    info!(timeout = ?drain_timeout, "Received shutdown signal, draining requests");
    let _ = drain_tx.send(());

    match tokio::time::timeout(drain_timeout, &mut server).await {
        Ok(Ok(Ok(()))) => info!("HTTP server stopped"),
        Ok(Ok(Err(e))) => error!(error = %e, "HTTP server failed while draining"),
        Ok(Err(e)) => error!(error = %e, "HTTP server task failed while draining"),
        Err(_) => {
            error!(timeout = ?drain_timeout, "http server forced to shutdown");
            server.abort();
            let _ = server.await;
        }
    }

    Ok(())
}
