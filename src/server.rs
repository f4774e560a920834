//! Wiring: builds the shared services, runs the HTTP server and the outbox
//! worker side by side, and stops both on shutdown.

use anyhow::{Context, Result};
use axum::Router;
use std::future::Future;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tracing::{info, warn};

use crate::clinic::Clinic;
use crate::outbox::{Mailer, Outbox, OutboxWorker};
use crate::presence::ConnectionRegistry;
use crate::routes::{build_router, AppState};
use crate::settings::AppConfig;
use crate::store::Database;

/// Everything a running instance shares.
#[derive(Clone)]
pub struct Services {
    pub db: Arc<Database>,
    pub outbox: Arc<Outbox>,
    pub clinic: Arc<Clinic>,
    pub presence: ConnectionRegistry,
}

impl Services {
    pub fn new() -> Self {
        let db = Arc::new(Database::new());
        let outbox = Arc::new(Outbox::new());
        let clinic = Arc::new(Clinic::new(db.clone(), outbox.clone()));
        Services {
            db,
            outbox,
            clinic,
            presence: ConnectionRegistry::new(),
        }
    }

    pub fn router(&self) -> Router {
        build_router(AppState {
            clinic: self.clinic.clone(),
            presence: self.presence.clone(),
        })
    }

    pub fn worker(&self, config: &AppConfig, mailer: Arc<dyn Mailer>) -> OutboxWorker {
        OutboxWorker::new(
            self.outbox.clone(),
            self.db.clone(),
            self.presence.clone(),
            mailer,
            config.retry_policy(),
        )
    }
}

impl Default for Services {
    fn default() -> Self {
        Self::new()
    }
}

/// Serve the API on `listener` until `shutdown` resolves, then drain the
/// outbox once more and stop the worker.
pub async fn start_server<F>(
    listener: TcpListener,
    services: Services,
    config: &AppConfig,
    mailer: Arc<dyn Mailer>,
    shutdown: F,
) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let (worker_tx, worker_rx) = oneshot::channel();
    let worker = services.worker(config, mailer);
    let worker_handle = tokio::spawn(worker.run(config.poll_interval(), worker_rx));

    let addr = listener
        .local_addr()
        .context("Failed to read listener address")?;
    info!(%addr, "easydent API listening");

    let served = axum::serve(listener, services.router().into_make_service())
        .with_graceful_shutdown(shutdown)
        .await
        .context("API server failed");

    if worker_tx.send(()).is_err() {
        warn!("outbox worker already stopped");
    }
    if let Err(err) = worker_handle.await {
        warn!(error = %err, "outbox worker did not shut down cleanly");
    }
    info!("easydent API stopped");
    served
}

/// Bind the configured address and serve until Ctrl-C.
pub async fn run(config: AppConfig, mailer: Arc<dyn Mailer>) -> Result<()> {
    let addr = config.socket_addr()?;
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind to address: {}", addr))?;

    let shutdown = async {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("received Ctrl-C, shutting down"),
            Err(err) => {
                warn!(error = %err, "could not listen for Ctrl-C; serving until killed");
                std::future::pending::<()>().await
            }
        }
    };
    start_server(listener, Services::new(), &config, mailer, shutdown).await
}
