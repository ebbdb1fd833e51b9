use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use axum::response::IntoResponse;
use axum::routing::get;
use tokio::net::ToSocketAddrs;
use tokio_util::sync::CancellationToken;

use crate::targets::TargetStore;

async fn targets(store: State<Arc<TargetStore>>) -> impl IntoResponse {
    Json(store.groups())
}

async fn health() -> &'static str {
    "ok"
}

pub struct APIServer {
    router: axum::Router,
}

impl APIServer {
    pub fn new(store: Arc<TargetStore>) -> Self {
        let router = axum::Router::new()
            .route("/targets", get(targets))
            .route("/health", get(health))
            .with_state(store);
        Self { router }
    }

    /// Serves the API until `shutdown` is cancelled.
    pub async fn listen(
        self,
        addr: impl ToSocketAddrs,
        shutdown: CancellationToken,
    ) -> std::io::Result<()> {
        let listener = tokio::net::TcpListener::bind(addr).await?;
        log::info!("API listening on {}", listener.local_addr()?);
        axum::serve(listener, self.router.into_make_service())
            .with_graceful_shutdown(async move { shutdown.cancelled().await })
            .await
    }
}
