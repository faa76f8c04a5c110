pub mod handlers;
pub mod types;

use crate::account::RegistrationService;
use axum::{
    routing::{get, post},
    Router,
};
use std::future::Future;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

#[derive(Clone)]
pub struct RpcState {
    pub registration: RegistrationService,
}

/// Build the HTTP router. Exactly one handler is bound to `/signup`.
pub fn router(state: RpcState, permissive_cors: bool) -> Router {
    let app = Router::new()
        .route("/signup", post(handlers::handle_signup))
        .route("/health", get(handlers::handle_health))
        .layer(TraceLayer::new_for_http());

    let app = if permissive_cors {
        app.layer(CorsLayer::permissive())
    } else {
        app
    };

    app.with_state(state)
}

pub struct RpcServer {
    state: RpcState,
    bind_addr: String,
    permissive_cors: bool,
}

impl RpcServer {
    pub fn new(
        registration: RegistrationService,
        host: &str,
        port: u16,
        permissive_cors: bool,
    ) -> Self {
        Self {
            state: RpcState { registration },
            bind_addr: format!("{}:{}", host, port),
            permissive_cors,
        }
    }

    /// Serve until `shutdown` resolves, then let in-flight requests finish.
    pub async fn start<F>(self, shutdown: F) -> std::io::Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let app = router(self.state, self.permissive_cors);

        let listener = tokio::net::TcpListener::bind(&self.bind_addr).await?;

        info!("HTTP server listening on {}", listener.local_addr()?);
        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown)
            .await
    }
}

/// Resolves on Ctrl-C, or SIGTERM on unix.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl-C: {}", e);
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
                tracing::error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received");
}
