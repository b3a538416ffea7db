//! HTTP API for the sandpit execution sandbox.
//!
//! Exposes code execution, the restricted shell gateway, per-client saved
//! sessions and AI code suggestions as JSON routes under `/api`.
//!
//! # Example
//!
//! ```no_run
//! # async fn example() -> std::io::Result<()> {
//! use sandpit::Sandbox;
//! use sandpit_server::{AppState, Settings};
//!
//! let state = AppState::new(Sandbox::with_defaults(), Settings::default());
//! let listener = tokio::net::TcpListener::bind("127.0.0.1:5000").await?;
//! sandpit_server::serve(listener, state).await
//! # }
//! ```

use std::net::SocketAddr;
use std::sync::Arc;

use sandpit::Sandbox;
use tokio::net::TcpListener;
use tracing::{info, warn};

pub use config::{ServerConfig, Settings, SuggestConfig};
pub use error::ApiError;
pub use routes::{TRUSTED_SHELL_PATH, router};
pub use session::{InMemorySessionStore, Session, SessionError, SessionStore, normalize_ip};
pub use suggest::{GroqClient, SuggestError, Suggestion, SuggestionService, Suggestions};

pub mod config;
pub mod error;
pub mod routes;
pub mod session;
pub mod suggest;

/// Shared state handed to every handler
#[derive(Clone)]
pub struct AppState {
    pub sandbox: Arc<Sandbox>,
    pub sessions: Arc<dyn SessionStore>,
    pub suggestions: Option<Arc<dyn SuggestionService>>,
    pub settings: Arc<Settings>,
}

impl AppState {
    /// State with an in-memory session store and no suggestion service
    pub fn new(sandbox: Sandbox, settings: Settings) -> Self {
        Self {
            sandbox: Arc::new(sandbox),
            sessions: Arc::new(InMemorySessionStore::new()),
            suggestions: None,
            settings: Arc::new(settings),
        }
    }

    pub fn with_suggestions(mut self, service: Arc<dyn SuggestionService>) -> Self {
        self.suggestions = Some(service);
        self
    }
}

/// Serve the API on `listener` until Ctrl-C
pub async fn serve(listener: TcpListener, state: AppState) -> std::io::Result<()> {
    if state.settings.server.expose_trusted_shell {
        warn!(
            "POST /api{TRUSTED_SHELL_PATH} is enabled and will run any command on this host"
        );
    }
    if let Ok(addr) = listener.local_addr() {
        info!(%addr, "listening");
    }

    let app = router(state);
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("shutting down");
}
