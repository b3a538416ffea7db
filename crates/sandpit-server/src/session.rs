//! Per-client saved editor sessions
//!
//! Clients are identified by their normalized IP address; each client has at
//! most one session, overwritten on every save.

use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::debug;

/// Language recorded when a save does not name one
pub const DEFAULT_SESSION_LANGUAGE: &str = "python";

/// Code shown to clients that have no saved session yet
pub const DEFAULT_CODE: &str = "# Welcome to Python Sandbox\ndef hello_world():\n    print(\"Hello, Sandbox World!\")\n\nhello_world()";

/// A client's saved editor contents
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub ip_address: String,
    pub code: String,
    pub language: String,
    pub last_modified: DateTime<Utc>,
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("session store unavailable: {0}")]
    Unavailable(String),
}

/// Storage for sessions keyed by client identity
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Create or replace the session for `client`
    async fn save(
        &self,
        client: &str,
        code: String,
        language: Option<String>,
    ) -> Result<Session, SessionError>;

    async fn load(&self, client: &str) -> Result<Option<Session>, SessionError>;
}

/// Process-local session store
#[derive(Debug, Default)]
pub struct InMemorySessionStore {
    sessions: RwLock<HashMap<String, Session>>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn save(
        &self,
        client: &str,
        code: String,
        language: Option<String>,
    ) -> Result<Session, SessionError> {
        let ip_address = normalize_ip(client);
        let session = Session {
            ip_address: ip_address.clone(),
            code,
            language: language.unwrap_or_else(|| DEFAULT_SESSION_LANGUAGE.to_owned()),
            last_modified: Utc::now(),
        };
        self.sessions
            .write()
            .await
            .insert(ip_address, session.clone());
        debug!(client = %session.ip_address, "saved session");
        Ok(session)
    }

    async fn load(&self, client: &str) -> Result<Option<Session>, SessionError> {
        let sessions = self.sessions.read().await;
        Ok(sessions.get(&normalize_ip(client)).cloned())
    }
}

/// Canonical form of a client address
///
/// IPv6 loopback becomes `127.0.0.1`, IPv4-mapped IPv6 addresses become plain
/// IPv4, and ports are dropped. Anything unparseable is kept as given.
pub fn normalize_ip(raw: &str) -> String {
    let raw = raw.trim();
    let ip = raw
        .parse::<IpAddr>()
        .ok()
        .or_else(|| raw.parse::<SocketAddr>().ok().map(|addr| addr.ip()));

    match ip {
        Some(IpAddr::V6(v6)) if v6.is_loopback() => "127.0.0.1".to_owned(),
        Some(IpAddr::V6(v6)) => match v6.to_ipv4_mapped() {
            Some(v4) => v4.to_string(),
            None => v6.to_string(),
        },
        Some(IpAddr::V4(v4)) => v4.to_string(),
        None => raw.to_owned(),
    }
}
