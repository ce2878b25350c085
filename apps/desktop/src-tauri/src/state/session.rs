//! # Session State
//!
//! The logged-in user. The token itself lives in the `ApiClient` (it goes
//! out on every request); this state keeps the decoded claims so commands
//! can check the role without touching the network.

use tokio::sync::broadcast::{self, error::RecvError};
use tokio::sync::RwLock;
use tracing::warn;

use crate::error::{ApiError, ApiResult};
use ecopila_sync::Session;

#[derive(Debug, Default)]
pub struct SessionState {
    session: RwLock<Option<Session>>,
}

impl SessionState {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn set(&self, session: Session) {
        *self.session.write().await = Some(session);
    }

    pub async fn clear(&self) {
        *self.session.write().await = None;
    }

    pub async fn current(&self) -> Option<Session> {
        self.session.read().await.clone()
    }

    /// The session, or `UNAUTHORIZED`.
    pub async fn require(&self) -> ApiResult<Session> {
        self.current().await.ok_or_else(ApiError::unauthorized)
    }

    /// The session of an admin, or `FORBIDDEN` (`UNAUTHORIZED` when nobody
    /// is logged in).
    pub async fn require_admin(&self) -> ApiResult<Session> {
        let session = self.require().await?;
        if !session.is_admin() {
            return Err(ApiError::forbidden());
        }
        Ok(session)
    }

    /// Drops the session every time the server answers 401/403, until the
    /// API client goes away.
    pub async fn expire_on_unauthorized(&self, mut rx: broadcast::Receiver<()>) {
        loop {
            match rx.recv().await {
                Ok(()) | Err(RecvError::Lagged(_)) => {
                    if self.session.write().await.take().is_some() {
                        warn!("Session rejected by the server, logged out");
                    }
                }
                Err(RecvError::Closed) => break,
            }
        }
    }
}
