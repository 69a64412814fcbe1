use std::sync::Arc;

use anyhow::Result as AnyResult;
use async_trait::async_trait;
use jsonwebtoken::{DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use storage::Storage;
use tokio::sync::{broadcast, Mutex, RwLock};
use tracing::{info, warn};

use crate::{
    error::{ClientError, Result},
    ClientEvent,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Unauthenticated,
    Authenticated,
}

/// Where the session token lives between process runs.
#[async_trait]
pub trait TokenStore: Send + Sync {
    async fn load(&self) -> AnyResult<Option<String>>;
    async fn save(&self, token: &str) -> AnyResult<()>;
    async fn clear(&self) -> AnyResult<()>;
}

#[async_trait]
impl TokenStore for Storage {
    async fn load(&self) -> AnyResult<Option<String>> {
        self.load_session_token().await
    }

    async fn save(&self, token: &str) -> AnyResult<()> {
        self.save_session_token(token).await
    }

    async fn clear(&self) -> AnyResult<()> {
        self.clear_session_token().await
    }
}

/// Process-local token store; nothing survives a restart.
#[derive(Default)]
pub struct MemoryTokenStore {
    token: Mutex<Option<String>>,
}

impl MemoryTokenStore {
    pub fn with_token(token: impl Into<String>) -> Self {
        Self {
            token: Mutex::new(Some(token.into())),
        }
    }
}

#[async_trait]
impl TokenStore for MemoryTokenStore {
    async fn load(&self) -> AnyResult<Option<String>> {
        Ok(self.token.lock().await.clone())
    }

    async fn save(&self, token: &str) -> AnyResult<()> {
        *self.token.lock().await = Some(token.to_string());
        Ok(())
    }

    async fn clear(&self) -> AnyResult<()> {
        self.token.lock().await.take();
        Ok(())
    }
}

/// Unverified view of the token payload, for display only. The backend alone
/// decides whether a token is still valid.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenClaims {
    #[serde(default)]
    pub sub: Option<String>,
    #[serde(default)]
    pub exp: Option<i64>,
}

impl TokenClaims {
    pub fn decode(token: &str) -> Option<Self> {
        let mut validation = Validation::default();
        validation.insecure_disable_signature_validation();
        validation.validate_exp = false;
        validation.validate_aud = false;
        validation.required_spec_claims.clear();
        jsonwebtoken::decode::<Self>(token, &DecodingKey::from_secret(&[]), &validation)
            .ok()
            .map(|data| data.claims)
    }

    pub fn is_expired_at(&self, unix_seconds: i64) -> bool {
        self.exp.is_some_and(|exp| exp <= unix_seconds)
    }
}

/// The client's own bearer token.
///
/// Holds at most one token. Every mutation (sign-in, sign-out, server
/// rejection) leaves it either present or absent, and the persisted copy is
/// updated under the same write lock so readers never observe the two out of
/// step.
pub struct Session {
    token: RwLock<Option<String>>,
    store: Arc<dyn TokenStore>,
    events: broadcast::Sender<ClientEvent>,
}

impl Session {
    pub fn new(store: Arc<dyn TokenStore>) -> Arc<Self> {
        let (events, _) = broadcast::channel(64);
        Arc::new(Self {
            token: RwLock::new(None),
            store,
            events,
        })
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<ClientEvent> {
        self.events.subscribe()
    }

    pub async fn token(&self) -> Option<String> {
        self.token.read().await.clone()
    }

    pub async fn state(&self) -> SessionState {
        if self.token.read().await.is_some() {
            SessionState::Authenticated
        } else {
            SessionState::Unauthenticated
        }
    }

    pub async fn is_authenticated(&self) -> bool {
        self.state().await == SessionState::Authenticated
    }

    pub async fn claims(&self) -> Option<TokenClaims> {
        self.token
            .read()
            .await
            .as_deref()
            .and_then(TokenClaims::decode)
    }

    pub(crate) async fn persisted_token(&self) -> Result<Option<String>> {
        self.store.load().await.map_err(ClientError::Storage)
    }

    /// Stores a freshly issued token, replacing any previous one. Nothing
    /// changes if the token cannot be persisted.
    pub(crate) async fn establish(&self, token: String) -> Result<()> {
        {
            let mut guard = self.token.write().await;
            self.store.save(&token).await.map_err(ClientError::Storage)?;
            *guard = Some(token);
        }
        let _ = self
            .events
            .send(ClientEvent::SessionChanged(SessionState::Authenticated));
        Ok(())
    }

    /// Makes an already persisted token current so it can be validated.
    pub(crate) async fn adopt(&self, token: String) {
        *self.token.write().await = Some(token);
    }

    pub(crate) fn announce_authenticated(&self) {
        let _ = self
            .events
            .send(ClientEvent::SessionChanged(SessionState::Authenticated));
    }

    /// Drops the token from memory and from the store. Always succeeds; a
    /// store failure is logged and the in-memory token is gone regardless.
    pub async fn invalidate(&self) {
        let had_token = {
            let mut guard = self.token.write().await;
            let had_token = guard.take().is_some();
            if let Err(error) = self.store.clear().await {
                warn!(%error, "session: failed to clear persisted token");
            }
            had_token
        };
        if had_token {
            let _ = self
                .events
                .send(ClientEvent::SessionChanged(SessionState::Unauthenticated));
        }
    }

    /// Server-side rejection of the token: clear it and send the user back to
    /// the login entry point.
    pub(crate) async fn reject(&self) {
        info!("session: token rejected by server; returning to login");
        self.invalidate().await;
        let _ = self.events.send(ClientEvent::LoginRequired);
    }
}
