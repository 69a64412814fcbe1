use std::sync::Arc;

use shared::domain::CurrentUser;
use tracing::{info, warn};

use crate::{
    error::{ClientError, Result},
    gateway::ApiGateway,
    session::{Session, SessionState},
};

/// Drives the session token through
/// `unauthenticated -> authenticated -> unauthenticated`.
pub struct SessionManager {
    gateway: Arc<dyn ApiGateway>,
    session: Arc<Session>,
}

impl SessionManager {
    pub fn new(gateway: Arc<dyn ApiGateway>, session: Arc<Session>) -> Self {
        Self { gateway, session }
    }

    pub fn session(&self) -> &Arc<Session> {
        &self.session
    }

    /// Creates a client user. Does not sign in.
    pub async fn register(&self, email: &str, password: &str) -> Result<CurrentUser> {
        let user = self.gateway.register(email, password).await?;
        info!(email, "session: registered user");
        Ok(user)
    }

    pub async fn login(&self, identifier: &str, secret: &str) -> Result<String> {
        let response = self.gateway.login(identifier, secret).await.map_err(|err| {
            warn!(error = %err, "session: credential login failed");
            err
        })?;
        if response.access_token.trim().is_empty() {
            return Err(ClientError::Decode(
                "token endpoint returned an empty access_token".to_string(),
            ));
        }
        self.session
            .establish(response.access_token.clone())
            .await?;
        info!("session: signed in");
        Ok(response.access_token)
    }

    /// Startup gate: validates a previously stored token against the backend.
    /// Any failure discards the token and leaves the session unauthenticated.
    pub async fn restore(&self) -> SessionState {
        let token = match self.session.persisted_token().await {
            Ok(Some(token)) => token,
            Ok(None) => return SessionState::Unauthenticated,
            Err(error) => {
                warn!(%error, "session: could not read stored token");
                self.session.invalidate().await;
                return SessionState::Unauthenticated;
            }
        };

        self.session.adopt(token).await;
        match self.gateway.current_user().await {
            Ok(user) => {
                info!(email = ?user.email, "session: restored stored token");
                self.session.announce_authenticated();
                SessionState::Authenticated
            }
            Err(error) => {
                warn!(%error, "session: stored token failed validation; discarding");
                self.session.invalidate().await;
                SessionState::Unauthenticated
            }
        }
    }

    pub async fn logout(&self) {
        self.session.invalidate().await;
        info!("session: signed out");
    }

    pub async fn current_user(&self) -> Result<CurrentUser> {
        self.gateway.current_user().await
    }
}

#[cfg(test)]
#[path = "tests/session_manager_tests.rs"]
mod tests;
