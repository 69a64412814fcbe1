use std::sync::Arc;

use tokio::sync::broadcast;

pub mod accounts;
pub mod auth_flow;
pub mod error;
pub mod gateway;
pub mod interceptor;
pub mod session;
pub mod session_manager;

pub use accounts::AccountStore;
pub use auth_flow::{AuthFlow, AuthOrchestrator};
pub use error::{ClientError, Result};
pub use gateway::{ApiGateway, HttpGateway};
pub use interceptor::SessionGuard;
pub use session::{MemoryTokenStore, Session, SessionState, TokenClaims, TokenStore};
pub use session_manager::SessionManager;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientEvent {
    SessionChanged(SessionState),
    /// The backend rejected the session token; the front end must return to
    /// its login entry point.
    LoginRequired,
}

/// The core components wired together over one session and one gateway.
pub struct AppClient {
    pub session: Arc<Session>,
    pub gateway: Arc<dyn ApiGateway>,
    pub session_manager: SessionManager,
    pub accounts: Arc<AccountStore>,
    pub auth: AuthOrchestrator,
}

impl AppClient {
    pub fn new(api_url: &str, token_store: Arc<dyn TokenStore>) -> Result<Self> {
        let session = Session::new(token_store);
        let http = HttpGateway::new(api_url, session.clone())?;
        Ok(Self::with_gateway(session, http))
    }

    /// Wraps `gateway` in the session rejection guard and builds the
    /// components on top of it.
    pub fn with_gateway<G: ApiGateway + 'static>(session: Arc<Session>, gateway: G) -> Self {
        let gateway: Arc<dyn ApiGateway> = Arc::new(SessionGuard::new(gateway, session.clone()));
        let accounts = Arc::new(AccountStore::new(gateway.clone()));
        Self {
            session_manager: SessionManager::new(gateway.clone(), session.clone()),
            auth: AuthOrchestrator::new(gateway.clone(), accounts.clone()),
            accounts,
            gateway,
            session,
        }
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<ClientEvent> {
        self.session.subscribe_events()
    }
}

#[cfg(test)]
#[path = "tests/stub_backend.rs"]
mod stub_backend;

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
