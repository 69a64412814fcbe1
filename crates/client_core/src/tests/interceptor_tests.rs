use super::*;
use crate::{
    session::{MemoryTokenStore, SessionState, TokenStore},
    ClientEvent,
};
use std::sync::atomic::{AtomicUsize, Ordering};

/// Fails every call with a fresh copy of one error.
struct FailingGateway {
    error: fn() -> ClientError,
    calls: AtomicUsize,
}

impl FailingGateway {
    fn new(error: fn() -> ClientError) -> Self {
        Self {
            error,
            calls: AtomicUsize::new(0),
        }
    }

    fn fail<T>(&self) -> Result<T> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err((self.error)())
    }
}

#[async_trait]
impl ApiGateway for FailingGateway {
    async fn register(&self, _email: &str, _password: &str) -> Result<CurrentUser> {
        self.fail()
    }
    async fn login(&self, _username: &str, _password: &str) -> Result<TokenResponse> {
        self.fail()
    }
    async fn current_user(&self) -> Result<CurrentUser> {
        self.fail()
    }
    async fn create_account(&self, _phone_number: &str) -> Result<Account> {
        self.fail()
    }
    async fn list_accounts(&self) -> Result<Vec<Account>> {
        self.fail()
    }
    async fn delete_account(&self, _account_id: AccountId) -> Result<bool> {
        self.fail()
    }
    async fn authenticate_account(&self, _request: &AuthRequest) -> Result<AuthResponse> {
        self.fail()
    }
    async fn logout_account(&self, _account_id: AccountId) -> Result<bool> {
        self.fail()
    }
    async fn list_chats(&self, _account_id: AccountId) -> Result<Vec<Chat>> {
        self.fail()
    }
    async fn list_messages(&self, _account_id: AccountId, _chat_id: ChatId) -> Result<Vec<Message>> {
        self.fail()
    }
}

async fn signed_in_session(store: Arc<MemoryTokenStore>) -> Arc<Session> {
    let session = Session::new(store);
    session
        .establish("token-a".to_string())
        .await
        .expect("establish");
    session
}

#[tokio::test]
async fn unauthorized_clears_session_and_requests_login() {
    let store = Arc::new(MemoryTokenStore::default());
    let session = signed_in_session(store.clone()).await;
    let mut events = session.subscribe_events();
    let guard = SessionGuard::new(FailingGateway::new(|| ClientError::Unauthorized), session.clone());

    let err = guard.list_chats(AccountId(1)).await.expect_err("rejected");

    assert!(err.is_unauthorized());
    assert_eq!(session.token().await, None);
    assert_eq!(store.load().await.expect("load"), None);
    assert_eq!(
        events.recv().await.expect("event"),
        ClientEvent::SessionChanged(SessionState::Unauthenticated)
    );
    assert_eq!(events.recv().await.expect("event"), ClientEvent::LoginRequired);
    assert_eq!(guard.inner().calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn other_failures_leave_the_session_alone() {
    let store = Arc::new(MemoryTokenStore::default());
    let session = signed_in_session(store.clone()).await;
    let mut events = session.subscribe_events();
    let guard = SessionGuard::new(
        FailingGateway::new(|| ClientError::Api {
            status: 500,
            detail: Some("boom".to_string()),
        }),
        session.clone(),
    );

    guard.list_accounts().await.expect_err("server error");
    guard
        .authenticate_account(&AuthRequest::code(AccountId(1), "12345"))
        .await
        .expect_err("server error");
    let invalid = SessionGuard::new(
        FailingGateway::new(|| ClientError::InvalidCredentials(None)),
        session.clone(),
    );
    invalid.login("a@b.c", "nope").await.expect_err("refused");

    assert_eq!(session.token().await.as_deref(), Some("token-a"));
    assert_eq!(store.load().await.expect("load").as_deref(), Some("token-a"));
    assert!(events.try_recv().is_err());
}

#[tokio::test]
async fn rejection_without_a_token_still_requests_login() {
    let session = Session::new(Arc::new(MemoryTokenStore::default()));
    let mut events = session.subscribe_events();
    let guard = SessionGuard::new(FailingGateway::new(|| ClientError::Unauthorized), session.clone());

    guard.current_user().await.expect_err("rejected");

    assert_eq!(events.recv().await.expect("event"), ClientEvent::LoginRequired);
    assert!(events.try_recv().is_err());
}
