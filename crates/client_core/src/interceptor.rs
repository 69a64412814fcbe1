use std::sync::Arc;

use async_trait::async_trait;
use shared::{
    domain::{Account, AccountId, Chat, ChatId, CurrentUser, Message},
    protocol::{AuthRequest, AuthResponse, TokenResponse},
};

use crate::{
    error::{ClientError, Result},
    gateway::ApiGateway,
    session::Session,
};

/// Wraps any [`ApiGateway`] so that an authorization rejection from any call
/// clears the session and requests navigation to login before the error is
/// handed back to the caller.
///
/// This is the only place a server rejection invalidates the session.
pub struct SessionGuard<G> {
    inner: G,
    session: Arc<Session>,
}

impl<G: ApiGateway> SessionGuard<G> {
    pub fn new(inner: G, session: Arc<Session>) -> Self {
        Self { inner, session }
    }

    pub fn inner(&self) -> &G {
        &self.inner
    }

    async fn intercept<T>(&self, result: Result<T>) -> Result<T> {
        if let Err(ClientError::Unauthorized) = &result {
            self.session.reject().await;
        }
        result
    }
}

#[async_trait]
impl<G: ApiGateway> ApiGateway for SessionGuard<G> {
    async fn register(&self, email: &str, password: &str) -> Result<CurrentUser> {
        self.intercept(self.inner.register(email, password).await)
            .await
    }

    async fn login(&self, username: &str, password: &str) -> Result<TokenResponse> {
        self.intercept(self.inner.login(username, password).await)
            .await
    }

    async fn current_user(&self) -> Result<CurrentUser> {
        self.intercept(self.inner.current_user().await).await
    }

    async fn create_account(&self, phone_number: &str) -> Result<Account> {
        self.intercept(self.inner.create_account(phone_number).await)
            .await
    }

    async fn list_accounts(&self) -> Result<Vec<Account>> {
        self.intercept(self.inner.list_accounts().await).await
    }

    async fn delete_account(&self, account_id: AccountId) -> Result<bool> {
        self.intercept(self.inner.delete_account(account_id).await)
            .await
    }

    async fn authenticate_account(&self, request: &AuthRequest) -> Result<AuthResponse> {
        self.intercept(self.inner.authenticate_account(request).await)
            .await
    }

    async fn logout_account(&self, account_id: AccountId) -> Result<bool> {
        self.intercept(self.inner.logout_account(account_id).await)
            .await
    }

    async fn list_chats(&self, account_id: AccountId) -> Result<Vec<Chat>> {
        self.intercept(self.inner.list_chats(account_id).await)
            .await
    }

    async fn list_messages(
        &self,
        account_id: AccountId,
        chat_id: ChatId,
    ) -> Result<Vec<Message>> {
        self.intercept(self.inner.list_messages(account_id, chat_id).await)
            .await
    }
}

#[cfg(test)]
#[path = "tests/interceptor_tests.rs"]
mod tests;
