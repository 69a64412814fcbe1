use std::sync::Arc;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use shared::{
    domain::{Account, AccountId, Chat, ChatId, CurrentUser, Message},
    error::ApiErrorBody,
    protocol::{
        AuthRequest, AuthResponse, CreateAccountRequest, CredentialForm, RegisterRequest,
        TokenResponse,
    },
};
use tracing::{debug, warn};
use url::Url;

use crate::{
    error::{ClientError, Result},
    session::Session,
};

/// Every remote operation the client consumes.
///
/// Implementations report an authorization rejection of the session token as
/// [`ClientError::Unauthorized`] and never act on it themselves; see
/// [`crate::SessionGuard`].
#[async_trait]
pub trait ApiGateway: Send + Sync {
    async fn register(&self, email: &str, password: &str) -> Result<CurrentUser>;
    /// Exchanges credentials for a token. A refusal is
    /// [`ClientError::InvalidCredentials`], not a session rejection.
    async fn login(&self, username: &str, password: &str) -> Result<TokenResponse>;
    async fn current_user(&self) -> Result<CurrentUser>;
    async fn create_account(&self, phone_number: &str) -> Result<Account>;
    async fn list_accounts(&self) -> Result<Vec<Account>>;
    async fn delete_account(&self, account_id: AccountId) -> Result<bool>;
    async fn authenticate_account(&self, request: &AuthRequest) -> Result<AuthResponse>;
    async fn logout_account(&self, account_id: AccountId) -> Result<bool>;
    async fn list_chats(&self, account_id: AccountId) -> Result<Vec<Chat>>;
    async fn list_messages(&self, account_id: AccountId, chat_id: ChatId)
        -> Result<Vec<Message>>;
}

/// [`ApiGateway`] over HTTP with JSON bodies, attaching the current session
/// token as a bearer credential.
pub struct HttpGateway {
    http: Client,
    base_url: String,
    session: Arc<Session>,
}

impl HttpGateway {
    pub fn new(base_url: &str, session: Arc<Session>) -> Result<Self> {
        Self::with_client(Client::new(), base_url, session)
    }

    pub fn with_client(http: Client, base_url: &str, session: Arc<Session>) -> Result<Self> {
        let parsed = Url::parse(base_url.trim())
            .map_err(|err| ClientError::precondition(format!("invalid api url '{base_url}': {err}")))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(ClientError::precondition(format!(
                "unsupported api url scheme '{}'",
                parsed.scheme()
            )));
        }
        Ok(Self {
            http,
            base_url: parsed.as_str().trim_end_matches('/').to_string(),
            session,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    async fn send(&self, request: RequestBuilder) -> Result<Response> {
        let request = match self.session.token().await {
            Some(token) => request.bearer_auth(token),
            None => request,
        };
        let response = request.send().await.map_err(ClientError::from_reqwest)?;
        check_status(response).await
    }

    async fn send_json<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T> {
        self.send(request)
            .await?
            .json()
            .await
            .map_err(|err| ClientError::Decode(err.to_string()))
    }
}

async fn check_status(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    if status == StatusCode::UNAUTHORIZED {
        debug!(url = %response.url(), "gateway: authorization rejected");
        return Err(ClientError::Unauthorized);
    }
    let detail = error_detail(response).await;
    warn!(status = status.as_u16(), detail = ?detail, "gateway: request failed");
    Err(ClientError::Api {
        status: status.as_u16(),
        detail,
    })
}

async fn error_detail(response: Response) -> Option<String> {
    let raw = response.text().await.ok()?;
    ApiErrorBody::parse(&raw).and_then(|body| body.message().map(str::to_string))
}

#[async_trait]
impl ApiGateway for HttpGateway {
    async fn register(&self, email: &str, password: &str) -> Result<CurrentUser> {
        let body = RegisterRequest {
            email: email.to_string(),
            password: password.to_string(),
        };
        self.send_json(self.http.post(self.endpoint("/register")).json(&body))
            .await
    }

    async fn login(&self, username: &str, password: &str) -> Result<TokenResponse> {
        let form = CredentialForm {
            username: username.to_string(),
            password: password.to_string(),
        };
        let response = self
            .http
            .post(self.endpoint("/token"))
            .form(&form)
            .send()
            .await
            .map_err(ClientError::from_reqwest)?;
        let status = response.status();
        if status.is_success() {
            return response
                .json()
                .await
                .map_err(|err| ClientError::Decode(err.to_string()));
        }

        // Not a session rejection: there is no session yet.
        let detail = error_detail(response).await;
        match status.as_u16() {
            400 | 401 | 403 => Err(ClientError::InvalidCredentials(detail)),
            status => Err(ClientError::Api { status, detail }),
        }
    }

    async fn current_user(&self) -> Result<CurrentUser> {
        self.send_json(self.http.get(self.endpoint("/users/me")))
            .await
    }

    async fn create_account(&self, phone_number: &str) -> Result<Account> {
        let body = CreateAccountRequest {
            phone_number: phone_number.to_string(),
        };
        self.send_json(self.http.post(self.endpoint("/telegram-accounts")).json(&body))
            .await
    }

    async fn list_accounts(&self) -> Result<Vec<Account>> {
        self.send_json(self.http.get(self.endpoint("/telegram-accounts")))
            .await
    }

    async fn delete_account(&self, account_id: AccountId) -> Result<bool> {
        self.send_json(
            self.http
                .delete(self.endpoint(&format!("/telegram-accounts/{account_id}"))),
        )
        .await
    }

    async fn authenticate_account(&self, request: &AuthRequest) -> Result<AuthResponse> {
        self.send_json(
            self.http
                .post(self.endpoint(&format!(
                    "/telegram-accounts/{}/auth",
                    request.account_id
                )))
                .json(request),
        )
        .await
    }

    async fn logout_account(&self, account_id: AccountId) -> Result<bool> {
        self.send_json(
            self.http
                .post(self.endpoint(&format!("/telegram-accounts/{account_id}/logout"))),
        )
        .await
    }

    async fn list_chats(&self, account_id: AccountId) -> Result<Vec<Chat>> {
        self.send_json(
            self.http
                .get(self.endpoint(&format!("/telegram-accounts/{account_id}/chats"))),
        )
        .await
    }

    async fn list_messages(
        &self,
        account_id: AccountId,
        chat_id: ChatId,
    ) -> Result<Vec<Message>> {
        self.send_json(self.http.get(self.endpoint(&format!(
            "/telegram-accounts/{account_id}/chats/{chat_id}/messages"
        ))))
        .await
    }
}

#[cfg(test)]
#[path = "tests/gateway_tests.rs"]
mod tests;
