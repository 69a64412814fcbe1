use std::sync::Arc;

use shared::{
    domain::Account,
    protocol::{AuthRequest, AuthResponse, AuthStep},
};
use tracing::{info, warn};

use crate::{
    accounts::AccountStore,
    error::{ClientError, Result},
    gateway::ApiGateway,
};

/// Where the single in-progress account login stands. Each state carries only
/// what is meaningful in it: a code is only held while a code is needed, a
/// password only while a password is needed.
#[derive(Clone, PartialEq, Eq, Default)]
pub enum AuthFlow {
    #[default]
    Idle,
    CodeNeeded {
        account: Account,
        message: String,
        verification_code: String,
    },
    PasswordNeeded {
        account: Account,
        message: String,
        two_factor_password: String,
    },
    Failed {
        account: Account,
        message: String,
    },
}

impl AuthFlow {
    /// `None` while idle.
    pub fn step(&self) -> Option<AuthStep> {
        match self {
            Self::Idle => None,
            Self::CodeNeeded { .. } => Some(AuthStep::CodeNeeded),
            Self::PasswordNeeded { .. } => Some(AuthStep::PasswordNeeded),
            Self::Failed { .. } => Some(AuthStep::Failed),
        }
    }

    pub fn account(&self) -> Option<&Account> {
        match self {
            Self::Idle => None,
            Self::CodeNeeded { account, .. }
            | Self::PasswordNeeded { account, .. }
            | Self::Failed { account, .. } => Some(account),
        }
    }

    pub fn message(&self) -> Option<&str> {
        match self {
            Self::Idle => None,
            Self::CodeNeeded { message, .. }
            | Self::PasswordNeeded { message, .. }
            | Self::Failed { message, .. } => Some(message),
        }
    }

    pub fn is_idle(&self) -> bool {
        matches!(self, Self::Idle)
    }

    fn describe(&self) -> &'static str {
        match self.step() {
            None => "idle",
            Some(step) => step.as_str(),
        }
    }
}

impl std::fmt::Debug for AuthFlow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => f.write_str("Idle"),
            Self::CodeNeeded {
                account,
                message,
                verification_code,
            } => f
                .debug_struct("CodeNeeded")
                .field("account_id", &account.id)
                .field("message", message)
                .field("has_code", &!verification_code.is_empty())
                .finish(),
            Self::PasswordNeeded {
                account,
                message,
                two_factor_password,
            } => f
                .debug_struct("PasswordNeeded")
                .field("account_id", &account.id)
                .field("message", message)
                .field("has_password", &!two_factor_password.is_empty())
                .finish(),
            Self::Failed { account, message } => f
                .debug_struct("Failed")
                .field("account_id", &account.id)
                .field("message", message)
                .finish(),
        }
    }
}

/// Mirrors an account's server-driven login sequence.
///
/// Operations take `&mut self`, so a submission can only be issued once the
/// previous response for the flow has been observed.
pub struct AuthOrchestrator {
    gateway: Arc<dyn ApiGateway>,
    accounts: Arc<AccountStore>,
    flow: AuthFlow,
}

impl AuthOrchestrator {
    pub fn new(gateway: Arc<dyn ApiGateway>, accounts: Arc<AccountStore>) -> Self {
        Self {
            gateway,
            accounts,
            flow: AuthFlow::Idle,
        }
    }

    pub fn flow(&self) -> &AuthFlow {
        &self.flow
    }

    /// Submits the account's phone number, abandoning whatever flow was in
    /// progress (no call is made for the abandoned account).
    pub async fn start(&mut self, account: Account) -> Result<AuthResponse> {
        self.flow = AuthFlow::Idle;
        info!(account_id = account.id.0, "auth: starting account login");

        match self
            .gateway
            .authenticate_account(&AuthRequest::phone(&account))
            .await
        {
            Ok(response) => {
                self.apply(account, &response).await;
                Ok(response)
            }
            Err(ClientError::Unauthorized) => Err(ClientError::Unauthorized),
            Err(err) => {
                warn!(account_id = account.id.0, error = %err, "auth: start failed");
                self.flow = AuthFlow::Failed {
                    account,
                    message: err.user_message("Failed to start authentication"),
                };
                Err(err)
            }
        }
    }

    pub fn set_verification_code(&mut self, code: &str) -> Result<()> {
        self.stage_code(code).map(|_| ())
    }

    pub fn set_two_factor_password(&mut self, password: &str) -> Result<()> {
        self.stage_password(password).map(|_| ())
    }

    fn stage_code(&mut self, code: &str) -> Result<Account> {
        match &mut self.flow {
            AuthFlow::CodeNeeded {
                account,
                verification_code,
                ..
            } => {
                *verification_code = code.to_string();
                Ok(account.clone())
            }
            other => Err(ClientError::precondition(format!(
                "no verification code is expected while {}",
                other.describe()
            ))),
        }
    }

    fn stage_password(&mut self, password: &str) -> Result<Account> {
        match &mut self.flow {
            AuthFlow::PasswordNeeded {
                account,
                two_factor_password,
                ..
            } => {
                *two_factor_password = password.to_string();
                Ok(account.clone())
            }
            other => Err(ClientError::precondition(format!(
                "no two-factor password is expected while {}",
                other.describe()
            ))),
        }
    }

    /// Valid only while a code is needed; otherwise fails without a network
    /// call.
    pub async fn submit_code(&mut self, code: &str) -> Result<AuthResponse> {
        let account = self.stage_code(code)?;
        if code.trim().is_empty() {
            return Err(ClientError::precondition("verification code is required"));
        }
        let request = AuthRequest::code(account.id, code.trim());
        self.advance(account, request, "Failed to verify code").await
    }

    /// Valid only while a password is needed; otherwise fails without a
    /// network call.
    pub async fn submit_password(&mut self, password: &str) -> Result<AuthResponse> {
        let account = self.stage_password(password)?;
        if password.is_empty() {
            return Err(ClientError::precondition("two-factor password is required"));
        }
        let request = AuthRequest::password(account.id, password);
        self.advance(account, request, "Failed to verify password")
            .await
    }

    /// Local discard only; the backend is not told.
    pub fn cancel(&mut self) {
        if let Some(account) = self.flow.account() {
            info!(account_id = account.id.0, "auth: flow cancelled");
        }
        self.flow = AuthFlow::Idle;
    }

    async fn advance(
        &mut self,
        account: Account,
        request: AuthRequest,
        fallback: &str,
    ) -> Result<AuthResponse> {
        match self.gateway.authenticate_account(&request).await {
            Ok(response) => {
                self.apply(account, &response).await;
                Ok(response)
            }
            Err(ClientError::Unauthorized) => {
                self.flow = AuthFlow::Idle;
                Err(ClientError::Unauthorized)
            }
            Err(err) => {
                // the step stays put so the same submission can be retried
                warn!(
                    account_id = account.id.0,
                    step = self.flow.describe(),
                    error = %err,
                    "auth: {}",
                    fallback
                );
                Err(err)
            }
        }
    }

    async fn apply(&mut self, account: Account, response: &AuthResponse) {
        info!(
            account_id = account.id.0,
            step = %response.auth_step,
            "auth: server reported step"
        );
        let message = response.message.clone();
        match response.auth_step {
            AuthStep::CodeNeeded => {
                self.flow = AuthFlow::CodeNeeded {
                    account,
                    message,
                    verification_code: String::new(),
                };
            }
            AuthStep::PasswordNeeded => {
                self.flow = AuthFlow::PasswordNeeded {
                    account,
                    message,
                    two_factor_password: String::new(),
                };
            }
            AuthStep::Failed => {
                self.flow = AuthFlow::Failed { account, message };
            }
            AuthStep::Success => {
                self.flow = AuthFlow::Idle;
                self.accounts.mark_authorized(account.id).await;
                if let Err(error) = self.accounts.refresh().await {
                    warn!(
                        account_id = account.id.0,
                        %error,
                        "auth: account refresh after login failed"
                    );
                }
            }
        }
    }
}

#[cfg(test)]
#[path = "tests/auth_flow_tests.rs"]
mod tests;
