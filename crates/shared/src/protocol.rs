use serde::{Deserialize, Serialize};

use crate::domain::{Account, AccountId};

/// Stage of an account's login sequence as reported by the backend.
///
/// The backend alone decides which stages an account goes through; clients
/// must not assume a password stage follows the code stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthStep {
    CodeNeeded,
    PasswordNeeded,
    Success,
    Failed,
}

impl AuthStep {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::CodeNeeded => "code_needed",
            Self::PasswordNeeded => "password_needed",
            Self::Success => "success",
            Self::Failed => "failed",
        }
    }
}

impl std::fmt::Display for AuthStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Body of `POST /telegram-accounts/{id}/auth`. Exactly one of the optional
/// fields is set per request.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthRequest {
    pub account_id: AccountId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone_number: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verification_code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
}

impl AuthRequest {
    pub fn phone(account: &Account) -> Self {
        Self {
            account_id: account.id,
            phone_number: Some(account.phone_number.clone()),
            verification_code: None,
            password: None,
        }
    }

    pub fn code(account_id: AccountId, code: impl Into<String>) -> Self {
        Self {
            account_id,
            phone_number: None,
            verification_code: Some(code.into()),
            password: None,
        }
    }

    pub fn password(account_id: AccountId, password: impl Into<String>) -> Self {
        Self {
            account_id,
            phone_number: None,
            verification_code: None,
            password: Some(password.into()),
        }
    }
}

impl std::fmt::Debug for AuthRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthRequest")
            .field("account_id", &self.account_id)
            .field("phone_number", &self.phone_number)
            .field(
                "verification_code",
                &self.verification_code.as_ref().map(|_| "<redacted>"),
            )
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub account_id: Option<AccountId>,
    pub auth_step: AuthStep,
    #[serde(default)]
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateAccountRequest {
    pub phone_number: String,
}

/// Form body of `POST /token`.
#[derive(Clone, Serialize, Deserialize)]
pub struct CredentialForm {
    pub username: String,
    pub password: String,
}

#[derive(Clone, Serialize, Deserialize)]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
}

#[derive(Clone, Serialize, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_type: Option<String>,
}

impl std::fmt::Debug for TokenResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenResponse")
            .field("access_token", &"<redacted>")
            .field("token_type", &self.token_type)
            .finish()
    }
}
