use std::sync::Arc;

use shared::domain::{Account, AccountId, Chat};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::{
    error::{ClientError, Result},
    gateway::ApiGateway,
};

#[derive(Default)]
struct AccountStoreState {
    accounts: Vec<Account>,
    selected: Option<AccountId>,
}

impl AccountStoreState {
    fn selected_account(&self) -> Option<&Account> {
        let selected = self.selected?;
        self.accounts.iter().find(|account| account.id == selected)
    }
}

/// Ordered list of known accounts plus the current selection.
pub struct AccountStore {
    gateway: Arc<dyn ApiGateway>,
    state: RwLock<AccountStoreState>,
}

impl AccountStore {
    pub fn new(gateway: Arc<dyn ApiGateway>) -> Self {
        Self {
            gateway,
            state: RwLock::new(AccountStoreState::default()),
        }
    }

    pub async fn accounts(&self) -> Vec<Account> {
        self.state.read().await.accounts.clone()
    }

    pub async fn get(&self, account_id: AccountId) -> Option<Account> {
        self.state
            .read()
            .await
            .accounts
            .iter()
            .find(|account| account.id == account_id)
            .cloned()
    }

    pub async fn selected(&self) -> Option<Account> {
        self.state.read().await.selected_account().cloned()
    }

    pub async fn select(&self, account_id: AccountId) -> Result<Account> {
        let mut state = self.state.write().await;
        let account = state
            .accounts
            .iter()
            .find(|account| account.id == account_id)
            .cloned()
            .ok_or_else(|| ClientError::precondition(format!("unknown account {account_id}")))?;
        state.selected = Some(account_id);
        Ok(account)
    }

    /// Re-fetches the full list. Selects the first entry only when nothing
    /// is selected; an existing selection is never overridden. A selection
    /// whose account no longer exists counts as no selection.
    pub async fn refresh(&self) -> Result<Vec<Account>> {
        let accounts = self.gateway.list_accounts().await?;
        let mut state = self.state.write().await;
        state.accounts = accounts;
        if state.selected_account().is_none() {
            state.selected = state.accounts.first().map(|account| account.id);
        }
        debug!(
            count = state.accounts.len(),
            selected = ?state.selected,
            "accounts: refreshed"
        );
        Ok(state.accounts.clone())
    }

    pub async fn create(&self, phone_number: &str) -> Result<Account> {
        let phone_number = phone_number.trim();
        if phone_number.is_empty() {
            return Err(ClientError::precondition("phone number is required"));
        }
        let account = self.gateway.create_account(phone_number).await?;
        info!(account_id = account.id.0, "accounts: created account");
        let mut state = self.state.write().await;
        state.accounts.retain(|existing| existing.id != account.id);
        state.accounts.push(account.clone());
        Ok(account)
    }

    /// Deletes remotely, then locally. A removed selection moves to the new
    /// first entry, or to nothing.
    pub async fn remove(&self, account_id: AccountId) -> Result<()> {
        if !self.gateway.delete_account(account_id).await? {
            warn!(
                account_id = account_id.0,
                "accounts: backend reported nothing deleted"
            );
        }
        let mut state = self.state.write().await;
        state.accounts.retain(|account| account.id != account_id);
        if state.selected == Some(account_id) {
            state.selected = state.accounts.first().map(|account| account.id);
        }
        info!(account_id = account_id.0, "accounts: removed account");
        Ok(())
    }

    /// Deauthorizes the account remotely and reloads the list so
    /// `is_authorized` reflects the backend. Returns `false` when the backend
    /// had no active session for the account.
    pub async fn logout_account(&self, account_id: AccountId) -> Result<bool> {
        let logged_out = self.gateway.logout_account(account_id).await?;
        if logged_out {
            info!(account_id = account_id.0, "accounts: logged out account");
        } else {
            warn!(
                account_id = account_id.0,
                "accounts: backend had no active session to log out"
            );
        }
        self.refresh().await?;
        Ok(logged_out)
    }

    pub(crate) async fn mark_authorized(&self, account_id: AccountId) {
        let mut state = self.state.write().await;
        if let Some(account) = state
            .accounts
            .iter_mut()
            .find(|account| account.id == account_id)
        {
            account.is_authorized = true;
        }
    }

    /// Chats of the selected account. Fails without a network call when
    /// nothing is selected or the selection is not authorized.
    pub async fn chats_for_selected(&self) -> Result<Vec<Chat>> {
        let account = self
            .selected()
            .await
            .ok_or_else(|| ClientError::precondition("no account selected"))?;
        if !account.is_authorized {
            return Err(ClientError::precondition(format!(
                "account {} is not authorized",
                account.id
            )));
        }
        self.gateway.list_chats(account.id).await
    }
}

#[cfg(test)]
#[path = "tests/accounts_tests.rs"]
mod tests;
