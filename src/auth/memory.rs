use std::collections::HashMap;

use async_trait::async_trait;
use time::OffsetDateTime;
use tokio::sync::Mutex as TokioMutex;
use uuid::Uuid;

use super::{
    model::{Account, NewAccount, DEFAULT_PHOTO},
    repo::{AccountStore, DUPLICATE_EMAIL},
};
use crate::error::{AppError, AppResult};

/// In-memory account storage (useful for testing)
#[derive(Default)]
pub struct MemoryAccountStore {
    accounts: TokioMutex<HashMap<Uuid, Account>>,
}

impl MemoryAccountStore {
    pub fn new() -> Self {
        Self::default()
    }

    async fn update(&self, id: Uuid, apply: impl FnOnce(&mut Account)) -> AppResult<()> {
        let mut accounts = self.accounts.lock().await;
        let stored = accounts
            .get_mut(&id)
            .ok_or_else(|| AppError::not_found("No account found with that ID"))?;
        apply(stored);
        Ok(())
    }
}

#[async_trait]
impl AccountStore for MemoryAccountStore {
    async fn create(&self, account: NewAccount) -> AppResult<Account> {
        let mut accounts = self.accounts.lock().await;
        if accounts.values().any(|a| a.email == account.email) {
            return Err(AppError::validation(DUPLICATE_EMAIL));
        }
        let created = Account {
            id: Uuid::new_v4(),
            name: account.name,
            email: account.email,
            photo: DEFAULT_PHOTO.to_string(),
            role: account.role,
            password_hash: account.password_hash,
            password_changed_at: None,
            password_reset_token: None,
            password_reset_expires: None,
            failed_login_attempts: None,
            lock_until: None,
            created_at: OffsetDateTime::now_utc(),
        };
        accounts.insert(created.id, created.clone());
        Ok(created)
    }

    async fn find_by_email(&self, email: &str) -> AppResult<Option<Account>> {
        let accounts = self.accounts.lock().await;
        Ok(accounts.values().find(|a| a.email == email).cloned())
    }

    async fn find_by_id(&self, id: Uuid) -> AppResult<Option<Account>> {
        Ok(self.accounts.lock().await.get(&id).cloned())
    }

    async fn find_by_reset_token(
        &self,
        token_hash: &str,
        now: OffsetDateTime,
    ) -> AppResult<Option<Account>> {
        let accounts = self.accounts.lock().await;
        Ok(accounts
            .values()
            .find(|a| a.reset_token_matches(token_hash, now))
            .cloned())
    }

    async fn record_login_failure(&self, account: &Account) -> AppResult<()> {
        self.update(account.id, |stored| {
            stored.failed_login_attempts = account.failed_login_attempts;
            stored.lock_until = account.lock_until;
        })
        .await
    }

    async fn clear_login_failures(&self, id: Uuid) -> AppResult<()> {
        self.update(id, |stored| stored.failed_login_attempts = None).await
    }

    async fn save_password(&self, account: &Account) -> AppResult<()> {
        self.update(account.id, |stored| {
            stored.password_hash = account.password_hash.clone();
            stored.password_changed_at = account.password_changed_at;
        })
        .await
    }

    async fn save_reset_token(&self, account: &Account) -> AppResult<()> {
        self.update(account.id, |stored| {
            stored.password_reset_token = account.password_reset_token.clone();
            stored.password_reset_expires = account.password_reset_expires;
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::model::Role;

    fn new_account(email: &str) -> NewAccount {
        NewAccount {
            name: "Test".into(),
            email: email.into(),
            role: Role::User,
            password_hash: "hash".into(),
        }
    }

    #[tokio::test]
    async fn create_enforces_unique_email() {
        let store = MemoryAccountStore::new();
        store.create(new_account("a@example.com")).await.unwrap();
        let err = store.create(new_account("a@example.com")).await.unwrap_err();
        assert_eq!(err.to_string(), DUPLICATE_EMAIL);
    }

    #[tokio::test]
    async fn login_state_writes_leave_credentials_alone() {
        let store = MemoryAccountStore::new();
        let stale = store.create(new_account("b@example.com")).await.unwrap();

        let mut changed = stale.clone();
        changed.set_password_hash("new-hash".into(), OffsetDateTime::now_utc());
        store.save_password(&changed).await.unwrap();

        let mut failed = stale.clone();
        failed.register_failed_login(OffsetDateTime::now_utc());
        failed.password_reset_token = Some("digest".into());
        store.record_login_failure(&failed).await.unwrap();

        let found = store.find_by_email("b@example.com").await.unwrap().unwrap();
        assert_eq!(found.failed_login_attempts, Some(1));
        assert_eq!(found.password_hash, "new-hash");
        assert_eq!(found.password_changed_at, changed.password_changed_at);
        assert!(found.password_reset_token.is_none());

        store.clear_login_failures(stale.id).await.unwrap();
        let found = store.find_by_id(stale.id).await.unwrap().unwrap();
        assert_eq!(found.failed_login_attempts, None);
        assert_eq!(found.password_hash, "new-hash");
    }

    #[tokio::test]
    async fn writes_to_unknown_accounts_are_not_found() {
        let store = MemoryAccountStore::new();
        let err = store.clear_login_failures(Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }
}
