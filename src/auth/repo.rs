use async_trait::async_trait;
use sqlx::PgPool;
use time::OffsetDateTime;
use uuid::Uuid;

use super::model::{Account, AccountRow, NewAccount};
use crate::error::{AppError, AppResult};

pub const DUPLICATE_EMAIL: &str = "Email address is already in use";

const ACCOUNT_COLUMNS: &str = r#"
    id, name, email, photo, role, password_hash, password_changed_at,
    password_reset_token, password_reset_expires, failed_login_attempts,
    lock_until, created_at
"#;

/// Persistence of accounts for the auth flows.
#[async_trait]
pub trait AccountStore: Send + Sync {
    /// Fails with a validation error when the email is taken.
    async fn create(&self, account: NewAccount) -> AppResult<Account>;
    async fn find_by_email(&self, email: &str) -> AppResult<Option<Account>>;
    async fn find_by_id(&self, id: Uuid) -> AppResult<Option<Account>>;
    /// Account holding this reset-token digest with an expiry after `now`.
    async fn find_by_reset_token(
        &self,
        token_hash: &str,
        now: OffsetDateTime,
    ) -> AppResult<Option<Account>>;
    /// Writes only the failed-login counter and lock expiry of `account`.
    async fn record_login_failure(&self, account: &Account) -> AppResult<()>;
    /// Resets the failed-login counter; the lock expiry is left alone.
    async fn clear_login_failures(&self, id: Uuid) -> AppResult<()>;
    /// Writes only the password hash and its change timestamp.
    async fn save_password(&self, account: &Account) -> AppResult<()>;
    /// Writes only the reset-token digest and its expiry.
    async fn save_reset_token(&self, account: &Account) -> AppResult<()>;
}

#[derive(Clone)]
pub struct PgAccountStore {
    db: PgPool,
}

impl PgAccountStore {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

fn into_account(row: Option<AccountRow>) -> AppResult<Option<Account>> {
    row.map(Account::try_from).transpose().map_err(AppError::from)
}

#[async_trait]
impl AccountStore for PgAccountStore {
    async fn create(&self, account: NewAccount) -> AppResult<Account> {
        let row = sqlx::query_as::<_, AccountRow>(&format!(
            r#"
            INSERT INTO users (name, email, role, password_hash)
            VALUES ($1, $2, $3, $4)
            RETURNING {ACCOUNT_COLUMNS}
            "#
        ))
        .bind(&account.name)
        .bind(&account.email)
        .bind(account.role.as_str())
        .bind(&account.password_hash)
        .fetch_one(&self.db)
        .await
        .map_err(|e| {
            let duplicate = e
                .as_database_error()
                .map_or(false, |db| db.is_unique_violation());
            if duplicate {
                AppError::validation(DUPLICATE_EMAIL)
            } else {
                AppError::from(e)
            }
        })?;
        Ok(Account::try_from(row)?)
    }

    async fn find_by_email(&self, email: &str) -> AppResult<Option<Account>> {
        let row = sqlx::query_as::<_, AccountRow>(&format!(
            "SELECT {ACCOUNT_COLUMNS} FROM users WHERE email = $1"
        ))
        .bind(email)
        .fetch_optional(&self.db)
        .await?;
        into_account(row)
    }

    async fn find_by_id(&self, id: Uuid) -> AppResult<Option<Account>> {
        let row = sqlx::query_as::<_, AccountRow>(&format!(
            "SELECT {ACCOUNT_COLUMNS} FROM users WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.db)
        .await?;
        into_account(row)
    }

    async fn find_by_reset_token(
        &self,
        token_hash: &str,
        now: OffsetDateTime,
    ) -> AppResult<Option<Account>> {
        let row = sqlx::query_as::<_, AccountRow>(&format!(
            r#"
            SELECT {ACCOUNT_COLUMNS} FROM users
            WHERE password_reset_token = $1 AND password_reset_expires > $2
            "#
        ))
        .bind(token_hash)
        .bind(now)
        .fetch_optional(&self.db)
        .await?;
        into_account(row)
    }

    async fn record_login_failure(&self, account: &Account) -> AppResult<()> {
        sqlx::query(
            "UPDATE users SET failed_login_attempts = $2, lock_until = $3 WHERE id = $1",
        )
        .bind(account.id)
        .bind(account.failed_login_attempts)
        .bind(account.lock_until)
        .execute(&self.db)
        .await?;
        Ok(())
    }

    async fn clear_login_failures(&self, id: Uuid) -> AppResult<()> {
        sqlx::query("UPDATE users SET failed_login_attempts = NULL WHERE id = $1")
            .bind(id)
            .execute(&self.db)
            .await?;
        Ok(())
    }

    async fn save_password(&self, account: &Account) -> AppResult<()> {
        sqlx::query(
            r#"
            UPDATE users SET
                password_hash = $2,
                password_changed_at = $3,
                version = version + 1
            WHERE id = $1
            "#,
        )
        .bind(account.id)
        .bind(&account.password_hash)
        .bind(account.password_changed_at)
        .execute(&self.db)
        .await?;
        Ok(())
    }

    async fn save_reset_token(&self, account: &Account) -> AppResult<()> {
        sqlx::query(
            r#"
            UPDATE users SET
                password_reset_token = $2,
                password_reset_expires = $3
            WHERE id = $1
            "#,
        )
        .bind(account.id)
        .bind(&account.password_reset_token)
        .bind(account.password_reset_expires)
        .execute(&self.db)
        .await?;
        Ok(())
    }
}
