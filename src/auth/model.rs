use std::{fmt, str::FromStr};

use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use sqlx::FromRow;
use time::{Duration, OffsetDateTime};
use uuid::Uuid;

/// Failed attempts tolerated before the account is locked.
pub const MAX_FAILED_LOGINS: i32 = 3;
pub const LOCK_DURATION: Duration = Duration::hours(1);
pub const RESET_TOKEN_TTL: Duration = Duration::minutes(10);
/// Password changes are recorded this far in the past so a token issued in the
/// same request is not considered stale.
pub const PASSWORD_CHANGE_SKEW: Duration = Duration::seconds(1);
pub const DEFAULT_PHOTO: &str = "default.jpg";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Role {
    User,
    Guide,
    LeadGuide,
    Admin,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Guide => "guide",
            Role::LeadGuide => "lead-guide",
            Role::Admin => "admin",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(Role::User),
            "guide" => Ok(Role::Guide),
            "lead-guide" => Ok(Role::LeadGuide),
            "admin" => Ok(Role::Admin),
            other => anyhow::bail!("unknown role {other:?}"),
        }
    }
}

/// An identity able to authenticate.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Account {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub photo: String,
    pub role: Role,
    #[serde(skip_serializing)]
    pub password_hash: String,
    #[serde(skip_serializing)]
    pub password_changed_at: Option<OffsetDateTime>,
    #[serde(skip_serializing)]
    pub password_reset_token: Option<String>,
    #[serde(skip_serializing)]
    pub password_reset_expires: Option<OffsetDateTime>,
    #[serde(skip_serializing)]
    pub failed_login_attempts: Option<i32>,
    #[serde(skip_serializing)]
    pub lock_until: Option<OffsetDateTime>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

impl Account {
    pub fn is_locked(&self, now: OffsetDateTime) -> bool {
        matches!(self.lock_until, Some(until) if until > now)
    }

    /// Counts a wrong password; past the threshold the account locks for an hour.
    pub fn register_failed_login(&mut self, now: OffsetDateTime) {
        let attempts = self.failed_login_attempts.unwrap_or(0) + 1;
        self.failed_login_attempts = Some(attempts);
        if attempts > MAX_FAILED_LOGINS {
            self.lock_until = Some(now + LOCK_DURATION);
        }
    }

    /// Only the counter is cleared; an expired lock-until stays on record.
    pub fn clear_failed_logins(&mut self) {
        self.failed_login_attempts = None;
    }

    /// True when the password changed after a token issued at `issued_at`
    /// (unix seconds).
    pub fn changed_password_after(&self, issued_at: i64) -> bool {
        self.password_changed_at
            .map(|changed| changed.unix_timestamp() > issued_at)
            .unwrap_or(false)
    }

    pub fn set_password_hash(&mut self, hash: String, now: OffsetDateTime) {
        self.password_hash = hash;
        self.password_changed_at = Some(now - PASSWORD_CHANGE_SKEW);
    }

    /// Stores the digest of a fresh reset token and returns the plain token,
    /// which only ever leaves through the mailer.
    pub fn create_password_reset_token(&mut self, now: OffsetDateTime) -> String {
        let mut bytes = [0u8; 32];
        rand::rngs::OsRng.fill_bytes(&mut bytes);
        let token = hex::encode(bytes);
        self.password_reset_token = Some(hash_reset_token(&token));
        self.password_reset_expires = Some(now + RESET_TOKEN_TTL);
        token
    }

    pub fn clear_password_reset(&mut self) {
        self.password_reset_token = None;
        self.password_reset_expires = None;
    }

    pub fn reset_token_matches(&self, token_hash: &str, now: OffsetDateTime) -> bool {
        self.password_reset_token.as_deref() == Some(token_hash)
            && matches!(self.password_reset_expires, Some(exp) if exp > now)
    }
}

pub fn hash_reset_token(token: &str) -> String {
    hex::encode(Sha256::digest(token.as_bytes()))
}

/// Fields needed to insert an account.
#[derive(Debug, Clone)]
pub struct NewAccount {
    pub name: String,
    pub email: String,
    pub role: Role,
    pub password_hash: String,
}

/// `users` row as stored; the role is kept as text.
#[derive(Debug, Clone, FromRow)]
pub struct AccountRow {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub photo: String,
    pub role: String,
    pub password_hash: String,
    pub password_changed_at: Option<OffsetDateTime>,
    pub password_reset_token: Option<String>,
    pub password_reset_expires: Option<OffsetDateTime>,
    pub failed_login_attempts: Option<i32>,
    pub lock_until: Option<OffsetDateTime>,
    pub created_at: OffsetDateTime,
}

impl TryFrom<AccountRow> for Account {
    type Error = anyhow::Error;

    fn try_from(row: AccountRow) -> Result<Self, Self::Error> {
        Ok(Account {
            id: row.id,
            name: row.name,
            email: row.email,
            photo: row.photo,
            role: row.role.parse()?,
            password_hash: row.password_hash,
            password_changed_at: row.password_changed_at,
            password_reset_token: row.password_reset_token,
            password_reset_expires: row.password_reset_expires,
            failed_login_attempts: row.failed_login_attempts,
            lock_until: row.lock_until,
            created_at: row.created_at,
        })
    }
}

#[cfg(test)]
pub(crate) fn sample_account() -> Account {
    Account {
        id: Uuid::new_v4(),
        name: "Jonas".into(),
        email: "jonas@example.com".into(),
        photo: DEFAULT_PHOTO.into(),
        role: Role::User,
        password_hash: String::new(),
        password_changed_at: None,
        password_reset_token: None,
        password_reset_expires: None,
        failed_login_attempts: None,
        lock_until: None,
        created_at: OffsetDateTime::now_utc(),
    }
}
