use std::sync::Arc;

use axum::extract::FromRef;
use jsonwebtoken::errors::ErrorKind;
use lazy_static::lazy_static;
use regex::Regex;
use time::OffsetDateTime;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use super::{
    dto::{LoginRequest, ResetPasswordRequest, SignupRequest, UpdatePasswordRequest},
    jwt::JwtKeys,
    model::{hash_reset_token, Account, NewAccount, Role},
    password::{hash_password, validate_new_password, verify_password},
    repo::AccountStore,
};
use crate::{
    error::{AppError, AppResult},
    mail::{Email, Mailer},
    state::AppState,
};

pub const INCORRECT_CREDENTIALS: &str = "Incorrect email or password";
pub const ACCOUNT_LOCKED: &str = "Your account is locked due to too many failed login attempts.";
pub const NOT_LOGGED_IN: &str = "You are not logged in! Please log in to get access.";
pub const ACCOUNT_GONE: &str = "The user belonging to this token does no longer exist.";
pub const PASSWORD_CHANGED: &str = "User recently changed password! Please log in again.";
pub const INVALID_RESET_TOKEN: &str = "Token is invalid or has expired";
pub const FORBIDDEN: &str = "You do not have permission to perform this action";

pub(crate) fn is_valid_email(email: &str) -> bool {
    lazy_static! {
        static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
    }
    EMAIL_RE.is_match(email)
}

fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Fails unless the account's role is one of `roles`.
pub fn restrict_to(account: &Account, roles: &[Role]) -> AppResult<()> {
    if roles.contains(&account.role) {
        Ok(())
    } else {
        warn!(account_id = %account.id, role = %account.role, "role not permitted");
        Err(AppError::Forbidden(FORBIDDEN.into()))
    }
}

/// An authenticated account together with a freshly signed token.
#[derive(Debug, Clone)]
pub struct Session {
    pub account: Account,
    pub token: String,
}

/// Credential checks, lockout, session tokens and password resets.
#[derive(Clone)]
pub struct AuthService {
    accounts: Arc<dyn AccountStore>,
    mailer: Arc<dyn Mailer>,
    keys: JwtKeys,
    public_url: String,
}

impl FromRef<AppState> for AuthService {
    fn from_ref(state: &AppState) -> Self {
        AuthService::new(
            state.accounts.clone(),
            state.mailer.clone(),
            JwtKeys::from_ref(state),
            state.config.public_url.clone(),
        )
    }
}

impl AuthService {
    pub fn new(
        accounts: Arc<dyn AccountStore>,
        mailer: Arc<dyn Mailer>,
        keys: JwtKeys,
        public_url: impl Into<String>,
    ) -> Self {
        Self {
            accounts,
            mailer,
            keys,
            public_url: public_url.into(),
        }
    }

    pub fn keys(&self) -> &JwtKeys {
        &self.keys
    }

    fn issue(&self, account: Account) -> AppResult<Session> {
        let token = self.keys.sign(account.id)?;
        Ok(Session { account, token })
    }

    #[instrument(skip_all)]
    pub async fn signup(&self, req: SignupRequest) -> AppResult<Session> {
        let name = req.name.trim().to_string();
        let email = normalize_email(&req.email);

        if name.is_empty() {
            return Err(AppError::validation("Please tell us your name!"));
        }
        if !is_valid_email(&email) {
            warn!(email = %email, "invalid email");
            return Err(AppError::validation("Please provide a valid email"));
        }
        validate_new_password(&req.password, &req.password_confirm)?;

        let password_hash = hash_password(&req.password)?;
        let account = self
            .accounts
            .create(NewAccount {
                name,
                email,
                role: Role::User,
                password_hash,
            })
            .await?;

        info!(account_id = %account.id, email = %account.email, "account created");
        self.issue(account)
    }

    /// Lookup and persistence failures are reported exactly like a wrong
    /// password so callers cannot tell accounts apart.
    #[instrument(skip_all)]
    pub async fn login(&self, req: LoginRequest) -> AppResult<Session> {
        let email = normalize_email(&req.email);
        if email.is_empty() || req.password.is_empty() {
            return Err(AppError::validation("Please provide email and password"));
        }
        let rejected = || AppError::auth(INCORRECT_CREDENTIALS);

        let mut account = match self.accounts.find_by_email(&email).await {
            Ok(Some(account)) => account,
            Ok(None) => {
                warn!(email = %email, "login unknown email");
                return Err(rejected());
            }
            Err(e) => {
                error!(error = %e, "account lookup failed");
                return Err(rejected());
            }
        };

        let now = OffsetDateTime::now_utc();
        let password_ok = verify_password(&req.password, &account.password_hash).unwrap_or_else(|e| {
            error!(error = %e, account_id = %account.id, "stored password hash unreadable");
            false
        });

        if !password_ok {
            account.register_failed_login(now);
            if let Err(e) = self.accounts.record_login_failure(&account).await {
                error!(error = %e, account_id = %account.id, "failed to record login failure");
            }
            warn!(
                account_id = %account.id,
                attempts = account.failed_login_attempts.unwrap_or(0),
                locked = account.is_locked(now),
                "login invalid password"
            );
            return Err(rejected());
        }

        if account.is_locked(now) {
            warn!(account_id = %account.id, "login while locked");
            return Err(AppError::AccountLocked(ACCOUNT_LOCKED.into()));
        }

        account.clear_failed_logins();
        if let Err(e) = self.accounts.clear_login_failures(account.id).await {
            error!(error = %e, account_id = %account.id, "failed to reset login counter");
            return Err(rejected());
        }

        info!(account_id = %account.id, "user logged in");
        self.issue(account)
    }

    /// Resolves the account behind a session token.
    pub async fn protect(&self, token: Option<&str>) -> AppResult<Account> {
        let token = token
            .filter(|t| !t.is_empty())
            .ok_or_else(|| AppError::auth(NOT_LOGGED_IN))?;

        let claims = self.keys.verify(token).map_err(|e| {
            warn!(error = %e, "invalid or expired token");
            match e.kind() {
                ErrorKind::ExpiredSignature => {
                    AppError::auth("Your token has expired! Please log in again.")
                }
                _ => AppError::auth("Invalid token. Please log in again!"),
            }
        })?;

        let account = self
            .accounts
            .find_by_id(claims.sub)
            .await?
            .ok_or_else(|| AppError::auth(ACCOUNT_GONE))?;

        if account.changed_password_after(claims.iat as i64) {
            return Err(AppError::auth(PASSWORD_CHANGED));
        }
        Ok(account)
    }

    #[instrument(skip_all)]
    pub async fn forgot_password(&self, email: &str) -> AppResult<()> {
        let email = normalize_email(email);
        let mut account = self
            .accounts
            .find_by_email(&email)
            .await?
            .ok_or_else(|| AppError::not_found("There is no user with that email address."))?;

        let token = account.create_password_reset_token(OffsetDateTime::now_utc());
        self.accounts.save_reset_token(&account).await?;

        let reset_url = format!(
            "{}/api/v1/users/resetPassword/{}",
            self.public_url.trim_end_matches('/'),
            token
        );
        let message = Email {
            to: account.email.clone(),
            subject: "Your password reset token (valid for 10 minutes)".into(),
            body: format!(
                "Forgot your password? Submit a PATCH request with your new password and \
                 passwordConfirm to: {reset_url}\nIf you didn't forget your password, please \
                 ignore this email!"
            ),
        };

        if let Err(e) = self.mailer.send(message).await {
            error!(error = %e, account_id = %account.id, "reset email dispatch failed");
            account.clear_password_reset();
            self.accounts.save_reset_token(&account).await?;
            return Err(AppError::Delivery(
                "There was an error sending the email. Try again later!".into(),
            ));
        }

        info!(account_id = %account.id, "reset token sent");
        Ok(())
    }

    #[instrument(skip_all)]
    pub async fn reset_password(&self, token: &str, req: ResetPasswordRequest) -> AppResult<Session> {
        let now = OffsetDateTime::now_utc();
        let mut account = self
            .accounts
            .find_by_reset_token(&hash_reset_token(token), now)
            .await?
            .ok_or_else(|| AppError::InvalidToken(INVALID_RESET_TOKEN.into()))?;

        validate_new_password(&req.password, &req.password_confirm)?;
        account.set_password_hash(hash_password(&req.password)?, now);
        account.clear_password_reset();
        self.accounts.save_reset_token(&account).await?;
        self.accounts.save_password(&account).await?;

        info!(account_id = %account.id, "password reset");
        self.issue(account)
    }

    #[instrument(skip(self, req))]
    pub async fn update_password(
        &self,
        account_id: Uuid,
        req: UpdatePasswordRequest,
    ) -> AppResult<Session> {
        let mut account = self
            .accounts
            .find_by_id(account_id)
            .await?
            .ok_or_else(|| AppError::auth(ACCOUNT_GONE))?;

        if !verify_password(&req.password_current, &account.password_hash)? {
            warn!(account_id = %account.id, "wrong current password");
            return Err(AppError::auth("Your current password is wrong."));
        }

        validate_new_password(&req.password, &req.password_confirm)?;
        account.set_password_hash(hash_password(&req.password)?, OffsetDateTime::now_utc());
        self.accounts.save_password(&account).await?;

        info!(account_id = %account.id, "password updated");
        self.issue(account)
    }
}
