//! Credential flows: login, registration, profile, second factor, password change
//! and logout. Persistence goes through the `Repository`; tokens through the
//! `TokenIssuer`/`IdentityResolver` seam so tests can swap either side.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::error::{AppError, AppResult};
use crate::identity::password::{hash_password, verify_password};
use crate::identity::{totp, IdentityResolver, LoginThrottle, Principal, TokenIssuer};
use crate::repository::Repository;
use crate::types::PublicUser;

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct LoginOutcome {
    pub token: String,
    #[serde(rename = "twoFactorRequired")]
    pub two_factor_required: bool,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct TwoFactorEnrollment {
    pub secret: String,
    pub email: String,
    #[serde(rename = "otpauthUrl")]
    pub otpauth_url: String,
}

const INVALID_LOGIN: &str = "invalid email or password";

pub struct AuthService {
    repo: Arc<Repository>,
    issuer: Arc<dyn TokenIssuer>,
    resolver: Arc<dyn IdentityResolver>,
    throttle: LoginThrottle,
    /// Verified against when the email is unknown, so both login failures cost one hash check.
    decoy_hash: String,
    password_checks: AtomicU64,
}

impl AuthService {
    pub fn new(
        repo: Arc<Repository>,
        issuer: Arc<dyn TokenIssuer>,
        resolver: Arc<dyn IdentityResolver>,
        throttle: LoginThrottle,
    ) -> AppResult<Self> {
        let decoy_hash = hash_password(&uuid::Uuid::new_v4().to_string())?;
        Ok(Self { repo, issuer, resolver, throttle, decoy_hash, password_checks: AtomicU64::new(0) })
    }

    pub fn resolver(&self) -> &Arc<dyn IdentityResolver> { &self.resolver }

    /// Unknown email and wrong password fail identically.
    pub fn login(&self, email: &str, password: &str) -> AppResult<LoginOutcome> {
        let email = email.trim();
        self.throttle.check(email)?;
        let found = self.repo.find_user_by_email(email)?;
        let stored = found.as_ref().map_or(self.decoy_hash.as_str(), |u| u.password.as_str());
        let matches = self.check_password(stored, password);
        let user = match found {
            Some(u) if matches => u,
            _ => {
                self.throttle.record_failure(email);
                warn!(target: "auth", account = email, "login rejected");
                return Err(AppError::auth("invalid_credentials", INVALID_LOGIN));
            }
        };
        self.throttle.clear(email);
        let token = self.issuer.issue(&Principal::new(user.email.clone(), user.role_name()))?;
        info!(target: "auth", account = %user.email, two_factor = user.two_factor_enabled, "login succeeded");
        Ok(LoginOutcome { token, two_factor_required: user.two_factor_enabled })
    }

    fn check_password(&self, stored: &str, password: &str) -> bool {
        self.password_checks.fetch_add(1, Ordering::Relaxed);
        verify_password(stored, password)
    }

    #[cfg(test)]
    pub(crate) fn password_checks(&self) -> u64 {
        self.password_checks.load(Ordering::Relaxed)
    }

    pub fn register(&self, email: &str, password: &str, name: Option<String>) -> AppResult<PublicUser> {
        let created = self.repo.register_user(email, password, name)?;
        info!(target: "auth", account = %created.email, "user registered");
        Ok(created.into())
    }

    pub fn authenticate(&self, credential: &str) -> AppResult<Principal> {
        self.resolver.resolve(credential)
    }

    /// Token check plus the account as it is stored now: a deleted account is
    /// refused and the role comes from the record, not the token claim.
    pub fn current_principal(&self, credential: &str) -> AppResult<Principal> {
        let claimed = self.authenticate(credential)?;
        match self.repo.find_user_by_email(&claimed.email)? {
            Some(user) => {
                if user.role_name() != claimed.role {
                    debug!(target: "auth", account = %user.email, claimed = %claimed.role, "role changed since token issue");
                }
                Ok(Principal::new(user.email.clone(), user.role_name()))
            }
            None => Err(AppError::auth("account_not_found", "account no longer exists")),
        }
    }

    pub fn profile(&self, credential: &str) -> AppResult<PublicUser> {
        let who = self.authenticate(credential)?;
        Ok(self.repo.user_by_email(&who.email)?.into())
    }

    pub fn update_profile(&self, credential: &str, name: Option<String>) -> AppResult<PublicUser> {
        let who = self.authenticate(credential)?;
        Ok(self.repo.update_profile(&who.email, name)?.into())
    }

    /// New pending secret for the bearer's own account.
    pub fn generate_two_factor(&self, credential: &str) -> AppResult<TwoFactorEnrollment> {
        let who = self.authenticate(credential)?;
        let secret = totp::generate_secret();
        self.repo.store_two_factor_secret(&who.email, &secret)?;
        Ok(TwoFactorEnrollment {
            otpauth_url: totp::otpauth_url(&secret, &who.email),
            secret,
            email: who.email,
        })
    }

    /// Enables 2FA for the bearer when `code` matches the stored secret.
    pub fn verify_two_factor(&self, credential: &str, code: &str) -> AppResult<PublicUser> {
        self.verify_two_factor_at(credential, code, totp::unix_now())
    }

    pub fn verify_two_factor_at(&self, credential: &str, code: &str, unix_time: u64) -> AppResult<PublicUser> {
        let who = self.authenticate(credential)?;
        let throttle_key = format!("2fa:{}", who.email);
        self.throttle.check(&throttle_key)?;
        let user = self.repo.user_by_email(&who.email)?;
        let Some(secret) = user.two_fa_secret.as_deref() else {
            return Err(AppError::user("two_factor_not_initialized", "generate a 2FA secret first"));
        };
        if !totp::verify(secret, code, unix_time)? {
            self.throttle.record_failure(&throttle_key);
            return Err(AppError::auth("invalid_code", "invalid verification code"));
        }
        self.throttle.clear(&throttle_key);
        Ok(self.repo.enable_two_factor(&who.email)?.into())
    }

    pub fn disable_two_factor(&self, credential: &str) -> AppResult<PublicUser> {
        let who = self.authenticate(credential)?;
        Ok(self.repo.disable_own_two_factor(&who.email)?.into())
    }

    pub fn change_password(&self, credential: &str, old: &str, new: &str) -> AppResult<()> {
        let who = self.authenticate(credential)?;
        self.repo.change_password(&who.email, old, new)
    }

    pub fn logout(&self, credential: &str) -> AppResult<()> {
        let who = self.authenticate(credential)?;
        self.issuer.revoke(credential)?;
        info!(target: "auth", account = %who.email, "logged out");
        Ok(())
    }
}

#[cfg(test)]
#[path = "auth_tests.rs"]
mod auth_tests;
