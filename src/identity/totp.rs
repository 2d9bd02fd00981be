use totp_rs::{Algorithm, Secret, TOTP};

use crate::error::{AppError, AppResult};

pub const ISSUER: &str = "NFSExplorer";
const DIGITS: usize = 6;
const SKEW: u8 = 1;
const STEP: u64 = 30;

/// Fresh 160-bit secret, base32 encoded.
pub fn generate_secret() -> String {
    Secret::generate_secret().to_encoded().to_string()
}

fn totp_for(secret: &str) -> AppResult<TOTP> {
    let bytes = Secret::Encoded(secret.to_string())
        .to_bytes()
        .map_err(|e| AppError::user("invalid_secret", format!("malformed second-factor secret: {:?}", e)))?;
    TOTP::new(Algorithm::SHA1, DIGITS, SKEW, STEP, bytes)
        .map_err(|e| AppError::user("invalid_secret", format!("unusable second-factor secret: {}", e)))
}

/// Check `code` against `secret` at `unix_time`, allowing one step of clock skew.
pub fn verify(secret: &str, code: &str, unix_time: u64) -> AppResult<bool> {
    let code = code.trim();
    if code.len() != DIGITS || !code.chars().all(|c| c.is_ascii_digit()) {
        return Ok(false);
    }
    Ok(totp_for(secret)?.check(code, unix_time))
}

pub fn code_at(secret: &str, unix_time: u64) -> AppResult<String> {
    Ok(totp_for(secret)?.generate(unix_time))
}

/// Enrollment URL understood by authenticator apps.
pub fn otpauth_url(secret: &str, account: &str) -> String {
    format!(
        "otpauth://totp/{}:{}?secret={}&issuer={}&algorithm=SHA1&digits={}&period={}",
        urlencoding::encode(ISSUER),
        urlencoding::encode(account),
        secret,
        urlencoding::encode(ISSUER),
        DIGITS,
        STEP
    )
}

pub fn unix_now() -> u64 {
    chrono::Utc::now().timestamp().max(0) as u64
}
