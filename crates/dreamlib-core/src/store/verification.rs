//! `verification_codes.json`: one live email verification code per address.

use std::path::PathBuf;

use rand::RngExt;
use tracing::debug;

use super::file::{Edit, JsonFile};
use super::models::VerificationCode;
use super::StoreError;

/// Generate a 6-digit numeric code (100000..=999999).
pub fn generate_code() -> String {
    let mut rng = rand::rng();
    rng.random_range(100_000..1_000_000_u32).to_string()
}

pub struct VerificationStore {
    file: JsonFile<Vec<VerificationCode>>,
    ttl_ms: i64,
}

impl VerificationStore {
    /// Codes older than `ttl_secs` are expired. An unreadable file is treated
    /// as holding no codes.
    pub fn open(path: impl Into<PathBuf>, ttl_secs: i64) -> Self {
        Self {
            file: JsonFile::lenient(path),
            ttl_ms: ttl_secs.saturating_mul(1000),
        }
    }

    fn is_expired(&self, code: &VerificationCode, now_ms: i64) -> bool {
        now_ms - code.created_at > self.ttl_ms
    }

    /// Store `code` for `email`, replacing any earlier code for that address.
    pub fn issue(&self, email: &str, code: &str, now_ms: i64) -> Result<(), StoreError> {
        self.file.update(|codes| {
            codes.retain(|c| c.email != email && !self.is_expired(c, now_ms));
            codes.push(VerificationCode {
                email: email.to_string(),
                code: code.to_string(),
                created_at: now_ms,
            });
            Edit::Write(())
        })
    }

    /// Check `code` for `email`. A matching live code is consumed; an expired
    /// one is removed and rejected.
    pub fn verify(&self, email: &str, code: &str, now_ms: i64) -> Result<bool, StoreError> {
        self.file.update(|codes| {
            let Some(pos) = codes.iter().position(|c| c.email == email) else {
                return Edit::Keep(false);
            };
            if self.is_expired(&codes[pos], now_ms) {
                codes.remove(pos);
                debug!(email, "Verification code expired");
                return Edit::Write(false);
            }
            if codes[pos].code != code {
                return Edit::Keep(false);
            }
            codes.remove(pos);
            Edit::Write(true)
        })
    }

    /// Remove all expired codes, returning how many were dropped.
    pub fn sweep_expired(&self, now_ms: i64) -> Result<usize, StoreError> {
        self.file.update(|codes| {
            let before = codes.len();
            codes.retain(|c| !self.is_expired(c, now_ms));
            let removed = before - codes.len();
            if removed == 0 {
                Edit::Keep(0)
            } else {
                Edit::Write(removed)
            }
        })
    }
}
