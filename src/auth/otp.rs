use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use rand::Rng;

use crate::error::AuthError;

#[derive(Debug, Clone)]
struct PendingOtp {
    code: String,
    expires_at: Instant,
}

/// One pending passcode per email, held in memory only.
#[derive(Debug)]
pub struct OtpStore {
    ttl: Duration,
    pending: Mutex<HashMap<String, PendingOtp>>,
}

impl OtpStore {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            pending: Mutex::new(HashMap::new()),
        }
    }

    pub fn generate_code() -> String {
        rand::thread_rng().gen_range(100_000..=999_999).to_string()
    }

    pub fn insert(&self, email: &str, code: String) {
        self.insert_at(email, code, Instant::now());
    }

    /// Also drops every expired passcode, so unverified requests do not pile up.
    fn insert_at(&self, email: &str, code: String, now: Instant) {
        let entry = PendingOtp {
            code,
            expires_at: now + self.ttl,
        };
        let mut pending = self.lock();
        pending.retain(|_, existing| existing.expires_at >= now);
        pending.insert(email.to_string(), entry);
    }

    pub fn verify(&self, email: &str, code: &str) -> Result<(), AuthError> {
        self.verify_at(email, code, Instant::now())
    }

    fn verify_at(&self, email: &str, code: &str, now: Instant) -> Result<(), AuthError> {
        let mut pending = self.lock();
        let Some(entry) = pending.get(email) else {
            return Err(AuthError::OtpNotSent);
        };
        if now > entry.expires_at {
            pending.remove(email);
            return Err(AuthError::OtpExpired);
        }
        if entry.code != code.trim() {
            return Err(AuthError::OtpMismatch);
        }
        Ok(())
    }

    pub fn clear(&self, email: &str) {
        self.lock().remove(email);
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, PendingOtp>> {
        // A poisoned map only holds passcodes; keep serving it.
        self.pending
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
