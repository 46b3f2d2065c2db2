pub mod mailer;
pub mod otp;
pub mod password;

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::{info, warn};

use crate::config::{AuthConfig, MailConfig};
use crate::error::{AuthError, StoreError};
use crate::schedule::IdSource;
use crate::store::{DataStore, PublicUser, UserAccount};

pub use mailer::{build_mailer, DisabledMailer, LogMailer, Mailer, OutgoingMail, SmtpMailer};
pub use otp::OtpStore;

/// Email OTP registration and password login over a [`DataStore`].
pub struct AuthService {
    store: Arc<dyn DataStore>,
    mailer: Arc<dyn Mailer>,
    ids: Arc<dyn IdSource>,
    otps: OtpStore,
    from_address: String,
    otp_ttl: Duration,
    min_password_length: usize,
}

impl AuthService {
    pub fn new(
        store: Arc<dyn DataStore>,
        mailer: Arc<dyn Mailer>,
        ids: Arc<dyn IdSource>,
        auth: &AuthConfig,
        mail: &MailConfig,
    ) -> Self {
        let otp_ttl = Duration::from_secs(auth.otp_ttl_secs);
        Self {
            store,
            mailer,
            ids,
            otps: OtpStore::new(otp_ttl),
            from_address: mail.from_address.clone(),
            otp_ttl,
            min_password_length: auth.min_password_length,
        }
    }

    pub async fn send_otp(&self, email: &str) -> Result<(), AuthError> {
        let email = normalize_email(email)?;
        if self.store.find_user_by_email(&email).await?.is_some() {
            return Err(AuthError::AlreadyRegistered);
        }

        let code = OtpStore::generate_code();
        let mail = OutgoingMail::otp(
            &self.from_address,
            &email,
            &code,
            self.otp_ttl.as_secs() / 60,
        );
        if let Err(err) = self.mailer.send(&mail).await {
            warn!("failed sending OTP to {email}: {err}");
            return Err(AuthError::Mail(err.to_string()));
        }
        self.otps.insert(&email, code);
        Ok(())
    }

    pub fn verify_otp(&self, email: &str, code: &str) -> Result<(), AuthError> {
        let email = normalize_email(email)?;
        self.otps.verify(&email, code)
    }

    pub async fn register(
        &self,
        email: &str,
        code: &str,
        password: &str,
        name: &str,
    ) -> Result<PublicUser, AuthError> {
        let email = normalize_email(email)?;
        self.otps.verify(&email, code)?;
        password::validate_password_strength(password, self.min_password_length)?;
        if self.store.find_user_by_email(&email).await?.is_some() {
            return Err(AuthError::AlreadyRegistered);
        }

        let account = UserAccount {
            id: self.ids.next_id(),
            email: email.clone(),
            name: name.trim().to_string(),
            password_hash: hash_off_thread(password.to_string()).await?,
            created_at: Utc::now(),
        };
        let account = match self.store.insert_user(account).await {
            Ok(account) => account,
            Err(StoreError::DuplicateEmail(_)) => return Err(AuthError::AlreadyRegistered),
            Err(err) => return Err(err.into()),
        };
        self.otps.clear(&email);
        info!("registered user {}", account.id);
        Ok(PublicUser::from(&account))
    }

    pub async fn login(&self, email: &str, password: &str) -> Result<PublicUser, AuthError> {
        let email = normalize_email(email)?;
        let Some(account) = self.store.find_user_by_email(&email).await? else {
            return Err(AuthError::InvalidCredentials);
        };
        if !verify_off_thread(password.to_string(), account.password_hash.clone()).await? {
            return Err(AuthError::InvalidCredentials);
        }
        Ok(PublicUser::from(&account))
    }
}

async fn hash_off_thread(plain: String) -> Result<String, AuthError> {
    tokio::task::spawn_blocking(move || password::hash_password(&plain))
        .await
        .map_err(|e| AuthError::Hash(e.to_string()))?
}

async fn verify_off_thread(plain: String, hash: String) -> Result<bool, AuthError> {
    tokio::task::spawn_blocking(move || password::verify_password(&plain, &hash))
        .await
        .map_err(|e| AuthError::Hash(e.to_string()))?
}

fn normalize_email(email: &str) -> Result<String, AuthError> {
    let trimmed = email.trim();
    if trimmed.is_empty() {
        return Err(AuthError::MissingEmail);
    }
    Ok(trimmed.to_string())
}
