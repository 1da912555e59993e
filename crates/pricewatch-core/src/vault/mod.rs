//! Password-protected storage of provider secrets.
//!
//! Secrets are sealed with [`cipher`] under a user password. The password is
//! never persisted; a verifier (a fixed plaintext sealed under the same
//! password) tells a wrong password apart from corrupted data. While unlocked,
//! the vault holds a [`VaultSession`]: the password plus a cache of decrypted
//! credentials. The session is replaced or dropped as a whole on lock, password
//! change and any decrypt failure.

pub mod cipher;
mod session;

use std::collections::BTreeMap;
use std::sync::Mutex;

use thiserror::Error;
use tracing::{debug, info, warn};

pub use session::VaultSession;

use crate::watchlist::WatchlistStore;
use crate::{Credentials, ProviderConfig, SecretField, StoreError, StoredSecret};

/// Plaintext sealed into the verifier record.
pub const VERIFIER_PLAINTEXT: &str = "pricewatch-vault-verifier-v1";
pub const MIN_PASSWORD_LEN: usize = 4;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum VaultError {
    #[error("wrong password")]
    WrongPassword,
    #[error("ciphertext is malformed: {0}")]
    InvalidFormat(String),
    #[error("crypto failure: {0}")]
    Crypto(String),
    #[error("vault is locked; unlock it with the password first")]
    UnlockRequired,
    #[error("password must be at least {min} characters")]
    PasswordTooShort { min: usize },
    #[error("no password has been set")]
    NotInitialized,
}

impl VaultError {
    pub const fn code(&self) -> &'static str {
        match self {
            Self::WrongPassword => "vault.wrong_password",
            Self::InvalidFormat(_) => "vault.invalid_format",
            Self::Crypto(_) => "vault.crypto",
            Self::UnlockRequired => "vault.unlock_required",
            Self::PasswordTooShort { .. } => "vault.password_too_short",
            Self::NotInitialized => "vault.not_initialized",
        }
    }

    /// Failures after which the held password can no longer be trusted.
    pub const fn invalidates_session(&self) -> bool {
        matches!(
            self,
            Self::WrongPassword | Self::InvalidFormat(_) | Self::Crypto(_)
        )
    }
}

/// Errors from vault operations that also read or write persisted state.
#[derive(Debug, Error)]
pub enum RekeyError {
    #[error(transparent)]
    Vault(#[from] VaultError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Debug, Default)]
struct VaultState {
    session: Option<VaultSession>,
    generation: u64,
}

impl VaultState {
    fn open(&mut self, password: String) {
        self.generation += 1;
        self.session = Some(VaultSession::new(password, self.generation));
    }

    fn close(&mut self) {
        self.generation += 1;
        self.session = None;
    }
}

#[derive(Debug, Default)]
pub struct Vault {
    state: Mutex<VaultState>,
}

impl Vault {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_unlocked(&self) -> bool {
        self.state().session.is_some()
    }

    /// Drops the held password and every cached credential.
    pub fn lock(&self) {
        let mut state = self.state();
        if state.session.is_some() {
            debug!("vault locked");
        }
        state.close();
    }

    /// Replaces the session with an empty one under the same password.
    pub fn invalidate_cache(&self) {
        let mut state = self.state();
        let password = state
            .session
            .as_ref()
            .map(|session| session.password().to_owned());
        match password {
            Some(password) => state.open(password),
            None => state.close(),
        }
    }

    /// Number of providers whose credentials are currently cached.
    pub fn cached_providers(&self) -> usize {
        self.state()
            .session
            .as_ref()
            .map_or(0, VaultSession::cached_len)
    }

    /// Seals the verifier plaintext under a new password.
    pub async fn create_verifier(&self, password: &str) -> Result<String, VaultError> {
        check_password(password)?;
        cipher::encrypt_blocking(VERIFIER_PLAINTEXT.to_owned(), password.to_owned()).await
    }

    /// Opens a session if `password` decrypts `verifier`. Any failure drops the
    /// current session.
    pub async fn unlock(&self, verifier: &str, password: &str) -> Result<(), VaultError> {
        match verify(verifier, password).await {
            Ok(()) => {
                self.state().open(password.to_owned());
                info!("vault unlocked");
                Ok(())
            }
            Err(error) => {
                warn!(code = error.code(), "vault unlock failed");
                self.lock();
                Err(error)
            }
        }
    }

    /// Credentials for one provider call.
    ///
    /// Plain secrets pass through. Encrypted secrets need an open session and
    /// are decrypted once per session, then served from its cache.
    pub async fn resolve_credentials(
        &self,
        config: &ProviderConfig,
    ) -> Result<Credentials, VaultError> {
        if !config.has_encrypted_secrets() {
            return Ok(Credentials {
                api_key: plain_value(config, SecretField::ApiKey),
                secret_key: plain_value(config, SecretField::SecretKey),
            });
        }

        let (password, generation) = {
            let state = self.state();
            let session = state.session.as_ref().ok_or(VaultError::UnlockRequired)?;
            if let Some(cached) = session.cached(&config.provider_id) {
                return Ok(cached.clone());
            }
            (session.password().to_owned(), session.generation())
        };

        let mut credentials = Credentials::default();
        for field in SecretField::ALL {
            let value = match config.secret(field) {
                StoredSecret::Absent => None,
                StoredSecret::Plain(value) => Some(value.to_owned()),
                StoredSecret::Encrypted(ciphertext) => {
                    match cipher::decrypt_blocking(ciphertext.to_owned(), password.clone()).await {
                        Ok(value) => Some(value),
                        Err(error) => {
                            warn!(
                                provider = %config.provider_id,
                                code = error.code(),
                                "credential decrypt failed; dropping vault session"
                            );
                            self.close_if_current(generation);
                            return Err(error);
                        }
                    }
                }
            };
            match field {
                SecretField::ApiKey => credentials.api_key = value,
                SecretField::SecretKey => credentials.secret_key = value,
            }
        }

        let mut state = self.state();
        if let Some(session) = state
            .session
            .as_mut()
            .filter(|session| session.generation() == generation)
        {
            session.remember(config.provider_id.clone(), credentials.clone());
        }
        Ok(credentials)
    }

    /// Seals every plain secret of `config` under the held password.
    pub async fn seal(&self, config: &mut ProviderConfig) -> Result<(), VaultError> {
        let password = self
            .state()
            .session
            .as_ref()
            .map(|session| session.password().to_owned())
            .ok_or(VaultError::UnlockRequired)?;
        seal_config(config, &password).await
    }

    /// First-time setup: writes the verifier, seals every plain secret and
    /// opens a session. With a verifier already stored this only unlocks.
    pub async fn set_password(
        &self,
        store: &WatchlistStore,
        password: &str,
    ) -> Result<(), RekeyError> {
        check_password(password)?;
        if let Some(verifier) = store.password_verifier().await? {
            self.unlock(&verifier, password).await?;
            return Ok(());
        }

        let verifier = self.create_verifier(password).await?;
        let mut configs = store.provider_configs().await?;
        for config in configs.values_mut() {
            seal_config(config, password).await?;
        }
        store.set_password_verifier(&verifier, &configs).await?;

        self.state().open(password.to_owned());
        info!(providers = configs.len(), "vault password set");
        Ok(())
    }

    /// Re-encrypts every secret under `new_password`. The old session, and its
    /// cache, is replaced by a fresh one.
    pub async fn change_password(
        &self,
        store: &WatchlistStore,
        old_password: &str,
        new_password: &str,
    ) -> Result<(), RekeyError> {
        let verifier = store
            .password_verifier()
            .await?
            .ok_or(VaultError::NotInitialized)?;
        if let Err(error) = verify(&verifier, old_password).await {
            self.lock();
            return Err(error.into());
        }
        check_password(new_password)?;

        let configs = store.provider_configs().await?;
        let mut rekeyed = BTreeMap::new();
        for (id, mut config) in configs {
            for field in SecretField::ALL {
                if let StoredSecret::Encrypted(ciphertext) = config.secret(field) {
                    let plain = match cipher::decrypt_blocking(
                        ciphertext.to_owned(),
                        old_password.to_owned(),
                    )
                    .await
                    {
                        Ok(plain) => plain,
                        Err(error) => {
                            warn!(
                                provider = %id,
                                code = error.code(),
                                "rekey could not open a stored secret"
                            );
                            self.lock();
                            return Err(error.into());
                        }
                    };
                    config.set_plain(field, Some(plain));
                }
            }
            seal_config(&mut config, new_password).await?;
            rekeyed.insert(id, config);
        }

        let verifier = self.create_verifier(new_password).await?;
        store.set_password_verifier(&verifier, &rekeyed).await?;

        self.state().open(new_password.to_owned());
        info!(providers = rekeyed.len(), "vault password changed");
        Ok(())
    }

    fn close_if_current(&self, generation: u64) {
        let mut state = self.state();
        if state
            .session
            .as_ref()
            .is_some_and(|session| session.generation() == generation)
        {
            state.close();
        }
    }

    fn state(&self) -> std::sync::MutexGuard<'_, VaultState> {
        self.state.lock().expect("vault state should not be poisoned")
    }
}

fn check_password(password: &str) -> Result<(), VaultError> {
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(VaultError::PasswordTooShort {
            min: MIN_PASSWORD_LEN,
        });
    }
    Ok(())
}

async fn verify(verifier: &str, password: &str) -> Result<(), VaultError> {
    let plaintext = cipher::decrypt_blocking(verifier.to_owned(), password.to_owned()).await?;
    if plaintext == VERIFIER_PLAINTEXT {
        Ok(())
    } else {
        Err(VaultError::WrongPassword)
    }
}

async fn seal_config(config: &mut ProviderConfig, password: &str) -> Result<(), VaultError> {
    for field in SecretField::ALL {
        if let StoredSecret::Plain(value) = config.secret(field) {
            let sealed = cipher::encrypt_blocking(value.to_owned(), password.to_owned()).await?;
            config.set_encrypted(field, sealed);
        }
    }
    Ok(())
}

fn plain_value(config: &ProviderConfig, field: SecretField) -> Option<String> {
    match config.secret(field) {
        StoredSecret::Plain(value) => Some(value.to_owned()),
        StoredSecret::Absent | StoredSecret::Encrypted(_) => None,
    }
}
