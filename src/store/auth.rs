use chrono::{DateTime, Duration, Utc};
use rand::RngCore;
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use subtle::ConstantTimeEq;

use super::config::ConfigStore;
use crate::core::FacturaError;

/// Hash iterations for newly registered users.
pub const PASSWORD_ITERATIONS: u32 = 100_000;

/// Minimum password length.
pub const MIN_PASSWORD_LEN: usize = 8;

/// Lifetime of a login session.
pub const SESSION_HOURS: i64 = 8;

/// The single user's stored credential.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserCredential {
    pub username: String,
    /// Hex salt.
    pub salt: String,
    /// Hex SHA-256 after `iterations` rounds.
    pub hash: String,
    pub iterations: u32,
}

fn hash_password(password: &str, salt: &[u8], iterations: u32) -> [u8; 32] {
    let mut digest = [0u8; 32];
    digest.copy_from_slice(
        &Sha256::new()
            .chain_update(salt)
            .chain_update(password.as_bytes())
            .finalize(),
    );
    for _ in 1..iterations {
        let next = Sha256::new().chain_update(salt).chain_update(digest).finalize();
        digest.copy_from_slice(&next);
    }
    digest
}

fn random_hex(len: usize) -> String {
    let mut bytes = vec![0u8; len];
    OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}

impl UserCredential {
    pub fn new(username: &str, password: &str, iterations: u32) -> Self {
        let mut salt = [0u8; 16];
        OsRng.fill_bytes(&mut salt);
        Self {
            username: username.to_string(),
            salt: hex::encode(salt),
            hash: hex::encode(hash_password(password, &salt, iterations)),
            iterations,
        }
    }

    /// Constant-time check of `username` and `password`.
    pub fn verify(&self, username: &str, password: &str) -> bool {
        let (Ok(salt), Ok(stored)) = (hex::decode(&self.salt), hex::decode(&self.hash)) else {
            return false;
        };
        let computed = hash_password(password, &salt, self.iterations.max(1));
        let user_ok = self.username.as_bytes().ct_eq(username.as_bytes());
        let hash_ok = computed.as_slice().ct_eq(stored.as_slice());
        (user_ok & hash_ok).into()
    }
}

/// An authenticated session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub token: String,
    pub username: String,
    pub expires_at: DateTime<Utc>,
}

/// Single-user authentication with in-memory sessions.
#[derive(Debug)]
pub struct Auth {
    config: ConfigStore,
    iterations: u32,
    sessions: HashMap<String, Session>,
}

impl Auth {
    pub fn new(config: ConfigStore) -> Self {
        Self {
            config,
            iterations: PASSWORD_ITERATIONS,
            sessions: HashMap::new(),
        }
    }

    /// Use fewer hash rounds; for tests.
    pub fn with_iterations(mut self, iterations: u32) -> Self {
        self.iterations = iterations.max(1);
        self
    }

    pub fn is_registered(&self) -> Result<bool, FacturaError> {
        Ok(self.config.load()?.user.is_some())
    }

    /// Create the user. Only possible while none exists.
    pub fn register(&mut self, username: &str, password: &str) -> Result<(), FacturaError> {
        let username = username.trim();
        if username.is_empty() {
            return Err(FacturaError::Validation("username is required".into()));
        }
        if password.chars().count() < MIN_PASSWORD_LEN {
            return Err(FacturaError::Validation(format!(
                "password must have at least {MIN_PASSWORD_LEN} characters"
            )));
        }
        let mut config = self.config.load()?;
        if config.user.is_some() {
            return Err(FacturaError::Conflict("a user is already registered".into()));
        }
        config.user = Some(UserCredential::new(username, password, self.iterations));
        self.config.save(&config)?;
        tracing::info!(username, "user registered");
        Ok(())
    }

    pub fn login(&mut self, username: &str, password: &str) -> Result<Session, FacturaError> {
        let config = self.config.load()?;
        let verified = config
            .user
            .as_ref()
            .is_some_and(|user| user.verify(username.trim(), password));
        if !verified {
            tracing::warn!(username, "login failed");
            return Err(FacturaError::Auth("invalid username or password".into()));
        }

        self.purge_expired();
        let session = Session {
            token: random_hex(32),
            username: username.trim().to_string(),
            expires_at: Utc::now() + Duration::hours(SESSION_HOURS),
        };
        self.sessions.insert(session.token.clone(), session.clone());
        tracing::info!(username = %session.username, "login succeeded");
        Ok(session)
    }

    /// The live session for `token`.
    pub fn validate(&mut self, token: &str) -> Result<Session, FacturaError> {
        let session = self
            .sessions
            .get(token)
            .cloned()
            .ok_or_else(|| FacturaError::Auth("unknown session".into()))?;
        if session.expires_at <= Utc::now() {
            self.sessions.remove(token);
            return Err(FacturaError::Auth("session expired".into()));
        }
        Ok(session)
    }

    /// End the session; false if it did not exist.
    pub fn logout(&mut self, token: &str) -> bool {
        let removed = self.sessions.remove(token);
        if let Some(session) = &removed {
            tracing::info!(username = %session.username, "logged out");
        }
        removed.is_some()
    }

    fn purge_expired(&mut self) {
        let now = Utc::now();
        self.sessions.retain(|_, s| s.expires_at > now);
    }
}
