use std::sync::{Arc, RwLock};

use base64::prelude::*;
use serde::Deserialize;
use tokio::sync::{Mutex, MutexGuard};

use super::{PendingPayment, TokenPair};
use crate::errors::{ClientError, Result};
use crate::storage::{keys, SecureStore};

/// Identity fields read out of the access token payload. Display only; the
/// backend remains the authority on what the token allows.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct AccessClaims {
    #[serde(default)]
    pub sub: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub unique_name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    /// Every role the token grants. A single string and an array both decode.
    #[serde(
        default,
        rename = "role",
        alias = "http://schemas.microsoft.com/ws/2008/06/identity/claims/role",
        deserialize_with = "one_or_many"
    )]
    pub roles: Vec<String>,
    /// Expiry, seconds since the epoch.
    #[serde(default)]
    pub exp: Option<i64>,
}

fn one_or_many<'de, D>(deserializer: D) -> std::result::Result<Vec<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        One(String),
        Many(Vec<String>),
        Null(()),
    }

    Ok(match Raw::deserialize(deserializer)? {
        Raw::One(role) => vec![role],
        Raw::Many(roles) => roles,
        Raw::Null(()) => Vec::new(),
    })
}

impl AccessClaims {
    /// Decode the payload segment of a JWT without verifying it.
    pub fn decode(token: &str) -> Option<Self> {
        let payload = token.split('.').nth(1)?;
        let bytes = BASE64_URL_SAFE_NO_PAD
            .decode(payload.trim_end_matches('='))
            .ok()?;
        serde_json::from_slice(&bytes).ok()
    }

    /// `name`, falling back to ASP.NET's `unique_name`.
    pub fn display_name(&self) -> Option<&str> {
        self.name.as_deref().or(self.unique_name.as_deref())
    }

    /// The first granted role.
    pub fn role(&self) -> Option<&str> {
        self.roles.first().map(String::as_str)
    }
}

/// The logged-in session: the one credential pair plus the pending-payment
/// marker, both living in the secure store.
///
/// Pair reads and writes go through `pair_guard` so a reader never sees an
/// access token from one pair next to the refresh token of another. Refreshes
/// are serialized through `refresh_lock`, which is held across the network
/// call.
pub struct Session {
    store: Arc<dyn SecureStore>,
    pair_guard: RwLock<()>,
    refresh_lock: Mutex<()>,
}

impl Session {
    pub fn new(store: Arc<dyn SecureStore>) -> Self {
        Self {
            store,
            pair_guard: RwLock::new(()),
            refresh_lock: Mutex::new(()),
        }
    }

    pub fn store(&self) -> &Arc<dyn SecureStore> {
        &self.store
    }

    pub fn access_token(&self) -> Option<String> {
        let _read = self.pair_guard.read().ok()?;
        self.store.get(keys::ACCESS_TOKEN)
    }

    pub fn refresh_token(&self) -> Option<String> {
        let _read = self.pair_guard.read().ok()?;
        self.store.get(keys::REFRESH_TOKEN)
    }

    /// The stored pair, or `None` unless both halves are present.
    pub fn tokens(&self) -> Option<TokenPair> {
        let _read = self.pair_guard.read().ok()?;
        Some(TokenPair {
            access_token: self.store.get(keys::ACCESS_TOKEN)?,
            refresh_token: self.store.get(keys::REFRESH_TOKEN)?,
            role: self.store.get(keys::ROLE).filter(|role| !role.is_empty()),
        })
    }

    pub fn is_authenticated(&self) -> bool {
        self.access_token().is_some()
    }

    /// Replace the stored pair. The stored role is kept when `tokens` has none.
    pub fn store_tokens(&self, tokens: &TokenPair) -> Result<()> {
        if tokens.access_token.is_empty() || tokens.refresh_token.is_empty() {
            return Err(ClientError::MalformedResponse(
                "token response is missing a token".to_string(),
            ));
        }

        let _write = self
            .pair_guard
            .write()
            .map_err(|_| ClientError::Storage("session lock poisoned".to_string()))?;

        let mut entries = vec![
            (keys::ACCESS_TOKEN, tokens.access_token.as_str()),
            (keys::REFRESH_TOKEN, tokens.refresh_token.as_str()),
        ];
        if let Some(role) = tokens.role.as_deref() {
            entries.push((keys::ROLE, role));
        }
        self.store.set_many(&entries)
    }

    /// Drop the credential pair.
    pub fn clear(&self) -> Result<()> {
        let _write = self
            .pair_guard
            .write()
            .map_err(|_| ClientError::Storage("session lock poisoned".to_string()))?;

        self.store
            .remove_many(&[keys::ACCESS_TOKEN, keys::REFRESH_TOKEN, keys::ROLE])
    }

    /// Role from the token response, falling back to the token's claims.
    pub fn role(&self) -> Option<String> {
        self.store
            .get(keys::ROLE)
            .filter(|role| !role.is_empty())
            .or_else(|| self.claims().and_then(|c| c.role().map(str::to_string)))
    }

    pub fn claims(&self) -> Option<AccessClaims> {
        AccessClaims::decode(&self.access_token()?)
    }

    pub(crate) async fn lock_refresh(&self) -> MutexGuard<'_, ()> {
        self.refresh_lock.lock().await
    }

    // ==================== Pending payment ====================

    pub fn save_pending(&self, pending: &PendingPayment) -> Result<()> {
        let json = serde_json::to_string(pending)
            .map_err(|e| ClientError::Storage(e.to_string()))?;
        self.store.set(keys::PENDING_PAYMENT, &json)
    }

    /// The stored marker. A marker that no longer parses is treated as absent.
    pub fn pending(&self) -> Option<PendingPayment> {
        let raw = self.store.get(keys::PENDING_PAYMENT)?;
        match serde_json::from_str(&raw) {
            Ok(pending) => Some(pending),
            Err(err) => {
                tracing::warn!(error = %err, "discarding unreadable pending payment marker");
                None
            }
        }
    }

    pub fn clear_pending(&self) -> Result<()> {
        self.store.remove(keys::PENDING_PAYMENT)
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("authenticated", &self.is_authenticated())
            .finish()
    }
}
