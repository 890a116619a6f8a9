use dashmap::DashMap;
use rand::RngCore;

use crate::clock::now_ms;
use crate::limits::SESSION_TTL_MS;
use crate::model::Ms;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionError {
    TokenNotFound,
    TokenExpired,
}

impl std::fmt::Display for SessionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionError::TokenNotFound => write!(f, "session token not found"),
            SessionError::TokenExpired => write!(f, "session token expired"),
        }
    }
}

impl std::error::Error for SessionError {}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionToken {
    pub token: String,
    pub username: String,
    pub created_at: Ms,
    pub expires_at: Ms,
}

impl SessionToken {
    /// Valid up to and including `expires_at`.
    pub fn is_expired(&self, now: Ms) -> bool {
        now > self.expires_at
    }
}

/// Opaque bearer tokens with a fixed lifetime.
///
/// Expiry is checked lazily on [`SessionRegistry::validate_at`]; an expired
/// token found there is removed. Tokens nobody presents again stay until
/// [`SessionRegistry::purge_expired`] runs or they are revoked.
pub struct SessionRegistry {
    tokens: DashMap<String, SessionToken>,
    ttl: Ms,
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::with_ttl(SESSION_TTL_MS)
    }

    pub fn with_ttl(ttl: Ms) -> Self {
        Self {
            tokens: DashMap::new(),
            ttl,
        }
    }

    pub fn issue(&self, username: &str) -> String {
        self.issue_at(username, now_ms())
    }

    pub fn issue_at(&self, username: &str, now: Ms) -> String {
        let token = generate_token();
        self.tokens.insert(
            token.clone(),
            SessionToken {
                token: token.clone(),
                username: username.to_string(),
                created_at: now,
                expires_at: now + self.ttl,
            },
        );
        tracing::debug!("session issued for {username}");
        token
    }

    pub fn validate(&self, token: &str) -> Result<String, SessionError> {
        self.validate_at(token, now_ms())
    }

    pub fn validate_at(&self, token: &str, now: Ms) -> Result<String, SessionError> {
        let username = {
            let entry = self.tokens.get(token).ok_or(SessionError::TokenNotFound)?;
            if !entry.is_expired(now) {
                return Ok(entry.username.clone());
            }
            entry.username.clone()
        };
        // Guard dropped above: removing while holding a shard read guard would deadlock.
        self.tokens.remove_if(token, |_, s| s.is_expired(now));
        tracing::debug!("expired session for {username} removed");
        Err(SessionError::TokenExpired)
    }

    /// Idempotent.
    pub fn revoke(&self, token: &str) {
        self.tokens.remove(token);
    }

    /// Drop every token expired at `now`; returns how many were removed.
    pub fn purge_expired(&self, now: Ms) -> usize {
        let before = self.tokens.len();
        self.tokens.retain(|_, s| !s.is_expired(now));
        before.saturating_sub(self.tokens.len())
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }
}

/// 256 random bits from the thread-local CSPRNG, hex encoded.
fn generate_token() -> String {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}
