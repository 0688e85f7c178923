//! Connection authentication against the external account store.
//!
//! Account and credential management live outside this process; the gateway
//! only needs `credentials -> identity`. The trait keeps that seam explicit,
//! with an in-memory table for tests and a guest mode for running without an
//! account store.

use crate::error::AuthError;
use dashmap::DashMap;
use shared::PlayerIdentity;

#[derive(Debug, Clone)]
pub struct Credentials {
    pub token: String,
    pub display_name: Option<String>,
}

pub trait Authenticator: Send + Sync {
    fn authenticate(&self, credentials: &Credentials) -> Result<PlayerIdentity, AuthError>;
}

/// Token table, preloaded by whoever owns the accounts. Used by tests and
/// deployments where a sibling process manages logins.
#[derive(Default)]
pub struct InMemoryAuthenticator {
    tokens: DashMap<String, PlayerIdentity>,
}

impl InMemoryAuthenticator {
    pub fn insert(&self, token: impl Into<String>, identity: PlayerIdentity) {
        self.tokens.insert(token.into(), identity);
    }
}

impl Authenticator for InMemoryAuthenticator {
    fn authenticate(&self, credentials: &Credentials) -> Result<PlayerIdentity, AuthError> {
        if credentials.token.is_empty() {
            return Err(AuthError::MissingCredentials);
        }
        self.tokens
            .get(&credentials.token)
            .map(|entry| entry.value().clone())
            .ok_or(AuthError::InvalidCredentials)
    }
}

/// Accepts any non-empty token and mints a guest identity from it. The id is
/// derived from the token so the same token reconnects to the same identity.
pub struct GuestAuthenticator {
    pub default_rating: i32,
}

impl Default for GuestAuthenticator {
    fn default() -> Self {
        Self {
            default_rating: 1200,
        }
    }
}

impl Authenticator for GuestAuthenticator {
    fn authenticate(&self, credentials: &Credentials) -> Result<PlayerIdentity, AuthError> {
        if credentials.token.is_empty() {
            return Err(AuthError::MissingCredentials);
        }
        let id = format!("guest:{}", credentials.token);
        let display_name = credentials
            .display_name
            .clone()
            .filter(|name| !name.is_empty())
            .unwrap_or_else(|| format!("guest-{}", &credentials.token));
        Ok(PlayerIdentity {
            id,
            display_name,
            rating: self.default_rating,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn in_memory_rejects_unknown_token() {
        let auth = InMemoryAuthenticator::default();
        auth.insert(
            "tok",
            PlayerIdentity {
                id: "u1".to_string(),
                display_name: "alice".to_string(),
                rating: 1500,
            },
        );

        let found = auth
            .authenticate(&Credentials {
                token: "tok".to_string(),
                display_name: None,
            })
            .unwrap();
        assert_eq!(found.id, "u1");

        let err = auth
            .authenticate(&Credentials {
                token: "nope".to_string(),
                display_name: None,
            })
            .unwrap_err();
        assert!(matches!(err, AuthError::InvalidCredentials));
    }

    #[test]
    fn guest_identity_is_stable_per_token() {
        let auth = GuestAuthenticator::default();
        let creds = Credentials {
            token: "abc".to_string(),
            display_name: None,
        };
        let a = auth.authenticate(&creds).unwrap();
        let b = auth.authenticate(&creds).unwrap();
        assert_eq!(a.id, b.id);
        assert_eq!(a.rating, 1200);
    }

    #[test]
    fn empty_token_is_missing_credentials() {
        let auth = GuestAuthenticator::default();
        let err = auth
            .authenticate(&Credentials {
                token: String::new(),
                display_name: None,
            })
            .unwrap_err();
        assert!(matches!(err, AuthError::MissingCredentials));
    }
}
