//! The opaque token capability consumed by `RestClient` (§3 "Token").
//!
//! The core neither parses nor stores secrets beyond this capability: it
//! asks for signed headers before each request and calls `refresh` when the
//! signature it is holding no longer matches what the provider currently
//! signs. Credential acquisition itself is an external collaborator
//! (Non-goal).

use async_trait::async_trait;
use std::collections::HashMap;

/// Capability presented to `RestClient`. Implementations own whatever
/// refresh/expiry logic their credential source requires.
#[async_trait]
pub trait TokenProvider: Send + Sync {
    /// Headers to attach to the next outbound request (at minimum,
    /// `Authorization`). Called before every attempt.
    async fn signed_headers(&self) -> crate::error::Result<HashMap<String, String>>;

    /// Force a refresh of the underlying credential. `RestClient` calls this
    /// when it observes the signature has changed since the last request,
    /// or proactively when a 401 is retried.
    async fn refresh(&self) -> crate::error::Result<()>;
}

/// A static bearer token, useful for tests and for callers who manage their
/// own refresh externally.
pub struct StaticToken {
    header_value: String,
}

impl StaticToken {
    pub fn new(bearer: impl Into<String>) -> Self {
        Self {
            header_value: format!("Bearer {}", bearer.into()),
        }
    }
}

#[async_trait]
impl TokenProvider for StaticToken {
    async fn signed_headers(&self) -> crate::error::Result<HashMap<String, String>> {
        let mut h = HashMap::new();
        h.insert("Authorization".to_string(), self.header_value.clone());
        Ok(h)
    }

    async fn refresh(&self) -> crate::error::Result<()> {
        Ok(())
    }
}
