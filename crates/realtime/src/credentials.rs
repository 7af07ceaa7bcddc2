//! Credential and base-address providers consumed at connect time.
//!
//! Both are queried synchronously on every connection attempt, so a
//! refreshed token or a changed base address is picked up on the next
//! reconnect.

use std::path::Path;
use std::sync::{Arc, PoisonError, RwLock};

use tracing::debug;

/// Environment variable read by [`EnvAddress::default`].
pub const DEFAULT_ADDRESS_VAR: &str = "THREADLINK_API_URL";

/// Supplies the bearer credential for new connections.
pub trait CredentialProvider: Send + Sync {
    /// Returns the current token, or `None` if the caller is signed out.
    fn token(&self) -> Option<String>;
}

/// Supplies the REST base address the streaming endpoint is derived from.
pub trait AddressProvider: Send + Sync {
    fn base_address(&self) -> String;
}

impl<T: CredentialProvider + ?Sized> CredentialProvider for Arc<T> {
    fn token(&self) -> Option<String> {
        (**self).token()
    }
}

impl<T: AddressProvider + ?Sized> AddressProvider for Arc<T> {
    fn base_address(&self) -> String {
        (**self).base_address()
    }
}

/// Errors from loading a credential.
#[derive(Debug, thiserror::Error)]
pub enum CredentialError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Bearer token for the current session, held in memory only.
///
/// Share it as `Arc<SessionTokenStore>` to refresh or clear the token
/// while a manager is using it.
#[derive(Debug, Default)]
pub struct SessionTokenStore {
    token: RwLock<Option<String>>,
}

impl SessionTokenStore {
    /// Creates an empty (signed-out) store.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_token(token: impl Into<String>) -> Self {
        Self {
            token: RwLock::new(Some(token.into())),
        }
    }

    /// Reads a token from a file, trimming surrounding whitespace. An
    /// empty file yields a signed-out store.
    pub fn from_file(path: &Path) -> Result<Self, CredentialError> {
        let data = std::fs::read_to_string(path)?;
        let token = data.trim();
        debug!(path = %path.display(), present = !token.is_empty(), "loaded session token");
        Ok(if token.is_empty() {
            Self::new()
        } else {
            Self::with_token(token)
        })
    }

    /// Replaces the stored token.
    pub fn set(&self, token: impl Into<String>) {
        *self.token.write().unwrap_or_else(PoisonError::into_inner) = Some(token.into());
    }

    /// Removes the stored token (sign-out).
    pub fn clear(&self) {
        *self.token.write().unwrap_or_else(PoisonError::into_inner) = None;
    }
}

impl CredentialProvider for SessionTokenStore {
    fn token(&self) -> Option<String> {
        self.token
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

/// A fixed base address.
#[derive(Debug, Clone)]
pub struct StaticAddress(String);

impl StaticAddress {
    pub fn new(address: impl Into<String>) -> Self {
        Self(address.into())
    }
}

impl AddressProvider for StaticAddress {
    fn base_address(&self) -> String {
        self.0.clone()
    }
}

/// Base address read from an environment variable on every call.
#[derive(Debug, Clone)]
pub struct EnvAddress {
    var: String,
    fallback: Option<String>,
}

impl EnvAddress {
    pub fn new(var: impl Into<String>) -> Self {
        Self {
            var: var.into(),
            fallback: None,
        }
    }

    /// Address used when the variable is unset or empty.
    pub fn with_fallback(mut self, fallback: impl Into<String>) -> Self {
        self.fallback = Some(fallback.into());
        self
    }
}

impl Default for EnvAddress {
    fn default() -> Self {
        Self::new(DEFAULT_ADDRESS_VAR)
    }
}

impl AddressProvider for EnvAddress {
    fn base_address(&self) -> String {
        std::env::var(&self.var)
            .ok()
            .filter(|v| !v.trim().is_empty())
            .or_else(|| self.fallback.clone())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_store_is_signed_out() {
        let store = SessionTokenStore::new();
        assert!(store.token().is_none());
    }

    #[test]
    fn set_and_clear_token() {
        let store = SessionTokenStore::new();
        store.set("tok-1");
        assert_eq!(store.token().as_deref(), Some("tok-1"));
        store.set("tok-2");
        assert_eq!(store.token().as_deref(), Some("tok-2"));
        store.clear();
        assert!(store.token().is_none());
    }

    #[test]
    fn shared_store_sees_refresh() {
        let store = Arc::new(SessionTokenStore::with_token("old"));
        let provider: Arc<dyn CredentialProvider> = store.clone();
        store.set("new");
        assert_eq!(provider.token().as_deref(), Some("new"));
    }

    #[test]
    fn load_token_from_file() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("token");
        std::fs::write(&path, "  abc.def \n").unwrap();
        let store = SessionTokenStore::from_file(&path).unwrap();
        assert_eq!(store.token().as_deref(), Some("abc.def"));
    }

    #[test]
    fn empty_token_file_is_signed_out() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("token");
        std::fs::write(&path, "\n").unwrap();
        let store = SessionTokenStore::from_file(&path).unwrap();
        assert!(store.token().is_none());
    }

    #[test]
    fn missing_token_file_errors() {
        let tmp = tempfile::tempdir().unwrap();
        let err = SessionTokenStore::from_file(&tmp.path().join("absent")).unwrap_err();
        assert!(matches!(err, CredentialError::Io(_)));
    }

    #[test]
    fn static_address() {
        let addr = StaticAddress::new("https://example.com/api");
        assert_eq!(addr.base_address(), "https://example.com/api");
    }

    #[test]
    fn env_address_uses_fallback_when_unset() {
        let addr = EnvAddress::new("THREADLINK_TEST_UNSET_ADDRESS_VAR")
            .with_fallback("http://localhost:8000/api");
        assert_eq!(addr.base_address(), "http://localhost:8000/api");
        assert_eq!(
            EnvAddress::new("THREADLINK_TEST_UNSET_ADDRESS_VAR").base_address(),
            ""
        );
    }
}
