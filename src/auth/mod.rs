//! Authentication module for gateway calls.
//!
//! Provides authentication providers for API key-based authentication
//! with secure credential handling.

use http::header::{HeaderValue, AUTHORIZATION};
use http::HeaderMap;
use secrecy::{ExposeSecret, SecretString};

use crate::errors::{TxGuardError, TxGuardResult};

/// Authentication provider trait.
///
/// Implementations attach credentials to every request sent to the
/// authorization gateway. Credentials never reach the guarded destination.
pub trait AuthProvider: Send + Sync {
    /// Apply authentication to request headers.
    fn apply_auth(&self, headers: &mut HeaderMap) -> TxGuardResult<()>;

    /// Get the authentication scheme name.
    fn scheme(&self) -> &str;

    /// Validate the credentials.
    fn validate(&self) -> TxGuardResult<()>;
}

/// API key authentication provider.
///
/// Uses Bearer token authentication with the gateway API key.
pub struct ApiKeyAuth {
    api_key: SecretString,
}

impl ApiKeyAuth {
    /// Creates a new API key authentication provider.
    pub fn new(api_key: SecretString) -> Self {
        Self { api_key }
    }

    /// Creates from a string API key.
    pub fn from_string(api_key: impl Into<String>) -> Self {
        Self {
            api_key: SecretString::new(api_key.into()),
        }
    }

    /// Gets a hint of the API key for debugging (last 4 characters).
    pub fn key_hint(&self) -> String {
        let key = self.api_key.expose_secret();
        if key.len() > 4 {
            format!("...{}", &key[key.len() - 4..])
        } else {
            "****".to_string()
        }
    }
}

impl AuthProvider for ApiKeyAuth {
    fn apply_auth(&self, headers: &mut HeaderMap) -> TxGuardResult<()> {
        let mut value = HeaderValue::from_str(&format!("Bearer {}", self.api_key.expose_secret()))?;
        value.set_sensitive(true);
        headers.insert(AUTHORIZATION, value);
        Ok(())
    }

    fn scheme(&self) -> &str {
        "Bearer"
    }

    fn validate(&self) -> TxGuardResult<()> {
        if self.api_key.expose_secret().is_empty() {
            return Err(TxGuardError::configuration("API key cannot be empty"));
        }
        Ok(())
    }
}

/// Provider for gateways that do not require credentials.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoAuth;

impl AuthProvider for NoAuth {
    fn apply_auth(&self, _headers: &mut HeaderMap) -> TxGuardResult<()> {
        Ok(())
    }

    fn scheme(&self) -> &str {
        "None"
    }

    fn validate(&self) -> TxGuardResult<()> {
        Ok(())
    }
}

impl std::fmt::Debug for ApiKeyAuth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiKeyAuth")
            .field("api_key", &"[REDACTED]")
            .field("key_hint", &self.key_hint())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_api_key_auth_apply() {
        let auth = ApiKeyAuth::from_string("tg_test_key_12345");
        let mut headers = HeaderMap::new();

        auth.apply_auth(&mut headers).unwrap();

        let value = headers.get(AUTHORIZATION).unwrap();
        assert_eq!(value, "Bearer tg_test_key_12345");
        assert!(value.is_sensitive());
    }

    #[test]
    fn test_api_key_auth_replaces_existing_header() {
        let auth = ApiKeyAuth::from_string("tg_new");
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer old"));

        auth.apply_auth(&mut headers).unwrap();

        assert_eq!(headers.get_all(AUTHORIZATION).iter().count(), 1);
        assert_eq!(headers.get(AUTHORIZATION).unwrap(), "Bearer tg_new");
    }

    #[test]
    fn test_api_key_auth_validate() {
        assert!(ApiKeyAuth::from_string("tg_test_key").validate().is_ok());
        assert!(ApiKeyAuth::from_string("").validate().is_err());
    }

    #[test]
    fn test_api_key_hint() {
        assert_eq!(ApiKeyAuth::from_string("tg_test_key_12345").key_hint(), "...2345");
        assert_eq!(ApiKeyAuth::from_string("abc").key_hint(), "****");
    }

    #[test]
    fn test_no_auth_leaves_headers_untouched() {
        let mut headers = HeaderMap::new();
        NoAuth.apply_auth(&mut headers).unwrap();
        assert!(headers.is_empty());
        assert_eq!(NoAuth.scheme(), "None");
    }

    #[test]
    fn test_debug_redacts_key() {
        let auth = ApiKeyAuth::from_string("tg_secret_value");
        let debug_str = format!("{:?}", auth);
        assert!(debug_str.contains("[REDACTED]"));
        assert!(!debug_str.contains("tg_secret_value"));
    }
}
