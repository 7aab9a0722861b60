//! Connection settings for the authorization server

use std::time::Duration;

use authgate_clock::DurationSecs;
use authgate_jose::{
    jwa,
    jwt::{Audience, ClientId, Issuer, Realm},
};
use authgate_jwks::{KeyCacheConfig, ValidatorConfig};
use serde::Deserialize;

use crate::ClientSecret;

/// Settings for reaching and trusting an authorization server
///
/// Deserializable from any `serde` format. Durations are whole seconds.
/// Only `base_url`, `realm`, `client_id` and `client_secret` are required.
///
/// ```
/// use authgate_client::AuthServerConfig;
///
/// let config: AuthServerConfig = serde_json::from_str(r#"{
///     "base_url": "https://auth.example.com/",
///     "realm": "main",
///     "client_id": "orders-service",
///     "client_secret": "s3cr3t",
///     "jwks_ttl": 600
/// }"#).unwrap();
///
/// assert_eq!(config.token_url(), "https://auth.example.com/oauth/token");
/// assert_eq!(config.key_cache_config().ttl().as_secs(), 600);
/// ```
#[derive(Clone, Debug, Deserialize)]
#[must_use]
pub struct AuthServerConfig {
    base_url: String,
    realm: Realm,
    client_id: ClientId,
    client_secret: ClientSecret,
    #[serde(default = "default_token_path")]
    token_path: String,
    #[serde(default = "default_users_path")]
    users_path: String,
    #[serde(default = "default_jwks_ttl")]
    jwks_ttl: DurationSecs,
    #[serde(default = "default_jwks_max_keys")]
    jwks_max_keys: usize,
    #[serde(default = "default_jwks_fetch_timeout")]
    jwks_fetch_timeout: DurationSecs,
    #[serde(default)]
    algorithm: jwa::Algorithm,
    #[serde(default)]
    issuer: Option<Issuer>,
    #[serde(default)]
    audiences: Vec<Audience>,
    #[serde(default)]
    leeway: DurationSecs,
    #[serde(default = "default_token_min_validity")]
    token_min_validity: DurationSecs,
    #[serde(default = "default_request_timeout")]
    request_timeout: DurationSecs,
}

fn default_token_path() -> String {
    "/oauth/token".into()
}

fn default_users_path() -> String {
    "/users".into()
}

const fn default_jwks_ttl() -> DurationSecs {
    DurationSecs(300)
}

const fn default_jwks_max_keys() -> usize {
    100
}

const fn default_jwks_fetch_timeout() -> DurationSecs {
    DurationSecs(10)
}

const fn default_token_min_validity() -> DurationSecs {
    DurationSecs(30)
}

const fn default_request_timeout() -> DurationSecs {
    DurationSecs(30)
}

fn join(base: &str, path: &str) -> String {
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}

impl AuthServerConfig {
    /// Settings with every optional value at its default
    pub fn new(
        base_url: impl Into<String>,
        realm: impl Into<Realm>,
        client_id: impl Into<ClientId>,
        client_secret: impl Into<ClientSecret>,
    ) -> Self {
        Self {
            base_url: base_url.into(),
            realm: realm.into(),
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            token_path: default_token_path(),
            users_path: default_users_path(),
            jwks_ttl: default_jwks_ttl(),
            jwks_max_keys: default_jwks_max_keys(),
            jwks_fetch_timeout: default_jwks_fetch_timeout(),
            algorithm: jwa::Algorithm::default(),
            issuer: None,
            audiences: Vec::new(),
            leeway: DurationSecs(0),
            token_min_validity: default_token_min_validity(),
            request_timeout: default_request_timeout(),
        }
    }

    /// Token endpoint path relative to the base URL
    pub fn with_token_path(self, token_path: impl Into<String>) -> Self {
        Self {
            token_path: token_path.into(),
            ..self
        }
    }

    /// User endpoint path relative to the base URL
    pub fn with_users_path(self, users_path: impl Into<String>) -> Self {
        Self {
            users_path: users_path.into(),
            ..self
        }
    }

    /// How long fetched signing keys are trusted
    pub fn with_jwks_ttl(self, ttl: DurationSecs) -> Self {
        Self {
            jwks_ttl: ttl,
            ..self
        }
    }

    /// Upper bound on cached signing keys
    pub fn with_jwks_max_keys(self, max_keys: usize) -> Self {
        Self {
            jwks_max_keys: max_keys,
            ..self
        }
    }

    /// Upper bound on one key set fetch
    pub fn with_jwks_fetch_timeout(self, timeout: DurationSecs) -> Self {
        Self {
            jwks_fetch_timeout: timeout,
            ..self
        }
    }

    /// The only algorithm accepted on incoming tokens
    pub fn with_algorithm(self, algorithm: jwa::Algorithm) -> Self {
        Self { algorithm, ..self }
    }

    /// Requires incoming tokens to carry exactly this issuer
    pub fn with_issuer(self, issuer: impl Into<Issuer>) -> Self {
        Self {
            issuer: Some(issuer.into()),
            ..self
        }
    }

    /// Accepts incoming tokens addressed to `audience`
    pub fn with_audience(mut self, audience: impl Into<Audience>) -> Self {
        self.audiences.push(audience.into());
        self
    }

    /// Clock-skew allowance for `exp` and `nbf`
    pub fn with_leeway(self, leeway: DurationSecs) -> Self {
        Self { leeway, ..self }
    }

    /// Stored service tokens closer than this to expiry are requested anew
    pub fn with_token_min_validity(self, min_validity: DurationSecs) -> Self {
        Self {
            token_min_validity: min_validity,
            ..self
        }
    }

    /// Overall timeout for one call to the authorization server
    pub fn with_request_timeout(self, timeout: DurationSecs) -> Self {
        Self {
            request_timeout: timeout,
            ..self
        }
    }

    /// The authorization server's base URL
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// The realm this service belongs to
    #[must_use]
    pub fn realm(&self) -> &Realm {
        &self.realm
    }

    /// This service's client ID
    #[must_use]
    pub fn client_id(&self) -> &ClientId {
        &self.client_id
    }

    pub(crate) fn client_secret(&self) -> &ClientSecret {
        &self.client_secret
    }

    /// Stored-token minimum validity
    #[must_use]
    pub fn token_min_validity(&self) -> DurationSecs {
        self.token_min_validity
    }

    /// Per-call timeout
    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        self.request_timeout.into()
    }

    /// Absolute URL of the token endpoint
    #[must_use]
    pub fn token_url(&self) -> String {
        join(&self.base_url, &self.token_path)
    }

    /// Absolute URL of the user collection
    #[must_use]
    pub fn users_url(&self) -> String {
        join(&self.base_url, &self.users_path)
    }

    /// Absolute URL of one user
    #[must_use]
    pub fn user_url(&self, id: &str) -> String {
        join(&self.users_url(), id)
    }

    /// Absolute URL of the key set document
    #[must_use]
    pub fn jwks_url(&self) -> String {
        authgate_jwks::config::jwks_url(&self.base_url)
    }

    /// Key cache settings derived from these settings
    pub fn key_cache_config(&self) -> KeyCacheConfig {
        KeyCacheConfig::default()
            .with_ttl(self.jwks_ttl.into())
            .with_max_keys(self.jwks_max_keys)
            .with_fetch_timeout(self.jwks_fetch_timeout.into())
    }

    /// Token validator settings derived from these settings
    pub fn validator_config(&self) -> ValidatorConfig {
        let mut config = ValidatorConfig::default()
            .with_algorithm(self.algorithm)
            .with_leeway(self.leeway.into());

        if let Some(issuer) = &self.issuer {
            config = config.with_issuer(issuer.clone());
        }

        for audience in &self.audiences {
            config = config.with_audience(audience.clone());
        }

        config
    }
}

#[cfg(test)]
mod tests {
    use color_eyre::Result;

    use super::*;

    #[test]
    fn minimal_document_takes_defaults() -> Result<()> {
        let config: AuthServerConfig = serde_json::from_str(
            r#"{
                "base_url": "https://auth.example.com",
                "realm": "main",
                "client_id": "orders",
                "client_secret": "s3cr3t"
            }"#,
        )?;

        assert_eq!(config.token_url(), "https://auth.example.com/oauth/token");
        assert_eq!(config.users_url(), "https://auth.example.com/users");
        assert_eq!(config.user_url("42"), "https://auth.example.com/users/42");
        assert_eq!(
            config.jwks_url(),
            "https://auth.example.com/.well-known/jwks.json"
        );

        let cache = config.key_cache_config();
        assert_eq!(cache.ttl(), Duration::from_secs(300));
        assert_eq!(cache.max_keys(), 100);
        assert_eq!(cache.fetch_timeout(), Duration::from_secs(10));

        assert_eq!(config.validator_config().algorithm(), jwa::Algorithm::RS256);
        assert_eq!(config.token_min_validity(), DurationSecs(30));
        Ok(())
    }

    #[test]
    fn secret_does_not_leak_through_debug() {
        let config = AuthServerConfig::new("https://a", "main", "orders", "s3cr3t");
        assert!(!format!("{:?}", config).contains("s3cr3t"));
    }

    #[test]
    fn builders_override_defaults() {
        let config = AuthServerConfig::new("https://auth.example.com/", "main", "orders", "x")
            .with_token_path("realms/main/token")
            .with_users_path("/admin/users/")
            .with_jwks_ttl(DurationSecs(60))
            .with_algorithm(jwa::Algorithm::PS256)
            .with_issuer("https://auth.example.com/realms/main")
            .with_audience("orders");

        assert_eq!(
            config.token_url(),
            "https://auth.example.com/realms/main/token"
        );
        assert_eq!(
            config.user_url("u1"),
            "https://auth.example.com/admin/users/u1"
        );
        assert_eq!(config.key_cache_config().ttl(), Duration::from_secs(60));

        let core = config.validator_config().core_validator();
        assert_eq!(core.algorithm(), jwa::Algorithm::PS256);
        assert_eq!(core.allowed_audiences().len(), 1);
        assert!(core.issuer().is_some());
    }
}
