//! Settings for the key cache and the token validator

use std::time::Duration;

use authgate_jose::{
    jwa,
    jwt::{Audience, CoreValidator, Issuer},
};

/// Path of the key set document relative to the authorization server's base URL
pub const JWKS_PATH: &str = "/.well-known/jwks.json";

/// Joins `base_url` and [`JWKS_PATH`], tolerating a trailing `/` on the base
#[must_use]
pub fn jwks_url(base_url: &str) -> String {
    format!("{}{}", base_url.trim_end_matches('/'), JWKS_PATH)
}

/// Settings for a [`JwksKeyCache`](crate::JwksKeyCache)
#[derive(Clone, Debug, PartialEq, Eq)]
#[must_use]
pub struct KeyCacheConfig {
    ttl: Duration,
    max_keys: usize,
    fetch_timeout: Duration,
}

impl Default for KeyCacheConfig {
    /// Five minute TTL, at most 100 keys, ten second fetch timeout
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(300),
            max_keys: 100,
            fetch_timeout: Duration::from_secs(10),
        }
    }
}

impl KeyCacheConfig {
    /// How long keys from one refresh stay usable
    pub fn with_ttl(self, ttl: Duration) -> Self {
        Self { ttl, ..self }
    }

    /// Upper bound on the number of distinct key IDs held
    ///
    /// A bound of zero is raised to one.
    pub fn with_max_keys(self, max_keys: usize) -> Self {
        Self {
            max_keys: max_keys.max(1),
            ..self
        }
    }

    /// Upper bound on the duration of one key set fetch
    pub fn with_fetch_timeout(self, fetch_timeout: Duration) -> Self {
        Self {
            fetch_timeout,
            ..self
        }
    }

    /// The time-to-live of fetched keys
    #[must_use]
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// The maximum number of keys
    #[must_use]
    pub fn max_keys(&self) -> usize {
        self.max_keys
    }

    /// The fetch timeout
    #[must_use]
    pub fn fetch_timeout(&self) -> Duration {
        self.fetch_timeout
    }
}

/// Settings for a [`TokenValidator`](crate::TokenValidator)
#[derive(Clone, Debug, Default, PartialEq, Eq)]
#[must_use]
pub struct ValidatorConfig {
    algorithm: jwa::Algorithm,
    issuer: Option<Issuer>,
    audiences: Vec<Audience>,
    leeway: Duration,
}

impl ValidatorConfig {
    /// The only algorithm tokens may be signed with; RS256 unless changed
    pub fn with_algorithm(self, algorithm: jwa::Algorithm) -> Self {
        Self { algorithm, ..self }
    }

    /// Requires `iss` to equal `issuer`
    pub fn with_issuer(self, issuer: impl Into<Issuer>) -> Self {
        Self {
            issuer: Some(issuer.into()),
            ..self
        }
    }

    /// Adds an audience; a token must name at least one added audience
    pub fn with_audience(self, audience: impl Into<Audience>) -> Self {
        let mut this = self;
        this.audiences.push(audience.into());
        this
    }

    /// Clock-skew allowance applied to `exp` and `nbf`
    pub fn with_leeway(self, leeway: Duration) -> Self {
        Self { leeway, ..self }
    }

    /// The pinned algorithm
    #[must_use]
    pub fn algorithm(&self) -> jwa::Algorithm {
        self.algorithm
    }

    /// Builds the claims validator these settings describe
    pub fn core_validator(&self) -> CoreValidator {
        let mut validator = CoreValidator::new(self.algorithm)
            .with_leeway(self.leeway)
            .extend_allowed_audiences(self.audiences.iter().cloned());

        if let Some(issuer) = &self.issuer {
            validator = validator.require_issuer(issuer.clone());
        }

        validator
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn jwks_url_joins_cleanly() {
        assert_eq!(
            jwks_url("https://auth.example.com"),
            "https://auth.example.com/.well-known/jwks.json"
        );
        assert_eq!(
            jwks_url("https://auth.example.com/realms/main/"),
            "https://auth.example.com/realms/main/.well-known/jwks.json"
        );
    }

    #[test]
    fn zero_max_keys_is_raised() {
        assert_eq!(KeyCacheConfig::default().with_max_keys(0).max_keys(), 1);
    }

    #[test]
    fn validator_config_carries_through() {
        let core = ValidatorConfig::default()
            .with_algorithm(jwa::Algorithm::PS256)
            .with_issuer("https://auth.example.com")
            .with_audience("orders")
            .with_leeway(Duration::from_secs(5))
            .core_validator();

        assert_eq!(core.algorithm(), jwa::Algorithm::PS256);
        assert_eq!(
            core.issuer().map(|i| i.as_str()),
            Some("https://auth.example.com")
        );
        assert_eq!(core.allowed_audiences().len(), 1);
        assert_eq!(core.leeway(), Duration::from_secs(5));
    }
}
