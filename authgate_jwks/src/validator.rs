use authgate_clock::{Clock, System};
use authgate_jose::{
    error::MalformedToken,
    jwt::{CoreClaims, CoreValidator, TokenClaims},
    JwtRef,
};
use serde::Deserialize;

use crate::{config::ValidatorConfig, error::ValidationError, JwksKeyCache};

/// Target for log events describing rejected tokens that may indicate an attack
const SECURITY_TARGET: &str = "authgate::security";

/// Validates bearer tokens against the keys held by a [`JwksKeyCache`]
///
/// The signing algorithm is pinned by configuration. A token naming any
/// other algorithm, `none` included, is refused before any key is looked up.
#[derive(Clone, Debug)]
pub struct TokenValidator<K = System> {
    cache: JwksKeyCache,
    core: CoreValidator,
    clock: K,
}

impl TokenValidator {
    /// Constructs a validator reading the system clock
    pub fn new(cache: JwksKeyCache, config: &ValidatorConfig) -> Self {
        Self::from_core(cache, config.core_validator())
    }

    /// Constructs a validator from an already-built claims validator
    pub fn from_core(cache: JwksKeyCache, core: CoreValidator) -> Self {
        Self {
            cache,
            core,
            clock: System,
        }
    }
}

impl<K: Clock> TokenValidator<K> {
    /// Replaces the clock used for temporal checks
    pub fn with_clock<K2: Clock>(self, clock: K2) -> TokenValidator<K2> {
        TokenValidator {
            cache: self.cache,
            core: self.core,
            clock,
        }
    }

    /// The key cache backing this validator
    pub fn cache(&self) -> &JwksKeyCache {
        &self.cache
    }

    /// The claims validator in effect
    pub fn core(&self) -> &CoreValidator {
        &self.core
    }

    /// Validates `token` and returns its claims
    ///
    /// # Errors
    ///
    /// The token is malformed, its signing key is unavailable or unusable,
    /// its signature does not match, or its claims are rejected.
    pub async fn validate(&self, token: &JwtRef) -> Result<TokenClaims, ValidationError> {
        self.validate_as(token).await
    }

    /// Validates `token`, deserializing its payload as `C`
    ///
    /// # Errors
    ///
    /// See [`validate()`](Self::validate).
    #[tracing::instrument(level = "debug", skip_all, fields(jwt.kid = tracing::field::Empty))]
    pub async fn validate_as<C>(&self, token: &JwtRef) -> Result<C, ValidationError>
    where
        C: for<'de> Deserialize<'de> + CoreClaims,
    {
        let decomposed = token.decompose()?;

        if let Err(err) = self.core.check_algorithm(decomposed.untrusted_header()) {
            if let MalformedToken::UnexpectedAlgorithm { found, .. } = &err {
                tracing::warn!(
                    target: SECURITY_TARGET,
                    alg = %found,
                    expected = %self.core.algorithm(),
                    "rejected token with unexpected algorithm"
                );
            }
            return Err(err.into());
        }

        let kid = decomposed.key_id()?;
        tracing::Span::current().record("jwt.kid", tracing::field::display(kid));

        let key = self.cache.get_public_key(kid).await?;

        if let Some(key_algorithm) = key.algorithm() {
            if key_algorithm != self.core.algorithm() {
                tracing::warn!(
                    target: SECURITY_TARGET,
                    kid = %kid,
                    key_alg = %key_algorithm,
                    expected = %self.core.algorithm(),
                    "rejected token signed with a key restricted to another algorithm"
                );
                return Err(ValidationError::IncompatibleKey {
                    kid: kid.to_owned(),
                    key_algorithm,
                    expected: self.core.algorithm(),
                });
            }
        }

        let kid = kid.to_owned();
        let validated = decomposed
            .verify_with_clock::<C, _>(key.public_key(), &self.core, &self.clock)
            .map_err(ValidationError::from)
            .map_err(|err| {
                if let ValidationError::InvalidSignature(_) = err {
                    tracing::warn!(
                        target: SECURITY_TARGET,
                        kid = %kid,
                        "rejected token with invalid signature"
                    );
                } else {
                    tracing::debug!(jwt.kid = %kid, error = %err, "rejected token");
                }
                err
            })?;

        Ok(validated.into_claims())
    }
}
