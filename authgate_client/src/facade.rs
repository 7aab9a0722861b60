use authgate_clock::{Clock, System};
use authgate_jose::{jwt::TokenClaims, JwtRef};
use authgate_jwks::{HttpJwksFetcher, JwksKeyCache, TokenValidator};

use crate::{
    client::AuthClient,
    config::AuthServerConfig,
    decorate::BearerToken,
    dto::{User, UserRegistration},
    error::{ApiErrorKind, AuthError, AuthErrorKind},
    store::TokenStore,
    AccessToken, UserIdRef,
};

/// One entry point for everything a service needs from its authorization
/// server
///
/// Validates incoming bearer tokens, and calls the server's user endpoints
/// with this service's own access token. That token is requested with the
/// client credentials grant and reused until it nears expiry.
#[derive(Debug)]
pub struct AuthFacade<K = System> {
    client: AuthClient,
    validator: TokenValidator<K>,
    store: TokenStore<K>,
}

impl AuthFacade {
    /// Wires up a client, key cache, validator and token store from `config`
    ///
    /// No request is made until the facade is first used.
    ///
    /// # Errors
    ///
    /// An HTTP client could not be constructed.
    pub fn new(config: AuthServerConfig) -> Result<Self, AuthError> {
        let cache = JwksKeyCache::new(
            HttpJwksFetcher::new(config.jwks_url())?,
            config.key_cache_config(),
        );
        let validator = TokenValidator::new(cache, &config.validator_config());
        let store = TokenStore::new(config.token_min_validity());
        let client = AuthClient::new(config)?;

        Ok(Self::from_parts(client, validator, store))
    }
}

impl<K: Clock> AuthFacade<K> {
    /// Assembles a facade from preconfigured parts
    pub fn from_parts(client: AuthClient, validator: TokenValidator<K>, store: TokenStore<K>) -> Self {
        Self {
            client,
            validator,
            store,
        }
    }

    /// Reads time from `clock` for token validation and the token store
    ///
    /// Tokens already stored are discarded.
    pub fn with_clock<K2: Clock + Clone>(self, clock: K2) -> AuthFacade<K2> {
        AuthFacade {
            client: self.client,
            store: TokenStore::with_clock(self.store.min_validity(), clock.clone()),
            validator: self.validator.with_clock(clock),
        }
    }

    /// The HTTP client
    pub fn client(&self) -> &AuthClient {
        &self.client
    }

    /// The signing key cache
    pub fn key_cache(&self) -> &JwksKeyCache {
        self.validator.cache()
    }

    /// The store holding this service's access token
    pub fn store(&self) -> &TokenStore<K> {
        &self.store
    }

    /// Validates an incoming bearer token
    ///
    /// # Errors
    ///
    /// The token was rejected; see [`ValidationError`](authgate_jwks::ValidationError).
    pub async fn validate(&self, token: &JwtRef) -> Result<TokenClaims, AuthError> {
        Ok(self.validator.validate(token).await?)
    }

    /// This service's access token, requested only if none is stored
    ///
    /// # Errors
    ///
    /// A new token was needed and could not be obtained.
    pub async fn client_token(&self) -> Result<AccessToken, AuthError> {
        let config = self.client.config();

        if let Some(token) = self.store.get(config.client_id(), config.realm()) {
            tracing::trace!("reusing stored access token");
            return Ok(token.access_token().to_owned());
        }

        let response = self.client.request_client_token().await?;
        let token = self.store.insert_response(
            config.client_id().clone(),
            config.realm().clone(),
            response,
        );

        Ok(token.access_token().to_owned())
    }

    /// Creates a user
    ///
    /// # Errors
    ///
    /// No service token could be obtained, or the server refused the call.
    pub async fn register_user(&self, registration: &UserRegistration) -> Result<User, AuthError> {
        let auth = self.service_auth().await?;
        let result = self.client.register_user(registration, &auth).await;
        self.forget_token_if_unauthorized(result)
    }

    /// Looks a user up by ID
    ///
    /// # Errors
    ///
    /// No service token could be obtained, or the server refused the call.
    pub async fn lookup_user(&self, id: &UserIdRef) -> Result<User, AuthError> {
        let auth = self.service_auth().await?;
        let result = self.client.lookup_user(id, &auth).await;
        self.forget_token_if_unauthorized(result)
    }

    async fn service_auth(&self) -> Result<BearerToken, AuthError> {
        let token = self.client_token().await?;
        BearerToken::new(&token).map_err(AuthError::decode)
    }

    /// A 401 means the stored token was revoked early; the next call requests
    /// a new one.
    fn forget_token_if_unauthorized<T>(
        &self,
        result: Result<T, AuthError>,
    ) -> Result<T, AuthError> {
        if let Err(err) = &result {
            if err.kind() == AuthErrorKind::Api(ApiErrorKind::Unauthorized) {
                let config = self.client.config();
                if self.store.remove(config.client_id(), config.realm()).is_some() {
                    tracing::debug!("discarded access token refused by the authorization server");
                }
            }
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use authgate_clock::{DurationSecs, TestClock, UnixTime};
    use authgate_jose::{
        jwa::{self, rsa::PrivateKey},
        jwt::Headers,
        Jwt,
    };
    use authgate_jwks::ValidationErrorKind;
    use color_eyre::Result;
    use tracing_test::traced_test;
    use wiremock::{
        matchers::{header, method, path},
        Mock, MockServer, ResponseTemplate,
    };

    use super::*;

    const JWKS: &str = include_str!("../data/rsa/jwks.json");
    const PRIMARY_PKCS8: &[u8] = include_bytes!("../data/rsa/primary.pk8");
    const NOW: UnixTime = UnixTime(1_700_000_000);
    const ISSUER: &str = "https://auth.example.com/realms/main";

    fn facade_for(server: &MockServer) -> Result<(TestClock, AuthFacade<TestClock>)> {
        let config = AuthServerConfig::new(server.uri(), "main", "orders", "s3cr3t")
            .with_issuer(ISSUER);
        let clock = TestClock::new(NOW);
        let facade = AuthFacade::new(config)?.with_clock(clock.clone());
        Ok((clock, facade))
    }

    fn signed_token() -> Result<Jwt> {
        let claims = TokenClaims::new("alice", ISSUER, "main", NOW, NOW + DurationSecs(300))
            .with_roles(["reader", "writer"]);
        Ok(Jwt::sign(
            &Headers::new(jwa::Algorithm::RS256).with_key_id("k1"),
            &claims,
            &PrivateKey::from_pkcs8_der(PRIMARY_PKCS8)?,
        )?)
    }

    async fn mount_jwks(server: &MockServer) {
        Mock::given(method("GET"))
            .and(path("/.well-known/jwks.json"))
            .respond_with(ResponseTemplate::new(200).set_body_string(JWKS))
            .expect(1)
            .mount(server)
            .await;
    }

    async fn mount_token_endpoint(server: &MockServer, calls: u64) {
        Mock::given(method("POST"))
            .and(path("/oauth/token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": "service-token",
                "expires_in": 300,
            })))
            .expect(calls)
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn validates_against_published_keys() -> Result<()> {
        let server = MockServer::start().await;
        mount_jwks(&server).await;
        let (_, facade) = facade_for(&server)?;

        let token = signed_token()?;
        let claims = facade.validate(&token).await?;
        assert_eq!(claims.sub().as_str(), "alice");
        assert!(claims.has_all_roles(&["reader", "writer"]));

        let again = facade.validate(&token).await?;
        assert_eq!(again.sub().as_str(), "alice");
        assert_eq!(facade.key_cache().stats().refreshes, 1);
        Ok(())
    }

    #[tokio::test]
    async fn expired_token_surfaces_as_validation_error() -> Result<()> {
        let server = MockServer::start().await;
        mount_jwks(&server).await;
        let (clock, facade) = facade_for(&server)?;

        clock.inc(310);
        let err = facade.validate(&signed_token()?).await.unwrap_err();
        assert_eq!(
            err.kind(),
            AuthErrorKind::Validation(ValidationErrorKind::TokenExpired)
        );
        Ok(())
    }

    #[tokio::test]
    async fn service_token_is_reused_until_near_expiry() -> Result<()> {
        let server = MockServer::start().await;
        mount_token_endpoint(&server, 2).await;
        let (clock, facade) = facade_for(&server)?;

        assert_eq!(facade.client_token().await?.as_str(), "service-token");
        clock.inc(200);
        facade.client_token().await?;
        assert_eq!(facade.store().len(), 1);

        clock.inc(70);
        assert!(facade.store().is_empty());
        facade.client_token().await?;
        Ok(())
    }

    #[tokio::test]
    async fn user_calls_carry_the_service_token() -> Result<()> {
        let server = MockServer::start().await;
        mount_token_endpoint(&server, 1).await;
        Mock::given(method("POST"))
            .and(path("/users"))
            .and(header("authorization", "Bearer service-token"))
            .and(header("x-auth-realm", "main"))
            .respond_with(ResponseTemplate::new(201).set_body_json(serde_json::json!({
                "id": "u-1",
                "username": "alice",
                "enabled": true,
            })))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/users/u-1"))
            .and(header("authorization", "Bearer service-token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "id": "u-1",
                "username": "alice",
            })))
            .expect(1)
            .mount(&server)
            .await;

        let (_, facade) = facade_for(&server)?;
        let created = facade
            .register_user(&UserRegistration::new("alice", "alice@example.com"))
            .await?;
        let found = facade.lookup_user(&created.id).await?;
        assert_eq!(found.username, "alice");
        Ok(())
    }

    #[tokio::test]
    #[traced_test]
    async fn unauthorized_call_discards_the_service_token() -> Result<()> {
        let server = MockServer::start().await;
        mount_token_endpoint(&server, 2).await;
        Mock::given(method("GET"))
            .and(path("/users/u-1"))
            .respond_with(ResponseTemplate::new(401))
            .expect(2)
            .mount(&server)
            .await;

        let (_, facade) = facade_for(&server)?;
        let id = UserIdRef::from_static("u-1");

        let err = facade.lookup_user(id).await.unwrap_err();
        assert_eq!(err.kind(), AuthErrorKind::Api(ApiErrorKind::Unauthorized));
        assert!(facade.store().is_empty());
        assert!(logs_contain("discarded access token refused"));

        assert!(facade.lookup_user(id).await.is_err());
        Ok(())
    }
}
