use std::{fmt, sync::Arc};

use reqwest::{Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;

use crate::{
    config::AuthServerConfig,
    decorate::{RequestContext, RequestDecorator, StaticHeader},
    dto::{ClientCredentials, TokenResponse, User, UserRegistration},
    error::AuthError,
    UserIdRef,
};

/// Calls the authorization server's token and user endpoints
///
/// Every request passes through the client's decorators, in the order they
/// were added, and then through any per-call decorator. The realm header is
/// always the first decorator.
#[derive(Clone)]
pub struct AuthClient {
    http: Client,
    config: Arc<AuthServerConfig>,
    decorators: Vec<Arc<dyn RequestDecorator>>,
}

impl fmt::Debug for AuthClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthClient")
            .field("base_url", &self.config.base_url())
            .field("realm", self.config.realm())
            .field("client_id", self.config.client_id())
            .field("decorators", &self.decorators.len())
            .finish()
    }
}

impl AuthClient {
    /// Builds an HTTP client honoring the configured request timeout
    ///
    /// # Errors
    ///
    /// The HTTP client could not be constructed, or the realm cannot be
    /// sent as a header.
    pub fn new(config: AuthServerConfig) -> Result<Self, AuthError> {
        let http = Client::builder()
            .user_agent(concat!("authgate_client/", env!("CARGO_PKG_VERSION")))
            .timeout(config.request_timeout())
            .build()?;

        Self::with_http_client(http, config)
    }

    /// Uses a preconfigured HTTP client
    ///
    /// # Errors
    ///
    /// The realm cannot be sent as a header.
    pub fn with_http_client(http: Client, config: AuthServerConfig) -> Result<Self, AuthError> {
        let realm: Arc<dyn RequestDecorator> =
            Arc::new(StaticHeader::realm(config.realm().as_str()).map_err(AuthError::decode)?);

        Ok(Self {
            http,
            config: Arc::new(config),
            decorators: vec![realm],
        })
    }

    /// Adds a decorator applied to every request
    #[must_use]
    pub fn with_decorator(mut self, decorator: impl RequestDecorator + 'static) -> Self {
        self.decorators.push(Arc::new(decorator));
        self
    }

    /// The settings in effect
    #[must_use]
    pub fn config(&self) -> &AuthServerConfig {
        &self.config
    }

    /// Requests a token for this service with the client credentials grant
    ///
    /// # Errors
    ///
    /// The request failed, the server refused it, or the response is not a
    /// token.
    #[tracing::instrument(
        skip(self),
        fields(
            token_url = %self.config.token_url(),
            credentials.client_id = %self.config.client_id(),
        ),
    )]
    pub async fn request_client_token(&self) -> Result<TokenResponse, AuthError> {
        tracing::trace!("requesting token from authority");

        let credentials = ClientCredentials {
            client_id: self.config.client_id(),
            client_secret: self.config.client_secret(),
        };
        let request = self.http.post(self.config.token_url()).form(&credentials);

        let token: TokenResponse = self.send_json(request, None).await?;

        tracing::info!(
            lifetime = token.expires_in.0,
            token_type = %token.token_type,
            "received new access token"
        );

        Ok(token)
    }

    /// Creates a user
    ///
    /// # Errors
    ///
    /// The request failed, the server refused it, or the response is not a
    /// user.
    #[tracing::instrument(skip_all, fields(user.username = %registration.username()))]
    pub async fn register_user(
        &self,
        registration: &UserRegistration,
        auth: &dyn RequestDecorator,
    ) -> Result<User, AuthError> {
        let request = self.http.post(self.config.users_url()).json(registration);
        let user: User = self.send_json(request, Some(auth)).await?;

        tracing::info!(user.id = %user.id, "registered user");
        Ok(user)
    }

    /// Looks a user up by ID
    ///
    /// # Errors
    ///
    /// The request failed, the server refused it (including `NotFound`), or
    /// the response is not a user.
    #[tracing::instrument(skip_all, fields(user.id = %id))]
    pub async fn lookup_user(
        &self,
        id: &UserIdRef,
        auth: &dyn RequestDecorator,
    ) -> Result<User, AuthError> {
        let request = self.http.get(self.config.user_url(id.as_str()));
        self.send_json(request, Some(auth)).await
    }

    async fn send_json<T: DeserializeOwned>(
        &self,
        request: RequestBuilder,
        extra: Option<&dyn RequestDecorator>,
    ) -> Result<T, AuthError> {
        let response = self.send(request, extra).await?;
        let body = response.bytes().await?;
        serde_json::from_slice(&body).map_err(AuthError::decode)
    }

    async fn send(
        &self,
        request: RequestBuilder,
        extra: Option<&dyn RequestDecorator>,
    ) -> Result<Response, AuthError> {
        let mut ctx = RequestContext::new(request.build()?);
        for decorator in &self.decorators {
            ctx = decorator.decorate(ctx);
        }
        if let Some(extra) = extra {
            ctx = extra.decorate(ctx);
        }

        let response = self.http.execute(ctx.into_request()).await?;
        let status = response.status();

        tracing::debug!(
            http.status_code = status.as_u16(),
            "received response from authorization server"
        );

        if status.is_success() {
            return Ok(response);
        }

        let body = response.bytes().await?;
        let err = AuthError::from_response(status.as_u16(), &body);
        tracing::warn!(
            http.status_code = status.as_u16(),
            error = %err,
            "authorization server refused request"
        );
        Err(err)
    }
}

#[cfg(test)]
mod tests {
    use color_eyre::Result;
    use wiremock::{
        matchers::{body_string_contains, header, method, path},
        Mock, MockServer, ResponseTemplate,
    };

    use super::*;
    use crate::{
        decorate::BearerToken,
        error::{ApiErrorKind, AuthErrorKind},
        AccessToken,
    };

    fn client_for(server: &MockServer) -> Result<AuthClient> {
        Ok(AuthClient::new(AuthServerConfig::new(
            server.uri(),
            "main",
            "orders",
            "s3cr3t",
        ))?)
    }

    fn bearer(token: &'static str) -> Result<BearerToken> {
        Ok(BearerToken::new(&AccessToken::from_static(token))?)
    }

    #[tokio::test]
    async fn client_credentials_are_posted_as_a_form() -> Result<()> {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/oauth/token"))
            .and(header("content-type", "application/x-www-form-urlencoded"))
            .and(header("x-auth-realm", "main"))
            .and(body_string_contains("grant_type=client_credentials"))
            .and(body_string_contains("client_id=orders"))
            .and(body_string_contains("client_secret=s3cr3t"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": "service-token",
                "token_type": "Bearer",
                "expires_in": 300,
            })))
            .expect(1)
            .mount(&server)
            .await;

        let token = client_for(&server)?.request_client_token().await?;
        assert_eq!(token.access_token.as_str(), "service-token");
        assert_eq!(token.expires_in.0, 300);
        Ok(())
    }

    #[tokio::test]
    async fn refused_credentials_are_unauthorized() -> Result<()> {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/oauth/token"))
            .respond_with(ResponseTemplate::new(401).set_body_json(serde_json::json!({
                "error": "invalid_client",
                "error_description": "bad secret",
            })))
            .mount(&server)
            .await;

        let err = client_for(&server)?
            .request_client_token()
            .await
            .unwrap_err();
        assert_eq!(err.kind(), AuthErrorKind::Api(ApiErrorKind::Unauthorized));
        assert_eq!(
            err.to_string(),
            "authorization server responded with 401: bad secret"
        );
        Ok(())
    }

    #[tokio::test]
    async fn non_token_body_is_a_decode_error() -> Result<()> {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>"))
            .mount(&server)
            .await;

        let err = client_for(&server)?
            .request_client_token()
            .await
            .unwrap_err();
        assert_eq!(err.kind(), AuthErrorKind::Decode);
        Ok(())
    }

    #[tokio::test]
    async fn registers_user_with_bearer_token() -> Result<()> {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/users"))
            .and(header("authorization", "Bearer service-token"))
            .and(header("content-type", "application/json"))
            .and(body_string_contains("\"username\":\"alice\""))
            .respond_with(ResponseTemplate::new(201).set_body_json(serde_json::json!({
                "id": "u-1",
                "username": "alice",
                "email": "alice@example.com",
                "enabled": true,
            })))
            .expect(1)
            .mount(&server)
            .await;

        let user = client_for(&server)?
            .register_user(
                &UserRegistration::new("alice", "alice@example.com"),
                &bearer("service-token")?,
            )
            .await?;

        assert_eq!(user.id.as_str(), "u-1");
        assert!(user.enabled);
        Ok(())
    }

    #[tokio::test]
    async fn duplicate_user_is_a_conflict() -> Result<()> {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/users"))
            .respond_with(
                ResponseTemplate::new(409).set_body_json(serde_json::json!({
                    "message": "username taken",
                })),
            )
            .mount(&server)
            .await;

        let err = client_for(&server)?
            .register_user(
                &UserRegistration::new("alice", "alice@example.com"),
                &bearer("t")?,
            )
            .await
            .unwrap_err();
        assert_eq!(err.kind(), AuthErrorKind::Api(ApiErrorKind::Conflict));
        assert_eq!(err.status(), Some(409));
        Ok(())
    }

    #[tokio::test]
    async fn looks_up_user_by_id() -> Result<()> {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/users/u-1"))
            .and(header("authorization", "Bearer t"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "id": "u-1",
                "username": "alice",
                "roles": ["reader"],
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/users/u-2"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let client = client_for(&server)?;
        let user = client
            .lookup_user(UserIdRef::from_static("u-1"), &bearer("t")?)
            .await?;
        assert_eq!(user.roles, ["reader"]);

        let err = client
            .lookup_user(UserIdRef::from_static("u-2"), &bearer("t")?)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), AuthErrorKind::Api(ApiErrorKind::NotFound));
        Ok(())
    }

    #[tokio::test]
    async fn client_decorators_run_before_per_call_ones() -> Result<()> {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/users/u-1"))
            .and(header("authorization", "Bearer from-client"))
            .and(header("x-request-id", "r-1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "id": "u-1",
                "username": "alice",
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = client_for(&server)?
            .with_decorator(bearer("from-client")?)
            .with_decorator(|mut ctx: RequestContext| {
                ctx.headers_mut().insert(
                    "x-request-id",
                    reqwest::header::HeaderValue::from_static("r-1"),
                );
                ctx
            });

        client
            .lookup_user(UserIdRef::from_static("u-1"), &bearer("per-call")?)
            .await?;
        Ok(())
    }
}
