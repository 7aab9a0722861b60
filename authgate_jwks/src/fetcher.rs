use std::{fmt, sync::Arc};

use async_trait::async_trait;
use authgate_jose::Jwks;

use crate::error::JwksFetchError;

/// A source of the authorization server's key set
///
/// The cache calls [`fetch()`](Self::fetch) at most once per refresh, no
/// matter how many callers are waiting on that refresh.
#[async_trait]
pub trait JwksFetcher: fmt::Debug + Send + Sync {
    /// Retrieves the current key set
    ///
    /// # Errors
    ///
    /// The key set could not be retrieved or decoded.
    async fn fetch(&self) -> Result<Jwks, JwksFetchError>;
}

#[async_trait]
impl<T> JwksFetcher for Arc<T>
where
    T: JwksFetcher + ?Sized,
{
    async fn fetch(&self) -> Result<Jwks, JwksFetchError> {
        T::fetch(self).await
    }
}

#[cfg(feature = "reqwest")]
pub use self::http::HttpJwksFetcher;

#[cfg(feature = "reqwest")]
mod http {
    use std::sync::{Mutex, PoisonError};

    use async_trait::async_trait;
    use authgate_jose::Jwks;
    use reqwest::{
        header::{self, HeaderValue},
        Client, StatusCode,
    };

    use super::JwksFetcher;
    use crate::{config, error::JwksFetchError};

    #[derive(Debug)]
    struct Validated {
        etag: HeaderValue,
        jwks: Jwks,
    }

    /// Fetches the key set over HTTP
    ///
    /// When the server supplies an `ETag`, later fetches are conditional and
    /// a `304 Not Modified` reuses the previously decoded document.
    #[derive(Debug)]
    #[cfg_attr(docsrs, doc(cfg(feature = "reqwest")))]
    pub struct HttpJwksFetcher {
        client: Client,
        jwks_url: String,
        last: Mutex<Option<Validated>>,
    }

    impl HttpJwksFetcher {
        /// Fetches from an explicit key set URL
        ///
        /// # Errors
        ///
        /// The HTTP client could not be constructed.
        pub fn new(jwks_url: impl Into<String>) -> Result<Self, reqwest::Error> {
            let client = Client::builder()
                .user_agent(concat!("authgate_jwks/", env!("CARGO_PKG_VERSION")))
                .build()?;

            Ok(Self::with_client(client, jwks_url))
        }

        /// Fetches from `{base_url}/.well-known/jwks.json`
        ///
        /// # Errors
        ///
        /// The HTTP client could not be constructed.
        pub fn from_base_url(base_url: &str) -> Result<Self, reqwest::Error> {
            Self::new(config::jwks_url(base_url))
        }

        /// Fetches using a preconfigured client
        pub fn with_client(client: Client, jwks_url: impl Into<String>) -> Self {
            Self {
                client,
                jwks_url: jwks_url.into(),
                last: Mutex::new(None),
            }
        }

        /// The URL fetched from
        #[must_use]
        pub fn jwks_url(&self) -> &str {
            &self.jwks_url
        }
    }

    #[async_trait]
    impl JwksFetcher for HttpJwksFetcher {
        #[tracing::instrument(skip(self), fields(jwks.url = %self.jwks_url))]
        async fn fetch(&self) -> Result<Jwks, JwksFetchError> {
            tracing::debug!("fetching JWKS");
            let mut request = self.client.get(&self.jwks_url);

            {
                let last = self.last.lock().unwrap_or_else(PoisonError::into_inner);
                if let Some(last) = &*last {
                    request = request.header(header::IF_NONE_MATCH, last.etag.clone());
                }
            }

            let response = request.send().await.map_err(|err| {
                let error: &(dyn std::error::Error + 'static) = &err;
                tracing::warn!(error, "JWKS request failed");
                JwksFetchError::transport(err)
            })?;

            let status = response.status();
            if status == StatusCode::NOT_MODIFIED {
                let last = self.last.lock().unwrap_or_else(PoisonError::into_inner);
                if let Some(last) = &*last {
                    tracing::debug!("JWKS not modified");
                    return Ok(last.jwks.clone());
                }
            }

            if !status.is_success() {
                tracing::warn!(
                    http.status_code = status.as_u16(),
                    "JWKS fetch failed; unexpected response status",
                );
                return Err(JwksFetchError::UnexpectedStatus {
                    status: status.as_u16(),
                });
            }

            let etag = response.headers().get(header::ETAG).map(ToOwned::to_owned);
            let body = response.bytes().await.map_err(JwksFetchError::transport)?;

            let jwks: Jwks = serde_json::from_slice(&body).map_err(|err| {
                let error: &(dyn std::error::Error + 'static) = &err;
                tracing::warn!(error, "JWKS fetch failed; malformed document");
                JwksFetchError::malformed_body(err)
            })?;

            let mut last = self.last.lock().unwrap_or_else(PoisonError::into_inner);
            *last = etag.map(|etag| Validated {
                etag,
                jwks: jwks.clone(),
            });

            Ok(jwks)
        }
    }

    #[cfg(test)]
    mod tests {
        use color_eyre::Result;
        use wiremock::{
            matchers::{header as header_is, method, path},
            Mock, MockServer, ResponseTemplate,
        };

        use super::*;
        use crate::test;

        async fn fetcher_for(server: &MockServer) -> Result<HttpJwksFetcher> {
            Ok(HttpJwksFetcher::from_base_url(&server.uri())?)
        }

        #[tokio::test]
        async fn fetches_well_known_document() -> Result<()> {
            let server = MockServer::start().await;
            Mock::given(method("GET"))
                .and(path("/.well-known/jwks.json"))
                .respond_with(ResponseTemplate::new(200).set_body_string(test::JWKS))
                .expect(1)
                .mount(&server)
                .await;

            let fetcher = fetcher_for(&server).await?;
            let jwks = fetcher.fetch().await?;
            assert_eq!(jwks.len(), 2);
            assert!(jwks.get("k1").is_some());
            Ok(())
        }

        #[tokio::test]
        async fn non_success_status_is_a_fetch_error() -> Result<()> {
            let server = MockServer::start().await;
            Mock::given(method("GET"))
                .respond_with(ResponseTemplate::new(503))
                .mount(&server)
                .await;

            let err = fetcher_for(&server).await?.fetch().await.unwrap_err();
            assert!(matches!(
                err,
                JwksFetchError::UnexpectedStatus { status: 503 }
            ));
            Ok(())
        }

        #[tokio::test]
        async fn malformed_document_is_a_fetch_error() -> Result<()> {
            let server = MockServer::start().await;
            Mock::given(method("GET"))
                .respond_with(ResponseTemplate::new(200).set_body_string("<html>oops</html>"))
                .mount(&server)
                .await;

            let err = fetcher_for(&server).await?.fetch().await.unwrap_err();
            assert!(matches!(err, JwksFetchError::MalformedBody(_)));
            Ok(())
        }

        #[tokio::test]
        async fn unreachable_server_is_a_transport_error() -> Result<()> {
            // Nothing listens on a port freed right after binding
            let listener = std::net::TcpListener::bind("127.0.0.1:0")?;
            let addr = listener.local_addr()?;
            drop(listener);

            let err = HttpJwksFetcher::from_base_url(&format!("http://{}", addr))?
                .fetch()
                .await
                .unwrap_err();
            assert!(matches!(err, JwksFetchError::Transport(_)));
            Ok(())
        }

        #[tokio::test]
        async fn etag_makes_refetch_conditional() -> Result<()> {
            let server = MockServer::start().await;
            Mock::given(method("GET"))
                .and(header_is("if-none-match", "\"v1\""))
                .respond_with(ResponseTemplate::new(304))
                .expect(1)
                .mount(&server)
                .await;
            Mock::given(method("GET"))
                .respond_with(
                    ResponseTemplate::new(200)
                        .insert_header("etag", "\"v1\"")
                        .set_body_string(test::JWKS),
                )
                .expect(1)
                .mount(&server)
                .await;

            let fetcher = fetcher_for(&server).await?;
            let first = fetcher.fetch().await?;
            let second = fetcher.fetch().await?;
            assert_eq!(first, second);
            Ok(())
        }
    }
}
