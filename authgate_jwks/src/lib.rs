//! Bearer token validation against the signing keys an OAuth2/OIDC
//! authorization server publishes at `/.well-known/jwks.json`
//!
//! A [`JwksKeyCache`] holds the converted keys for a bounded time and
//! refreshes them on demand when a token names a key it does not know. A
//! [`TokenValidator`] pins the signing algorithm, looks the token's key up
//! in the cache, and checks the signature and claims.
//!
//! # Example
//!
//! ```no_run
//! use std::time::Duration;
//!
//! use authgate_jose::Jwt;
//! use authgate_jwks::{JwksKeyCache, KeyCacheConfig, TokenValidator, ValidatorConfig};
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let cache = JwksKeyCache::from_base_url(
//!     "https://auth.example.com",
//!     KeyCacheConfig::default().with_ttl(Duration::from_secs(600)),
//! )?;
//!
//! let validator = TokenValidator::new(
//!     cache,
//!     &ValidatorConfig::default()
//!         .with_issuer("https://auth.example.com/realms/main")
//!         .with_audience("orders"),
//! );
//!
//! let token = Jwt::from_static("eyJhbGciOiJSUzI1NiIsImtpZCI6ImsxIn0.e30.c2ln");
//! match validator.validate(&token).await {
//!     Ok(claims) => println!("hello {}", claims.sub()),
//!     Err(err) if err.is_reauthenticate() => println!("token needs renewal: {}", err),
//!     Err(err) => println!("token rejected: {}", err),
//! }
//! # Ok(())
//! # }
//! ```
//!
//! # Feature flags
//!
//! The `reqwest` feature, on by default, provides [`HttpJwksFetcher`]. This
//! crate does not enable TLS support in `reqwest` itself. If your
//! application already uses `reqwest` with some TLS settings, those settings
//! apply here too. Otherwise enable the `default-tls` or `rustls-tls`
//! feature to fetch keys over HTTPS.

#![cfg_attr(docsrs, feature(doc_cfg))]
#![warn(
    missing_docs,
    unused_import_braces,
    unused_imports,
    unused_qualifications
)]
#![deny(
    missing_debug_implementations,
    trivial_casts,
    trivial_numeric_casts,
    unsafe_code,
    unused_must_use
)]

mod cache;
pub mod config;
pub mod error;
mod fetcher;
mod validator;


pub use cache::{CacheStats, JwksKeyCache, ResolvedKey};
pub use config::{KeyCacheConfig, ValidatorConfig};
pub use error::{JwksFetchError, KeyLookupError, ValidationError, ValidationErrorKind};
#[cfg(feature = "reqwest")]
pub use fetcher::HttpJwksFetcher;
pub use fetcher::JwksFetcher;
pub use validator::TokenValidator;
