//! A thin client for an OAuth2/OIDC authorization server
//!
//! Services usually need three things from their authorization server:
//! validating the bearer tokens presented by callers, an access token of
//! their own, and a few administrative calls such as creating users. The
//! [`AuthFacade`] bundles all three behind one value built from an
//! [`AuthServerConfig`].
//!
//! ```no_run
//! use authgate_client::{dto::UserRegistration, AuthFacade, AuthServerConfig};
//! use authgate_jose::Jwt;
//!
//! # async fn run() -> Result<(), authgate_client::AuthError> {
//! let config = AuthServerConfig::new(
//!     "https://auth.example.com",
//!     "main",
//!     "orders-service",
//!     "s3cr3t",
//! )
//! .with_issuer("https://auth.example.com/realms/main");
//!
//! let auth = AuthFacade::new(config)?;
//!
//! let claims = auth.validate(&Jwt::from_static("eyJ...")).await?;
//! if claims.has_role("admin") {
//!     auth.register_user(&UserRegistration::new("bob", "bob@example.com"))
//!         .await?;
//! }
//! # Ok(())
//! # }
//! ```
//!
//! Failures of every call are reported as one [`AuthError`], whose
//! [`kind()`](AuthError::kind) tells HTTP refusals, transport failures,
//! undecodable responses and rejected tokens apart.
//!
//! # Feature flags
//!
//! This crate does not enable TLS support in `reqwest` itself. Enable the
//! `default-tls` or `rustls-tls` feature unless your application already
//! configures `reqwest` with one.

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

mod braids;
mod client;
pub mod config;
pub mod decorate;
pub mod dto;
pub mod error;
mod facade;
mod store;

pub use authgate_jose::jwt::{ClientId, ClientIdRef, Realm, RealmRef};
pub use braids::*;
pub use client::AuthClient;
pub use config::AuthServerConfig;
pub use error::{ApiErrorKind, AuthError, AuthErrorKind};
pub use facade::AuthFacade;
pub use store::{StoredToken, TokenStore};
