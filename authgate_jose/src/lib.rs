//! JSON Object Signing and Encryption (JOSE) pieces needed to validate
//! RSA-signed bearer tokens issued by an OAuth2/OIDC authorization server:
//!
//! * JSON Web Key (JWK) and key sets: [RFC7517][]
//! * RSA signature algorithms from JSON Web Algorithms (JWA): [RFC7518][]
//! * Compact JSON Web Tokens (JWT): [RFC7519][]
//!
//! [RFC7517]: https://tools.ietf.org/html/rfc7517
//! [RFC7518]: https://tools.ietf.org/html/rfc7518
//! [RFC7519]: https://tools.ietf.org/html/rfc7519
//!
//! # Example
//!
//! ```
//! use authgate_jose::{jwa, jwt, Jwks, JwtRef};
//!
//! let jwks: Jwks = serde_json::from_str(r#"{
//!     "keys": [{ "kid": "k1", "kty": "RSA", "alg": "RS256", "use": "sig",
//!                "n": "AQAB", "e": "AQAB" }]
//! }"#).unwrap();
//!
//! // Far too small to be an RSA modulus, so conversion refuses it
//! let jwk = jwks.get("k1").unwrap();
//! assert!(jwa::rsa::PublicKey::from_jwk(jwk).is_err());
//!
//! // Structure is checked before anything else
//! let token = JwtRef::from_str("not-a-token");
//! assert!(token.decompose().is_err());
//!
//! let validator = jwt::CoreValidator::default();
//! assert_eq!(validator.algorithm(), jwa::Algorithm::RS256);
//! ```

#![cfg_attr(docsrs, feature(doc_cfg))]
#![warn(
    missing_docs,
    unused_import_braces,
    unused_imports,
    unused_qualifications
)]
#![deny(
    missing_debug_implementations,
    missing_copy_implementations,
    trivial_casts,
    trivial_numeric_casts,
    unsafe_code,
    unused_must_use
)]

mod b64;
pub mod error;
pub mod jwa;
pub mod jwk;
mod jwks;
pub mod jwt;

#[cfg(test)]
pub(crate) mod test;

#[doc(inline)]
pub use jwk::Jwk;
#[doc(inline)]
pub use jwks::Jwks;
#[doc(inline)]
pub use jwt::{Jwt, JwtRef, TokenClaims};
