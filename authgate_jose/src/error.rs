//! Common errors

#![allow(missing_copy_implementations)]

use std::error::Error as StdError;

use authgate_clock::UnixTime;
use thiserror::Error;

use crate::jwa;

/// The provided name could not be matched with supported algorithms
#[derive(Clone, Debug, PartialEq, Eq, Error)]
#[error("'{alg}' does not match supported algorithms")]
pub struct UnknownAlgorithm {
    alg: String,
}

impl UnknownAlgorithm {
    /// The algorithm name that was not recognized
    #[must_use]
    pub fn name(&self) -> &str {
        &self.alg
    }
}

#[inline]
pub(crate) fn unknown_algorithm(alg: impl Into<String>) -> UnknownAlgorithm {
    UnknownAlgorithm { alg: alg.into() }
}

/// A JWK whose key material cannot be turned into a usable public key
///
/// A key that fails conversion stays unusable until the authority publishes
/// a corrected key set; retrying the same material cannot succeed.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum KeyConversionError {
    /// The key type is missing or is not `RSA`
    #[error("unsupported key type {0:?}")]
    UnsupportedKeyType(Option<String>),

    /// A required key member is absent
    #[error("missing required key member '{0}'")]
    MissingComponent(&'static str),

    /// A key member is not valid base64url
    #[error("key member '{component}' is not valid base64url")]
    InvalidEncoding {
        /// The offending member
        component: &'static str,
        /// The decoder's complaint
        #[source]
        source: base64::DecodeError,
    },

    /// The modulus decodes to zero
    #[error("key modulus is zero")]
    ZeroModulus,

    /// The modulus is outside of the range accepted for RSA signatures
    #[error("key modulus of {bits} bits is outside the supported 2048..=8192 range")]
    ModulusSize {
        /// The size of the decoded modulus
        bits: usize,
    },

    /// The exponent cannot belong to an RSA public key
    #[error("key exponent is not an odd integer in 3..2^33")]
    InvalidExponent,

    /// The key declares an algorithm that is not understood
    #[error(transparent)]
    UnknownAlgorithm(#[from] UnknownAlgorithm),

    /// The key declares a use other than signing
    #[error("key use '{0}' is not 'sig'")]
    NotASigningKey(String),
}

/// The JWT cannot be parsed, or asks to be verified in a way that is not allowed
#[derive(Debug, Error)]
pub enum MalformedToken {
    /// The token is not three dot-separated segments
    #[error("token is not a compact JWS with header, payload and signature")]
    Structure,

    /// The header segment is not base64url-encoded JSON
    #[error("malformed JWT header")]
    Header(#[source] Box<dyn StdError + Send + Sync + 'static>),

    /// The payload segment is not base64url-encoded JSON claims
    #[error("malformed JWT payload")]
    Payload(#[source] Box<dyn StdError + Send + Sync + 'static>),

    /// The signature segment is not base64url
    #[error("malformed JWT signature")]
    Signature(#[source] base64::DecodeError),

    /// The header does not name a signing key
    #[error("JWT header has no 'kid'")]
    MissingKeyId,

    /// The payload lacks a claim that validation depends on
    #[error("required claim '{0}' missing")]
    MissingClaim(&'static str),

    /// The header names an algorithm other than the pinned one
    #[error("JWT algorithm '{found}' does not match the expected '{expected}'")]
    UnexpectedAlgorithm {
        /// The pinned algorithm
        expected: jwa::Algorithm,
        /// The algorithm named in the token header
        found: String,
    },
}

pub(crate) fn malformed_header(
    source: impl Into<Box<dyn StdError + Send + Sync + 'static>>,
) -> MalformedToken {
    MalformedToken::Header(source.into())
}

pub(crate) fn malformed_payload(
    source: impl Into<Box<dyn StdError + Send + Sync + 'static>>,
) -> MalformedToken {
    MalformedToken::Payload(source.into())
}

/// The signature did not match
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Error)]
#[error("signature mismatch")]
pub struct SignatureMismatch {
    _p: (),
}

pub(crate) const fn signature_mismatch() -> SignatureMismatch {
    SignatureMismatch { _p: () }
}

/// A private key could not be loaded
#[cfg(any(test, feature = "private-keys"))]
#[cfg_attr(docsrs, doc(cfg(feature = "private-keys")))]
#[derive(Debug, Error)]
#[error("private key rejected: {reason}")]
pub struct KeyRejected {
    reason: String,
}

#[cfg(any(test, feature = "private-keys"))]
pub(crate) fn key_rejected(reason: impl ToString) -> KeyRejected {
    KeyRejected {
        reason: reason.to_string(),
    }
}

/// An error occurring while producing a signed JWT
#[cfg(any(test, feature = "private-keys"))]
#[cfg_attr(docsrs, doc(cfg(feature = "private-keys")))]
#[derive(Debug, Error)]
pub enum JwtSigningError {
    /// The header names an algorithm that cannot sign
    #[error(transparent)]
    UnknownAlgorithm(#[from] UnknownAlgorithm),

    /// The header or payload could not be serialized
    #[error("unable to serialize JWT section")]
    Serialization(#[from] serde_json::Error),

    /// The signing operation itself failed
    #[error("unable to produce signature")]
    Signing,
}

/// An error occurring when validating the claims of a JWT
#[derive(Debug, Error)]
pub enum ClaimsRejected {
    /// The token is expired according to the `exp` claim
    #[error("token expired at {exp} (now {now})")]
    TokenExpired {
        /// The `exp` claim
        exp: UnixTime,
        /// The time of the check
        now: UnixTime,
    },

    /// The token is not yet valid according to the `nbf` claim
    #[error("token not valid before {nbf} (now {now})")]
    TokenNotYetValid {
        /// The `nbf` claim
        nbf: UnixTime,
        /// The time of the check
        now: UnixTime,
    },

    /// The token issuer is not acceptable
    #[error("invalid issuer")]
    InvalidIssuer,

    /// The token audience is not acceptable
    #[error("invalid audience")]
    InvalidAudience,

    /// A required claim is missing
    #[error("required {0} claim missing")]
    MissingRequiredClaim(&'static str),
}

/// An error occurring while verifying a decomposed JWT
#[derive(Debug, Error)]
pub enum JwtVerifyError {
    /// The signature does not match the key
    #[error(transparent)]
    SignatureMismatch(#[from] SignatureMismatch),

    /// The token could not be parsed
    #[error(transparent)]
    MalformedToken(#[from] MalformedToken),

    /// The JWT was rejected by the claims validator
    #[error("token rejected by claims validator")]
    ClaimsRejected(#[from] ClaimsRejected),
}
