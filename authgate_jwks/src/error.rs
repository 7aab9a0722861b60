//! Errors raised while fetching keys and validating tokens

use std::{error::Error as StdError, sync::Arc, time::Duration};

use authgate_clock::UnixTime;
use authgate_jose::{
    error::{
        ClaimsRejected, JwtVerifyError, KeyConversionError, MalformedToken, SignatureMismatch,
    },
    jwa,
    jwk::KeyId,
};
use thiserror::Error;

type SharedSource = Arc<dyn StdError + Send + Sync + 'static>;

/// The key set could not be fetched
///
/// Cloneable so that one failed fetch can be reported to every caller that
/// was waiting on it.
#[derive(Clone, Debug, Error)]
pub enum JwksFetchError {
    /// The request could not be sent or the response could not be read
    #[error("JWKS request failed")]
    Transport(#[source] SharedSource),

    /// The endpoint answered with a non-success status
    #[error("JWKS endpoint responded with status {status}")]
    UnexpectedStatus {
        /// The HTTP status code
        status: u16,
    },

    /// The response body is not a JWKS document
    #[error("JWKS document is malformed")]
    MalformedBody(#[source] SharedSource),

    /// The fetch did not finish in time
    #[error("JWKS fetch did not complete within {after:?}")]
    Timeout {
        /// The configured timeout
        after: Duration,
    },
}

impl JwksFetchError {
    /// Wraps a transport-level failure
    pub fn transport(source: impl StdError + Send + Sync + 'static) -> Self {
        Self::Transport(Arc::new(source))
    }

    /// Wraps a document decoding failure
    pub fn malformed_body(source: impl StdError + Send + Sync + 'static) -> Self {
        Self::MalformedBody(Arc::new(source))
    }
}

/// A key could not be produced for a key ID
#[derive(Clone, Debug, Error)]
pub enum KeyLookupError {
    /// The authority does not publish the key, even after a refresh
    #[error("no key '{0}' published by the authority")]
    KeyNotFound(KeyId),

    /// The authority publishes the key, but its material is unusable
    #[error("key '{kid}' published by the authority is unusable")]
    KeyConversion {
        /// The key ID
        kid: KeyId,
        /// Why the key was refused
        #[source]
        source: KeyConversionError,
    },

    /// The key set could not be refreshed
    #[error(transparent)]
    JwksFetch(#[from] JwksFetchError),
}

/// The kind of a [`ValidationError`]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ValidationErrorKind {
    /// See [`ValidationError::KeyConversion`]
    KeyConversion,
    /// See [`ValidationError::JwksFetch`]
    JwksFetch,
    /// See [`ValidationError::KeyNotFound`]
    KeyNotFound,
    /// See [`ValidationError::MalformedToken`]
    MalformedToken,
    /// See [`ValidationError::InvalidSignature`]
    InvalidSignature,
    /// See [`ValidationError::TokenExpired`]
    TokenExpired,
    /// See [`ValidationError::TokenNotYetValid`]
    TokenNotYetValid,
    /// See [`ValidationError::IncompatibleKey`]
    IncompatibleKey,
    /// See [`ValidationError::InvalidIssuer`]
    InvalidIssuer,
    /// See [`ValidationError::InvalidAudience`]
    InvalidAudience,
}

/// A bearer token was rejected
#[derive(Debug, Error)]
pub enum ValidationError {
    /// The signing key named by the token is published but unusable
    #[error("key '{kid}' published by the authority is unusable")]
    KeyConversion {
        /// The key ID
        kid: KeyId,
        /// Why the key was refused
        #[source]
        source: KeyConversionError,
    },

    /// The key set could not be refreshed
    #[error("unable to refresh signing keys")]
    JwksFetch(#[source] JwksFetchError),

    /// The authority does not publish the key named by the token
    #[error("no key '{0}' published by the authority")]
    KeyNotFound(KeyId),

    /// The token cannot be parsed, or asks for a disallowed algorithm
    #[error("malformed token")]
    MalformedToken(#[from] MalformedToken),

    /// The signature does not match the key
    #[error("invalid token signature")]
    InvalidSignature(#[from] SignatureMismatch),

    /// The token has expired
    #[error("token expired at {exp} (now {now})")]
    TokenExpired {
        /// The `exp` claim
        exp: UnixTime,
        /// The time of the check
        now: UnixTime,
    },

    /// The token is not valid yet
    #[error("token not valid before {nbf} (now {now})")]
    TokenNotYetValid {
        /// The `nbf` claim
        nbf: UnixTime,
        /// The time of the check
        now: UnixTime,
    },

    /// The key is restricted to an algorithm other than the pinned one
    #[error("key '{kid}' is restricted to {key_algorithm}, not {expected}")]
    IncompatibleKey {
        /// The key ID
        kid: KeyId,
        /// The algorithm the key declares
        key_algorithm: jwa::Algorithm,
        /// The pinned algorithm
        expected: jwa::Algorithm,
    },

    /// The issuer is not the required one
    #[error("invalid issuer")]
    InvalidIssuer,

    /// None of the token's audiences are allowed
    #[error("invalid audience")]
    InvalidAudience,
}

impl ValidationError {
    /// The kind of this error
    #[must_use]
    pub fn kind(&self) -> ValidationErrorKind {
        match self {
            Self::KeyConversion { .. } => ValidationErrorKind::KeyConversion,
            Self::JwksFetch(_) => ValidationErrorKind::JwksFetch,
            Self::KeyNotFound(_) => ValidationErrorKind::KeyNotFound,
            Self::MalformedToken(_) => ValidationErrorKind::MalformedToken,
            Self::InvalidSignature(_) => ValidationErrorKind::InvalidSignature,
            Self::TokenExpired { .. } => ValidationErrorKind::TokenExpired,
            Self::TokenNotYetValid { .. } => ValidationErrorKind::TokenNotYetValid,
            Self::IncompatibleKey { .. } => ValidationErrorKind::IncompatibleKey,
            Self::InvalidIssuer => ValidationErrorKind::InvalidIssuer,
            Self::InvalidAudience => ValidationErrorKind::InvalidAudience,
        }
    }

    /// Whether the client should obtain a fresh token and try again
    ///
    /// True only for the temporal rejections. Every other kind means the
    /// token should be refused outright.
    #[must_use]
    pub fn is_reauthenticate(&self) -> bool {
        matches!(
            self.kind(),
            ValidationErrorKind::TokenExpired | ValidationErrorKind::TokenNotYetValid
        )
    }
}

impl From<KeyLookupError> for ValidationError {
    fn from(err: KeyLookupError) -> Self {
        match err {
            KeyLookupError::KeyNotFound(kid) => Self::KeyNotFound(kid),
            KeyLookupError::KeyConversion { kid, source } => Self::KeyConversion { kid, source },
            KeyLookupError::JwksFetch(err) => Self::JwksFetch(err),
        }
    }
}

impl From<ClaimsRejected> for ValidationError {
    fn from(err: ClaimsRejected) -> Self {
        match err {
            ClaimsRejected::TokenExpired { exp, now } => Self::TokenExpired { exp, now },
            ClaimsRejected::TokenNotYetValid { nbf, now } => Self::TokenNotYetValid { nbf, now },
            ClaimsRejected::InvalidIssuer => Self::InvalidIssuer,
            ClaimsRejected::InvalidAudience => Self::InvalidAudience,
            ClaimsRejected::MissingRequiredClaim(claim) => {
                Self::MalformedToken(MalformedToken::MissingClaim(claim))
            }
        }
    }
}

impl From<JwtVerifyError> for ValidationError {
    fn from(err: JwtVerifyError) -> Self {
        match err {
            JwtVerifyError::SignatureMismatch(err) => Self::InvalidSignature(err),
            JwtVerifyError::MalformedToken(err) => Self::MalformedToken(err),
            JwtVerifyError::ClaimsRejected(err) => err.into(),
        }
    }
}
