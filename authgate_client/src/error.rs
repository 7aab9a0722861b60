//! The single error type for calls to the authorization server

use std::error::Error as StdError;

use authgate_jwks::{ValidationError, ValidationErrorKind};
use thiserror::Error;

/// Classification of an error response by its HTTP status
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ApiErrorKind {
    /// 400
    BadRequest,
    /// 401
    Unauthorized,
    /// 403
    Forbidden,
    /// 404
    NotFound,
    /// 409
    Conflict,
    /// 422
    UnprocessableEntity,
    /// 429
    TooManyRequests,
    /// 503
    ServiceUnavailable,
    /// Any other 5xx
    Server,
    /// Any other non-success status
    Other,
}

impl ApiErrorKind {
    /// Classifies a non-success status code
    #[must_use]
    pub fn from_status(status: u16) -> Self {
        match status {
            400 => Self::BadRequest,
            401 => Self::Unauthorized,
            403 => Self::Forbidden,
            404 => Self::NotFound,
            409 => Self::Conflict,
            422 => Self::UnprocessableEntity,
            429 => Self::TooManyRequests,
            503 => Self::ServiceUnavailable,
            500..=599 => Self::Server,
            _ => Self::Other,
        }
    }
}

/// The kind of an [`AuthError`]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum AuthErrorKind {
    /// See [`AuthError::Api`]
    Api(ApiErrorKind),
    /// See [`AuthError::Transport`]
    Transport,
    /// See [`AuthError::Decode`]
    Decode,
    /// See [`AuthError::Validation`]
    Validation(ValidationErrorKind),
}

/// An error interacting with the authorization server
#[derive(Debug, Error)]
pub enum AuthError {
    /// The server answered with a non-success status
    #[error("authorization server responded with {status}: {message}")]
    Api {
        /// Classification of the status
        kind: ApiErrorKind,
        /// The HTTP status code
        status: u16,
        /// A human-readable description taken from the response
        message: String,
        /// The JSON error body, when the server sent one
        details: Option<serde_json::Value>,
    },

    /// The request could not be built, sent, or its response read
    #[error("request to authorization server failed")]
    Transport(#[from] reqwest::Error),

    /// The response could not be decoded
    #[error("unable to decode authorization server response")]
    Decode(#[source] Box<dyn StdError + Send + Sync + 'static>),

    /// A bearer token was rejected
    #[error(transparent)]
    Validation(#[from] ValidationError),
}

impl AuthError {
    /// The kind of this error
    #[must_use]
    pub fn kind(&self) -> AuthErrorKind {
        match self {
            Self::Api { kind, .. } => AuthErrorKind::Api(*kind),
            Self::Transport(_) => AuthErrorKind::Transport,
            Self::Decode(_) => AuthErrorKind::Decode,
            Self::Validation(err) => AuthErrorKind::Validation(err.kind()),
        }
    }

    /// The HTTP status of an [`Api`](Self::Api) error
    #[must_use]
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Api { status, .. } => Some(*status),
            _ => None,
        }
    }

    pub(crate) fn decode(source: impl Into<Box<dyn StdError + Send + Sync + 'static>>) -> Self {
        Self::Decode(source.into())
    }

    /// Builds an [`Api`](Self::Api) error from a status and raw response body
    ///
    /// A JSON body contributes its `error_description`, `message` or `error`
    /// member, in that order of preference, as the message and is kept as
    /// details. Any other non-empty body becomes the message verbatim.
    pub fn from_response(status: u16, body: &[u8]) -> Self {
        let details = serde_json::from_slice::<serde_json::Value>(body).ok();

        let from_json = details.as_ref().and_then(|json| {
            ["error_description", "message", "error"]
                .iter()
                .find_map(|field| json.get(field).and_then(serde_json::Value::as_str))
                .map(str::to_owned)
        });

        let message = from_json
            .or_else(|| {
                let text = String::from_utf8_lossy(body);
                let text = text.trim();
                (details.is_none() && !text.is_empty()).then(|| text.to_owned())
            })
            .unwrap_or_else(|| {
                reqwest::StatusCode::from_u16(status)
                    .ok()
                    .and_then(|s| s.canonical_reason())
                    .unwrap_or("unexpected response")
                    .to_owned()
            });

        Self::Api {
            kind: ApiErrorKind::from_status(status),
            status,
            message,
            details,
        }
    }
}
