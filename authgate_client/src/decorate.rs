//! Decorators applied to every outgoing request
//!
//! A decorator takes the request about to be sent and returns it, usually
//! with headers added. Plain closures are decorators too:
//!
//! ```
//! use authgate_client::decorate::{RequestContext, RequestDecorator};
//! use reqwest::header::{HeaderName, HeaderValue};
//!
//! let trace = |mut ctx: RequestContext| {
//!     ctx.headers_mut().insert(
//!         HeaderName::from_static("x-request-id"),
//!         HeaderValue::from_static("abc123"),
//!     );
//!     ctx
//! };
//!
//! let req = reqwest::Client::new().get("https://auth.example.com/users").build().unwrap();
//! let ctx = trace.decorate(RequestContext::new(req));
//! assert_eq!(ctx.headers()["x-request-id"], "abc123");
//! ```

use std::fmt;

use reqwest::{
    header::{self, HeaderMap, HeaderName, HeaderValue, InvalidHeaderValue},
    Method, Request, Url,
};

use crate::AccessTokenRef;

/// Name of the header that carries the caller's realm
pub const REALM_HEADER: &str = "x-auth-realm";

/// An outgoing request open to decoration
#[derive(Debug)]
pub struct RequestContext {
    request: Request,
}

impl RequestContext {
    /// Wraps a built request
    #[must_use]
    pub fn new(request: Request) -> Self {
        Self { request }
    }

    /// The request method
    #[must_use]
    pub fn method(&self) -> &Method {
        self.request.method()
    }

    /// The request URL
    #[must_use]
    pub fn url(&self) -> &Url {
        self.request.url()
    }

    /// The request headers
    #[must_use]
    pub fn headers(&self) -> &HeaderMap {
        self.request.headers()
    }

    /// Mutable access to the request headers
    pub fn headers_mut(&mut self) -> &mut HeaderMap {
        self.request.headers_mut()
    }

    /// Unwraps the decorated request
    #[must_use]
    pub fn into_request(self) -> Request {
        self.request
    }
}

/// Modifies outgoing requests
pub trait RequestDecorator: Send + Sync {
    /// Returns `ctx`, modified as this decorator sees fit
    fn decorate(&self, ctx: RequestContext) -> RequestContext;
}

impl<F> RequestDecorator for F
where
    F: Fn(RequestContext) -> RequestContext + Send + Sync,
{
    fn decorate(&self, ctx: RequestContext) -> RequestContext {
        self(ctx)
    }
}

impl fmt::Debug for dyn RequestDecorator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("RequestDecorator")
    }
}

/// Attaches an access token as `Authorization: Bearer …`
///
/// An `Authorization` header already on the request is left in place, so
/// that a caller can override the token for a single request.
#[derive(Clone)]
pub struct BearerToken {
    value: HeaderValue,
}

impl BearerToken {
    /// Prepares the header for `token`
    ///
    /// # Errors
    ///
    /// The token contains bytes that cannot appear in a header.
    pub fn new(token: &AccessTokenRef) -> Result<Self, InvalidHeaderValue> {
        let mut value = HeaderValue::from_str(&format!("Bearer {}", token.as_str()))?;
        value.set_sensitive(true);
        Ok(Self { value })
    }
}

impl fmt::Debug for BearerToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("BearerToken(***)")
    }
}

impl RequestDecorator for BearerToken {
    fn decorate(&self, mut ctx: RequestContext) -> RequestContext {
        ctx.headers_mut()
            .entry(header::AUTHORIZATION)
            .or_insert_with(|| self.value.clone());
        ctx
    }
}

/// Sets a fixed header on every request, replacing any existing value
#[derive(Clone, Debug)]
pub struct StaticHeader {
    name: HeaderName,
    value: HeaderValue,
}

impl StaticHeader {
    /// Sets `name: value`
    #[must_use]
    pub fn new(name: HeaderName, value: HeaderValue) -> Self {
        Self { name, value }
    }

    /// Sets the [`REALM_HEADER`] to `realm`
    ///
    /// # Errors
    ///
    /// The realm contains bytes that cannot appear in a header.
    pub fn realm(realm: &str) -> Result<Self, InvalidHeaderValue> {
        Ok(Self::new(
            HeaderName::from_static(REALM_HEADER),
            HeaderValue::from_str(realm)?,
        ))
    }
}

impl RequestDecorator for StaticHeader {
    fn decorate(&self, mut ctx: RequestContext) -> RequestContext {
        ctx.headers_mut()
            .insert(self.name.clone(), self.value.clone());
        ctx
    }
}
