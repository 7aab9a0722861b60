//! The RSA subset of the JSON Web Algorithms (JWA) standard
//!
//! The specifications for these algorithms can be found in [RFC7518][].
//!
//! [RFC7518]: https://tools.ietf.org/html/rfc7518

pub mod rsa;

mod algorithm;
mod usage;

pub use algorithm::Algorithm;
pub use usage::Usage;
