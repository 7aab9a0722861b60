//! RSA signature verification
//!
//! An authorization server publishes each signing key as a base64url modulus
//! `n` and exponent `e`. [`PublicKey`] turns those into a key the verifier
//! can use, refusing material that cannot belong to a 2048 to 8192 bit RSA
//! key. Verification itself is delegated to `ring`.
//!
//! ```
//! use authgate_jose::{error::KeyConversionError, jwa::rsa::PublicKey};
//!
//! // A 17-bit modulus is refused before the exponent is looked at
//! let err = PublicKey::from_components("AQAB", "AQA").unwrap_err();
//! assert!(matches!(err, KeyConversionError::ModulusSize { bits: 17 }));
//! ```

mod public;

#[cfg(any(test, feature = "private-keys"))]
#[cfg_attr(docsrs, doc(cfg(feature = "private-keys")))]
mod private;

#[cfg(any(test, feature = "private-keys"))]
#[cfg_attr(docsrs, doc(cfg(feature = "private-keys")))]
pub use private::PrivateKey;
pub use public::PublicKey;

/// Smallest accepted modulus, in bits
pub const MIN_MODULUS_BITS: usize = 2048;

/// Largest accepted modulus, in bits
pub const MAX_MODULUS_BITS: usize = 8192;

/// Widest accepted public exponent, in bits
pub const MAX_EXPONENT_BITS: usize = 33;
