//! Implementations of the JSON Web Keys (JWK) standard
//!
//! The specifications for JSON Web Keys can be found in [RFC7517][].
//!
//! [RFC7517]: https://tools.ietf.org/html/rfc7517

use aliri_braid::braid;
use serde::{Deserialize, Serialize};

use crate::{error::KeyConversionError, jwa};

/// An identifier for a JWK
#[braid(serde, ref_doc = "A borrowed reference to JWK identifier ([`KeyId`])")]
pub struct KeyId;

/// A JSON Web Key as published by an authorization server
///
/// Every member is optional so that one unusual entry in a key set cannot
/// prevent the others from being read. Whether the key is usable is decided
/// when its material is converted, see
/// [`PublicKey::from_jwk()`](jwa::rsa::PublicKey::from_jwk).
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[must_use]
pub struct Jwk {
    #[serde(rename = "kid", default, skip_serializing_if = "Option::is_none")]
    key_id: Option<KeyId>,

    #[serde(rename = "kty", default, skip_serializing_if = "Option::is_none")]
    key_type: Option<String>,

    #[serde(rename = "alg", default, skip_serializing_if = "Option::is_none")]
    algorithm: Option<String>,

    #[serde(rename = "use", default, skip_serializing_if = "Option::is_none")]
    usage: Option<String>,

    #[serde(rename = "n", default, skip_serializing_if = "Option::is_none")]
    modulus: Option<String>,

    #[serde(rename = "e", default, skip_serializing_if = "Option::is_none")]
    exponent: Option<String>,
}

impl Jwk {
    /// Creates an RSA JWK from base64url encoded components
    pub fn rsa(modulus: impl Into<String>, exponent: impl Into<String>) -> Self {
        Self {
            key_type: Some("RSA".to_owned()),
            modulus: Some(modulus.into()),
            exponent: Some(exponent.into()),
            ..Self::default()
        }
    }

    /// The key ID
    #[must_use]
    pub fn key_id(&self) -> Option<&KeyIdRef> {
        self.key_id.as_deref()
    }

    /// The key type (`kty`)
    #[must_use]
    pub fn key_type(&self) -> Option<&str> {
        self.key_type.as_deref()
    }

    /// The algorithm name (`alg`) exactly as published
    #[must_use]
    pub fn algorithm(&self) -> Option<&str> {
        self.algorithm.as_deref()
    }

    /// The intended use (`use`) exactly as published
    #[must_use]
    pub fn usage(&self) -> Option<&str> {
        self.usage.as_deref()
    }

    /// The base64url encoded modulus (`n`)
    #[must_use]
    pub fn modulus(&self) -> Option<&str> {
        self.modulus.as_deref()
    }

    /// The base64url encoded exponent (`e`)
    #[must_use]
    pub fn exponent(&self) -> Option<&str> {
        self.exponent.as_deref()
    }

    /// The signing algorithm this key is restricted to, if it declares one
    ///
    /// # Errors
    ///
    /// The key declares a use other than `sig`, or an `alg` that is not one
    /// of the supported RSA signature algorithms.
    pub fn signing_algorithm(&self) -> Result<Option<jwa::Algorithm>, KeyConversionError> {
        if let Some(usage) = self.usage() {
            if usage != jwa::Usage::Signing.as_str() {
                return Err(KeyConversionError::NotASigningKey(usage.to_owned()));
            }
        }

        self.algorithm()
            .map(|alg| alg.parse::<jwa::Algorithm>())
            .transpose()
            .map_err(KeyConversionError::from)
    }

    /// Sets the key ID
    pub fn with_key_id(self, kid: impl Into<KeyId>) -> Self {
        Self {
            key_id: Some(kid.into()),
            ..self
        }
    }

    /// Sets the algorithm and marks the key as a signing key
    pub fn with_algorithm(self, alg: jwa::Algorithm) -> Self {
        Self {
            algorithm: Some(alg.as_str().to_owned()),
            usage: Some(jwa::Usage::Signing.as_str().to_owned()),
            ..self
        }
    }

    /// Sets the key's usage
    pub fn with_usage(self, usage: jwa::Usage) -> Self {
        Self {
            usage: Some(usage.as_str().to_owned()),
            ..self
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_published_members() -> color_eyre::Result<()> {
        let jwk: Jwk = serde_json::from_str(
            r#"{"kid":"k1","kty":"RSA","alg":"RS256","use":"sig","n":"AQAB","e":"AQAB","x5t":"ignored"}"#,
        )?;

        assert_eq!(jwk.key_id(), Some(KeyIdRef::from_static("k1")));
        assert_eq!(jwk.key_type(), Some("RSA"));
        assert_eq!(jwk.algorithm(), Some("RS256"));
        assert_eq!(jwk.usage(), Some("sig"));
        assert_eq!(jwk.signing_algorithm()?, Some(jwa::Algorithm::RS256));
        Ok(())
    }

    #[test]
    fn members_are_optional() -> color_eyre::Result<()> {
        let jwk: Jwk = serde_json::from_str("{}")?;
        assert_eq!(jwk, Jwk::default());
        assert_eq!(jwk.signing_algorithm()?, None);
        Ok(())
    }

    #[test]
    fn encryption_keys_are_not_signing_keys() {
        let jwk = Jwk::rsa("AQAB", "AQAB").with_usage(jwa::Usage::Encryption);
        assert_eq!(
            jwk.signing_algorithm(),
            Err(KeyConversionError::NotASigningKey("enc".into()))
        );
    }

    #[test]
    fn unknown_algorithm_is_reported() -> color_eyre::Result<()> {
        let jwk: Jwk = serde_json::from_str(r#"{"kty":"RSA","alg":"RSA-OAEP"}"#)?;
        let err = jwk.signing_algorithm().unwrap_err();
        assert!(matches!(
            err,
            KeyConversionError::UnknownAlgorithm(ref u) if u.name() == "RSA-OAEP"
        ));
        Ok(())
    }

    #[test]
    fn builder_round_trips_through_json() -> color_eyre::Result<()> {
        let jwk = Jwk::rsa("AQAB", "AQAB")
            .with_key_id("k9")
            .with_algorithm(jwa::Algorithm::PS256);

        let json = serde_json::to_value(&jwk)?;
        assert_eq!(json["kid"], "k9");
        assert_eq!(json["use"], "sig");
        assert_eq!(json["alg"], "PS256");

        let back: Jwk = serde_json::from_value(json)?;
        assert_eq!(back, jwk);
        Ok(())
    }
}
