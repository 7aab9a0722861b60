use std::fmt;

use super::{MAX_EXPONENT_BITS, MAX_MODULUS_BITS, MIN_MODULUS_BITS};
use crate::{
    b64,
    error::{self, KeyConversionError},
    jwa, Jwk,
};

/// An RSA public key
///
/// Both components are held as unsigned big-endian integers without leading
/// zero bytes. A high bit set in the first byte of the modulus is part of
/// the magnitude, never a sign.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct PublicKey {
    modulus: Vec<u8>,
    exponent: Vec<u8>,
}

impl PublicKey {
    /// Converts base64url encoded `n` and `e` members into a public key
    ///
    /// Padding is optional, and the standard base64 alphabet is tolerated.
    ///
    /// # Errors
    ///
    /// Either member is not base64, or the decoded integers cannot form an
    /// RSA public key usable for signature verification.
    pub fn from_components(modulus: &str, exponent: &str) -> Result<Self, KeyConversionError> {
        let modulus = b64::decode_key_material(modulus).map_err(|source| {
            KeyConversionError::InvalidEncoding {
                component: "n",
                source,
            }
        })?;

        let exponent = b64::decode_key_material(exponent).map_err(|source| {
            KeyConversionError::InvalidEncoding {
                component: "e",
                source,
            }
        })?;

        Self::from_raw_components(&modulus, &exponent)
    }

    /// Constructs a public key from big-endian modulus and exponent bytes
    ///
    /// # Errors
    ///
    /// The modulus is zero or outside of 2048 to 8192 bits, or the exponent
    /// is not an odd integer of at least 3 that fits in 33 bits.
    pub fn from_raw_components(
        modulus: &[u8],
        exponent: &[u8],
    ) -> Result<Self, KeyConversionError> {
        let modulus = strip_leading_zeros(modulus);
        if modulus.is_empty() {
            return Err(KeyConversionError::ZeroModulus);
        }

        let bits = bit_length(modulus);
        if !(MIN_MODULUS_BITS..=MAX_MODULUS_BITS).contains(&bits) {
            return Err(KeyConversionError::ModulusSize { bits });
        }

        let exponent = strip_leading_zeros(exponent);
        let odd = exponent.last().map_or(false, |b| b & 1 == 1);
        let at_least_three = exponent.len() > 1 || exponent.first().map_or(false, |&b| b >= 3);
        if !odd || !at_least_three || bit_length(exponent) > MAX_EXPONENT_BITS {
            return Err(KeyConversionError::InvalidExponent);
        }

        Ok(Self {
            modulus: modulus.to_vec(),
            exponent: exponent.to_vec(),
        })
    }

    /// Converts the key material of a JWK
    ///
    /// The JWK's `alg` and `use` are not consulted here; see
    /// [`Jwk::signing_algorithm()`] for those.
    ///
    /// # Errors
    ///
    /// The key is not of type `RSA`, lacks `n` or `e`, or carries material
    /// refused by [`from_components()`](Self::from_components).
    pub fn from_jwk(jwk: &Jwk) -> Result<Self, KeyConversionError> {
        match jwk.key_type() {
            Some("RSA") => {}
            other => {
                return Err(KeyConversionError::UnsupportedKeyType(
                    other.map(String::from),
                ))
            }
        }

        let n = jwk
            .modulus()
            .ok_or(KeyConversionError::MissingComponent("n"))?;
        let e = jwk
            .exponent()
            .ok_or(KeyConversionError::MissingComponent("e"))?;

        Self::from_components(n, e)
    }

    /// The public key's modulus as big-endian bytes
    #[must_use]
    pub fn modulus(&self) -> &[u8] {
        &self.modulus
    }

    /// The public key's exponent as big-endian bytes
    #[must_use]
    pub fn exponent(&self) -> &[u8] {
        &self.exponent
    }

    /// The size of the modulus in bits
    #[must_use]
    pub fn modulus_bits(&self) -> usize {
        bit_length(&self.modulus)
    }

    /// The modulus re-encoded as unpadded base64url
    #[must_use]
    pub fn encoded_modulus(&self) -> String {
        b64::encode_segment(&self.modulus)
    }

    /// The exponent re-encoded as unpadded base64url
    #[must_use]
    pub fn encoded_exponent(&self) -> String {
        b64::encode_segment(&self.exponent)
    }

    /// Verifies `signature` over `data` using `alg`
    ///
    /// # Errors
    ///
    /// The signature was not produced by the private half of this key with
    /// the given algorithm.
    pub fn verify(
        &self,
        alg: jwa::Algorithm,
        data: &[u8],
        signature: &[u8],
    ) -> Result<(), error::SignatureMismatch> {
        let pk = ring::signature::RsaPublicKeyComponents {
            n: self.modulus.as_slice(),
            e: self.exponent.as_slice(),
        };

        pk.verify(alg.verification_params(), data, signature)
            .map_err(|_| error::signature_mismatch())
    }
}

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("PublicKey")
            .field("bits", &self.modulus_bits())
            .field("e", &self.encoded_exponent())
            .finish()
    }
}

fn strip_leading_zeros(bytes: &[u8]) -> &[u8] {
    let start = bytes.iter().position(|&b| b != 0).unwrap_or(bytes.len());
    &bytes[start..]
}

/// Bit length of a big-endian integer without leading zero bytes
fn bit_length(bytes: &[u8]) -> usize {
    match bytes.first() {
        Some(&first) => (bytes.len() - 1) * 8 + (8 - first.leading_zeros() as usize),
        None => 0,
    }
}
