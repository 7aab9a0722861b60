use std::{fmt, sync::Arc};

use ring::{rand::SystemRandom, signature::RsaKeyPair};

use crate::{error, jwa};

/// An RSA private key, used to mint tokens in tests and tooling
///
/// Cloning is cheap; the parsed key pair is shared.
#[derive(Clone)]
#[must_use]
pub struct PrivateKey {
    key_pair: Arc<RsaKeyPair>,
}

impl PrivateKey {
    /// Imports an RSA key pair from an unencrypted PKCS#8 DER document
    ///
    /// # Errors
    ///
    /// The document is not a PKCS#8 RSA private key acceptable to `ring`.
    pub fn from_pkcs8_der(der: &[u8]) -> Result<Self, error::KeyRejected> {
        let key_pair = RsaKeyPair::from_pkcs8(der).map_err(error::key_rejected)?;

        Ok(Self {
            key_pair: Arc::new(key_pair),
        })
    }

    /// The modulus length in bytes, which is also the signature length
    #[must_use]
    pub fn modulus_len(&self) -> usize {
        self.key_pair.public().modulus_len()
    }

    /// Signs `data` with the given algorithm
    ///
    /// # Errors
    ///
    /// The underlying signing operation failed.
    pub fn sign(
        &self,
        alg: jwa::Algorithm,
        data: &[u8],
    ) -> Result<Vec<u8>, error::JwtSigningError> {
        let mut buf = vec![0; self.modulus_len()];
        self.key_pair
            .sign(alg.signing_params(), &SystemRandom::new(), data, &mut buf)
            .map_err(|_| error::JwtSigningError::Signing)?;
        Ok(buf)
    }
}

impl fmt::Debug for PrivateKey {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("PrivateKey")
            .field("modulus_len", &self.modulus_len())
            .field("private_key", &"<redacted>")
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test;

    #[test]
    fn rejects_garbage() {
        assert!(PrivateKey::from_pkcs8_der(b"definitely not DER").is_err());
    }

    #[test]
    fn signature_length_matches_modulus() -> color_eyre::Result<()> {
        let key = test::primary_key();
        assert_eq!(key.modulus_len(), 256);

        let sig = key.sign(jwa::Algorithm::PS256, b"data")?;
        assert_eq!(sig.len(), 256);
        Ok(())
    }

    #[test]
    fn debug_does_not_leak_key() {
        let rendered = format!("{:?}", test::primary_key());
        assert!(rendered.contains("<redacted>"));
    }
}
