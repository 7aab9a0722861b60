//! Fixtures backed by the real 2048-bit RSA keys in `data/rsa`

use authgate_clock::{DurationSecs, UnixTime};

use crate::{
    error, jwa,
    jwa::rsa::{PrivateKey, PublicKey},
    jwt::{Headers, TokenClaims},
    Jwks, Jwt,
};

pub const JWKS: &str = include_str!("../data/rsa/jwks.json");
pub const PRIMARY_PKCS8: &[u8] = include_bytes!("../data/rsa/primary.pk8");
pub const ROTATED_PKCS8: &[u8] = include_bytes!("../data/rsa/rotated.pk8");

pub fn jwks() -> Jwks {
    serde_json::from_str(JWKS).expect("fixture JWKS parses")
}

pub fn public_key(kid: &str) -> Result<PublicKey, error::KeyConversionError> {
    let jwks = jwks();
    let jwk = jwks.get(kid).expect("fixture key present");
    PublicKey::from_jwk(jwk)
}

pub fn primary_key() -> PrivateKey {
    PrivateKey::from_pkcs8_der(PRIMARY_PKCS8).expect("fixture key loads")
}

pub fn rotated_key() -> PrivateKey {
    PrivateKey::from_pkcs8_der(ROTATED_PKCS8).expect("fixture key loads")
}

pub fn sign_primary(
    alg: jwa::Algorithm,
    data: &[u8],
) -> Result<Vec<u8>, error::JwtSigningError> {
    primary_key().sign(alg, data)
}

/// Claims issued at `now`, valid for five minutes
pub fn claims(now: UnixTime) -> TokenClaims {
    TokenClaims::new(
        "alice",
        "https://auth.example.com/realms/main",
        "main",
        now,
        now + DurationSecs(300),
    )
}

/// An RS256 token signed by the key published as `kid`
pub fn token(kid: &str, claims: &TokenClaims) -> Result<Jwt, error::JwtSigningError> {
    let key = match kid {
        "k2" => rotated_key(),
        _ => primary_key(),
    };
    Jwt::sign(
        &Headers::new(jwa::Algorithm::RS256).with_key_id(kid),
        claims,
        &key,
    )
}
