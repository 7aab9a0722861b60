use base64::{
    engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD},
    DecodeError, Engine,
};

/// Decodes base64url key material by rewriting it into the standard alphabet
///
/// `-` becomes `+`, `_` becomes `/`, and `=` is appended until the length
/// is a multiple of four. Input that already carries canonical padding is
/// therefore accepted as well.
pub(crate) fn decode_key_material(encoded: &str) -> Result<Vec<u8>, DecodeError> {
    let mut normalized: String = encoded
        .chars()
        .map(|c| match c {
            '-' => '+',
            '_' => '/',
            c => c,
        })
        .collect();

    while normalized.len() % 4 != 0 {
        normalized.push('=');
    }

    STANDARD.decode(normalized)
}

/// Decodes one segment of a compact JWS, which never carries padding
pub(crate) fn decode_segment(segment: &str) -> Result<Vec<u8>, DecodeError> {
    URL_SAFE_NO_PAD.decode(segment)
}

/// Encodes raw bytes as unpadded base64url
pub(crate) fn encode_segment(raw: impl AsRef<[u8]>) -> String {
    URL_SAFE_NO_PAD.encode(raw)
}
