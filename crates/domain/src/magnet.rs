//! Info-hash detection and magnet URI helpers.
//!
//! Bare info hashes come in two shapes: 40 hex characters, or the older
//! 32-character base32 encoding. Both normalize to uppercase 40-hex.

use crate::DomainError;

pub fn is_hex_info_hash(value: &str) -> bool {
    value.len() == 40 && value.bytes().all(|b| b.is_ascii_hexdigit())
}

pub fn is_base32_info_hash(value: &str) -> bool {
    value.len() == 32
        && value
            .bytes()
            .all(|b| b.is_ascii_alphabetic() || (b'2'..=b'7').contains(&b))
}

/// True when `value` looks like a bare info hash rather than a URI.
pub fn is_info_hash(value: &str) -> bool {
    is_hex_info_hash(value) || is_base32_info_hash(value)
}

/// Normalize a bare hash to canonical uppercase 40-hex.
pub fn normalize_info_hash(value: &str) -> Result<String, DomainError> {
    if is_hex_info_hash(value) {
        return Ok(value.to_ascii_uppercase());
    }
    if is_base32_info_hash(value) {
        let bytes = base32_decode(value)?;
        return Ok(hex::encode_upper(bytes));
    }
    Err(DomainError::BadRequest(format!(
        "Not a valid info hash: {value}"
    )))
}

pub fn info_hash_to_magnet(info_hash: &str) -> Result<String, DomainError> {
    let hash = normalize_info_hash(info_hash)?;
    Ok(format!("magnet:?xt=urn:btih:{hash}"))
}

/// Extract the canonical info hash from a magnet URI's `xt=urn:btih:` field.
pub fn info_hash_from_magnet(uri: &str) -> Result<String, DomainError> {
    if !uri.starts_with("magnet:?") {
        return Err(DomainError::BadRequest("Not a magnet URI".to_string()));
    }
    for param in uri["magnet:?".len()..].split('&') {
        if let Some(value) = param.strip_prefix("xt=urn:btih:") {
            return normalize_info_hash(value);
        }
    }
    Err(DomainError::BadRequest(
        "Magnet URI has no btih exact topic".to_string(),
    ))
}

/// RFC 4648 base32 (no padding), as used in 32-char magnet hashes.
fn base32_decode(value: &str) -> Result<Vec<u8>, DomainError> {
    let mut out = Vec::with_capacity(20);
    let mut buffer: u64 = 0;
    let mut bits = 0u32;
    for ch in value.bytes() {
        let digit = match ch {
            b'A'..=b'Z' => ch - b'A',
            b'a'..=b'z' => ch - b'a',
            b'2'..=b'7' => ch - b'2' + 26,
            _ => {
                return Err(DomainError::BadRequest(
                    "Invalid base32 info hash".to_string(),
                ))
            }
        };
        buffer = (buffer << 5) | digit as u64;
        bits += 5;
        if bits >= 8 {
            bits -= 8;
            out.push((buffer >> bits) as u8);
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    const HEX_HASH: &str = "0123456789abcdef0123456789abcdef01234567";

    #[test]
    fn detects_hex_and_base32_hashes() {
        assert!(is_info_hash(HEX_HASH));
        assert!(is_info_hash("ABCDEFGHIJKLMNOPQRSTUVWXYZ234567"));
        assert!(!is_info_hash("magnet:?xt=urn:btih:abc"));
        assert!(!is_info_hash("0123"));
    }

    #[test]
    fn normalizes_hex_to_uppercase() {
        assert_eq!(
            normalize_info_hash(HEX_HASH).unwrap(),
            "0123456789ABCDEF0123456789ABCDEF01234567"
        );
    }

    #[test]
    fn base32_decodes_to_twenty_bytes() {
        let hash = normalize_info_hash("ABCDEFGHIJKLMNOPQRSTUVWXYZ234567").unwrap();
        assert_eq!(hash.len(), 40);
        assert!(hash.bytes().all(|b| b.is_ascii_digit() || (b'A'..=b'F').contains(&b)));
    }

    #[test]
    fn extracts_hash_from_magnet() {
        let uri = format!("magnet:?xt=urn:btih:{HEX_HASH}&dn=example&tr=udp%3A%2F%2Ftracker");
        assert_eq!(
            info_hash_from_magnet(&uri).unwrap(),
            "0123456789ABCDEF0123456789ABCDEF01234567"
        );
    }

    #[test]
    fn round_trips_hash_to_magnet() {
        let magnet = info_hash_to_magnet(HEX_HASH).unwrap();
        assert_eq!(
            info_hash_from_magnet(&magnet).unwrap(),
            "0123456789ABCDEF0123456789ABCDEF01234567"
        );
    }
}
