//! Hex (base16) encoding for raw PCM payloads carried in JSON records.

use std::sync::Arc;

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serializer};

const DIGITS: &[u8; 16] = b"0123456789abcdef";

/// Encode bytes as lowercase hex.
pub fn encode(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 2);
    for byte in bytes {
        out.push(DIGITS[(byte >> 4) as usize] as char);
        out.push(DIGITS[(byte & 0x0f) as usize] as char);
    }
    out
}

/// Decode a hex string (either case) into bytes.
pub fn decode(text: &str) -> Result<Vec<u8>, String> {
    let raw = text.as_bytes();
    if raw.len() % 2 != 0 {
        return Err(format!("odd hex length {}", raw.len()));
    }
    raw.chunks_exact(2)
        .enumerate()
        .map(|(idx, pair)| {
            let hi = nibble(pair[0]).ok_or_else(|| format!("invalid hex digit at {}", idx * 2))?;
            let lo = nibble(pair[1]).ok_or_else(|| format!("invalid hex digit at {}", idx * 2 + 1))?;
            Ok((hi << 4) | lo)
        })
        .collect()
}

fn nibble(c: u8) -> Option<u8> {
    match c {
        b'0'..=b'9' => Some(c - b'0'),
        b'a'..=b'f' => Some(c - b'a' + 10),
        b'A'..=b'F' => Some(c - b'A' + 10),
        _ => None,
    }
}

pub(crate) fn serialize<S, T>(bytes: &T, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
    T: AsRef<[u8]>,
{
    serializer.serialize_str(&encode(bytes.as_ref()))
}

pub(crate) fn deserialize<'de, D>(deserializer: D) -> Result<Arc<[u8]>, D::Error>
where
    D: Deserializer<'de>,
{
    let text = String::deserialize(deserializer)?;
    decode(&text).map(Arc::from).map_err(D::Error::custom)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_uses_lowercase_pairs() {
        assert_eq!(encode(&[0x00, 0x7f, 0xab, 0xff]), "007fabff");
        assert_eq!(encode(&[]), "");
    }

    #[test]
    fn decode_accepts_mixed_case() {
        assert_eq!(decode("00FFaB").unwrap(), vec![0x00, 0xff, 0xab]);
    }

    #[test]
    fn decode_rejects_bad_input() {
        assert!(decode("abc").is_err());
        assert!(decode("zz").is_err());
    }
}
