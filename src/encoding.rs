//! Request keys: the canonical, URL-safe encoding of a diagram source.
//!
//! The encoding is the one PlantUML servers accept in their URL paths:
//! raw DEFLATE at maximum compression, then base64 over the alphabet
//! `0-9 A-Z a-z - _`, always emitting full 4-character groups. Being
//! byte-for-byte what the server decodes, the key doubles as the cache key.

use std::io::Write;

use base64::Engine;
use base64::alphabet::Alphabet;
use base64::engine::{GeneralPurpose, GeneralPurposeConfig};
use flate2::Compression;
use flate2::write::DeflateEncoder;

const PLANTUML_ALPHABET: &str = "0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz-_";

const ALPHABET: Alphabet = match Alphabet::new(PLANTUML_ALPHABET) {
    Ok(alphabet) => alphabet,
    Err(_) => panic!("invalid PlantUML alphabet"),
};

const PLANTUML_ENGINE: GeneralPurpose = GeneralPurpose::new(
    &ALPHABET,
    GeneralPurposeConfig::new().with_encode_padding(true),
);

/// Deterministic identifier for a fully prepared diagram source.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RequestKey(String);

impl RequestKey {
    /// Borrow the encoded key.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Wrap an already-encoded key (e.g. one read back from the cache).
    pub fn from_encoded(encoded: impl Into<String>) -> Self {
        Self(encoded.into())
    }
}

impl std::fmt::Display for RequestKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Encode a diagram source into its request key.
///
/// Pure: the same text always yields the same key, across processes.
pub fn encode(source: &str) -> RequestKey {
    RequestKey(encode_bytes(&deflate(source.as_bytes())))
}

fn deflate(data: &[u8]) -> Vec<u8> {
    let mut encoder = DeflateEncoder::new(Vec::with_capacity(data.len() / 2 + 16), Compression::best());
    // Writing into a Vec cannot fail.
    let _ = encoder.write_all(data);
    encoder.finish().unwrap_or_default()
}

/// PlantUML's base64 variant fills an incomplete trailing group with zero
/// bits and still emits four symbols. Standard padded base64 emits the same
/// leading symbols followed by `=`, and `0` is the zero symbol here.
fn encode_bytes(data: &[u8]) -> String {
    PLANTUML_ENGINE.encode(data).replace('=', "0")
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::read::DeflateDecoder;
    use std::io::Read;

    fn decode_symbol(c: u8) -> u8 {
        PLANTUML_ALPHABET.bytes().position(|b| b == c).unwrap() as u8
    }

    /// Reference decoder mirroring what the server does with a key.
    fn decode(key: &str) -> String {
        let symbols: Vec<u8> = key.bytes().map(decode_symbol).collect();
        let mut bytes = Vec::new();
        for chunk in symbols.chunks(4) {
            let c = |i: usize| chunk.get(i).copied().unwrap_or(0);
            bytes.push((c(0) << 2) | (c(1) >> 4));
            bytes.push(((c(1) & 0x0F) << 4) | (c(2) >> 2));
            bytes.push(((c(2) & 0x03) << 6) | c(3));
        }
        let mut out = String::new();
        DeflateDecoder::new(&bytes[..])
            .read_to_string(&mut out)
            .unwrap();
        out
    }

    #[test]
    fn test_encode_is_deterministic() {
        let a = encode("Alice -> Bob: hello");
        let b = encode("Alice -> Bob: hello");
        assert_eq!(a, b);
    }

    #[test]
    fn test_different_sources_differ() {
        assert_ne!(encode("Alice -> Bob: hello"), encode("Alice -> Bob: hello!"));
        assert_ne!(encode("a"), encode("b"));
    }

    #[test]
    fn test_key_is_url_safe() {
        let key = encode("@startuml\nA -> B : \"quoted\" & <tag> / ? # %\n@enduml");
        assert!(
            key.as_str()
                .bytes()
                .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_'),
            "unexpected character in {key}"
        );
        assert_eq!(key.as_str().len() % 4, 0);
    }

    #[test]
    fn test_known_vector() {
        // Empty input deflates to the two-byte final empty block 0x03 0x00.
        assert_eq!(encode_bytes(&[0x03, 0x00]), "0m00");
        assert_eq!(encode_bytes(&[0xFF, 0xFF, 0xFF]), "____");
    }

    #[test]
    fn test_round_trip_through_reference_decoder() {
        let source = "@startuml\nAlice -> Bob: hello\nBob --> Alice: hi\n@enduml";
        assert_eq!(decode(encode(source).as_str()), source);
    }

    #[test]
    fn test_large_input_is_not_truncated() {
        let source: String = (0..5000)
            .map(|i| format!("participant P{i}\n"))
            .collect();
        assert_eq!(decode(encode(&source).as_str()), source);
    }
}
