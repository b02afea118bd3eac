// Buffer content: encoding tags, canonical bytes and MD5 fingerprints.
//
// Every buffer is fingerprinted by the MD5 of its canonical bytes. Text
// buffers hash their UTF-8 bytes; binary buffers hash the raw bytes, not the
// base64 form used on the wire.

use std::fmt::Write as _;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use md5::{Digest, Md5};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Hex-encoded MD5 of buffer content.
pub type ContentHash = String;

/// How buffer content travels on the wire.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Encoding {
    #[default]
    Utf8,
    Base64,
}

impl Encoding {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Utf8 => "utf8",
            Self::Base64 => "base64",
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum EncodingError {
    #[error("invalid base64 payload: {0}")]
    Base64(String),
}

/// Decoded content of a buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BufContent {
    Text(String),
    Binary(Vec<u8>),
}

impl BufContent {
    /// Classify raw file bytes: valid UTF-8 becomes text, anything else binary.
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        match String::from_utf8(bytes) {
            Ok(text) => Self::Text(text),
            Err(error) => Self::Binary(error.into_bytes()),
        }
    }

    /// Wrap raw bytes under a known encoding tag. A `base64` buffer stays
    /// binary even when its bytes happen to be valid UTF-8.
    pub fn from_bytes_as(bytes: Vec<u8>, encoding: Encoding) -> Self {
        match encoding {
            Encoding::Utf8 => Self::from_bytes(bytes),
            Encoding::Base64 => Self::Binary(bytes),
        }
    }

    /// Decode a wire payload according to its encoding tag.
    pub fn from_wire(buf: &str, encoding: Encoding) -> Result<Self, EncodingError> {
        match encoding {
            Encoding::Utf8 => Ok(Self::Text(buf.to_owned())),
            Encoding::Base64 => STANDARD
                .decode(buf.as_bytes())
                .map(Self::Binary)
                .map_err(|error| EncodingError::Base64(error.to_string())),
        }
    }

    /// The payload string and encoding tag used on the wire.
    pub fn to_wire(&self) -> (String, Encoding) {
        match self {
            Self::Text(text) => (text.clone(), Encoding::Utf8),
            Self::Binary(bytes) => (STANDARD.encode(bytes), Encoding::Base64),
        }
    }

    pub fn encoding(&self) -> Encoding {
        match self {
            Self::Text(_) => Encoding::Utf8,
            Self::Binary(_) => Encoding::Base64,
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Self::Text(text) => text.as_bytes(),
            Self::Binary(bytes) => bytes,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(text) => Some(text),
            Self::Binary(_) => None,
        }
    }

    pub fn md5(&self) -> ContentHash {
        md5_hex(self.as_bytes())
    }
}

/// Compute the MD5 of the given bytes as a lowercase hex string.
pub fn md5_hex(content: &[u8]) -> ContentHash {
    let digest = Md5::digest(content);
    hex_encode(&digest)
}

/// MD5 of a text's UTF-8 bytes.
pub fn md5_text(text: &str) -> ContentHash {
    md5_hex(text.as_bytes())
}

fn hex_encode(bytes: &[u8]) -> String {
    let mut s = String::with_capacity(bytes.len() * 2);
    for &b in bytes {
        let _ = write!(s, "{b:02x}");
    }
    s
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn md5_of_empty_input() {
        assert_eq!(md5_hex(b""), "d41d8cd98f00b204e9800998ecf8427e");
    }

    #[test]
    fn md5_of_hello() {
        assert_eq!(md5_text("hello"), "5d41402abc4b2a76b9719d911017c592");
    }

    #[test]
    fn md5_hex_is_lowercase_and_32_chars() {
        let hash = md5_text("anything at all");
        assert_eq!(hash.len(), 32);
        assert_eq!(hash, hash.to_lowercase());
    }

    #[test]
    fn utf8_bytes_become_text() {
        let content = BufContent::from_bytes("héllo".as_bytes().to_vec());
        assert_eq!(content, BufContent::Text("héllo".into()));
        assert_eq!(content.encoding(), Encoding::Utf8);
    }

    #[test]
    fn invalid_utf8_becomes_binary_and_travels_as_base64() {
        let raw = vec![0xff, 0xfe, 0x00, 0x41];
        let content = BufContent::from_bytes(raw.clone());
        assert_eq!(content.encoding(), Encoding::Base64);

        let (wire, encoding) = content.to_wire();
        assert_eq!(encoding, Encoding::Base64);
        assert_eq!(wire, "//4AQQ==");
        assert_eq!(BufContent::from_wire(&wire, encoding).unwrap(), BufContent::Binary(raw));
    }

    #[test]
    fn base64_tag_keeps_utf8_bytes_binary() {
        let content = BufContent::from_bytes_as(b"PK plain ascii".to_vec(), Encoding::Base64);
        assert_eq!(content.encoding(), Encoding::Base64);
        assert_eq!(content.md5(), md5_text("PK plain ascii"));

        let text = BufContent::from_bytes_as(b"plain".to_vec(), Encoding::Utf8);
        assert_eq!(text, BufContent::Text("plain".into()));
        let raw = BufContent::from_bytes_as(vec![0xff, 0xfe], Encoding::Utf8);
        assert_eq!(raw.encoding(), Encoding::Base64);
    }

    #[test]
    fn binary_hash_covers_raw_bytes_not_base64() {
        let raw = vec![0xff, 0x10, 0x20];
        let content = BufContent::Binary(raw.clone());
        assert_eq!(content.md5(), md5_hex(&raw));
    }

    #[test]
    fn rejects_malformed_base64() {
        let result = BufContent::from_wire("not base64!!", Encoding::Base64);
        assert!(matches!(result, Err(EncodingError::Base64(_))));
    }

    #[test]
    fn encoding_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&Encoding::Utf8).unwrap(), "\"utf8\"");
        assert_eq!(serde_json::to_string(&Encoding::Base64).unwrap(), "\"base64\"");
        assert_eq!(Encoding::Base64.as_str(), "base64");
    }
}
