use std::convert::TryInto;
use std::fmt;

use std::hash::Hasher as StdHasher;
use twox_hash::XxHash32;

use serde::de::{self, Unexpected, Visitor};
use serde::Deserialize;
use serde::Deserializer;
use serde::Serialize;
use serde::Serializer;

// Make the checksum api be similiar to blake3's
pub struct Checksum(XxHash32);

impl Checksum {
    pub fn new() -> Checksum {
        Checksum(XxHash32::with_seed(0))
    }

    pub fn update(&mut self, data: &[u8]) {
        self.0.write(data);
    }

    pub fn finalize(self) -> u32 {
        self.0.finish() as u32
    }
}

impl Default for Checksum {
    fn default() -> Self {
        Checksum::new()
    }
}

/// BLAKE3 hash of a stored file's plaintext content.
#[derive(PartialEq, Eq, Clone, Copy, std::hash::Hash)]
pub struct ContentHash(blake3::Hash);

/// Incremental hasher for [`ContentHash`], fed as file content streams past.
#[derive(Default)]
pub struct ContentHasher(blake3::Hasher);

impl ContentHasher {
    pub fn new() -> Self {
        ContentHasher(blake3::Hasher::new())
    }

    pub fn update(&mut self, data: &[u8]) {
        self.0.update(data);
    }

    pub fn finalize(&self) -> ContentHash {
        ContentHash(self.0.finalize())
    }
}

impl ContentHash {
    pub fn of(data: &[u8]) -> ContentHash {
        ContentHash(blake3::hash(data))
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        self.0.as_bytes()
    }

    pub fn to_hex(&self) -> String {
        self.0.to_hex().to_string()
    }
}

impl From<[u8; 32]> for ContentHash {
    fn from(bytes: [u8; 32]) -> Self {
        ContentHash(blake3::Hash::from(bytes))
    }
}

impl fmt::Debug for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ContentHash({})", self.to_hex())
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

// Serde impls
impl Serialize for ContentHash {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_bytes(self.0.as_bytes())
    }
}

struct HashVisitor;

impl<'de> Visitor<'de> for HashVisitor {
    type Value = ContentHash;

    fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
        write!(formatter, "a byte array containing 32 bytes")
    }

    fn visit_bytes<E: de::Error>(self, v: &[u8]) -> Result<Self::Value, E> {
        v.try_into().map_or_else(
            |_| Err(de::Error::invalid_value(Unexpected::Bytes(v), &self)),
            |hash_bytes: [u8; 32]| Ok(ContentHash::from(hash_bytes)),
        )
    }

    fn visit_byte_buf<E: de::Error>(self, v: Vec<u8>) -> Result<Self::Value, E> {
        v.try_into().map_or_else(
            |v: Vec<u8>| Err(de::Error::invalid_value(Unexpected::Bytes(&v), &self)),
            |hash_bytes: [u8; 32]| Ok(ContentHash::from(hash_bytes)),
        )
    }
}

impl<'de> Deserialize<'de> for ContentHash {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<ContentHash, D::Error> {
        deserializer.deserialize_byte_buf(HashVisitor)
    }
}

#[cfg(test)]
mod test_hash {
    use super::*;

    #[test]
    fn checksum_is_order_sensitive() {
        let mut a = Checksum::new();
        a.update(&[0x00, 0x01]);

        let mut b = Checksum::new();
        b.update(&[0x01, 0x00]);

        assert_ne!(a.finalize(), b.finalize());
    }

    #[test]
    fn checksum_split_updates() {
        let mut a = Checksum::new();
        a.update(b"hello world");

        let mut b = Checksum::new();
        b.update(b"hello ");
        b.update(b"world");

        assert_eq!(a.finalize(), b.finalize());
    }

    #[test]
    fn streamed_hash_matches_oneshot() {
        let data = b"Hello World!!!!!".repeat(1000);

        let mut hasher = ContentHasher::new();
        for chunk in data.chunks(333) {
            hasher.update(chunk);
        }

        assert_eq!(hasher.finalize(), ContentHash::of(&data));
    }

    #[test]
    fn empty_hash_is_blake3_empty() {
        assert_eq!(
            ContentHash::of(b"").to_hex(),
            "af1349b9f5f9a1a6a0404dea36dcc9499bcb25c9adc112b7cc9a93cae41f3262"
        );
    }
}
