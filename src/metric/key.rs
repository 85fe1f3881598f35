//! Metric keys
//!
//! A `MetricKey` is the stable identity of one metric definition: a content
//! hash of its identity string plus the owning tenant. Two definitions with
//! the same observable identity always produce the same key, regardless of
//! the order their tags were supplied in.
//!
//! The wire/string form is `"<tenant>.<hex hash>"`, e.g.
//! `1.0a3f...e9` (32 hex characters).

use crate::metric::error::ValidationError;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};
use std::fmt;
use std::str::FromStr;

/// Size of the content hash in bytes
pub const HASH_LEN: usize = 16;

/// Stable identity of a metric definition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MetricKey {
    /// Truncated SHA-256 of the identity string
    pub hash: [u8; HASH_LEN],
    /// Owning tenant
    pub tenant: u32,
}

impl MetricKey {
    pub fn new(hash: [u8; HASH_LEN], tenant: u32) -> Self {
        Self { hash, tenant }
    }

    /// Hash an identity string into a key for `tenant`
    pub fn from_identity(identity: &[u8], tenant: u32) -> Self {
        let digest = Sha256::digest(identity);
        let mut hash = [0u8; HASH_LEN];
        hash.copy_from_slice(&digest[..HASH_LEN]);
        Self { hash, tenant }
    }

    /// Fixed-size byte encoding: tenant (little endian) followed by the hash
    pub fn to_bytes(&self) -> [u8; HASH_LEN + 4] {
        let mut out = [0u8; HASH_LEN + 4];
        out[..4].copy_from_slice(&self.tenant.to_le_bytes());
        out[4..].copy_from_slice(&self.hash);
        out
    }

    pub fn from_bytes(bytes: &[u8; HASH_LEN + 4]) -> Self {
        let mut tenant = [0u8; 4];
        tenant.copy_from_slice(&bytes[..4]);
        let mut hash = [0u8; HASH_LEN];
        hash.copy_from_slice(&bytes[4..]);
        Self {
            hash,
            tenant: u32::from_le_bytes(tenant),
        }
    }
}

impl fmt::Display for MetricKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.tenant, hex::encode(self.hash))
    }
}

impl FromStr for MetricKey {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || ValidationError::InvalidKey(s.to_string());

        let (tenant, digest) = s.split_once('.').ok_or_else(invalid)?;
        let tenant: u32 = tenant.parse().map_err(|_| invalid())?;

        if digest.len() != HASH_LEN * 2 {
            return Err(invalid());
        }

        let mut hash = [0u8; HASH_LEN];
        hex::decode_to_slice(digest, &mut hash).map_err(|_| invalid())?;

        Ok(Self { hash, tenant })
    }
}

impl Serialize for MetricKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for MetricKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_string_roundtrip() {
        let key = MetricKey::from_identity(b"some.metric\0\0gauge\x0010", 7);
        let encoded = key.to_string();

        assert!(encoded.starts_with("7."));
        assert_eq!(encoded.len(), 2 + HASH_LEN * 2);
        assert_eq!(encoded.parse::<MetricKey>().unwrap(), key);
    }

    #[test]
    fn test_rejects_malformed() {
        assert!("".parse::<MetricKey>().is_err());
        assert!("1".parse::<MetricKey>().is_err());
        assert!("x.00112233445566778899aabbccddeeff".parse::<MetricKey>().is_err());
        assert!("1.0011".parse::<MetricKey>().is_err());
        assert!("1.zz112233445566778899aabbccddeeff".parse::<MetricKey>().is_err());
    }

    #[test]
    fn test_same_identity_same_key() {
        let a = MetricKey::from_identity(b"a.b", 1);
        let b = MetricKey::from_identity(b"a.b", 1);
        let other_tenant = MetricKey::from_identity(b"a.b", 2);

        assert_eq!(a, b);
        assert_ne!(a, other_tenant);
        assert_eq!(a.hash, other_tenant.hash);
    }

    #[test]
    fn test_bytes_roundtrip() {
        let key = MetricKey::from_identity(b"bytes", 42);
        assert_eq!(MetricKey::from_bytes(&key.to_bytes()), key);
    }

    #[test]
    fn test_serde_as_string() {
        let key = MetricKey::from_identity(b"serde", 3);
        let json = serde_json::to_string(&key).unwrap();

        assert_eq!(json, format!("\"{}\"", key));
        let back: MetricKey = serde_json::from_str(&json).unwrap();
        assert_eq!(back, key);
    }
}
