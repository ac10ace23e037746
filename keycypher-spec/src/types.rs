#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Kind of key material held by a resolved key version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum KeyType {
    /// Symmetric secret key.
    Secret,
    /// Public half of a key pair.
    Public,
    /// Private half of a key pair.
    Private,
}

impl KeyType {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Secret => "secret",
            Self::Public => "public",
            Self::Private => "private",
        }
    }
}

impl fmt::Display for KeyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for KeyType {
    type Err = ();

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "secret" | "symmetric" => Ok(Self::Secret),
            "public" => Ok(Self::Public),
            "private" => Ok(Self::Private),
            _ => Err(()),
        }
    }
}

/// Key requirements of a cypher template.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct KeyDescriptor {
    /// Key algorithm family, e.g. `AES`.
    pub algorithm: &'static str,
    /// Key size in bits.
    pub key_size: usize,
}

impl KeyDescriptor {
    pub const fn new(algorithm: &'static str, key_size: usize) -> Self {
        Self {
            algorithm,
            key_size,
        }
    }

    pub const fn key_len(&self) -> usize {
        self.key_size / 8
    }
}

/// Cipher transformation and framing of a cypher template.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CypherDescriptor {
    /// Transformation name, e.g. `AES/GCM/NoPadding`.
    pub transformation: &'static str,
    pub iv_len: usize,
    pub tag_len: usize,
}

/// Selects a registered cypher template by name.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct CypherSpecification {
    pub algorithm: String,
    #[cfg_attr(
        feature = "serde",
        serde(default, skip_serializing_if = "BTreeMap::is_empty")
    )]
    pub params: BTreeMap<String, String>,
}

impl CypherSpecification {
    pub fn new(algorithm: impl Into<String>) -> Self {
        Self {
            algorithm: algorithm.into(),
            params: BTreeMap::new(),
        }
    }

    pub fn algorithm(&self) -> &str {
        &self.algorithm
    }

    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }

    pub fn param(&self, key: &str) -> Option<&str> {
        self.params.get(key).map(String::as_str)
    }
}

/// One AEAD ciphertext.
///
/// `iv` and `authentication_tag` are absent when they are framed inside
/// `secure_data` (`iv || ciphertext || tag`).
#[derive(Debug, Clone, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct CypherEncryption {
    pub secure_data: Vec<u8>,
    #[cfg_attr(feature = "serde", serde(default, skip_serializing_if = "Option::is_none"))]
    pub iv: Option<Vec<u8>>,
    #[cfg_attr(feature = "serde", serde(default, skip_serializing_if = "Option::is_none"))]
    pub authentication_tag: Option<Vec<u8>>,
}

impl CypherEncryption {
    pub fn new(secure_data: Vec<u8>, iv: Option<Vec<u8>>, authentication_tag: Option<Vec<u8>>) -> Self {
        Self {
            secure_data,
            iv,
            authentication_tag,
        }
    }

    /// Wrap framed bytes that carry their own iv and tag.
    pub fn combined(secure_data: Vec<u8>) -> Self {
        Self::new(secure_data, None, None)
    }

    pub fn secure_data(&self) -> &[u8] {
        &self.secure_data
    }

    pub fn iv(&self) -> Option<&[u8]> {
        self.iv.as_deref()
    }

    pub fn authentication_tag(&self) -> Option<&[u8]> {
        self.authentication_tag.as_deref()
    }

    pub fn into_secure_data(self) -> Vec<u8> {
        self.secure_data
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_type_parsing() {
        assert_eq!("Secret".parse::<KeyType>(), Ok(KeyType::Secret));
        assert_eq!("symmetric".parse::<KeyType>(), Ok(KeyType::Secret));
        assert_eq!("private".parse::<KeyType>(), Ok(KeyType::Private));
        assert!("rsa".parse::<KeyType>().is_err());
    }

    #[cfg(feature = "serde")]
    #[test]
    fn serde_shapes() {
        let spec = CypherSpecification::new("A256GCM").with_param("aad", "tenant");
        let json = serde_json::to_string(&spec).unwrap();
        let back: CypherSpecification = serde_json::from_str(&json).unwrap();
        assert_eq!(spec, back);
        assert_eq!(back.param("aad"), Some("tenant"));

        let framed = CypherEncryption::combined(vec![1, 2, 3]);
        let json = serde_json::to_value(&framed).unwrap();
        assert_eq!(json, serde_json::json!({ "secure_data": [1, 2, 3] }));
    }
}
