use crate::crypto::template::CypherTemplate;
use crate::key_provider::KeyProvider;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use keycypher_spec::{CypherEncryption, CypherError, CypherResult, KeyReference};
use std::fmt;
use std::sync::Arc;

/// Byte-level encrypt/decrypt bound to one template and one key reference.
///
/// Each call resolves the key through the bound provider, so rotation shows
/// up on the next call without rebuilding the cypher.
pub struct Cypher {
    context: Arc<dyn KeyProvider>,
    template: Arc<dyn CypherTemplate>,
    key_ref: KeyReference,
}

impl Cypher {
    pub fn new(
        context: Arc<dyn KeyProvider>,
        template: Arc<dyn CypherTemplate>,
        key_ref: KeyReference,
    ) -> Self {
        Self {
            context,
            template,
            key_ref,
        }
    }

    pub fn template(&self) -> &Arc<dyn CypherTemplate> {
        &self.template
    }

    pub fn key_reference(&self) -> &KeyReference {
        &self.key_ref
    }

    /// Encrypt with a random IV and return the framed bytes.
    pub fn encrypt_bytes(&self, plaintext: Option<&[u8]>) -> CypherResult<Option<Vec<u8>>> {
        Ok(self
            .encrypt(plaintext, None, None)?
            .map(CypherEncryption::into_secure_data))
    }

    pub fn encrypt(
        &self,
        plaintext: Option<&[u8]>,
        iv: Option<&[u8]>,
        aad: Option<&[u8]>,
    ) -> CypherResult<Option<CypherEncryption>> {
        let Some(plaintext) = plaintext else {
            return Ok(None);
        };
        self.template
            .encrypt(self.context.as_ref(), &self.key_ref, plaintext, iv, aad)
            .map(Some)
    }

    pub fn decrypt(&self, encryption: &CypherEncryption, aad: Option<&[u8]>) -> CypherResult<Vec<u8>> {
        self.template
            .decrypt(self.context.as_ref(), &self.key_ref, encryption, aad)
    }

    /// Decrypt bytes produced by [`Cypher::encrypt_bytes`].
    pub fn decrypt_bytes(&self, secure_data: Option<&[u8]>) -> CypherResult<Option<Vec<u8>>> {
        let Some(secure_data) = secure_data else {
            return Ok(None);
        };
        let encryption = CypherEncryption::combined(secure_data.to_vec());
        self.decrypt(&encryption, None).map(Some)
    }
}

impl fmt::Debug for Cypher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cypher")
            .field("transformation", &self.template.cypher_descriptor().transformation)
            .field("key", &self.key_ref.path())
            .finish_non_exhaustive()
    }
}

/// String layer over [`Cypher`]: UTF-8 in, Base64 out.
#[derive(Debug)]
pub struct StringCypher {
    cypher: Cypher,
}

impl StringCypher {
    pub fn new(cypher: Cypher) -> Self {
        Self { cypher }
    }

    pub fn as_cypher(&self) -> &Cypher {
        &self.cypher
    }

    pub fn into_cypher(self) -> Cypher {
        self.cypher
    }

    pub fn encrypt(&self, plaintext: Option<&str>) -> CypherResult<Option<String>> {
        Ok(self
            .cypher
            .encrypt_bytes(plaintext.map(str::as_bytes))?
            .map(|sealed| STANDARD.encode(sealed)))
    }

    pub fn decrypt(&self, encoded: Option<&str>) -> CypherResult<Option<String>> {
        let Some(encoded) = encoded else {
            return Ok(None);
        };
        let sealed = STANDARD
            .decode(encoded.trim())
            .map_err(|err| CypherError::Encoding(format!("invalid base64: {err}")))?;
        let Some(plain) = self.cypher.decrypt_bytes(Some(sealed.as_slice()))? else {
            return Ok(None);
        };
        String::from_utf8(plain)
            .map(Some)
            .map_err(|err| {
                CypherError::Encoding(format!(
                    "invalid utf-8 at byte {}",
                    err.utf8_error().valid_up_to()
                ))
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::aead::Aes256GcmTemplate;
    use crate::crypto::template::CypherPlugin;
    use crate::provider::MemoryKeyProvider;

    fn cypher() -> Cypher {
        let provider = MemoryKeyProvider::new("keys");
        provider.add_key("db", "AES", vec![3u8; 32]);
        Cypher::new(
            Arc::new(provider),
            Arc::new(Aes256GcmTemplate::create().unwrap()),
            KeyReference::new("keys/db"),
        )
    }

    #[test]
    fn none_passes_through() {
        let cypher = cypher();
        assert_eq!(cypher.encrypt_bytes(None).unwrap(), None);
        assert_eq!(cypher.encrypt(None, None, None).unwrap(), None);
        assert_eq!(cypher.decrypt_bytes(None).unwrap(), None);
    }

    #[test]
    fn bytes_round_trip() {
        let cypher = cypher();
        let sealed = cypher.encrypt_bytes(Some(&b"payload"[..])).unwrap().unwrap();
        assert_ne!(&sealed[..], b"payload");
        let plain = cypher.decrypt_bytes(Some(sealed.as_slice())).unwrap().unwrap();
        assert_eq!(plain, b"payload");
    }

    #[test]
    fn strings_round_trip() {
        let strings = StringCypher::new(cypher());
        for text in ["", "plain ascii", "héllo wörld", "鍵の暗号化 🔐"] {
            let sealed = strings.encrypt(Some(text)).unwrap().unwrap();
            assert_eq!(strings.decrypt(Some(sealed.as_str())).unwrap().as_deref(), Some(text));
        }
        assert_eq!(strings.encrypt(None).unwrap(), None);
        assert_eq!(strings.decrypt(None).unwrap(), None);
    }

    #[test]
    fn bad_base64_is_an_encoding_error() {
        let strings = StringCypher::new(cypher());
        assert!(matches!(
            strings.decrypt(Some("not base64 !!")),
            Err(CypherError::Encoding(_))
        ));
    }

    #[test]
    fn non_utf8_plaintext_is_an_encoding_error() {
        let strings = StringCypher::new(cypher());
        let sealed = strings
            .as_cypher()
            .encrypt_bytes(Some(&[0xff, 0xfe, 0xfd][..]))
            .unwrap()
            .unwrap();
        let encoded = STANDARD.encode(sealed);
        assert!(matches!(
            strings.decrypt(Some(encoded.as_str())),
            Err(CypherError::Encoding(_))
        ));
    }
}
