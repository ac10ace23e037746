//! Built-in AEAD templates.
//!
//! A call with an explicit IV returns the ciphertext, IV and tag detached. A
//! call without one draws a random IV and returns `iv || ciphertext || tag`
//! in `secure_data`, which is what the byte-level cypher API round-trips.

use crate::crypto::template::{CypherNamespace, CypherPlugin, CypherTemplate, TemplateRegistration};
use crate::key_provider::KeyProvider;
use crate::key_version::KeyVersion;
#[allow(deprecated)]
use aes_gcm::aead::generic_array::GenericArray;
use aes_gcm::aead::generic_array::typenum::Unsigned;
use aes_gcm::aead::{Aead, AeadCore, KeyInit, Payload};
use aes_gcm::{Aes128Gcm, Aes256Gcm};
use chacha20poly1305::ChaCha20Poly1305;
#[cfg(feature = "xchacha")]
use chacha20poly1305::XChaCha20Poly1305;
use keycypher_spec::{
    CypherDescriptor, CypherEncryption, CypherError, CypherResult, KeyDescriptor, KeyReference,
    KeyType,
};
use rand::RngCore;
use std::marker::PhantomData;

/// AEAD template over any RustCrypto cipher.
pub struct AeadTemplate<C> {
    name: &'static str,
    key: KeyDescriptor,
    transformation: &'static str,
    _cipher: PhantomData<fn() -> C>,
}

pub type Aes256GcmTemplate = AeadTemplate<Aes256Gcm>;
pub type Aes128GcmTemplate = AeadTemplate<Aes128Gcm>;
pub type ChaCha20Poly1305Template = AeadTemplate<ChaCha20Poly1305>;
#[cfg(feature = "xchacha")]
pub type XChaCha20Poly1305Template = AeadTemplate<XChaCha20Poly1305>;

impl<C> AeadTemplate<C>
where
    C: Aead + KeyInit,
{
    pub const fn new(name: &'static str, key: KeyDescriptor, transformation: &'static str) -> Self {
        Self {
            name,
            key,
            transformation,
            _cipher: PhantomData,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    fn iv_len() -> usize {
        <<C as AeadCore>::NonceSize as Unsigned>::USIZE
    }

    fn tag_len() -> usize {
        <<C as AeadCore>::TagSize as Unsigned>::USIZE
    }

    fn cipher(&self, version: &KeyVersion) -> CypherResult<C> {
        let key = version.key(KeyType::Secret)?;
        if key.len() != self.key.key_len() {
            return Err(CypherError::InvalidKey {
                algorithm: self.name,
                reason: format!(
                    "expected {} key bytes, `{}` has {}",
                    self.key.key_len(),
                    version.version_path(),
                    key.len()
                ),
            });
        }
        C::new_from_slice(&key).map_err(|_| CypherError::InvalidKey {
            algorithm: self.name,
            reason: "key rejected by cipher".into(),
        })
    }

    fn check_iv(&self, iv: &[u8]) -> CypherResult<()> {
        if iv.len() != Self::iv_len() {
            return Err(CypherError::InvalidIv {
                algorithm: self.name,
                expected: Self::iv_len(),
                actual: iv.len(),
            });
        }
        Ok(())
    }

    fn invalid_ciphertext(&self, reason: impl Into<String>) -> CypherError {
        CypherError::InvalidCiphertext {
            algorithm: self.name,
            reason: reason.into(),
        }
    }

    #[allow(deprecated)]
    fn seal(&self, cipher: &C, iv: &[u8], msg: &[u8], aad: &[u8]) -> CypherResult<Vec<u8>> {
        let nonce = GenericArray::from_slice(iv);
        cipher
            .encrypt(nonce, Payload { msg, aad })
            .map_err(|_| self.invalid_ciphertext("plaintext rejected by cipher"))
    }

    #[allow(deprecated)]
    fn open(&self, cipher: &C, iv: &[u8], msg: &[u8], aad: &[u8]) -> CypherResult<Vec<u8>> {
        let nonce = GenericArray::from_slice(iv);
        cipher
            .decrypt(nonce, Payload { msg, aad })
            .map_err(|_| CypherError::AuthenticationFailed)
    }
}

impl<C> CypherTemplate for AeadTemplate<C>
where
    C: Aead + KeyInit,
{
    fn key_descriptor(&self) -> KeyDescriptor {
        self.key
    }

    fn cypher_descriptor(&self) -> CypherDescriptor {
        CypherDescriptor {
            transformation: self.transformation,
            iv_len: Self::iv_len(),
            tag_len: Self::tag_len(),
        }
    }

    fn encrypt(
        &self,
        ctx: &dyn KeyProvider,
        key_ref: &KeyReference,
        plaintext: &[u8],
        iv: Option<&[u8]>,
        aad: Option<&[u8]>,
    ) -> CypherResult<CypherEncryption> {
        let version = ctx.resolve_key(key_ref)?;
        let cipher = self.cipher(&version)?;
        let aad = aad.unwrap_or_default();

        match iv {
            Some(iv) => {
                self.check_iv(iv)?;
                let mut sealed = self.seal(&cipher, iv, plaintext, aad)?;
                let tag = sealed.split_off(sealed.len() - Self::tag_len());
                Ok(CypherEncryption::new(sealed, Some(iv.to_vec()), Some(tag)))
            }
            None => {
                let mut iv = vec![0u8; Self::iv_len()];
                rand::rng().fill_bytes(&mut iv);
                let sealed = self.seal(&cipher, &iv, plaintext, aad)?;
                let mut framed = iv;
                framed.extend_from_slice(&sealed);
                Ok(CypherEncryption::combined(framed))
            }
        }
    }

    fn decrypt(
        &self,
        ctx: &dyn KeyProvider,
        key_ref: &KeyReference,
        encryption: &CypherEncryption,
        aad: Option<&[u8]>,
    ) -> CypherResult<Vec<u8>> {
        let version = ctx.resolve_key(key_ref)?;
        let cipher = self.cipher(&version)?;
        let aad = aad.unwrap_or_default();
        let data = encryption.secure_data();

        match (encryption.iv(), encryption.authentication_tag()) {
            (Some(iv), Some(tag)) => {
                self.check_iv(iv)?;
                if tag.len() != Self::tag_len() {
                    return Err(self.invalid_ciphertext(format!(
                        "expected {} tag bytes, got {}",
                        Self::tag_len(),
                        tag.len()
                    )));
                }
                let mut sealed = Vec::with_capacity(data.len() + tag.len());
                sealed.extend_from_slice(data);
                sealed.extend_from_slice(tag);
                self.open(&cipher, iv, &sealed, aad)
            }
            (Some(iv), None) => {
                self.check_iv(iv)?;
                if data.len() < Self::tag_len() {
                    return Err(self.invalid_ciphertext("ciphertext shorter than the tag"));
                }
                self.open(&cipher, iv, data, aad)
            }
            (None, Some(_)) => Err(self.invalid_ciphertext("authentication tag without iv")),
            (None, None) => {
                if data.len() < Self::iv_len() + Self::tag_len() {
                    return Err(self.invalid_ciphertext("framed ciphertext shorter than iv and tag"));
                }
                let (iv, sealed) = data.split_at(Self::iv_len());
                self.open(&cipher, iv, sealed, aad)
            }
        }
    }
}

impl CypherPlugin for AeadTemplate<Aes256Gcm> {
    const ALGORITHMS: &'static [&'static str] = &["A256GCM", "AES-256-GCM", "AES/GCM/NoPadding"];

    fn create() -> CypherResult<Self> {
        Ok(Self::new("A256GCM", KeyDescriptor::new("AES", 256), "AES/GCM/NoPadding"))
    }
}

impl CypherPlugin for AeadTemplate<Aes128Gcm> {
    const ALGORITHMS: &'static [&'static str] = &["A128GCM", "AES-128-GCM"];

    fn create() -> CypherResult<Self> {
        Ok(Self::new("A128GCM", KeyDescriptor::new("AES", 128), "AES/GCM/NoPadding"))
    }
}

impl CypherPlugin for AeadTemplate<ChaCha20Poly1305> {
    const ALGORITHMS: &'static [&'static str] = &["C20P", "ChaCha20-Poly1305"];

    fn create() -> CypherResult<Self> {
        Ok(Self::new("C20P", KeyDescriptor::new("ChaCha20", 256), "ChaCha20-Poly1305"))
    }
}

#[cfg(feature = "xchacha")]
impl CypherPlugin for AeadTemplate<XChaCha20Poly1305> {
    const ALGORITHMS: &'static [&'static str] = &["XC20P", "XChaCha20-Poly1305"];

    fn create() -> CypherResult<Self> {
        Ok(Self::new("XC20P", KeyDescriptor::new("ChaCha20", 256), "XChaCha20-Poly1305"))
    }
}

#[cfg(feature = "xchacha")]
const AEAD_PLUGINS: &[TemplateRegistration] = &[
    TemplateRegistration::of::<Aes256GcmTemplate>(),
    TemplateRegistration::of::<Aes128GcmTemplate>(),
    TemplateRegistration::of::<ChaCha20Poly1305Template>(),
    TemplateRegistration::of::<XChaCha20Poly1305Template>(),
];

#[cfg(not(feature = "xchacha"))]
const AEAD_PLUGINS: &[TemplateRegistration] = &[
    TemplateRegistration::of::<Aes256GcmTemplate>(),
    TemplateRegistration::of::<Aes128GcmTemplate>(),
    TemplateRegistration::of::<ChaCha20Poly1305Template>(),
];

/// The `aead` plugin namespace.
pub static AEAD_NAMESPACE: CypherNamespace = CypherNamespace {
    name: "aead",
    plugins: AEAD_PLUGINS,
};
