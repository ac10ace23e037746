//! JSON keystore on disk, exposed through the framed provider contract.
//!
//! The document is read when the first frame opens and scrubbed when the last
//! frame closes. While frames are open the file is re-read whenever its
//! modification stamp changes, so writes from other handles or processes are
//! seen on the next resolution. Password-protected versions are sealed with
//! AES-256-GCM under a key stretched from the password with Argon2id and a
//! per-version salt.

use crate::key_provider::{is_under_root, FramedKeyProvider, KeyFrame, KeyProvider};
use crate::key_version::KeyVersion;
#[allow(deprecated)]
use aes_gcm::aead::generic_array::GenericArray;
use aes_gcm::aead::{Aead, KeyInit, Payload};
use aes_gcm::Aes256Gcm;
use argon2::Argon2;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use hkdf::Hkdf;
use keycypher_spec::key_path::{add_suffix, PUBLIC_SEGMENT};
use keycypher_spec::{
    KeyPathComponents, KeyProviderError, KeyReference, KeyResult, KeyType, Password,
};
use parking_lot::Mutex;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;
use zeroize::{Zeroize, Zeroizing};

const SALT_LEN: usize = 16;
const NONCE_LEN: usize = 12;
const WRAP_INFO: &str = "keycypher/keystore";

/// Serialized keystore document.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct KeyStoreDocument {
    #[serde(default)]
    pub keys: BTreeMap<String, KeyStoreEntry>,
}

impl KeyStoreDocument {
    fn scrub(&mut self) {
        for entry in self.keys.values_mut() {
            for version in &mut entry.versions {
                version.material.zeroize();
                if let Some(public) = version.public.as_mut() {
                    public.zeroize();
                }
            }
        }
        self.keys.clear();
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeyStoreEntry {
    pub algorithm: String,
    #[serde(default)]
    pub versions: Vec<StoredKeyVersion>,
}

impl KeyStoreEntry {
    fn latest_active(&self) -> Option<&StoredKeyVersion> {
        self.versions.iter().rev().find(|version| !version.revoked)
    }

    fn next_version(&self) -> u32 {
        self.versions.last().map(|v| v.version + 1).unwrap_or(1)
    }
}

#[derive(Clone, Serialize, Deserialize)]
pub struct StoredKeyVersion {
    pub version: u32,
    pub key_type: KeyType,
    material: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    public: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    sealed: Option<SealParams>,
    #[serde(default)]
    pub revoked: bool,
}

impl StoredKeyVersion {
    pub fn is_protected(&self) -> bool {
        self.sealed.is_some()
    }
}

impl fmt::Debug for StoredKeyVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoredKeyVersion")
            .field("version", &self.version)
            .field("key_type", &self.key_type)
            .field("protected", &self.is_protected())
            .field("revoked", &self.revoked)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct SealParams {
    salt: String,
    nonce: String,
}

/// Listing row for one stored version. Never carries material.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyInfo {
    pub alias: String,
    pub algorithm: String,
    pub version: u32,
    pub key_type: KeyType,
    pub protected: bool,
    pub revoked: bool,
}

/// Material for a new key version.
pub enum NewKey<'a> {
    Secret(&'a [u8]),
    Pair { private: &'a [u8], public: &'a [u8] },
}

/// Modification stamp of the keystore file at the time it was loaded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct FileStamp {
    modified: Option<SystemTime>,
    len: u64,
}

#[derive(Default)]
struct FrameState {
    frames: usize,
    document: Option<KeyStoreDocument>,
    stamp: Option<FileStamp>,
}

/// Framed [`KeyProvider`] over a JSON keystore file.
pub struct FileKeyStore {
    root: String,
    path: PathBuf,
    state: Mutex<FrameState>,
}

impl FileKeyStore {
    /// Handle on an existing keystore. Nothing is read until a frame opens.
    pub fn open(path: impl Into<PathBuf>, root: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            path: path.into(),
            state: Mutex::new(FrameState::default()),
        }
    }

    /// Write an empty keystore at `path`, refusing to overwrite.
    pub fn create(path: impl Into<PathBuf>, root: impl Into<String>) -> KeyResult<Self> {
        let store = Self::open(path, root);
        if store.path.exists() {
            return Err(store.storage_error("keystore already exists"));
        }
        store.write_document(&KeyStoreDocument::default())?;
        tracing::info!(path = %store.path.display(), "created keystore");
        Ok(store)
    }

    pub fn root(&self) -> &str {
        &self.root
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append a new version under `alias`, creating the alias if needed.
    pub fn add_key(
        &self,
        alias: &str,
        algorithm: &str,
        key: NewKey<'_>,
        password: Option<&Password>,
    ) -> KeyResult<u32> {
        let version = self.update(|document| {
            let entry = document
                .keys
                .entry(alias.to_string())
                .or_insert_with(|| KeyStoreEntry {
                    algorithm: algorithm.to_string(),
                    versions: Vec::new(),
                });
            let version = entry.next_version();
            entry
                .versions
                .push(seal_version(alias, version, key, password)?);
            Ok(version)
        })?;
        tracing::info!(alias, version, protected = password.is_some(), "stored key version");
        Ok(version)
    }

    /// Append a new secret version to an existing alias.
    pub fn rotate(&self, alias: &str, material: &[u8], password: Option<&Password>) -> KeyResult<u32> {
        let version = self.update(|document| {
            let entry = document
                .keys
                .get_mut(alias)
                .ok_or_else(|| self.not_found(alias))?;
            let version = entry.next_version();
            entry
                .versions
                .push(seal_version(alias, version, NewKey::Secret(material), password)?);
            Ok(version)
        })?;
        tracing::info!(alias, version, "rotated key");
        Ok(version)
    }

    pub fn revoke(&self, alias: &str, version: u32) -> KeyResult<()> {
        self.update(|document| {
            let entry = document
                .keys
                .get_mut(alias)
                .ok_or_else(|| self.not_found(alias))?;
            let stored = entry
                .versions
                .iter_mut()
                .find(|stored| stored.version == version)
                .ok_or_else(|| self.not_found(&format!("{alias}@{version}")))?;
            stored.revoked = true;
            Ok(())
        })?;
        tracing::info!(alias, version, "revoked key");
        Ok(())
    }

    pub fn list(&self) -> KeyResult<Vec<KeyInfo>> {
        let document = self.read_document()?;
        Ok(document
            .keys
            .iter()
            .flat_map(|(alias, entry)| {
                entry.versions.iter().map(move |version| KeyInfo {
                    alias: alias.clone(),
                    algorithm: entry.algorithm.clone(),
                    version: version.version,
                    key_type: version.key_type,
                    protected: version.is_protected(),
                    revoked: version.revoked,
                })
            })
            .collect())
    }

    fn update<R>(&self, f: impl FnOnce(&mut KeyStoreDocument) -> KeyResult<R>) -> KeyResult<R> {
        let mut state = self.state.lock();
        let mut document = self.read_document()?;
        let out = f(&mut document)?;
        self.write_document(&document)?;
        if state.frames > 0 {
            if let Some(mut stale) = state.document.replace(document) {
                stale.scrub();
            }
            state.stamp = self.stamp().ok();
        } else {
            document.scrub();
        }
        Ok(out)
    }

    fn read_document(&self) -> KeyResult<KeyStoreDocument> {
        let bytes = fs::read(&self.path).map_err(|err| self.storage_error(err))?;
        let bytes = Zeroizing::new(bytes);
        serde_json::from_slice(&bytes).map_err(|err| self.storage_error(err))
    }

    fn write_document(&self, document: &KeyStoreDocument) -> KeyResult<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(|err| self.storage_error(err))?;
            }
        }
        let data = Zeroizing::new(
            serde_json::to_vec_pretty(document).map_err(|err| self.storage_error(err))?,
        );
        let mut file = fs::File::create(&self.path).map_err(|err| self.storage_error(err))?;
        file.write_all(&data)
            .and_then(|_| file.sync_all())
            .map_err(|err| self.storage_error(err))
    }

    /// Frame that keeps the store alive instead of borrowing it.
    pub fn open_owned_frame(self: &Arc<Self>) -> KeyResult<KeyFrame<'static>> {
        self.enter_frame()?;
        let store = Arc::clone(self);
        Ok(KeyFrame::new(move || store.close_frame()))
    }

    fn enter_frame(&self) -> KeyResult<()> {
        let mut state = self.state.lock();
        if state.frames == 0 {
            self.load(&mut state)?;
            tracing::debug!(path = %self.path.display(), "keystore frame opened");
        }
        state.frames += 1;
        Ok(())
    }

    fn close_frame(&self) {
        let mut state = self.state.lock();
        state.frames = state.frames.saturating_sub(1);
        if state.frames == 0 {
            if let Some(mut document) = state.document.take() {
                document.scrub();
            }
            state.stamp = None;
            tracing::debug!(path = %self.path.display(), "keystore frame closed");
        }
    }

    fn stamp(&self) -> KeyResult<FileStamp> {
        let metadata = fs::metadata(&self.path).map_err(|err| self.storage_error(err))?;
        Ok(FileStamp {
            modified: metadata.modified().ok(),
            len: metadata.len(),
        })
    }

    fn load(&self, state: &mut FrameState) -> KeyResult<()> {
        let stamp = self.stamp()?;
        let document = self.read_document()?;
        if let Some(mut stale) = state.document.replace(document) {
            stale.scrub();
        }
        state.stamp = Some(stamp);
        Ok(())
    }

    /// Re-read the document of an open frame when the file changed on disk.
    fn refresh(&self, state: &mut FrameState) -> KeyResult<()> {
        if state.frames == 0 {
            return Ok(());
        }
        let stamp = self.stamp()?;
        if state.stamp != Some(stamp) {
            self.load(state)?;
            tracing::debug!(path = %self.path.display(), "keystore reloaded");
        }
        Ok(())
    }

    fn storage_error(&self, message: impl ToString) -> KeyProviderError {
        KeyProviderError::storage(self.path.display().to_string(), message)
    }

    fn not_found(&self, alias: &str) -> KeyProviderError {
        KeyProviderError::NotFound {
            path: format!("{}/{alias}", self.root),
        }
    }
}

impl KeyProvider for FileKeyStore {
    fn is_supported(&self, key_ref: &KeyReference) -> bool {
        is_under_root(&self.root, key_ref.path())
    }

    fn resolve_key(&self, key_ref: &KeyReference) -> KeyResult<Arc<KeyVersion>> {
        if !self.is_supported(key_ref) {
            return Err(KeyProviderError::Unsupported {
                path: key_ref.path().to_string(),
            });
        }
        let components = KeyPathComponents::parse(&self.root, key_ref.path())?;

        let mut state = self.state.lock();
        self.refresh(&mut state)?;
        let document = state
            .document
            .as_ref()
            .ok_or_else(|| KeyProviderError::FrameNotOpen {
                path: key_ref.path().to_string(),
            })?;
        let entry = document
            .keys
            .get(components.alias())
            .ok_or_else(|| KeyProviderError::NotFound {
                path: components.path().to_string(),
            })?;

        let stored = if components.is_latest() {
            entry
                .latest_active()
                .ok_or_else(|| KeyProviderError::Revoked {
                    path: components.path().to_string(),
                })?
        } else {
            let stored = entry
                .versions
                .iter()
                .find(|stored| stored.version == components.version())
                .ok_or_else(|| KeyProviderError::NotFound {
                    path: components.version_path().to_string(),
                })?;
            if stored.revoked {
                return Err(KeyProviderError::Revoked {
                    path: components.version_path().to_string(),
                });
            }
            stored
        };

        if components.is_public() {
            let encoded = stored
                .public
                .as_deref()
                .ok_or_else(|| KeyProviderError::NotFound {
                    path: components.version_path().to_string(),
                })?;
            let public = STANDARD
                .decode(encoded)
                .map_err(|err| KeyProviderError::storage(components.path(), err))?;
            let path = add_suffix(Some(components.path()), Some(PUBLIC_SEGMENT)).unwrap_or_default();
            return Ok(Arc::new(KeyVersion::new(
                path,
                stored.version,
                KeyType::Public,
                entry.algorithm.as_str(),
                public,
            )));
        }

        let mut material = open_version(
            components.alias(),
            components.path(),
            stored,
            key_ref.password(),
        )?;
        Ok(Arc::new(KeyVersion::new(
            components.path(),
            stored.version,
            stored.key_type,
            entry.algorithm.as_str(),
            std::mem::take(&mut *material),
        )))
    }

    /// Valid while a frame is open and the stored version is not revoked,
    /// as of the current file contents.
    fn is_valid(&self, version: &KeyVersion) -> bool {
        let Ok(components) = KeyPathComponents::parse(&self.root, version.path()) else {
            return false;
        };
        let mut state = self.state.lock();
        if state.frames == 0 || self.refresh(&mut state).is_err() {
            return false;
        }
        state
            .document
            .as_ref()
            .and_then(|document| document.keys.get(components.alias()))
            .and_then(|entry| {
                entry
                    .versions
                    .iter()
                    .find(|stored| stored.version == version.version())
            })
            .is_some_and(|stored| !stored.revoked)
    }
}

impl FramedKeyProvider for FileKeyStore {
    fn has_frame(&self) -> bool {
        self.state.lock().frames > 0
    }

    fn open_frame(&self) -> KeyResult<KeyFrame<'_>> {
        self.enter_frame()?;
        Ok(KeyFrame::new(move || self.close_frame()))
    }
}

fn seal_version(
    alias: &str,
    version: u32,
    key: NewKey<'_>,
    password: Option<&Password>,
) -> KeyResult<StoredKeyVersion> {
    let (key_type, material, public) = match key {
        NewKey::Secret(material) => (KeyType::Secret, material, None),
        NewKey::Pair { private, public } => (KeyType::Private, private, Some(STANDARD.encode(public))),
    };

    let Some(password) = password else {
        return Ok(StoredKeyVersion {
            version,
            key_type,
            material: STANDARD.encode(material),
            public,
            sealed: None,
            revoked: false,
        });
    };

    let salt = random_bytes(SALT_LEN);
    let nonce = random_bytes(NONCE_LEN);
    let info = wrap_info(alias, version);
    let wrapping_key = derive_wrapping_key(password.expose(), &salt, &info, alias)?;
    let cipher = Aes256Gcm::new_from_slice(wrapping_key.as_ref())
        .map_err(|err| KeyProviderError::storage(alias, err))?;
    #[allow(deprecated)]
    let nonce_array = GenericArray::from_slice(&nonce);
    let sealed = cipher
        .encrypt(
            nonce_array,
            Payload {
                msg: material,
                aad: info.as_bytes(),
            },
        )
        .map_err(|_| KeyProviderError::storage(alias, "failed to seal key material"))?;

    Ok(StoredKeyVersion {
        version,
        key_type,
        material: STANDARD.encode(sealed),
        public,
        sealed: Some(SealParams {
            salt: STANDARD.encode(salt),
            nonce: STANDARD.encode(nonce),
        }),
        revoked: false,
    })
}

fn open_version(
    alias: &str,
    path: &str,
    stored: &StoredKeyVersion,
    password: Option<&Password>,
) -> KeyResult<Zeroizing<Vec<u8>>> {
    let decode = |value: &str| {
        STANDARD
            .decode(value)
            .map_err(|err| KeyProviderError::storage(path, err))
    };
    let material = Zeroizing::new(decode(&stored.material)?);
    let Some(params) = stored.sealed.as_ref() else {
        return Ok(material);
    };

    let password = password.ok_or_else(|| KeyProviderError::BadPassword {
        path: path.to_string(),
    })?;
    let salt = decode(&params.salt)?;
    let nonce = decode(&params.nonce)?;
    if nonce.len() != NONCE_LEN {
        return Err(KeyProviderError::storage(path, "corrupt seal parameters"));
    }
    let info = wrap_info(alias, stored.version);
    let wrapping_key = derive_wrapping_key(password.expose(), &salt, &info, path)?;
    let cipher = Aes256Gcm::new_from_slice(wrapping_key.as_ref())
        .map_err(|err| KeyProviderError::storage(path, err))?;
    #[allow(deprecated)]
    let nonce_array = GenericArray::from_slice(&nonce);
    cipher
        .decrypt(
            nonce_array,
            Payload {
                msg: material.as_slice(),
                aad: info.as_bytes(),
            },
        )
        .map(Zeroizing::new)
        .map_err(|_| KeyProviderError::BadPassword {
            path: path.to_string(),
        })
}

fn wrap_info(alias: &str, version: u32) -> String {
    format!("{WRAP_INFO}/{alias}@{version}")
}

/// Argon2id stretches the password under the per-version salt, HKDF binds the
/// result to the alias and version.
fn derive_wrapping_key(
    password: &[u8],
    salt: &[u8],
    info: &str,
    path: &str,
) -> KeyResult<Zeroizing<[u8; 32]>> {
    let mut stretched = Zeroizing::new([0u8; 32]);
    Argon2::default()
        .hash_password_into(password, salt, &mut stretched[..])
        .map_err(|err| KeyProviderError::storage(path, err))?;
    let hk = Hkdf::<Sha256>::from_prk(&stretched[..])
        .map_err(|_| KeyProviderError::storage(path, "failed to derive wrapping key"))?;
    let mut okm = Zeroizing::new([0u8; 32]);
    hk.expand(info.as_bytes(), &mut okm[..])
        .map_err(|_| KeyProviderError::storage(path, "failed to derive wrapping key"))?;
    Ok(okm)
}

fn random_bytes(len: usize) -> Vec<u8> {
    let mut buf = vec![0u8; len];
    rand::rng().fill_bytes(&mut buf);
    buf
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn store(dir: &TempDir) -> FileKeyStore {
        FileKeyStore::create(dir.path().join("keystore.json"), "keys").unwrap()
    }

    #[test]
    fn resolution_requires_a_frame() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        store
            .add_key("db", "AES", NewKey::Secret(&[5u8; 32]), None)
            .unwrap();

        assert!(!store.has_frame());
        assert!(matches!(
            store.resolve_key(&"keys/db".into()),
            Err(KeyProviderError::FrameNotOpen { .. })
        ));

        let version = store
            .with_frame(|store| store.resolve_key(&"keys/db".into()))
            .unwrap()
            .unwrap();
        assert_eq!(version.version(), 1);
        assert!(!store.has_frame());
    }

    #[test]
    fn frames_are_shared_and_counted() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        store
            .add_key("db", "AES", NewKey::Secret(&[5u8; 32]), None)
            .unwrap();

        let outer = store.open_frame().unwrap();
        let inner = store.open_frame().unwrap();
        drop(inner);
        assert!(store.has_frame());
        assert!(store.resolve_key(&"keys/db".into()).is_ok());
        drop(outer);
        assert!(!store.has_frame());
    }

    #[test]
    fn password_sealed_versions() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        let password = Password::from("correct horse");
        store
            .add_key("db", "AES", NewKey::Secret(&[8u8; 32]), Some(&password))
            .unwrap();

        let raw = fs::read_to_string(store.path()).unwrap();
        assert!(!raw.contains(&STANDARD.encode([8u8; 32])));

        let _frame = store.open_frame().unwrap();
        let ok = store
            .resolve_key(&KeyReference::with_password("keys/db", "correct horse"))
            .unwrap();
        assert_eq!(&*ok.key(KeyType::Secret).unwrap(), &[8u8; 32][..]);

        let wrong = store
            .resolve_key(&KeyReference::with_password("keys/db", "wrong"))
            .unwrap_err();
        assert_eq!(
            wrong,
            KeyProviderError::BadPassword {
                path: "keys/db".into()
            }
        );
        assert!(!wrong.to_string().contains("correct horse"));

        assert!(matches!(
            store.resolve_key(&"keys/db".into()),
            Err(KeyProviderError::BadPassword { .. })
        ));
    }

    #[test]
    fn rotation_is_visible_inside_an_open_frame() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        store
            .add_key("db", "AES", NewKey::Secret(&[1u8; 32]), None)
            .unwrap();
        let _frame = store.open_frame().unwrap();
        assert_eq!(store.resolve_key(&"keys/db".into()).unwrap().version(), 1);

        store.rotate("db", &[2u8; 32], None).unwrap();
        assert_eq!(store.resolve_key(&"keys/db".into()).unwrap().version(), 2);

        store.revoke("db", 2).unwrap();
        assert_eq!(store.resolve_key(&"keys/db".into()).unwrap().version(), 1);
        assert!(matches!(
            store.resolve_key(&"keys/db@2".into()),
            Err(KeyProviderError::Revoked { .. })
        ));
    }

    #[test]
    fn writes_from_another_handle_are_reloaded() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        store
            .add_key("db", "AES", NewKey::Secret(&[1u8; 32]), None)
            .unwrap();
        let _frame = store.open_frame().unwrap();
        assert_eq!(store.resolve_key(&"keys/db".into()).unwrap().version(), 1);

        let other = FileKeyStore::open(store.path(), "keys");
        assert_eq!(other.rotate("db", &[2u8; 32], None).unwrap(), 2);

        let latest = store.resolve_key(&"keys/db".into()).unwrap();
        assert_eq!(latest.version(), 2);
        assert_eq!(&*latest.key(KeyType::Secret).unwrap(), &[2u8; 32][..]);
    }

    #[test]
    fn validity_follows_revocation_and_frames() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        store
            .add_key("db", "AES", NewKey::Secret(&[1u8; 32]), None)
            .unwrap();
        let frame = store.open_frame().unwrap();
        let version = store.resolve_key(&"keys/db".into()).unwrap();
        assert!(store.is_valid(&version));

        FileKeyStore::open(store.path(), "keys").revoke("db", 1).unwrap();
        assert!(!store.is_valid(&version));

        store.rotate("db", &[2u8; 32], None).unwrap();
        let fresh = store.resolve_key(&"keys/db".into()).unwrap();
        assert!(store.is_valid(&fresh));
        drop(frame);
        assert!(!store.is_valid(&fresh));
    }

    #[test]
    fn wrapping_key_is_stretched_before_expansion() {
        let salt = [7u8; SALT_LEN];
        let info = wrap_info("db", 1);
        let derived = derive_wrapping_key(b"hunter2", &salt, &info, "keys/db").unwrap();
        assert_eq!(
            *derived,
            *derive_wrapping_key(b"hunter2", &salt, &info, "keys/db").unwrap()
        );

        let mut unstretched = [0u8; 32];
        Hkdf::<Sha256>::new(Some(&salt), b"hunter2")
            .expand(info.as_bytes(), &mut unstretched)
            .unwrap();
        assert_ne!(*derived, unstretched);

        let other_salt = derive_wrapping_key(b"hunter2", &[8u8; SALT_LEN], &info, "keys/db").unwrap();
        assert_ne!(*derived, *other_salt);
    }

    #[test]
    fn key_pairs_and_listing() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        store
            .add_key(
                "signer",
                "EC",
                NewKey::Pair {
                    private: &[3u8; 32],
                    public: &[4u8; 65],
                },
                None,
            )
            .unwrap();

        let rows = store.list().unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].alias, "signer");
        assert_eq!(rows[0].key_type, KeyType::Private);
        assert!(!rows[0].protected);

        let _frame = store.open_frame().unwrap();
        let public = store.resolve_key(&"keys/signer/public".into()).unwrap();
        assert_eq!(public.key_type(), KeyType::Public);
        assert_eq!(public.key(KeyType::Public).unwrap().len(), 65);
    }

    #[test]
    fn create_refuses_to_overwrite() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("keystore.json");
        FileKeyStore::create(&path, "keys").unwrap();
        assert!(matches!(
            FileKeyStore::create(&path, "keys"),
            Err(KeyProviderError::Storage { .. })
        ));
    }

    #[test]
    fn owned_frame_outlives_the_borrow() {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(store(&dir));
        store
            .add_key("db", "AES", NewKey::Secret(&[6u8; 32]), None)
            .unwrap();
        let frame = store.open_owned_frame().unwrap();
        let shared = Arc::clone(&store);
        let handle = std::thread::spawn(move || {
            let _frame = frame;
            shared.resolve_key(&"keys/db".into()).map(|version| version.version())
        });
        assert_eq!(handle.join().unwrap(), Ok(1));
        assert!(!store.has_frame());
    }

    #[test]
    fn missing_keystore_fails_to_open_frame() {
        let dir = TempDir::new().unwrap();
        let store = FileKeyStore::open(dir.path().join("absent.json"), "keys");
        assert!(matches!(
            store.open_frame(),
            Err(KeyProviderError::Storage { .. })
        ));
        assert!(!store.has_frame());
    }
}
