use crate::key_provider::{is_under_root, KeyProvider};
use crate::key_version::KeyVersion;
use keycypher_spec::key_path::{add_suffix, PUBLIC_SEGMENT};
use keycypher_spec::{KeyPathComponents, KeyProviderError, KeyReference, KeyResult, KeyType};
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::Arc;
use zeroize::Zeroizing;

struct StoredVersion {
    key_type: KeyType,
    material: Zeroizing<Vec<u8>>,
    public: Option<Zeroizing<Vec<u8>>>,
    revoked: bool,
}

struct StoredKey {
    algorithm: String,
    versions: Vec<StoredVersion>,
}

impl StoredKey {
    /// Newest version that has not been revoked, numbered from 1.
    fn latest_active(&self) -> Option<(u32, &StoredVersion)> {
        self.versions
            .iter()
            .enumerate()
            .rev()
            .find(|(_, stored)| !stored.revoked)
            .map(|(idx, stored)| (idx as u32 + 1, stored))
    }
}

/// In-process key store for a single root.
///
/// Every resolution hands out a fresh [`KeyVersion`], so destroying one never
/// affects the stored material.
pub struct MemoryKeyProvider {
    root: String,
    keys: RwLock<BTreeMap<String, StoredKey>>,
}

impl MemoryKeyProvider {
    pub fn new(root: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            keys: RwLock::new(BTreeMap::new()),
        }
    }

    pub fn root(&self) -> &str {
        &self.root
    }

    /// Store a symmetric key under `alias`, appending a version if it exists.
    pub fn add_key(&self, alias: &str, algorithm: &str, material: impl Into<Vec<u8>>) -> u32 {
        self.push(
            alias,
            algorithm,
            StoredVersion {
                key_type: KeyType::Secret,
                material: Zeroizing::new(material.into()),
                public: None,
                revoked: false,
            },
        )
    }

    /// Store a key pair. The private half resolves at `alias`, the public
    /// half at `alias/public`.
    pub fn add_key_pair(
        &self,
        alias: &str,
        algorithm: &str,
        private: impl Into<Vec<u8>>,
        public: impl Into<Vec<u8>>,
    ) -> u32 {
        self.push(
            alias,
            algorithm,
            StoredVersion {
                key_type: KeyType::Private,
                material: Zeroizing::new(private.into()),
                public: Some(Zeroizing::new(public.into())),
                revoked: false,
            },
        )
    }

    /// Append a new symmetric version to an existing alias.
    pub fn rotate(&self, alias: &str, material: impl Into<Vec<u8>>) -> KeyResult<u32> {
        let mut keys = self.keys.write();
        let stored = keys.get_mut(alias).ok_or_else(|| self.not_found(alias))?;
        stored.versions.push(StoredVersion {
            key_type: KeyType::Secret,
            material: Zeroizing::new(material.into()),
            public: None,
            revoked: false,
        });
        let version = stored.versions.len() as u32;
        tracing::info!(root = %self.root, alias, version, "rotated key");
        Ok(version)
    }

    /// Mark one version as revoked. Resolving it afterwards fails with
    /// [`KeyProviderError::Revoked`].
    pub fn revoke(&self, alias: &str, version: u32) -> KeyResult<()> {
        let mut keys = self.keys.write();
        let stored = keys.get_mut(alias).ok_or_else(|| self.not_found(alias))?;
        let slot = version
            .checked_sub(1)
            .and_then(|idx| stored.versions.get_mut(idx as usize))
            .ok_or_else(|| self.not_found(&format!("{alias}@{version}")))?;
        slot.revoked = true;
        tracing::info!(root = %self.root, alias, version, "revoked key");
        Ok(())
    }

    pub fn latest_version(&self, alias: &str) -> Option<u32> {
        self.keys
            .read()
            .get(alias)
            .and_then(|stored| stored.latest_active().map(|(version, _)| version))
    }

    pub fn aliases(&self) -> Vec<String> {
        self.keys.read().keys().cloned().collect()
    }

    fn push(&self, alias: &str, algorithm: &str, version: StoredVersion) -> u32 {
        let mut keys = self.keys.write();
        let stored = keys.entry(alias.to_string()).or_insert_with(|| StoredKey {
            algorithm: algorithm.to_string(),
            versions: Vec::new(),
        });
        stored.versions.push(version);
        stored.versions.len() as u32
    }

    fn not_found(&self, alias: &str) -> KeyProviderError {
        KeyProviderError::NotFound {
            path: format!("{}/{alias}", self.root),
        }
    }
}

impl KeyProvider for MemoryKeyProvider {
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
        let keys = self.keys.read();
        let stored = keys
            .get(components.alias())
            .ok_or_else(|| KeyProviderError::NotFound {
                path: components.path().to_string(),
            })?;

        let (version, entry) = if components.is_latest() {
            stored
                .latest_active()
                .ok_or_else(|| KeyProviderError::Revoked {
                    path: components.path().to_string(),
                })?
        } else {
            let entry = stored
                .versions
                .get(components.version() as usize - 1)
                .ok_or_else(|| KeyProviderError::NotFound {
                    path: components.version_path().to_string(),
                })?;
            if entry.revoked {
                return Err(KeyProviderError::Revoked {
                    path: components.version_path().to_string(),
                });
            }
            (components.version(), entry)
        };

        if components.is_public() {
            let public = entry
                .public
                .as_ref()
                .ok_or_else(|| KeyProviderError::NotFound {
                    path: components.version_path().to_string(),
                })?;
            let path = add_suffix(Some(components.path()), Some(PUBLIC_SEGMENT)).unwrap_or_default();
            return Ok(Arc::new(KeyVersion::new(
                path,
                version,
                KeyType::Public,
                stored.algorithm.as_str(),
                public.to_vec(),
            )));
        }

        Ok(Arc::new(KeyVersion::new(
            components.path(),
            version,
            entry.key_type,
            stored.algorithm.as_str(),
            entry.material.to_vec(),
        )))
    }

    fn is_valid(&self, version: &KeyVersion) -> bool {
        let Ok(components) = KeyPathComponents::parse(&self.root, version.path()) else {
            return false;
        };
        let keys = self.keys.read();
        keys.get(components.alias())
            .and_then(|stored| stored.versions.get((version.version() as usize).wrapping_sub(1)))
            .is_some_and(|entry| !entry.revoked)
    }
}
