use keycypher_spec::key_path::VERSION_SEPARATOR;
use keycypher_spec::{KeyProviderError, KeyResult, KeyType};
use parking_lot::{MappedRwLockReadGuard, RwLock, RwLockReadGuard};
use std::fmt;
use zeroize::Zeroizing;

/// Resolved key material for one concrete version of a key path.
///
/// The material lives behind a lock so [`KeyVersion::destroy`] can scrub it
/// while the value is shared. Destruction is final; later reads fail with
/// [`KeyProviderError::Destroyed`].
pub struct KeyVersion {
    path: String,
    version_path: String,
    version: u32,
    key_type: KeyType,
    algorithm: String,
    material: RwLock<Option<Zeroizing<Vec<u8>>>>,
}

impl KeyVersion {
    pub fn new(
        path: impl Into<String>,
        version: u32,
        key_type: KeyType,
        algorithm: impl Into<String>,
        material: impl Into<Vec<u8>>,
    ) -> Self {
        let path = path.into();
        let version_path = format!("{path}{VERSION_SEPARATOR}{version}");
        Self {
            path,
            version_path,
            version,
            key_type,
            algorithm: algorithm.into(),
            material: RwLock::new(Some(Zeroizing::new(material.into()))),
        }
    }

    /// Key path without the version suffix.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Key path pinned to this version, e.g. `keys/db@2`.
    pub fn version_path(&self) -> &str {
        &self.version_path
    }

    pub fn version(&self) -> u32 {
        self.version
    }

    pub fn key_type(&self) -> KeyType {
        self.key_type
    }

    pub fn algorithm(&self) -> &str {
        &self.algorithm
    }

    /// Borrow the key material as `expected`.
    ///
    /// The guard holds a read lock; keep it short-lived since
    /// [`KeyVersion::destroy`] waits for every reader.
    pub fn key(&self, expected: KeyType) -> KeyResult<MappedRwLockReadGuard<'_, [u8]>> {
        if self.key_type != expected {
            return Err(KeyProviderError::TypeMismatch {
                path: self.version_path.clone(),
                expected,
                actual: self.key_type,
            });
        }
        RwLockReadGuard::try_map(self.material.read(), |material| {
            material.as_ref().map(|bytes| bytes.as_slice())
        })
        .map_err(|_| KeyProviderError::Destroyed {
            path: self.version_path.clone(),
        })
    }

    /// Run `f` over the material without handing out the guard.
    pub fn with_key<R>(&self, expected: KeyType, f: impl FnOnce(&[u8]) -> R) -> KeyResult<R> {
        let key = self.key(expected)?;
        Ok(f(&key))
    }

    /// Scrub the material. Idempotent.
    pub fn destroy(&self) {
        let mut material = self.material.write();
        if material.take().is_some() {
            tracing::debug!(key = %self.version_path, "key material destroyed");
        }
    }

    pub fn is_destroyed(&self) -> bool {
        self.material.read().is_none()
    }
}

impl fmt::Debug for KeyVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyVersion")
            .field("version_path", &self.version_path)
            .field("key_type", &self.key_type)
            .field("algorithm", &self.algorithm)
            .field("destroyed", &self.is_destroyed())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn typed_access() {
        let version = KeyVersion::new("keys/db", 2, KeyType::Secret, "AES", vec![7u8; 32]);
        assert_eq!(version.version_path(), "keys/db@2");
        assert_eq!(version.key(KeyType::Secret).unwrap().len(), 32);

        let err = version.key(KeyType::Private).unwrap_err();
        assert_eq!(
            err,
            KeyProviderError::TypeMismatch {
                path: "keys/db@2".into(),
                expected: KeyType::Private,
                actual: KeyType::Secret,
            }
        );
    }

    #[test]
    fn destroy_is_final() {
        let version = KeyVersion::new("keys/db", 1, KeyType::Secret, "AES", vec![1u8; 16]);
        version.destroy();
        version.destroy();
        assert!(version.is_destroyed());
        assert!(matches!(
            version.key(KeyType::Secret),
            Err(KeyProviderError::Destroyed { .. })
        ));
    }

    #[test]
    fn debug_hides_material() {
        let version = KeyVersion::new("keys/db", 1, KeyType::Secret, "AES", b"topsecret".to_vec());
        let rendered = format!("{version:?}");
        assert!(rendered.contains("keys/db@1"));
        assert!(!rendered.contains("topsecret"));
    }
}
