use crate::key_provider::KeyProvider;
use crate::key_version::KeyVersion;
use keycypher_spec::{KeyProviderError, KeyReference, KeyResult};
use std::sync::Arc;

/// Routes each reference to the first child provider that supports it.
#[derive(Default)]
pub struct CompositeKeyProvider {
    providers: Vec<Arc<dyn KeyProvider>>,
}

impl CompositeKeyProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, provider: Arc<dyn KeyProvider>) -> Self {
        self.push(provider);
        self
    }

    pub fn push(&mut self, provider: Arc<dyn KeyProvider>) {
        self.providers.push(provider);
    }

    pub fn len(&self) -> usize {
        self.providers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }

    fn route(&self, key_ref: &KeyReference) -> Option<&Arc<dyn KeyProvider>> {
        self.providers
            .iter()
            .find(|provider| provider.is_supported(key_ref))
    }
}

impl KeyProvider for CompositeKeyProvider {
    fn is_supported(&self, key_ref: &KeyReference) -> bool {
        self.route(key_ref).is_some()
    }

    fn resolve_key(&self, key_ref: &KeyReference) -> KeyResult<Arc<KeyVersion>> {
        match self.route(key_ref) {
            Some(provider) => provider.resolve_key(key_ref),
            None => Err(KeyProviderError::Unsupported {
                path: key_ref.path().to_string(),
            }),
        }
    }

    fn is_valid(&self, version: &KeyVersion) -> bool {
        self.route(&KeyReference::new(version.path()))
            .is_some_and(|provider| provider.is_valid(version))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::MemoryKeyProvider;

    #[test]
    fn routes_by_root() {
        let keys = MemoryKeyProvider::new("keys");
        keys.add_key("db", "AES", vec![1u8; 32]);
        let vault = MemoryKeyProvider::new("vault");
        vault.add_key("db", "AES", vec![2u8; 16]);

        let composite = CompositeKeyProvider::new()
            .with(Arc::new(keys))
            .with(Arc::new(vault));
        assert_eq!(composite.len(), 2);

        let from_keys = composite.resolve_key(&"keys/db".into()).unwrap();
        assert_eq!(from_keys.algorithm(), "AES");
        assert_eq!(from_keys.path(), "keys/db");
        let from_vault = composite.resolve_key(&"vault/db".into()).unwrap();
        assert_eq!(from_vault.path(), "vault/db");

        assert!(!composite.is_supported(&"hsm/db".into()));
        assert_eq!(
            composite.resolve_key(&"hsm/db".into()).unwrap_err(),
            KeyProviderError::Unsupported {
                path: "hsm/db".into()
            }
        );
    }
}
