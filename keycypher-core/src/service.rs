use crate::cache::MemoryCache;
use crate::crypto::{Cypher, CypherProvider, StringCypher};
use crate::key_provider::{CachedKeyProvider, KeyProvider};
use crate::key_version::KeyVersion;
use crate::lifecycle::{Lifecycle, Service};
use crate::provider::CachingKeyProvider;
use keycypher_spec::{
    CypherError, CypherResult, CypherSpecification, KeyProviderError, KeyReference, KeyResult,
    LifecycleResult,
};
use parking_lot::RwLock;
use std::sync::Arc;

type SharedCache = Arc<CachingKeyProvider<Arc<dyn KeyProvider>>>;

#[derive(Clone)]
struct KeyBinding {
    resolver: Arc<dyn KeyProvider>,
    cache: Option<SharedCache>,
}

/// Key resolution behind the service lifecycle.
///
/// Resolving a revoked key compromises the service.
pub struct KeyService {
    lifecycle: Lifecycle,
    binding: RwLock<Option<KeyBinding>>,
}

impl KeyService {
    pub fn new() -> Self {
        Self {
            lifecycle: Lifecycle::new("key service"),
            binding: RwLock::new(None),
        }
    }

    /// Bind the backing provider. Only valid while initializing.
    pub fn configure(&self, provider: Arc<dyn KeyProvider>) -> LifecycleResult<()> {
        self.assert_initializing()?;
        *self.binding.write() = Some(KeyBinding {
            resolver: provider,
            cache: None,
        });
        Ok(())
    }

    /// Bind the backing provider behind a read-through key cache.
    pub fn configure_cached(
        &self,
        provider: Arc<dyn KeyProvider>,
        cache: MemoryCache<Arc<KeyVersion>>,
    ) -> LifecycleResult<()> {
        self.assert_initializing()?;
        let cached: SharedCache = Arc::new(CachingKeyProvider::with_cache(provider, cache));
        *self.binding.write() = Some(KeyBinding {
            resolver: cached.clone(),
            cache: Some(cached),
        });
        Ok(())
    }

    fn binding(&self) -> Option<KeyBinding> {
        self.binding.read().clone()
    }

    fn not_configured(&self, key_ref: &KeyReference) -> KeyProviderError {
        KeyProviderError::Unsupported {
            path: key_ref.path().to_string(),
        }
    }
}

impl Default for KeyService {
    fn default() -> Self {
        Self::new()
    }
}

impl Service for KeyService {
    fn lifecycle(&self) -> &Lifecycle {
        &self.lifecycle
    }

    fn is_configured(&self) -> bool {
        self.binding.read().is_some()
    }

    fn release(&self) {
        if let Some(binding) = self.binding.write().take() {
            if let Some(cache) = binding.cache {
                cache.release();
            }
        }
    }
}

impl KeyProvider for KeyService {
    fn is_supported(&self, key_ref: &KeyReference) -> bool {
        self.assert_ready().is_ok()
            && self
                .binding()
                .is_some_and(|binding| binding.resolver.is_supported(key_ref))
    }

    fn resolve_key(&self, key_ref: &KeyReference) -> KeyResult<Arc<KeyVersion>> {
        self.assert_ready()?;
        let binding = self
            .binding()
            .ok_or_else(|| self.not_configured(key_ref))?;
        match binding.resolver.resolve_key(key_ref) {
            Err(KeyProviderError::Revoked { path }) => Err(self
                .compromise(&format!("revoked key `{path}` was requested"))
                .into()),
            other => other,
        }
    }

    fn is_valid(&self, version: &KeyVersion) -> bool {
        self.assert_ready().is_ok()
            && self
                .binding()
                .is_some_and(|binding| binding.resolver.is_valid(version))
    }
}

impl CachedKeyProvider for KeyService {
    fn evict(&self, path: &str) {
        if let Some(cache) = self.binding().and_then(|binding| binding.cache) {
            cache.evict(path);
        }
    }

    fn clear(&self) {
        if let Some(cache) = self.binding().and_then(|binding| binding.cache) {
            cache.clear();
        }
    }
}

/// Cypher registry behind the service lifecycle.
pub struct CypherService {
    lifecycle: Lifecycle,
    provider: RwLock<Option<Arc<CypherProvider>>>,
}

impl CypherService {
    pub fn new() -> Self {
        Self {
            lifecycle: Lifecycle::new("cypher service"),
            provider: RwLock::new(None),
        }
    }

    /// Install the registry. Only valid while initializing.
    pub fn configure(&self, provider: CypherProvider) -> LifecycleResult<()> {
        self.assert_initializing()?;
        *self.provider.write() = Some(Arc::new(provider));
        Ok(())
    }

    pub fn cypher_provider(&self) -> CypherResult<Arc<CypherProvider>> {
        self.assert_ready()?;
        self.provider
            .read()
            .clone()
            .ok_or_else(|| CypherError::unsupported(None))
    }

    pub fn cypher(&self, spec: &CypherSpecification, key_ref: KeyReference) -> CypherResult<Cypher> {
        self.cypher_provider()?.cypher(spec, key_ref)
    }

    pub fn string_cypher(
        &self,
        spec: &CypherSpecification,
        key_ref: KeyReference,
    ) -> CypherResult<StringCypher> {
        self.cypher_provider()?.string_cypher(spec, key_ref)
    }

    pub fn algorithms(&self) -> CypherResult<Vec<String>> {
        Ok(self
            .cypher_provider()?
            .algorithms()
            .into_iter()
            .map(str::to_string)
            .collect())
    }
}

impl Default for CypherService {
    fn default() -> Self {
        Self::new()
    }
}

impl Service for CypherService {
    fn lifecycle(&self) -> &Lifecycle {
        &self.lifecycle
    }

    fn is_configured(&self) -> bool {
        self.provider.read().is_some()
    }

    fn release(&self) {
        self.provider.write().take();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::MemoryKeyProvider;
    use keycypher_spec::{KeyType, LifecycleError, ServiceState};

    fn ready_key_service(memory: Arc<MemoryKeyProvider>) -> KeyService {
        let service = KeyService::new();
        let stage = service.begin_initialize().unwrap();
        service
            .configure_cached(memory, MemoryCache::unbounded())
            .unwrap();
        stage.complete().unwrap();
        service
    }

    #[test]
    fn resolve_requires_ready() {
        let service = KeyService::new();
        assert!(matches!(
            service.resolve_key(&"keys/db".into()),
            Err(KeyProviderError::Lifecycle(LifecycleError::StateMismatch {
                current: ServiceState::Created,
                ..
            }))
        ));
        assert!(!service.is_supported(&"keys/db".into()));
    }

    #[test]
    fn close_scrubs_cached_material() {
        let memory = Arc::new(MemoryKeyProvider::new("keys"));
        memory.add_key("db", "AES", vec![1u8; 32]);
        let service = ready_key_service(memory);

        let held = service.resolve_key(&"keys/db".into()).unwrap();
        assert!(held.key(KeyType::Secret).is_ok());
        service.close().unwrap();
        assert!(held.is_destroyed());
        assert!(!service.is_configured());
        assert!(service.resolve_key(&"keys/db".into()).is_err());
    }

    #[test]
    fn revoked_key_compromises_the_service() {
        let memory = Arc::new(MemoryKeyProvider::new("keys"));
        memory.add_key("db", "AES", vec![1u8; 32]);
        memory.revoke("db", 1).unwrap();
        let service = ready_key_service(memory);

        let err = service.resolve_key(&"keys/db@1".into()).unwrap_err();
        assert!(err.is_compromised());
        assert_eq!(service.state(), ServiceState::Compromised);

        let again = service.resolve_key(&"keys/other".into()).unwrap_err();
        assert!(again.is_compromised());
    }

    #[test]
    fn cypher_service_requires_configuration() {
        let service = CypherService::new();
        {
            let _stage = service.begin_initialize().unwrap();
        }
        assert_eq!(service.state(), ServiceState::Error);
        assert!(service
            .cypher(&CypherSpecification::new("A256GCM"), "keys/db".into())
            .is_err());
    }
}
