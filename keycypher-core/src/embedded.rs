use crate::cache::MemoryCache;
use crate::crypto::{namespace, Cypher, CypherNamespace, CypherProvider, CypherTemplate, StringCypher};
use crate::key_provider::{CachedKeyProvider, KeyFrame, KeyProvider};
use crate::lifecycle::Service;
use crate::provider::{CompositeKeyProvider, MemoryKeyProvider};
#[cfg(feature = "file")]
use crate::provider::FileKeyStore;
use crate::service::{CypherService, KeyService};
use keycypher_spec::{CypherResult, CypherSpecification, Error, KeyReference, Result};
use parking_lot::Mutex;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

pub const KEY_ROOT_ENV: &str = "KEYCYPHER_KEY_ROOT";
pub const KEYSTORE_PATH_ENV: &str = "KEYCYPHER_KEYSTORE_PATH";
pub const CACHE_CAPACITY_ENV: &str = "KEYCYPHER_CACHE_CAPACITY";
pub const CACHE_TTL_ENV: &str = "KEYCYPHER_CACHE_TTL_SECS";
pub const NAMESPACES_ENV: &str = "KEYCYPHER_CYPHER_NAMESPACES";

pub const DEFAULT_KEY_ROOT: &str = "keys";
pub const DEFAULT_CACHE_CAPACITY: usize = 256;
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(300);
pub const DEFAULT_NAMESPACE: &str = "aead";

/// Runtime configuration captured when building a [`KeyCore`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoreConfig {
    /// Namespace root for key paths.
    pub key_root: String,
    /// JSON keystore backing the key service, if any.
    pub keystore_path: Option<PathBuf>,
    /// Maximum cached key versions. `0` disables the key cache.
    pub cache_capacity: usize,
    /// Lifetime of a cached key version. `None` keeps entries until evicted.
    pub cache_ttl: Option<Duration>,
    /// Cypher plugin namespaces scanned at startup.
    pub namespaces: Vec<String>,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            key_root: DEFAULT_KEY_ROOT.to_string(),
            keystore_path: None,
            cache_capacity: DEFAULT_CACHE_CAPACITY,
            cache_ttl: Some(DEFAULT_CACHE_TTL),
            namespaces: vec![DEFAULT_NAMESPACE.to_string()],
        }
    }
}

impl CoreConfig {
    /// Defaults overridden by the `KEYCYPHER_*` environment variables.
    pub fn from_env() -> Result<Self> {
        Ok(CoreBuilder::from_env()?.config())
    }
}

/// Builder for [`KeyCore`].
#[derive(Default)]
pub struct CoreBuilder {
    key_root: Option<String>,
    keystore_path: Option<PathBuf>,
    cache_capacity: Option<usize>,
    cache_ttl: Option<Option<Duration>>,
    namespaces: Option<Vec<String>>,
    providers: Vec<Arc<dyn KeyProvider>>,
    cyphers: Vec<(String, Arc<dyn CypherTemplate>)>,
}

impl CoreBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Initialise the builder using environment configuration.
    ///
    /// * `KEYCYPHER_KEY_ROOT` sets the key path root (default: `"keys"`).
    /// * `KEYCYPHER_KEYSTORE_PATH` points at a JSON keystore file.
    /// * `KEYCYPHER_CACHE_CAPACITY` bounds the key cache (default: 256, `0` disables it).
    /// * `KEYCYPHER_CACHE_TTL_SECS` sets the key cache TTL (default: 300s, `0` disables expiry).
    /// * `KEYCYPHER_CYPHER_NAMESPACES` is a comma list of plugin namespaces (default: `aead`).
    ///
    /// Unparsable numbers are reported rather than replaced by defaults.
    pub fn from_env() -> Result<Self> {
        let mut builder = CoreBuilder::default();

        if let Some(root) = non_empty_env(KEY_ROOT_ENV) {
            builder.key_root = Some(root);
        }

        if let Some(path) = non_empty_env(KEYSTORE_PATH_ENV) {
            builder.keystore_path = Some(PathBuf::from(path));
        }

        if let Some(capacity) = non_empty_env(CACHE_CAPACITY_ENV) {
            builder.cache_capacity = Some(parse_env_number(CACHE_CAPACITY_ENV, &capacity)? as usize);
        }

        if let Some(ttl) = non_empty_env(CACHE_TTL_ENV) {
            let seconds = parse_env_number(CACHE_TTL_ENV, &ttl)?;
            builder.cache_ttl = Some((seconds > 0).then(|| Duration::from_secs(seconds)));
        }

        if let Some(list) = non_empty_env(NAMESPACES_ENV) {
            builder.namespaces = Some(
                list.split(',')
                    .map(str::trim)
                    .filter(|name| !name.is_empty())
                    .map(str::to_string)
                    .collect(),
            );
        }

        Ok(builder)
    }

    pub fn key_root(mut self, root: impl Into<String>) -> Self {
        self.key_root = Some(root.into());
        self
    }

    pub fn keystore_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.keystore_path = Some(path.into());
        self
    }

    pub fn cache_capacity(mut self, capacity: usize) -> Self {
        self.cache_capacity = Some(capacity);
        self
    }

    pub fn cache_ttl(mut self, ttl: Option<Duration>) -> Self {
        self.cache_ttl = Some(ttl.filter(|ttl| !ttl.is_zero()));
        self
    }

    pub fn namespaces<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.namespaces = Some(names.into_iter().map(Into::into).collect());
        self
    }

    /// Add a key provider. Providers are consulted in registration order,
    /// after the keystore when one is configured.
    pub fn provider(mut self, provider: Arc<dyn KeyProvider>) -> Self {
        self.providers.push(provider);
        self
    }

    /// Register a template after discovery, replacing any discovered one.
    pub fn cypher(mut self, name: impl Into<String>, template: Arc<dyn CypherTemplate>) -> Self {
        self.cyphers.push((name.into(), template));
        self
    }

    /// Effective configuration with defaults applied.
    pub fn config(&self) -> CoreConfig {
        let defaults = CoreConfig::default();
        CoreConfig {
            key_root: self.key_root.clone().unwrap_or(defaults.key_root),
            keystore_path: self.keystore_path.clone(),
            cache_capacity: self.cache_capacity.unwrap_or(defaults.cache_capacity),
            cache_ttl: self.cache_ttl.unwrap_or(defaults.cache_ttl),
            namespaces: self.namespaces.clone().unwrap_or(defaults.namespaces),
        }
    }

    /// Build and initialize the key and cypher services.
    pub fn build(self) -> Result<KeyCore> {
        let config = self.config();
        let namespaces = resolve_namespaces(&config.namespaces)?;

        let mut chain: Vec<Arc<dyn KeyProvider>> = Vec::new();
        #[allow(unused_mut)]
        let mut frame = None;
        #[cfg(feature = "file")]
        let keystore = match config.keystore_path.as_ref() {
            Some(path) => {
                let store = Arc::new(FileKeyStore::open(path.clone(), config.key_root.clone()));
                frame = Some(store.open_owned_frame()?);
                chain.push(store.clone());
                Some(store)
            }
            None => None,
        };
        #[cfg(not(feature = "file"))]
        reject_keystore(&config)?;
        chain.extend(self.providers);

        let memory = if chain.is_empty() {
            let memory = Arc::new(MemoryKeyProvider::new(config.key_root.clone()));
            chain.push(memory.clone());
            Some(memory)
        } else {
            None
        };

        let provider: Arc<dyn KeyProvider> = if chain.len() == 1 {
            chain.remove(0)
        } else {
            let mut composite = CompositeKeyProvider::new();
            for provider in chain {
                composite.push(provider);
            }
            Arc::new(composite)
        };

        let key_service = Arc::new(KeyService::new());
        {
            let stage = key_service.begin_initialize()?;
            if config.cache_capacity > 0 {
                key_service.configure_cached(
                    provider,
                    MemoryCache::new(config.cache_capacity, config.cache_ttl),
                )?;
            } else {
                key_service.configure(provider)?;
            }
            stage.complete()?;
        }

        let mut cyphers = CypherProvider::discover(key_service.clone(), &namespaces);
        for (name, template) in self.cyphers {
            cyphers.add_cypher(name, template);
        }

        let cypher_service = Arc::new(CypherService::new());
        {
            let stage = cypher_service.begin_initialize()?;
            cypher_service.configure(cyphers)?;
            stage.complete()?;
        }

        tracing::info!(
            root = %config.key_root,
            keystore = config.keystore_path.is_some(),
            cache_capacity = config.cache_capacity,
            "key core ready"
        );

        Ok(KeyCore {
            config,
            key_service,
            cypher_service,
            memory,
            #[cfg(feature = "file")]
            keystore,
            frame: Mutex::new(frame),
        })
    }
}

/// Composition root owning the key and cypher services.
pub struct KeyCore {
    config: CoreConfig,
    key_service: Arc<KeyService>,
    cypher_service: Arc<CypherService>,
    memory: Option<Arc<MemoryKeyProvider>>,
    #[cfg(feature = "file")]
    keystore: Option<Arc<FileKeyStore>>,
    frame: Mutex<Option<KeyFrame<'static>>>,
}

impl KeyCore {
    /// Start from environment configuration.
    pub fn builder() -> Result<CoreBuilder> {
        CoreBuilder::from_env()
    }

    pub fn config(&self) -> &CoreConfig {
        &self.config
    }

    pub fn key_service(&self) -> &Arc<KeyService> {
        &self.key_service
    }

    pub fn cypher_service(&self) -> &Arc<CypherService> {
        &self.cypher_service
    }

    /// In-memory store created when no other provider was configured.
    pub fn memory_store(&self) -> Option<&Arc<MemoryKeyProvider>> {
        self.memory.as_ref()
    }

    #[cfg(feature = "file")]
    pub fn keystore(&self) -> Option<&Arc<FileKeyStore>> {
        self.keystore.as_ref()
    }

    pub fn cypher(&self, spec: &CypherSpecification, key_ref: KeyReference) -> CypherResult<Cypher> {
        self.cypher_service.cypher(spec, key_ref)
    }

    pub fn string_cypher(
        &self,
        spec: &CypherSpecification,
        key_ref: KeyReference,
    ) -> CypherResult<StringCypher> {
        self.cypher_service.string_cypher(spec, key_ref)
    }

    /// Drop cached versions of `path`.
    pub fn evict(&self, path: &str) {
        self.key_service.evict(path);
    }

    /// Close both services and release the keystore frame.
    pub fn close(&self) -> Result<()> {
        self.cypher_service.close()?;
        self.key_service.close()?;
        if let Some(frame) = self.frame.lock().take() {
            frame.close();
        }
        Ok(())
    }
}

impl Drop for KeyCore {
    fn drop(&mut self) {
        if let Some(frame) = self.frame.get_mut().take() {
            frame.close();
        }
    }
}

#[cfg(not(feature = "file"))]
fn reject_keystore(config: &CoreConfig) -> Result<()> {
    match config.keystore_path {
        Some(_) => Err(Error::Config(
            "keystore support requires the `file` feature".into(),
        )),
        None => Ok(()),
    }
}

fn resolve_namespaces(names: &[String]) -> Result<Vec<&'static CypherNamespace>> {
    names
        .iter()
        .map(|name| {
            namespace(name).ok_or_else(|| Error::Config(format!("unknown cypher namespace `{name}`")))
        })
        .collect()
}

fn non_empty_env(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn parse_env_number(name: &str, raw: &str) -> Result<u64> {
    raw.parse::<u64>()
        .map_err(|_| Error::Config(format!("{name} must be a non-negative integer, got `{raw}`")))
}
