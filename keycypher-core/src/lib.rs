//! Key resolution, key caching and pluggable cypher templates behind a
//! staged service lifecycle.

pub mod cache;
pub mod crypto;
pub mod embedded;
pub mod key_provider;
pub mod key_version;
pub mod lifecycle;
pub mod provider;
pub mod service;

pub use cache::{Cache, MemoryCache};
pub use crypto::{
    Cypher, CypherNamespace, CypherPlugin, CypherProvider, CypherTemplate, StringCypher,
    TemplateRegistration,
};
pub use embedded::{CoreBuilder, CoreConfig, KeyCore};
pub use key_provider::{CachedKeyProvider, FramedKeyProvider, KeyFrame, KeyProvider};
pub use key_version::KeyVersion;
pub use keycypher_spec::{
    CypherDescriptor, CypherEncryption, CypherError, CypherSpecification, Error, KeyDescriptor,
    KeyPathComponents, KeyProviderError, KeyReference, KeyType, LifecycleError, Password, Result,
    ServiceState,
};
pub use lifecycle::{Lifecycle, Service, Stage};
#[cfg(feature = "file")]
pub use provider::FileKeyStore;
pub use provider::{CachingKeyProvider, CompositeKeyProvider, MemoryKeyProvider};
pub use service::{CypherService, KeyService};

pub mod prelude {
    pub use crate::key_provider::{CachedKeyProvider, FramedKeyProvider, KeyProvider};
    pub use crate::lifecycle::Service;
    pub use crate::{CoreBuilder, Cypher, KeyCore, StringCypher};
    pub use keycypher_spec::prelude::*;
}
