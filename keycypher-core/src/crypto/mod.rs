//! Cypher templates, plugin discovery and the encrypt/decrypt façade.

pub mod aead;
pub mod cypher;
pub mod registry;
pub mod template;

pub use aead::{
    AeadTemplate, Aes128GcmTemplate, Aes256GcmTemplate, ChaCha20Poly1305Template, AEAD_NAMESPACE,
};
#[cfg(feature = "xchacha")]
pub use aead::XChaCha20Poly1305Template;
pub use cypher::{Cypher, StringCypher};
pub use registry::{namespace, CypherProvider, BUILTIN_NAMESPACES};
pub use template::{CypherNamespace, CypherPlugin, CypherTemplate, TemplateRegistration};
