//! Concrete key providers.

mod cached;
mod composite;
#[cfg(feature = "file")]
mod file;
mod memory;

pub use cached::CachingKeyProvider;
pub use composite::CompositeKeyProvider;
#[cfg(feature = "file")]
pub use file::{FileKeyStore, KeyInfo, KeyStoreDocument, KeyStoreEntry, NewKey, StoredKeyVersion};
pub use memory::MemoryKeyProvider;
