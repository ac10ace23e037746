//! Shared vocabulary for keycypher: key path grammar, key references, cypher
//! value types, lifecycle states and the error taxonomy.

pub mod error;
pub mod key_path;
pub mod key_ref;
pub mod state;
pub mod types;

pub use error::{
    CypherError, CypherResult, Error, KeyPathError, KeyProviderError, KeyResult, LifecycleError,
    LifecycleResult, Result,
};
pub use key_path::KeyPathComponents;
pub use key_ref::{KeyReference, Password};
pub use state::ServiceState;
pub use types::{CypherDescriptor, CypherEncryption, CypherSpecification, KeyDescriptor, KeyType};

pub mod prelude {
    pub use crate::{
        CypherEncryption, CypherError, CypherSpecification, KeyPathComponents, KeyProviderError,
        KeyReference, KeyType, Password, ServiceState,
    };
}
