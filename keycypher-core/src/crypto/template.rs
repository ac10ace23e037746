use crate::key_provider::KeyProvider;
use keycypher_spec::{
    CypherDescriptor, CypherEncryption, CypherResult, KeyDescriptor, KeyReference,
};
use std::fmt;
use std::sync::Arc;

/// Algorithm implementation shared by every cypher bound to its name.
///
/// Templates hold no per-call state. Keys are resolved through `ctx` on every
/// call rather than handed in.
pub trait CypherTemplate: Send + Sync {
    fn key_descriptor(&self) -> KeyDescriptor;

    fn cypher_descriptor(&self) -> CypherDescriptor;

    fn encrypt(
        &self,
        ctx: &dyn KeyProvider,
        key_ref: &KeyReference,
        plaintext: &[u8],
        iv: Option<&[u8]>,
        aad: Option<&[u8]>,
    ) -> CypherResult<CypherEncryption>;

    fn decrypt(
        &self,
        ctx: &dyn KeyProvider,
        key_ref: &KeyReference,
        encryption: &CypherEncryption,
        aad: Option<&[u8]>,
    ) -> CypherResult<Vec<u8>>;
}

/// Marker contract for templates that discovery can build by name.
pub trait CypherPlugin: CypherTemplate + Sized + 'static {
    /// Names this template answers to. The first one is canonical.
    const ALGORITHMS: &'static [&'static str];

    fn create() -> CypherResult<Self>;
}

type Construct = fn() -> CypherResult<Arc<dyn CypherTemplate>>;

/// One discoverable template: its names and a zero-argument constructor.
#[derive(Clone, Copy)]
pub struct TemplateRegistration {
    pub algorithms: &'static [&'static str],
    construct: Construct,
}

impl TemplateRegistration {
    pub const fn of<T: CypherPlugin>() -> Self {
        Self {
            algorithms: T::ALGORITHMS,
            construct: construct_plugin::<T>,
        }
    }

    /// Registration with a hand-written constructor.
    pub const fn new(algorithms: &'static [&'static str], construct: Construct) -> Self {
        Self {
            algorithms,
            construct,
        }
    }

    pub fn construct(&self) -> CypherResult<Arc<dyn CypherTemplate>> {
        (self.construct)()
    }
}

impl fmt::Debug for TemplateRegistration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TemplateRegistration")
            .field("algorithms", &self.algorithms)
            .finish_non_exhaustive()
    }
}

fn construct_plugin<T: CypherPlugin>() -> CypherResult<Arc<dyn CypherTemplate>> {
    Ok(Arc::new(T::create()?))
}

/// Named static table of plugins scanned by discovery.
#[derive(Debug)]
pub struct CypherNamespace {
    pub name: &'static str,
    pub plugins: &'static [TemplateRegistration],
}
