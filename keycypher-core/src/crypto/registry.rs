use crate::crypto::aead::AEAD_NAMESPACE;
use crate::crypto::cypher::{Cypher, StringCypher};
use crate::crypto::template::{CypherNamespace, CypherTemplate};
use crate::key_provider::KeyProvider;
use keycypher_spec::{CypherError, CypherResult, CypherSpecification, KeyReference};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// Namespaces shipped with the crate, addressable by name from configuration.
pub static BUILTIN_NAMESPACES: &[&CypherNamespace] = &[&AEAD_NAMESPACE];

/// Look up a built-in namespace by name.
pub fn namespace(name: &str) -> Option<&'static CypherNamespace> {
    BUILTIN_NAMESPACES
        .iter()
        .copied()
        .find(|namespace| namespace.name.eq_ignore_ascii_case(name.trim()))
}

/// Algorithm name to template map bound to a key provider context.
pub struct CypherProvider {
    context: Arc<dyn KeyProvider>,
    templates: BTreeMap<String, Arc<dyn CypherTemplate>>,
}

impl CypherProvider {
    /// Empty registry; populate it with [`CypherProvider::add_cypher`].
    pub fn new(context: Arc<dyn KeyProvider>) -> Self {
        Self {
            context,
            templates: BTreeMap::new(),
        }
    }

    /// Registry populated from every plugin in `namespaces`.
    ///
    /// A plugin whose constructor fails is logged and skipped. Later
    /// registrations of the same name replace earlier ones.
    pub fn discover(context: Arc<dyn KeyProvider>, namespaces: &[&CypherNamespace]) -> Self {
        let mut provider = Self::new(context);
        let mut skipped = 0usize;
        for namespace in namespaces {
            for plugin in namespace.plugins {
                match plugin.construct() {
                    Ok(template) => {
                        for name in plugin.algorithms {
                            provider.add_cypher(*name, Arc::clone(&template));
                        }
                    }
                    Err(err) => {
                        skipped += 1;
                        tracing::warn!(
                            namespace = namespace.name,
                            algorithms = ?plugin.algorithms,
                            error = %err,
                            "skipping cypher plugin"
                        );
                    }
                }
            }
        }
        tracing::info!(
            namespaces = namespaces.len(),
            algorithms = provider.templates.len(),
            skipped,
            "cypher discovery complete"
        );
        provider
    }

    /// Registry over the built-in namespaces.
    pub fn with_builtins(context: Arc<dyn KeyProvider>) -> Self {
        Self::discover(context, BUILTIN_NAMESPACES)
    }

    /// Register `template` under `name`, returning the template it replaced.
    pub fn add_cypher(
        &mut self,
        name: impl Into<String>,
        template: Arc<dyn CypherTemplate>,
    ) -> Option<Arc<dyn CypherTemplate>> {
        self.templates.insert(name.into(), template)
    }

    pub fn cypher_template(&self, name: Option<&str>) -> CypherResult<Arc<dyn CypherTemplate>> {
        let name = name.ok_or_else(|| CypherError::unsupported(None))?;
        self.templates
            .get(name)
            .cloned()
            .ok_or_else(|| CypherError::unsupported(Some(name)))
    }

    /// Cypher for `spec` bound to `key_ref`. Fails before any key resolution
    /// when the algorithm is unknown.
    pub fn cypher(&self, spec: &CypherSpecification, key_ref: KeyReference) -> CypherResult<Cypher> {
        let template = self.cypher_template(Some(spec.algorithm()))?;
        Ok(Cypher::new(Arc::clone(&self.context), template, key_ref))
    }

    pub fn string_cypher(
        &self,
        spec: &CypherSpecification,
        key_ref: KeyReference,
    ) -> CypherResult<StringCypher> {
        self.cypher(spec, key_ref).map(StringCypher::new)
    }

    /// Registered algorithm names in sorted order.
    pub fn algorithms(&self) -> Vec<&str> {
        self.templates.keys().map(String::as_str).collect()
    }

    pub fn context(&self) -> &Arc<dyn KeyProvider> {
        &self.context
    }
}

impl fmt::Debug for CypherProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CypherProvider")
            .field("algorithms", &self.algorithms())
            .finish_non_exhaustive()
    }
}
