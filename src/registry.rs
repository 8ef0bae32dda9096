//! Provider factory registry.
//!
//! Every resource type owns a `ProviderRegistry` mapping provider names to
//! [`ProviderFactory`] values. Declaring the same provider name twice does not
//! replace the factory: the new definition closure is appended and all
//! closures are applied, in declaration order, whenever a provider is bound.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{debug, warn};

use crate::error::{ResourceError, ResourceResult};
use crate::provider::{DeclaredProvider, ProviderDefinition};
use crate::resource::Resource;
use crate::value::Value;

type DefineFn = Arc<dyn Fn(&mut ProviderDefinition) + Send + Sync>;

/// Options accepted by a provider declaration.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProviderOptions {
    /// Name of the factory whose capabilities the new factory starts from
    pub parent: Option<String>,
}

impl ProviderOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from the capabilities of the named provider.
    pub fn with_parent(mut self, parent: impl Into<String>) -> Self {
        self.parent = Some(parent.into());
        self
    }

    /// Parse options from key/value pairs.
    ///
    /// Only `parent` is recognized; anything else fails with
    /// [`ResourceError::InvalidProviderOption`].
    pub fn from_pairs<K, V, I>(pairs: I) -> ResourceResult<Self>
    where
        K: AsRef<str>,
        V: Into<Value>,
        I: IntoIterator<Item = (K, V)>,
    {
        let mut options = Self::new();
        let mut invalid = Vec::new();

        for (key, value) in pairs {
            let key = key.as_ref();
            let value: Value = value.into();
            match (key, value) {
                ("parent", Value::Str(parent)) => options.parent = Some(parent),
                ("parent", Value::Null) => options.parent = None,
                _ => invalid.push(key.to_string()),
            }
        }

        if !invalid.is_empty() {
            return Err(ResourceError::InvalidProviderOption(invalid.join(", ")));
        }
        Ok(options)
    }
}

/// A named constructor of providers for one resource type.
pub struct ProviderFactory {
    type_name: String,
    name: String,
    parent: Option<Arc<ProviderFactory>>,
    steps: RwLock<Vec<DefineFn>>,
}

impl ProviderFactory {
    fn new(type_name: &str, name: &str, parent: Option<Arc<ProviderFactory>>) -> Self {
        Self {
            type_name: type_name.to_string(),
            name: name.to_string(),
            parent,
            steps: RwLock::new(Vec::new()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    pub fn parent(&self) -> Option<&Arc<ProviderFactory>> {
        self.parent.as_ref()
    }

    /// Number of declarations accumulated for this factory.
    pub fn declarations(&self) -> usize {
        self.steps.read().len()
    }

    fn extend(&self, step: DefineFn) {
        self.steps.write().push(step);
    }

    /// Compute the capability set: the parent's definition (or an empty
    /// base) with every declaration of this factory applied in order.
    pub fn definition(&self) -> ProviderDefinition {
        let mut definition = match &self.parent {
            Some(parent) => parent.definition(),
            None => ProviderDefinition::new(),
        };
        let steps = self.steps.read().clone();
        for step in steps {
            step(&mut definition);
        }
        definition
    }

    /// Build a provider bound to `resource`.
    pub fn bind(&self, resource: &Resource) -> ResourceResult<DeclaredProvider> {
        let definition = self.definition();
        definition.run_bind_hooks(resource)?;
        debug!(
            resource_type = %self.type_name,
            provider = %self.name,
            resource = %resource.name(),
            "Bound provider"
        );
        Ok(DeclaredProvider::new(
            self.type_name.clone(),
            self.name.clone(),
            resource.downgrade(),
            definition,
        ))
    }
}

impl fmt::Display for ProviderFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#<{} provider {:?}>", self.type_name, self.name)
    }
}

impl fmt::Debug for ProviderFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderFactory")
            .field("type_name", &self.type_name)
            .field("name", &self.name)
            .field("parent", &self.parent.as_ref().map(|p| p.name()))
            .field("declarations", &self.declarations())
            .finish()
    }
}

/// Per resource-type registry of provider factories.
///
/// Names iterate in lexicographic order, which is also the order used to
/// pick a default provider.
#[derive(Debug)]
pub struct ProviderRegistry {
    type_name: String,
    factories: BTreeMap<String, Arc<ProviderFactory>>,
}

impl ProviderRegistry {
    /// Create an empty registry for the named resource type.
    pub fn new(type_name: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            factories: BTreeMap::new(),
        }
    }

    /// Declare a provider, or extend it when it already exists.
    pub fn define<F>(&mut self, name: &str, options: ProviderOptions, build: F) -> ResourceResult<()>
    where
        F: Fn(&mut ProviderDefinition) + Send + Sync + 'static,
    {
        if let Some(factory) = self.factories.get(name) {
            if let Some(parent) = &options.parent {
                if factory.parent().map(|p| p.name()) != Some(parent.as_str()) {
                    warn!(
                        resource_type = %self.type_name,
                        provider = %name,
                        parent = %parent,
                        "Ignoring parent option when extending an existing provider"
                    );
                }
            }
            factory.extend(Arc::new(build));
            debug!(resource_type = %self.type_name, provider = %name, "Extended provider");
            return Ok(());
        }

        let parent = match &options.parent {
            Some(parent) => Some(self.get(parent)?),
            None => None,
        };
        let factory = ProviderFactory::new(&self.type_name, name, parent);
        factory.extend(Arc::new(build));
        self.factories.insert(name.to_string(), Arc::new(factory));
        debug!(resource_type = %self.type_name, provider = %name, "Defined provider");
        Ok(())
    }

    /// Get a factory by name.
    pub fn get(&self, name: &str) -> ResourceResult<Arc<ProviderFactory>> {
        self.factories
            .get(name)
            .cloned()
            .ok_or_else(|| ResourceError::UnknownProvider {
                type_name: self.type_name.clone(),
                provider: name.to_string(),
            })
    }

    /// Check if a factory with the given name is registered.
    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    /// Get the names of all registered factories, sorted.
    pub fn names(&self) -> Vec<&str> {
        self.factories.keys().map(|s| s.as_str()).collect()
    }

    /// The provider picked when a resource does not name one.
    pub fn default_name(&self) -> Option<&str> {
        self.factories.keys().next().map(|s| s.as_str())
    }

    pub fn len(&self) -> usize {
        self.factories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.factories.is_empty()
    }

    /// Iterate over all factories in name order.
    pub fn iter(&self) -> impl Iterator<Item = &Arc<ProviderFactory>> {
        self.factories.values()
    }
}
