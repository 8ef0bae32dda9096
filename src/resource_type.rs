//! Resource types.
//!
//! A [`ResourceType`] is a declared kind of resource. It owns its provider
//! registry, its pattern rules and its type-level operations, and points to
//! an optional ancestor type. The ancestor is used for polymorphic lookup
//! and attribute acceptance only; providers and patterns are never
//! inherited.
//!
//! Every declared type descends, directly or indirectly, from the root type
//! returned by [`ResourceType::root`].

use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};

use parking_lot::RwLock;
use tracing::debug;

use crate::error::{ProviderResult, ResourceError, ResourceResult};
use crate::pattern::{Generator, PatternMatch, PatternOptions, PatternRule, PatternTable};
use crate::provider::{Invocation, Operation, ProviderDefinition};
use crate::registry::{ProviderFactory, ProviderOptions, ProviderRegistry};
use crate::resource::Resource;
use crate::scope::{current_scope, Scope};
use crate::value::{Attributes, Value};

/// Name of the root resource type.
pub const ROOT_TYPE_NAME: &str = "Resource";

/// Attribute accepted by every resource type.
pub const PROVIDER_ATTRIBUTE: &str = "provider";

type Initializer = Arc<dyn Fn(&str, &mut Attributes) + Send + Sync>;

static NEXT_TYPE_ID: AtomicU64 = AtomicU64::new(0);

struct TypeInner {
    id: u64,
    name: String,
    ancestor: Option<ResourceType>,
    attributes: Vec<String>,
    initializers: Vec<Initializer>,
    providers: RwLock<ProviderRegistry>,
    patterns: RwLock<PatternTable>,
    operations: RwLock<BTreeMap<String, Operation>>,
}

/// Handle to a declared resource type.
///
/// Cloning is cheap; clones refer to the same type. Every declaration is a
/// distinct type, even when two declarations share a name.
#[derive(Clone)]
pub struct ResourceType {
    inner: Arc<TypeInner>,
}

impl ResourceType {
    /// The common root of all resource types.
    pub fn root() -> ResourceType {
        static ROOT: OnceLock<ResourceType> = OnceLock::new();
        ROOT.get_or_init(|| ResourceTypeBuilder::new(ROOT_TYPE_NAME).build_root())
            .clone()
    }

    /// Declare a type with no attributes of its own.
    ///
    /// Without an explicit ancestor the type extends the root type.
    pub fn declare(name: impl Into<String>, ancestor: Option<&ResourceType>) -> ResourceType {
        let mut builder = ResourceTypeBuilder::new(name);
        if let Some(ancestor) = ancestor {
            builder = builder.extends(ancestor);
        }
        builder.build()
    }

    /// Start declaring a type with attributes and initializers.
    pub fn builder(name: impl Into<String>) -> ResourceTypeBuilder {
        ResourceTypeBuilder::new(name)
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Identity of this declaration, unique within the process.
    pub fn id(&self) -> u64 {
        self.inner.id
    }

    pub fn ancestor(&self) -> Option<&ResourceType> {
        self.inner.ancestor.as_ref()
    }

    /// Iterate from this type up to and including the root.
    pub fn ancestors(&self) -> Ancestors {
        Ancestors {
            next: Some(self.clone()),
        }
    }

    /// Check whether this type is `other` or one of its subtypes.
    pub fn is_a(&self, other: &ResourceType) -> bool {
        self.ancestors().any(|t| t == *other)
    }

    /// Check whether `key` is accepted as an attribute by this type or any
    /// of its ancestors.
    pub fn accepts_attribute(&self, key: &str) -> bool {
        key == PROVIDER_ATTRIBUTE
            || self
                .ancestors()
                .any(|t| t.inner.attributes.iter().any(|a| a == key))
    }

    /// Attribute keys declared on this type and its ancestors.
    pub fn attribute_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .ancestors()
            .flat_map(|t| t.inner.attributes.clone())
            .collect();
        names.sort();
        names.dedup();
        names
    }

    pub(crate) fn apply_initializers(&self, name: &str, attributes: &mut Attributes) {
        for ty in self.ancestors() {
            for init in &ty.inner.initializers {
                init(name, attributes);
            }
        }
    }

    // ---------------------------------------------------------------------
    // Providers
    // ---------------------------------------------------------------------

    /// Declare a provider, or extend it when it already exists.
    pub fn define_provider<F>(&self, name: &str, build: F) -> ResourceResult<()>
    where
        F: Fn(&mut ProviderDefinition) + Send + Sync + 'static,
    {
        self.define_provider_with(name, ProviderOptions::new(), build)
    }

    /// Declare a provider with options such as a parent provider.
    pub fn define_provider_with<F>(
        &self,
        name: &str,
        options: ProviderOptions,
        build: F,
    ) -> ResourceResult<()>
    where
        F: Fn(&mut ProviderDefinition) + Send + Sync + 'static,
    {
        self.inner.providers.write().define(name, options, build)
    }

    /// Get the named provider factory.
    pub fn provider_factory(&self, name: &str) -> ResourceResult<Arc<ProviderFactory>> {
        self.inner.providers.read().get(name)
    }

    /// Provider names in lexicographic order.
    pub fn provider_names(&self) -> Vec<String> {
        self.inner
            .providers
            .read()
            .names()
            .into_iter()
            .map(str::to_string)
            .collect()
    }

    /// The provider used when a resource does not name one.
    pub fn default_provider(&self) -> Option<String> {
        self.inner.providers.read().default_name().map(str::to_string)
    }

    // ---------------------------------------------------------------------
    // Patterns
    // ---------------------------------------------------------------------

    /// Declare a pattern rule at priority 0.
    pub fn define_pattern<F>(&self, pattern: &str, generator: F) -> ResourceResult<()>
    where
        F: Fn(&ResourceType, &PatternMatch) -> ResourceResult<Resource> + Send + Sync + 'static,
    {
        self.define_pattern_with(pattern, PatternOptions::new(), generator)
    }

    /// Declare a pattern rule with options.
    pub fn define_pattern_with<F>(
        &self,
        pattern: &str,
        options: PatternOptions,
        generator: F,
    ) -> ResourceResult<()>
    where
        F: Fn(&ResourceType, &PatternMatch) -> ResourceResult<Resource> + Send + Sync + 'static,
    {
        self.add_pattern_rule(pattern, options.priority, Arc::new(generator))
    }

    pub(crate) fn add_pattern_rule(
        &self,
        pattern: &str,
        priority: i32,
        generator: Generator,
    ) -> ResourceResult<()> {
        let rule = PatternRule::new(pattern, priority, generator)?;
        self.inner.patterns.write().add(rule);
        debug!(resource_type = %self.name(), pattern = %pattern, priority, "Defined pattern");
        Ok(())
    }

    /// Snapshot of the pattern rules in consultation order.
    pub fn pattern_rules(&self) -> Vec<Arc<PatternRule>> {
        self.inner.patterns.read().rules()
    }

    // ---------------------------------------------------------------------
    // Operations
    // ---------------------------------------------------------------------

    /// Define an operation implemented by instances of this type (and its
    /// subtypes) themselves. These take precedence over provider operations.
    pub fn define_operation<F, Fut>(&self, name: impl Into<String>, f: F)
    where
        F: Fn(Invocation) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ProviderResult<Value>> + Send + 'static,
    {
        let name = name.into();
        debug!(resource_type = %self.name(), operation = %name, "Defined operation");
        self.inner.operations.write().insert(name, Operation::new(f));
    }

    /// Find a type-level operation, walking the ancestor chain.
    pub fn operation(&self, name: &str) -> Option<Operation> {
        self.ancestors()
            .find_map(|t| t.inner.operations.read().get(name).cloned())
    }

    // ---------------------------------------------------------------------
    // Instances
    // ---------------------------------------------------------------------

    /// Build an instance without registering it in any scope.
    pub fn new_resource(&self, name: impl AsRef<str>, attributes: Attributes) -> ResourceResult<Resource> {
        Resource::instantiate(self, name.as_ref(), attributes)
    }

    /// Build an instance and register it in the current scope.
    pub fn create(&self, name: impl AsRef<str>, attributes: Attributes) -> ResourceResult<Resource> {
        let name = name.as_ref();
        let resource = self.new_resource(name, attributes)?;
        self.scope().add_resource(name, &resource)?;
        Ok(resource)
    }

    /// Resolve a name in the current scope.
    pub fn find(&self, name: impl AsRef<str>) -> ResourceResult<Option<Resource>> {
        self.scope().find(self, name)
    }

    /// Resolve a name in the current scope, failing when it is not found.
    pub fn get(&self, name: impl AsRef<str>) -> ResourceResult<Resource> {
        self.scope().get(self, name)
    }

    /// The current scope.
    pub fn scope(&self) -> Scope {
        current_scope()
    }
}

impl PartialEq for ResourceType {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Eq for ResourceType {}

impl fmt::Display for ResourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.inner.name)
    }
}

impl fmt::Debug for ResourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResourceType")
            .field("id", &self.inner.id)
            .field("name", &self.inner.name)
            .field("ancestor", &self.ancestor().map(|a| a.name().to_string()))
            .field("attributes", &self.inner.attributes)
            .finish()
    }
}

/// Iterator over a type and its ancestors, most specific first.
pub struct Ancestors {
    next: Option<ResourceType>,
}

impl Iterator for Ancestors {
    type Item = ResourceType;

    fn next(&mut self) -> Option<Self::Item> {
        let current = self.next.take()?;
        self.next = current.ancestor().cloned();
        Some(current)
    }
}

/// Builder for declaring resource types with fluent API.
///
/// # Example
///
/// ```rust
/// use rustadmin::{Attributes, ResourceType};
///
/// let host = ResourceType::builder("DocHost")
///     .attributes(["hostname", "username"])
///     .initializer(|name, attrs| attrs.insert_default("hostname", name))
///     .build();
///
/// let db = host.new_resource("db1", Attributes::new()).unwrap();
/// assert_eq!(db.attribute_str("hostname").as_deref(), Some("db1"));
/// ```
pub struct ResourceTypeBuilder {
    name: String,
    ancestor: Option<ResourceType>,
    attributes: Vec<String>,
    initializers: Vec<Initializer>,
}

impl ResourceTypeBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ancestor: None,
            attributes: Vec::new(),
            initializers: Vec::new(),
        }
    }

    /// Set the ancestor type.
    pub fn extends(mut self, ancestor: &ResourceType) -> Self {
        self.ancestor = Some(ancestor.clone());
        self
    }

    /// Accept an attribute key.
    pub fn attribute(mut self, name: impl Into<String>) -> Self {
        self.attributes.push(name.into());
        self
    }

    /// Accept several attribute keys.
    pub fn attributes<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.attributes.extend(names.into_iter().map(Into::into));
        self
    }

    /// Add a hook that adjusts attributes before an instance is built.
    /// Receives the instance name.
    pub fn initializer<F>(mut self, f: F) -> Self
    where
        F: Fn(&str, &mut Attributes) + Send + Sync + 'static,
    {
        self.initializers.push(Arc::new(f));
        self
    }

    /// Declare the type.
    pub fn build(self) -> ResourceType {
        let ancestor = self.ancestor.clone().unwrap_or_else(ResourceType::root);
        let ty = self.finish(Some(ancestor));
        debug!(
            resource_type = %ty.name(),
            ancestor = ?ty.ancestor().map(|a| a.name().to_string()),
            "Declared resource type"
        );
        ty
    }

    fn build_root(self) -> ResourceType {
        self.finish(None)
    }

    fn finish(self, ancestor: Option<ResourceType>) -> ResourceType {
        ResourceType {
            inner: Arc::new(TypeInner {
                id: NEXT_TYPE_ID.fetch_add(1, Ordering::Relaxed),
                providers: RwLock::new(ProviderRegistry::new(self.name.clone())),
                patterns: RwLock::new(PatternTable::new()),
                operations: RwLock::new(BTreeMap::new()),
                name: self.name,
                ancestor,
                attributes: self.attributes,
                initializers: self.initializers,
            }),
        }
    }
}
