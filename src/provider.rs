//! Provider trait and operation plumbing.
//!
//! A provider is the pluggable access mechanism behind a resource: the same
//! `System` resource may be reached through a local shell or over ssh. Each
//! provider is bound to exactly one resource and exposes named operations.
//!
//! Providers are normally produced by a [`ProviderFactory`](crate::ProviderFactory)
//! from the capabilities accumulated in a [`ProviderDefinition`].

use std::any::Any;
use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use futures_core::future::BoxFuture;

use crate::error::{ProviderError, ProviderResult};
use crate::resource::{Resource, WeakResource};
use crate::value::Value;

/// Base trait for all resource providers.
///
/// `invoke` is the single entry point for open-ended operation names.
/// Typed surfaces such as [`Shell`](crate::Shell) are layered on top of it.
///
/// # Example
///
/// ```rust
/// use rustadmin::{async_trait, Provider, ProviderError, ProviderResult, Resource, Value};
/// use std::any::Any;
///
/// #[derive(Debug)]
/// struct EchoProvider;
///
/// #[async_trait]
/// impl Provider for EchoProvider {
///     fn name(&self) -> &str {
///         "echo"
///     }
///
///     fn resource(&self) -> Option<Resource> {
///         None
///     }
///
///     fn operations(&self) -> Vec<&str> {
///         vec!["echo"]
///     }
///
///     async fn invoke(&self, operation: &str, args: Vec<Value>) -> ProviderResult<Value> {
///         match operation {
///             "echo" => Ok(Value::List(args)),
///             _ => Err(ProviderError::UnsupportedOperation {
///                 target: "echo".to_string(),
///                 operation: operation.to_string(),
///             }),
///         }
///     }
///
///     fn as_any(&self) -> &dyn Any {
///         self
///     }
/// }
///
/// assert!(EchoProvider.supports("echo"));
/// ```
#[async_trait]
pub trait Provider: Send + Sync + fmt::Debug {
    /// Returns the provider name, unique within its resource type.
    fn name(&self) -> &str;

    /// Returns the resource this provider is bound to, if it is still alive.
    fn resource(&self) -> Option<Resource>;

    /// Returns the names of the operations this provider implements.
    fn operations(&self) -> Vec<&str>;

    /// Check if this provider implements the given operation.
    fn supports(&self, operation: &str) -> bool {
        self.operations().contains(&operation)
    }

    /// Invoke a named operation.
    async fn invoke(&self, operation: &str, args: Vec<Value>) -> ProviderResult<Value>;

    /// Downcast to concrete type for advanced usage.
    fn as_any(&self) -> &dyn Any;
}

/// Extension trait for provider type checking.
pub trait ProviderExt: Provider {
    /// Check if this provider is of type T.
    fn is<T: Provider + 'static>(&self) -> bool {
        self.as_any().is::<T>()
    }

    /// Downcast to type T.
    fn downcast_ref<T: Provider + 'static>(&self) -> Option<&T> {
        self.as_any().downcast_ref::<T>()
    }
}

impl<P: Provider + ?Sized> ProviderExt for P {}

/// Arguments of a single operation call.
#[derive(Debug, Clone)]
pub struct Invocation {
    /// Resource the operation acts on
    pub resource: Resource,
    /// Operation name
    pub operation: String,
    /// Positional arguments
    pub args: Vec<Value>,
}

impl Invocation {
    pub fn new(resource: Resource, operation: impl Into<String>, args: Vec<Value>) -> Self {
        Self {
            resource,
            operation: operation.into(),
            args,
        }
    }

    /// Get the positional argument at `index`.
    pub fn arg(&self, index: usize) -> Option<&Value> {
        self.args.get(index)
    }

    /// Get the positional argument at `index` as a string.
    pub fn str_arg(&self, index: usize) -> ProviderResult<&str> {
        self.arg(index)
            .and_then(Value::as_str)
            .ok_or_else(|| ProviderError::InvalidArgument {
                operation: self.operation.clone(),
                message: format!("expected a string at position {}", index),
            })
    }
}

type OperationFn = dyn Fn(Invocation) -> BoxFuture<'static, ProviderResult<Value>> + Send + Sync;

/// A named, shareable asynchronous operation.
#[derive(Clone)]
pub struct Operation(Arc<OperationFn>);

impl Operation {
    /// Wrap an async closure as an operation.
    pub fn new<F, Fut>(f: F) -> Self
    where
        F: Fn(Invocation) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ProviderResult<Value>> + Send + 'static,
    {
        Self(Arc::new(move |call| Box::pin(f(call))))
    }

    /// Start the operation.
    pub fn call(&self, invocation: Invocation) -> BoxFuture<'static, ProviderResult<Value>> {
        (self.0)(invocation)
    }
}

impl fmt::Debug for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Operation(..)")
    }
}

type BindHook = Arc<dyn Fn(&Resource) -> ProviderResult<()> + Send + Sync>;

/// The capability set of a provider, accumulated from one or more
/// declarations of the same provider name.
///
/// Operations declared later replace earlier ones of the same name; bind
/// hooks all run, in declaration order.
#[derive(Clone, Default)]
pub struct ProviderDefinition {
    operations: BTreeMap<String, Operation>,
    bind_hooks: Vec<BindHook>,
}

impl ProviderDefinition {
    /// Create an empty definition (the generic provider base).
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an operation.
    pub fn operation<F, Fut>(&mut self, name: impl Into<String>, f: F) -> &mut Self
    where
        F: Fn(Invocation) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ProviderResult<Value>> + Send + 'static,
    {
        self.operations.insert(name.into(), Operation::new(f));
        self
    }

    /// Add a hook that runs whenever the provider is bound to a resource.
    pub fn on_bind<F>(&mut self, f: F) -> &mut Self
    where
        F: Fn(&Resource) -> ProviderResult<()> + Send + Sync + 'static,
    {
        self.bind_hooks.push(Arc::new(f));
        self
    }

    /// Check if an operation is defined.
    pub fn has_operation(&self, name: &str) -> bool {
        self.operations.contains_key(name)
    }

    /// Names of all defined operations, sorted.
    pub fn operation_names(&self) -> Vec<&str> {
        self.operations.keys().map(|k| k.as_str()).collect()
    }

    pub(crate) fn run_bind_hooks(&self, resource: &Resource) -> ProviderResult<()> {
        for hook in &self.bind_hooks {
            hook(resource)?;
        }
        Ok(())
    }

    pub(crate) fn into_operations(self) -> BTreeMap<String, Operation> {
        self.operations
    }
}

impl fmt::Debug for ProviderDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderDefinition")
            .field("operations", &self.operation_names())
            .field("bind_hooks", &self.bind_hooks.len())
            .finish()
    }
}

/// A provider produced by a factory and bound to one resource.
pub struct DeclaredProvider {
    type_name: String,
    name: String,
    resource: WeakResource,
    operations: BTreeMap<String, Operation>,
}

impl DeclaredProvider {
    pub(crate) fn new(
        type_name: impl Into<String>,
        name: impl Into<String>,
        resource: WeakResource,
        definition: ProviderDefinition,
    ) -> Self {
        Self {
            type_name: type_name.into(),
            name: name.into(),
            resource,
            operations: definition.into_operations(),
        }
    }

    /// Name of the resource type this provider belongs to.
    pub fn type_name(&self) -> &str {
        &self.type_name
    }
}

#[async_trait]
impl Provider for DeclaredProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn resource(&self) -> Option<Resource> {
        self.resource.upgrade()
    }

    fn operations(&self) -> Vec<&str> {
        self.operations.keys().map(|k| k.as_str()).collect()
    }

    fn supports(&self, operation: &str) -> bool {
        self.operations.contains_key(operation)
    }

    async fn invoke(&self, operation: &str, args: Vec<Value>) -> ProviderResult<Value> {
        let op = self
            .operations
            .get(operation)
            .cloned()
            .ok_or_else(|| ProviderError::UnsupportedOperation {
                target: self.to_string(),
                operation: operation.to_string(),
            })?;
        let resource = self
            .resource
            .upgrade()
            .ok_or_else(|| ProviderError::ResourceReleased(self.to_string()))?;

        op.call(Invocation::new(resource, operation, args)).await
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl fmt::Display for DeclaredProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#<{} provider {:?}>", self.type_name, self.name)
    }
}

impl fmt::Debug for DeclaredProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeclaredProvider")
            .field("type_name", &self.type_name)
            .field("name", &self.name)
            .field("operations", &self.operations.keys().collect::<Vec<_>>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource_type::ResourceType;
    use crate::value::Attributes;

    #[derive(Debug)]
    struct StaticProvider;

    #[async_trait]
    impl Provider for StaticProvider {
        fn name(&self) -> &str {
            "static"
        }

        fn resource(&self) -> Option<Resource> {
            None
        }

        fn operations(&self) -> Vec<&str> {
            vec!["ping"]
        }

        async fn invoke(&self, _operation: &str, _args: Vec<Value>) -> ProviderResult<Value> {
            Ok(Value::from("pong"))
        }

        fn as_any(&self) -> &dyn Any {
            self
        }
    }

    #[test]
    fn test_provider_supports() {
        assert!(StaticProvider.supports("ping"));
        assert!(!StaticProvider.supports("pong"));
    }

    #[test]
    fn test_provider_downcast() {
        let provider: Box<dyn Provider> = Box::new(StaticProvider);
        assert!(provider.is::<StaticProvider>());
        assert!(provider.downcast_ref::<DeclaredProvider>().is_none());
    }

    #[test]
    fn test_definition_later_operation_replaces_earlier() {
        let mut definition = ProviderDefinition::new();
        definition
            .operation("a", |_| async { Ok(Value::from(1)) })
            .operation("b", |_| async { Ok(Value::from(2)) })
            .operation("a", |_| async { Ok(Value::from(3)) });

        assert_eq!(definition.operation_names(), vec!["a", "b"]);
    }

    #[tokio::test]
    async fn test_declared_provider_invoke() {
        let ty = ResourceType::declare("ProviderTestHost", None);
        let resource = ty.new_resource("h1", Attributes::new()).unwrap();

        let mut definition = ProviderDefinition::new();
        definition.operation("whoami", |call: Invocation| async move {
            Ok(Value::from(call.resource.name()))
        });
        let provider = DeclaredProvider::new("ProviderTestHost", "fake", resource.downgrade(), definition);

        assert_eq!(provider.to_string(), "#<ProviderTestHost provider \"fake\">");
        assert_eq!(
            provider.invoke("whoami", vec![]).await.unwrap(),
            Value::from("h1")
        );

        let err = provider.invoke("reboot", vec![]).await.unwrap_err();
        assert!(matches!(err, ProviderError::UnsupportedOperation { .. }));
    }

    #[tokio::test]
    async fn test_declared_provider_outlived_resource() {
        let ty = ResourceType::declare("ProviderTestGone", None);
        let resource = ty.new_resource("gone", Attributes::new()).unwrap();
        let weak = resource.downgrade();
        drop(resource);

        let mut definition = ProviderDefinition::new();
        definition.operation("ping", |_| async { Ok(Value::Null) });
        let provider = DeclaredProvider::new("ProviderTestGone", "fake", weak, definition);

        let err = provider.invoke("ping", vec![]).await.unwrap_err();
        assert!(matches!(err, ProviderError::ResourceReleased(_)));
    }
}
