//! Resource instances.
//!
//! A [`Resource`] is a named object of some [`ResourceType`]. It holds its
//! attributes and at most one provider. Operations invoked on the resource
//! are served by the type's own operations first and otherwise delegated to
//! the bound provider.

use std::fmt;
use std::sync::{Arc, Weak};

use parking_lot::RwLock;
use tracing::debug;

use crate::error::{ProviderError, ProviderResult, ResourceError, ResourceResult};
use crate::provider::{Invocation, Provider};
use crate::resource_type::{ResourceType, PROVIDER_ATTRIBUTE};
use crate::value::{Attributes, Value};

struct ResourceInner {
    name: String,
    resource_type: ResourceType,
    attributes: RwLock<Attributes>,
    provider: RwLock<Option<Arc<dyn Provider>>>,
}

/// Handle to a resource instance.
///
/// Cloning is cheap; clones refer to the same instance and compare equal.
#[derive(Clone)]
pub struct Resource {
    inner: Arc<ResourceInner>,
}

/// Non-owning reference to a resource, held by its provider.
#[derive(Clone, Debug)]
pub struct WeakResource(Weak<ResourceInner>);

impl WeakResource {
    pub fn upgrade(&self) -> Option<Resource> {
        self.0.upgrade().map(|inner| Resource { inner })
    }
}

impl fmt::Debug for ResourceInner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({:?})", self.resource_type.name(), self.name)
    }
}

impl Resource {
    /// Construct an unregistered instance.
    ///
    /// Runs the type's initializers, picks the default provider when none is
    /// given, rejects unknown attribute keys and binds the provider last, so
    /// bind hooks observe the complete attribute set.
    pub(crate) fn instantiate(
        resource_type: &ResourceType,
        name: &str,
        mut attributes: Attributes,
    ) -> ResourceResult<Resource> {
        if name.is_empty() {
            return Err(ResourceError::MissingName {
                type_name: resource_type.name().to_string(),
            });
        }

        resource_type.apply_initializers(name, &mut attributes);

        let provider = attributes.remove(PROVIDER_ATTRIBUTE).unwrap_or(Value::Null);

        if let Some(invalid) = attributes
            .keys()
            .find(|key| !resource_type.accepts_attribute(key))
        {
            return Err(ResourceError::InvalidAttribute {
                type_name: resource_type.name().to_string(),
                attribute: invalid.to_string(),
            });
        }

        let resource = Resource {
            inner: Arc::new(ResourceInner {
                name: name.to_string(),
                resource_type: resource_type.clone(),
                attributes: RwLock::new(attributes),
                provider: RwLock::new(None),
            }),
        };

        resource.set_provider_value(provider)?;
        Ok(resource)
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn resource_type(&self) -> &ResourceType {
        &self.inner.resource_type
    }

    /// Check whether this resource's type is `ty` or a subtype of it.
    pub fn is_a(&self, ty: &ResourceType) -> bool {
        self.inner.resource_type.is_a(ty)
    }

    pub fn downgrade(&self) -> WeakResource {
        WeakResource(Arc::downgrade(&self.inner))
    }

    // ---------------------------------------------------------------------
    // Attributes
    // ---------------------------------------------------------------------

    /// Get an attribute value.
    pub fn attribute(&self, key: &str) -> Option<Value> {
        self.inner.attributes.read().get(key).cloned()
    }

    /// Get a string attribute. Missing, null and non-string values yield
    /// `None`.
    pub fn attribute_str(&self, key: &str) -> Option<String> {
        self.inner
            .attributes
            .read()
            .get(key)
            .and_then(Value::as_str)
            .map(str::to_string)
    }

    /// Get a resource-valued attribute.
    pub fn attribute_resource(&self, key: &str) -> Option<Resource> {
        self.inner
            .attributes
            .read()
            .get(key)
            .and_then(Value::as_resource)
            .cloned()
    }

    /// Snapshot of all attributes (the provider is not included).
    pub fn attributes(&self) -> Attributes {
        self.inner.attributes.read().clone()
    }

    /// Set an attribute. Setting `provider` rebinds the provider.
    pub fn set_attribute(&self, key: &str, value: impl Into<Value>) -> ResourceResult<()> {
        let value = value.into();
        if key == PROVIDER_ATTRIBUTE {
            return self.set_provider_value(value);
        }
        if !self.inner.resource_type.accepts_attribute(key) {
            return Err(ResourceError::InvalidAttribute {
                type_name: self.inner.resource_type.name().to_string(),
                attribute: key.to_string(),
            });
        }
        self.inner.attributes.write().insert(key, value);
        Ok(())
    }

    // ---------------------------------------------------------------------
    // Provider
    // ---------------------------------------------------------------------

    /// Bind a new provider built by the named factory. The previous
    /// provider, if any, is discarded.
    pub fn set_provider(&self, name: &str) -> ResourceResult<()> {
        let factory = self.inner.resource_type.provider_factory(name)?;
        let provider = factory.bind(self)?;
        let previous = self.inner.provider.write().replace(Arc::new(provider));
        debug!(
            resource = %self,
            provider = %name,
            replaced = ?previous.as_ref().map(|p| p.name().to_string()),
            "Set provider"
        );
        Ok(())
    }

    /// A null value selects the type's default provider, or unbinds when
    /// the type has none.
    fn set_provider_value(&self, value: Value) -> ResourceResult<()> {
        match value {
            Value::Str(name) => self.set_provider(&name),
            Value::Null => match self.inner.resource_type.default_provider() {
                Some(name) => self.set_provider(&name),
                None => {
                    self.inner.provider.write().take();
                    Ok(())
                }
            },
            other => Err(ResourceError::UnknownProvider {
                type_name: self.inner.resource_type.name().to_string(),
                provider: other.to_string(),
            }),
        }
    }

    /// The bound provider.
    pub fn provider(&self) -> Option<Arc<dyn Provider>> {
        self.inner.provider.read().clone()
    }

    /// Name of the bound provider.
    pub fn provider_name(&self) -> Option<String> {
        self.inner
            .provider
            .read()
            .as_ref()
            .map(|p| p.name().to_string())
    }

    // ---------------------------------------------------------------------
    // Operations
    // ---------------------------------------------------------------------

    /// Check whether `operation` can be invoked on this resource.
    pub fn supports(&self, operation: &str) -> bool {
        self.inner.resource_type.operation(operation).is_some()
            || self
                .inner
                .provider
                .read()
                .as_ref()
                .map(|p| p.supports(operation))
                .unwrap_or(false)
    }

    /// Invoke a named operation.
    ///
    /// Operations defined on the resource type win; anything else is
    /// forwarded to the bound provider.
    pub async fn invoke(&self, operation: &str, args: Vec<Value>) -> ProviderResult<Value> {
        if let Some(op) = self.inner.resource_type.operation(operation) {
            return op
                .call(Invocation::new(self.clone(), operation, args))
                .await;
        }

        // Clone out of the lock; the provider may be replaced while the
        // operation runs.
        let provider = self.provider();
        match provider {
            Some(provider) => provider.invoke(operation, args).await,
            None => Err(ProviderError::UnsupportedOperation {
                target: self.to_string(),
                operation: operation.to_string(),
            }),
        }
    }
}

impl PartialEq for Resource {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Eq for Resource {}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#<{} {:?}>", self.inner.resource_type.name(), self.inner.name)
    }
}

impl fmt::Debug for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Resource")
            .field("type", &self.inner.resource_type.name())
            .field("name", &self.inner.name)
            .field("provider", &self.provider_name())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn host_type(name: &str) -> ResourceType {
        ResourceType::builder(name)
            .attributes(["hostname", "username"])
            .initializer(|name, attrs| attrs.insert_default("hostname", name))
            .build()
    }

    #[test]
    fn test_new_resource_sets_attributes() {
        let ty = host_type("ResTestHost");
        let r = ty
            .new_resource("db1", Attributes::new().with("username", "alice"))
            .unwrap();

        assert_eq!(r.name(), "db1");
        assert_eq!(r.attribute_str("hostname").as_deref(), Some("db1"));
        assert_eq!(r.attribute_str("username").as_deref(), Some("alice"));
        assert!(r.provider().is_none());
    }

    #[test]
    fn test_empty_name_rejected() {
        let ty = host_type("ResTestNoName");
        assert!(matches!(
            ty.new_resource("", Attributes::new()),
            Err(ResourceError::MissingName { .. })
        ));
    }

    #[test]
    fn test_unknown_attribute_rejected() {
        let ty = host_type("ResTestBadAttr");
        let err = ty
            .new_resource("db1", Attributes::new().with("color", "blue"))
            .unwrap_err();

        match err {
            ResourceError::InvalidAttribute { attribute, .. } => assert_eq!(attribute, "color"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_default_provider_selected() {
        let ty = host_type("ResTestDefaultProvider");
        ty.define_provider("ssh", |_| {}).unwrap();
        ty.define_provider("local", |_| {}).unwrap();

        let r = ty.new_resource("db1", Attributes::new()).unwrap();
        assert_eq!(r.provider_name().as_deref(), Some("local"));

        let r = ty
            .new_resource("db2", Attributes::new().with("provider", Value::Null))
            .unwrap();
        assert_eq!(r.provider_name().as_deref(), Some("local"));

        let r = ty
            .new_resource("db3", Attributes::new().with("provider", "ssh"))
            .unwrap();
        assert_eq!(r.provider_name().as_deref(), Some("ssh"));
    }

    #[test]
    fn test_provider_on_type_without_providers() {
        let ty = host_type("ResTestNoProviders");
        let err = ty
            .new_resource("db1", Attributes::new().with("provider", "ssh"))
            .unwrap_err();
        assert!(matches!(err, ResourceError::UnknownProvider { .. }));
    }

    #[test]
    fn test_replacing_provider_discards_old() {
        let ty = host_type("ResTestReplace");
        ty.define_provider("local", |_| {}).unwrap();
        ty.define_provider("ssh", |_| {}).unwrap();

        let r = ty.new_resource("db1", Attributes::new()).unwrap();
        let old = r.provider().unwrap();
        r.set_attribute("provider", "ssh").unwrap();

        assert_eq!(r.provider_name().as_deref(), Some("ssh"));
        // The resource no longer holds the old provider.
        assert_eq!(Arc::strong_count(&old), 1);
    }

    #[test]
    fn test_setting_null_provider_selects_default() {
        let ty = host_type("ResTestNullProvider");
        ty.define_provider("local", |_| {}).unwrap();
        ty.define_provider("ssh", |_| {}).unwrap();

        let r = ty
            .new_resource("db1", Attributes::new().with("provider", "ssh"))
            .unwrap();
        r.set_attribute("provider", Value::Null).unwrap();
        assert_eq!(r.provider_name().as_deref(), Some("local"));

        let bare = host_type("ResTestNullNoProviders")
            .new_resource("db2", Attributes::new())
            .unwrap();
        bare.set_attribute("provider", Value::Null).unwrap();
        assert!(bare.provider().is_none());
    }

    #[test]
    fn test_provider_back_reference() {
        let ty = host_type("ResTestBackRef");
        ty.define_provider("local", |_| {}).unwrap();

        let r = ty.new_resource("db1", Attributes::new()).unwrap();
        assert_eq!(r.provider().unwrap().resource(), Some(r.clone()));
    }

    #[test]
    fn test_bind_hook_sees_attributes() {
        let ty = host_type("ResTestBindHook");
        ty.define_provider("ssh", |def| {
            def.on_bind(|resource| match resource.attribute_str("username") {
                Some(_) => Ok(()),
                None => Err(ProviderError::InitializationFailed("username required".into())),
            });
        })
        .unwrap();

        assert!(ty
            .new_resource("db1", Attributes::new().with("username", "alice"))
            .is_ok());
        let err = ty.new_resource("db2", Attributes::new()).unwrap_err();
        assert!(matches!(
            err,
            ResourceError::Provider(ProviderError::InitializationFailed(_))
        ));
    }

    #[tokio::test]
    async fn test_invoke_delegates_to_provider() {
        let ty = host_type("ResTestDelegate");
        ty.define_provider("local", |def| {
            def.operation("hostname", |call: Invocation| async move {
                Ok(Value::from(call.resource.attribute_str("hostname")))
            });
        })
        .unwrap();

        let r = ty.new_resource("db1", Attributes::new()).unwrap();
        assert!(r.supports("hostname"));
        assert_eq!(r.invoke("hostname", vec![]).await.unwrap(), Value::from("db1"));

        let err = r.invoke("reboot", vec![]).await.unwrap_err();
        assert!(matches!(err, ProviderError::UnsupportedOperation { .. }));
    }

    #[tokio::test]
    async fn test_type_operation_takes_precedence() {
        let ty = host_type("ResTestTypeOp");
        ty.define_provider("local", |def| {
            def.operation("describe", |_| async { Ok(Value::from("provider")) });
        })
        .unwrap();
        ty.define_operation("describe", |_| async { Ok(Value::from("resource")) });

        let r = ty.new_resource("db1", Attributes::new()).unwrap();
        assert_eq!(r.invoke("describe", vec![]).await.unwrap(), Value::from("resource"));
    }

    #[tokio::test]
    async fn test_invoke_without_provider() {
        let ty = host_type("ResTestNoProvider");
        let r = ty.new_resource("db1", Attributes::new()).unwrap();

        let err = r.invoke("sh", vec![]).await.unwrap_err();
        match err {
            ProviderError::UnsupportedOperation { target, operation } => {
                assert_eq!(target, "#<ResTestNoProvider \"db1\">");
                assert_eq!(operation, "sh");
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
