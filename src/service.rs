//! The `Service` resource type: an operating system service on a system.
//!
//! A service is addressed as `<system>/<service>`, e.g. `db1/postgresql`.
//! The `debian` provider controls it through `/usr/sbin/service` on the
//! owning system.

use async_trait::async_trait;

use crate::error::{ProviderError, ProviderResult, ResourceResult};
use crate::provider::Invocation;
use crate::resource::Resource;
use crate::resource_type::ResourceType;
use crate::shell::{shell_quote, CommandOutput};
use crate::value::{Attributes, Value};

/// Name pattern for services: `<system>/<service>`.
pub const SERVICE_PATTERN: &str = r"^([^/]+)/(.+)$";

/// Declares the `Service` resource type.
pub struct Service;

impl Service {
    pub const TYPE_NAME: &'static str = "Service";

    /// Declare the `Service` type. Systems named in service names are
    /// resolved through `system_type`.
    pub fn declare(system_type: &ResourceType) -> ResourceResult<ResourceType> {
        Self::declare_as(Self::TYPE_NAME, system_type)
    }

    /// Declare a `Service` type under a different name.
    pub fn declare_as(name: &str, system_type: &ResourceType) -> ResourceResult<ResourceType> {
        let ty = ResourceType::builder(name)
            .attributes(["system", "service_name"])
            .build();

        ty.define_provider("debian", |def| {
            def.operation("status", |call| service_command(call, "status"));
            def.operation("restart", |call| service_command(call, "restart"));
        })?;

        let system_type = system_type.clone();
        ty.define_pattern(SERVICE_PATTERN, move |ty, m| {
            let system_name = m.capture(0).unwrap_or_default();
            let system = system_type.get(system_name)?;

            ty.new_resource(
                &m.name,
                Attributes::new()
                    .with("system", system)
                    .with("service_name", m.capture_value(1)),
            )
        })?;

        Ok(ty)
    }
}

/// Run `/usr/sbin/service <name> <action>` on the service's system.
async fn service_command(call: Invocation, action: &'static str) -> ProviderResult<Value> {
    let service = &call.resource;
    let system = service
        .attribute_resource("system")
        .ok_or_else(|| ProviderError::ConfigurationError(format!("{} has no system", service)))?;
    let service_name = service
        .attribute_str("service_name")
        .ok_or_else(|| ProviderError::ConfigurationError(format!("{} has no service_name", service)))?;

    let command = format!("/usr/sbin/service {} {}", shell_quote(&service_name), action);
    system.invoke("sh", vec![Value::from(command)]).await
}

/// Typed control of a service resource.
#[async_trait]
pub trait ServiceControl {
    async fn status(&self) -> ProviderResult<CommandOutput>;

    async fn restart(&self) -> ProviderResult<CommandOutput>;
}

#[async_trait]
impl ServiceControl for Resource {
    async fn status(&self) -> ProviderResult<CommandOutput> {
        CommandOutput::from_value(&self.invoke("status", vec![]).await?)
    }

    async fn restart(&self) -> ProviderResult<CommandOutput> {
        CommandOutput::from_value(&self.invoke("restart", vec![]).await?)
    }
}
