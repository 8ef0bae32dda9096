//! The `System` resource type: a host that runs commands.
//!
//! Two providers are declared:
//!
//! - `local` runs commands through the configured shell on this machine
//! - `ssh` runs commands on the remote host through the ssh client program
//!
//! Names such as `db1`, `alice@db1` or `alice:secret@db1` resolve to a
//! `System` through a low-priority pattern; `localhost` gets the `local`
//! provider, everything else `ssh`.

use async_trait::async_trait;
use tracing::warn;

use crate::config::{Config, ShellConfig};
use crate::error::{ProviderError, ProviderResult, ResourceResult};
use crate::pattern::PatternOptions;
use crate::provider::Invocation;
use crate::resource::Resource;
use crate::resource_type::ResourceType;
use crate::shell::{run_command, CommandOutput, CommandSpec};
use crate::value::{Attributes, Value};

/// Name pattern for systems: `[user[:password]@]hostname`.
pub const SYSTEM_PATTERN: &str = r"^(?:([^@:]*)(?::([^@]*))?@)?([A-Za-z0-9.-]+)$";

/// Priority of [`SYSTEM_PATTERN`]; low so that more specific rules win.
pub const SYSTEM_PATTERN_PRIORITY: i32 = -1;

/// Declares the `System` resource type.
pub struct System;

impl System {
    pub const TYPE_NAME: &'static str = "System";

    /// Declare the `System` type with its providers and name pattern.
    pub fn declare(config: ShellConfig) -> ResourceResult<ResourceType> {
        Self::declare_as(Self::TYPE_NAME, config)
    }

    /// Declare a `System` type under a different name.
    pub fn declare_as(name: &str, config: ShellConfig) -> ResourceResult<ResourceType> {
        config.validate().map_err(ProviderError::ConfigurationError)?;

        let ty = ResourceType::builder(name)
            .attributes(["hostname", "username", "password"])
            .initializer(|name, attrs| attrs.insert_default("hostname", name))
            .build();

        let local_config = config.clone();
        ty.define_provider("local", move |def| {
            let config = local_config.clone();
            def.operation("sh", move |call: Invocation| {
                let config = config.clone();
                async move {
                    let command = call.str_arg(0)?;
                    let spec = CommandSpec::new(&config.shell).arg("-c").arg(command);
                    Ok::<_, ProviderError>(run_command(&spec, &config).await?.to_value())
                }
            });
        })?;

        let ssh_config = config;
        ty.define_provider("ssh", move |def| {
            def.on_bind(|resource| {
                if resource.attribute_str("hostname").is_none() {
                    return Err(ProviderError::InitializationFailed(format!(
                        "{} has no hostname",
                        resource
                    )));
                }
                if resource.attribute_str("password").is_some() {
                    warn!(
                        resource = %resource,
                        "Password authentication is not supported by the ssh client; relying on keys"
                    );
                }
                Ok(())
            });

            let config = ssh_config.clone();
            def.operation("sh", move |call: Invocation| {
                let config = config.clone();
                async move {
                    let command = call.str_arg(0)?;
                    let spec = ssh_command(&call.resource, command, &config)?;
                    Ok::<_, ProviderError>(run_command(&spec, &config).await?.to_value())
                }
            });
        })?;

        ty.define_pattern_with(
            SYSTEM_PATTERN,
            PatternOptions::new().with_priority(SYSTEM_PATTERN_PRIORITY),
            |ty, m| {
                let hostname = m.capture(2).unwrap_or(m.name.as_str());
                let provider = if hostname == "localhost" { "local" } else { "ssh" };

                ty.new_resource(
                    &m.name,
                    Attributes::new()
                        .with("provider", provider)
                        .with("hostname", hostname)
                        .with("username", m.capture_value(0))
                        .with("password", m.capture_value(1)),
                )
            },
        )?;

        Ok(ty)
    }
}

/// Build the ssh client invocation for `command` on `resource`.
pub fn ssh_command(resource: &Resource, command: &str, config: &ShellConfig) -> ProviderResult<CommandSpec> {
    let hostname = resource
        .attribute_str("hostname")
        .ok_or_else(|| ProviderError::ConfigurationError(format!("{} has no hostname", resource)))?;
    let username = resource
        .attribute_str("username")
        .filter(|u| !u.is_empty())
        .or_else(|| config.fallback_username());

    let mut spec = CommandSpec::new(&config.ssh_program);
    if let Some(username) = username {
        spec = spec.arg("-l").arg(username);
    }
    Ok(spec.arg("--").arg(hostname).arg(command))
}

/// Typed shell access to a system resource.
#[async_trait]
pub trait Shell {
    /// Execute a command on the system.
    async fn sh(&self, command: &str) -> ProviderResult<CommandOutput>;
}

#[async_trait]
impl Shell for Resource {
    async fn sh(&self, command: &str) -> ProviderResult<CommandOutput> {
        let value = self.invoke("sh", vec![Value::from(command)]).await?;
        CommandOutput::from_value(&value)
    }
}
