//! # Rustadmin
//!
//! **Rustadmin** is a library for describing administered things (hosts,
//! services, accounts) as typed, named resources whose behavior comes from
//! pluggable providers.
//!
//! ## Overview
//!
//! - **Resource types** declare accepted attributes, an optional ancestor
//!   type, and own a set of named providers and pattern rules
//! - **Providers** are built by per-type factories from accumulated
//!   operation definitions and bound to exactly one resource each
//! - **Scopes** hold explicitly registered resources, chain to a parent and
//!   are activated on a task-local scope stack
//! - **Resolution** turns a type and a name into a resource: explicit
//!   registrations first, then pattern rules, walking both scopes and
//!   ancestor types
//!
//! ## Quick Start
//!
//! ```rust
//! use rustadmin::{Attributes, ResourceType, Scope};
//!
//! let host = ResourceType::builder("QuickStartHost")
//!     .attributes(["hostname", "username"])
//!     .build();
//!
//! host.define_provider("ssh", |def| {
//!     def.on_bind(|resource| match resource.attribute_str("hostname") {
//!         Some(_) => Ok(()),
//!         None => Err("hostname required".into()),
//!     });
//! })
//! .unwrap();
//!
//! host.define_pattern(r"(\w+)@(.+)", |ty, m| {
//!     ty.create(
//!         &m.name,
//!         Attributes::new()
//!             .with("username", m.capture_value(0))
//!             .with("hostname", m.capture_value(1)),
//!     )
//! })
//! .unwrap();
//!
//! Scope::enter(|_| {
//!     let db = host.get("alice@db1").unwrap();
//!     assert_eq!(db.attribute_str("hostname").as_deref(), Some("db1"));
//!     assert_eq!(db.provider_name().as_deref(), Some("ssh"));
//! });
//! ```
//!
//! ## Built-in types
//!
//! - [`System`]: a host reached through the `local` or `ssh` provider
//! - [`Service`]: an operating system service on a system

mod config;
mod error;
mod pattern;
mod provider;
mod registry;
mod resource;
mod resource_type;
mod scope;
mod service;
mod shell;
pub mod stream;
mod system;
mod value;

pub mod prelude;

// Re-export core types
pub use config::{Config, ShellConfig};
pub use error::{ProviderError, ProviderResult, ResourceError, ResourceResult};
pub use pattern::{Generator, PatternMatch, PatternOptions, PatternRule, PatternTable};
pub use provider::{
    DeclaredProvider, Invocation, Operation, Provider, ProviderDefinition, ProviderExt,
};
pub use registry::{ProviderFactory, ProviderOptions, ProviderRegistry};
pub use resource::{Resource, WeakResource};
pub use resource_type::{
    Ancestors, ResourceType, ResourceTypeBuilder, PROVIDER_ATTRIBUTE, ROOT_TYPE_NAME,
};
pub use scope::{current_scope, global_scope, scope_eval, scope_eval_async, Scope, ScopeStack};
pub use service::{Service, ServiceControl, SERVICE_PATTERN};
pub use shell::{collect_output, run_command, spawn_command, CommandEvent, CommandOutput, CommandSpec};
pub use stream::{create_stream, EventSender, EventStream};
pub use system::{ssh_command, Shell, System, SYSTEM_PATTERN, SYSTEM_PATTERN_PRIORITY};
pub use value::{Attributes, Value};

// Re-export async-trait for convenience
pub use async_trait::async_trait;
