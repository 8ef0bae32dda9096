//! Prelude module for convenient imports.
//!
//! This module re-exports the most commonly used types and traits
//! from Rustadmin for convenient glob imports.
//!
//! # Example
//!
//! ```rust
//! use rustadmin::prelude::*;
//! ```

// Configuration
pub use crate::config::{Config, ShellConfig};

// Resources
pub use crate::resource::Resource;
pub use crate::resource_type::ResourceType;
pub use crate::value::{Attributes, Value};

// Providers
pub use crate::provider::{Invocation, Provider, ProviderDefinition, ProviderExt};
pub use crate::registry::ProviderOptions;

// Resolution
pub use crate::pattern::{PatternMatch, PatternOptions};
pub use crate::scope::{current_scope, global_scope, scope_eval, scope_eval_async, Scope};

// Built-in types
pub use crate::service::{Service, ServiceControl};
pub use crate::shell::CommandOutput;
pub use crate::system::{Shell, System};

// Streams
pub use crate::stream::{create_stream, EventSender, EventStream};

// Errors
pub use crate::error::{ProviderError, ProviderResult, ResourceError, ResourceResult};

// Re-export async_trait for convenience
pub use async_trait::async_trait;
