//! Configuration for providers.
//!
//! Provider implementations take their settings from a [`Config`]
//! implementation captured when the provider is declared.

use std::time::Duration;

/// Base trait for configuration types.
///
/// # Example
///
/// ```rust
/// use rustadmin::Config;
/// use std::time::Duration;
///
/// #[derive(Debug, Clone)]
/// struct ApiConfig {
///     endpoint: String,
///     timeout_ms: u64,
/// }
///
/// impl Config for ApiConfig {
///     fn name(&self) -> &str {
///         &self.endpoint
///     }
///
///     fn timeout(&self) -> Option<Duration> {
///         Some(Duration::from_millis(self.timeout_ms))
///     }
///
///     fn validate(&self) -> Result<(), String> {
///         if self.endpoint.is_empty() {
///             return Err("endpoint must not be empty".to_string());
///         }
///         Ok(())
///     }
/// }
/// ```
pub trait Config: Send + Sync {
    /// Returns the configuration name/identifier.
    fn name(&self) -> &str {
        "default"
    }

    /// Returns the timeout duration, if configured.
    fn timeout(&self) -> Option<Duration> {
        None
    }

    /// Returns whether verbose output is enabled.
    fn is_verbose(&self) -> bool {
        false
    }

    /// Returns whether debug mode is enabled.
    fn is_debug(&self) -> bool {
        false
    }

    /// Validates the configuration.
    ///
    /// Returns Ok(()) if valid, or an error message describing the issue.
    fn validate(&self) -> Result<(), String> {
        Ok(())
    }
}

/// Settings for providers that execute commands.
#[derive(Debug, Clone)]
pub struct ShellConfig {
    /// Configuration name
    pub name: String,
    /// Shell used by the local provider (invoked as `<shell> -c <command>`)
    pub shell: String,
    /// ssh client program used by the ssh provider
    pub ssh_program: String,
    /// Login used over ssh when the resource has no username
    pub default_username: Option<String>,
    /// Command timeout in milliseconds
    pub timeout_ms: Option<u64>,
    /// Capacity of the command output channel
    pub buffer_size: usize,
    /// Verbose output flag
    pub verbose: bool,
    /// Debug mode flag
    pub debug: bool,
}

impl Default for ShellConfig {
    fn default() -> Self {
        Self {
            name: "shell".to_string(),
            shell: "/bin/sh".to_string(),
            ssh_program: "ssh".to_string(),
            default_username: None,
            timeout_ms: None,
            buffer_size: 100,
            verbose: false,
            debug: false,
        }
    }
}

impl ShellConfig {
    /// Create a new default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the configuration name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Set the local shell program.
    pub fn with_shell(mut self, shell: impl Into<String>) -> Self {
        self.shell = shell.into();
        self
    }

    /// Set the ssh client program.
    pub fn with_ssh_program(mut self, program: impl Into<String>) -> Self {
        self.ssh_program = program.into();
        self
    }

    /// Set the fallback ssh login.
    pub fn with_default_username(mut self, username: impl Into<String>) -> Self {
        self.default_username = Some(username.into());
        self
    }

    /// Set the timeout in milliseconds.
    pub fn with_timeout_ms(mut self, ms: u64) -> Self {
        self.timeout_ms = Some(ms);
        self
    }

    /// Set the timeout duration.
    pub fn with_timeout(mut self, duration: Duration) -> Self {
        self.timeout_ms = Some(duration.as_millis() as u64);
        self
    }

    /// Set the output channel capacity.
    pub fn with_buffer_size(mut self, size: usize) -> Self {
        self.buffer_size = size;
        self
    }

    /// Enable verbose output.
    pub fn verbose(mut self) -> Self {
        self.verbose = true;
        self
    }

    /// Enable debug mode.
    pub fn debug(mut self) -> Self {
        self.debug = true;
        self
    }

    /// The login for ssh: the configured default, else `$USER`.
    pub fn fallback_username(&self) -> Option<String> {
        self.default_username
            .clone()
            .or_else(|| std::env::var("USER").ok().filter(|u| !u.is_empty()))
    }
}

impl Config for ShellConfig {
    fn name(&self) -> &str {
        if self.name.is_empty() {
            "default"
        } else {
            &self.name
        }
    }

    fn timeout(&self) -> Option<Duration> {
        self.timeout_ms.map(Duration::from_millis)
    }

    fn is_verbose(&self) -> bool {
        self.verbose
    }

    fn is_debug(&self) -> bool {
        self.debug
    }

    fn validate(&self) -> Result<(), String> {
        if self.shell.is_empty() {
            return Err("shell must not be empty".to_string());
        }
        if self.ssh_program.is_empty() {
            return Err("ssh_program must not be empty".to_string());
        }
        if self.buffer_size == 0 {
            return Err("buffer_size must be greater than 0".to_string());
        }
        Ok(())
    }
}
