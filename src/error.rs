//! Error types used by the hostvisor runtime, its plugins and collaborators.
//!
//! The taxonomy follows how failures are handled:
//!
//! - [`ConfigError`], [`StoreError`]: configuration problems, fatal at configure time.
//! - [`ContainerError`]: container runtime failures, recovered by the restart loop.
//! - [`PluginError`]: failures surfaced by a plugin's configure/run/stop.
//! - [`RegistryError`]: what the host process sees; any of these ends the process.
//!
//! Every enum provides `as_label` (a short stable snake_case label for logs/metrics).

use std::path::PathBuf;

use thiserror::Error;

/// # Errors produced while loading or validating [`Config`](crate::Config).
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum ConfigError {
    /// The configuration file could not be read.
    #[error("failed to read config {path}: {source}")]
    Read {
        /// Path of the file.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// The configuration file is not valid TOML for [`Config`](crate::Config).
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    /// A field holds a value the runtime cannot work with.
    #[error("invalid config field `{field}`: {reason}")]
    Invalid {
        /// Dotted field path (e.g. `supervisor.backoff_ms`).
        field: &'static str,
        /// What is wrong with it.
        reason: String,
    },

    /// The global log subscriber could not be installed.
    #[error("failed to initialize logging: {0}")]
    Logging(String),
}

impl ConfigError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            ConfigError::Read { .. } => "config_read",
            ConfigError::Parse(_) => "config_parse",
            ConfigError::Invalid { .. } => "config_invalid",
            ConfigError::Logging(_) => "config_logging",
        }
    }
}

/// # Errors produced by a [`ServiceStore`](crate::ServiceStore).
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum StoreError {
    /// The services directory could not be listed.
    #[error("failed to list services in {path}: {source}")]
    ReadDir {
        /// Directory that was listed.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// A bundle has no readable `config.json`.
    #[error("failed to read bundle spec {path}: {source}")]
    ReadSpec {
        /// Path of the spec file.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// A bundle's `config.json` is not a valid OCI spec.
    #[error("invalid bundle spec {path}: {source}")]
    InvalidSpec {
        /// Path of the spec file.
        path: PathBuf,
        /// Decoder error.
        source: serde_json::Error,
    },

    /// Two services share the same id.
    #[error("duplicate service id `{0}`")]
    DuplicateId(String),
}

impl StoreError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            StoreError::ReadDir { .. } => "store_read_dir",
            StoreError::ReadSpec { .. } => "store_read_spec",
            StoreError::InvalidSpec { .. } => "store_invalid_spec",
            StoreError::DuplicateId(_) => "store_duplicate_id",
        }
    }
}

/// # Errors produced by a container handle or a container runtime binding.
///
/// These never reach the registry: the supervisor's restart loop turns them
/// into `ServiceExited` events and log records.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum ContainerError {
    /// Local I/O failure (pipes, capture setup).
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// The runtime binary could not be started.
    #[error("failed to spawn runtime for `{op}`: {source}")]
    Spawn {
        /// Runtime operation (`run`, `kill`, `state`, ...).
        op: &'static str,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// The runtime ran but reported a failure.
    #[error("runtime `{op}` failed (code {code:?}): {stderr}")]
    Runtime {
        /// Runtime operation.
        op: &'static str,
        /// Exit code of the runtime command, if any.
        code: Option<i32>,
        /// Captured diagnostic output.
        stderr: String,
    },

    /// The runtime produced output that could not be decoded.
    #[error("failed to decode `{op}` output: {source}")]
    Decode {
        /// Runtime operation.
        op: &'static str,
        /// Decoder error.
        source: serde_json::Error,
    },

    /// The container is not running.
    #[error("container `{id}` is not running")]
    NotRunning {
        /// Container id.
        id: String,
    },

    /// The run was cancelled before the container was started.
    #[error("start of container `{id}` was cancelled")]
    Cancelled {
        /// Container id.
        id: String,
    },

    /// Preparing or cleaning up a bundle mount failed.
    #[error("mount operation on {path} failed: {source}")]
    Mount {
        /// Mount target.
        path: PathBuf,
        /// Errno reported by the kernel.
        source: nix::Error,
    },

    /// The operation is not available on this platform.
    #[error("unsupported: {0}")]
    Unsupported(&'static str),
}

impl ContainerError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            ContainerError::Io(_) => "container_io",
            ContainerError::Spawn { .. } => "container_spawn",
            ContainerError::Runtime { .. } => "container_runtime",
            ContainerError::Decode { .. } => "container_decode",
            ContainerError::NotRunning { .. } => "container_not_running",
            ContainerError::Cancelled { .. } => "container_cancelled",
            ContainerError::Mount { .. } => "container_mount",
            ContainerError::Unsupported(_) => "container_unsupported",
        }
    }
}

/// # Errors produced by plugins.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum PluginError {
    /// An operation requires `configure` to have succeeded first.
    #[error("plugin is not configured")]
    NotConfigured,

    /// `configure` was called twice.
    #[error("plugin is already configured")]
    AlreadyConfigured,

    /// `run` was called while a previous run is still active or after stop.
    #[error("plugin is already running")]
    AlreadyRunning,

    /// `stop` was called on a plugin that is already stopped.
    #[error("plugin is already stopped")]
    AlreadyStopped,

    /// Configuration could not be used.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The service store failed.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// A container operation failed.
    #[error(transparent)]
    Container(#[from] ContainerError),

    /// No managed service has the requested id.
    #[error("unknown service `{0}`")]
    UnknownService(String),

    /// A remote method name is not in the plugin's method table.
    #[error("unknown method `{0}`")]
    UnknownMethod(String),

    /// Remote call arguments could not be decoded.
    #[error("invalid arguments: {0}")]
    InvalidArgs(String),

    /// The plugin's run future panicked.
    #[error("plugin panicked: {0}")]
    Panicked(String),

    /// Free-form failure reported by a plugin.
    #[error("{0}")]
    Failed(String),
}

impl PluginError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            PluginError::NotConfigured => "plugin_not_configured",
            PluginError::AlreadyConfigured => "plugin_already_configured",
            PluginError::AlreadyRunning => "plugin_already_running",
            PluginError::AlreadyStopped => "plugin_already_stopped",
            PluginError::Config(_) => "plugin_config",
            PluginError::Store(_) => "plugin_store",
            PluginError::Container(_) => "plugin_container",
            PluginError::UnknownService(_) => "plugin_unknown_service",
            PluginError::UnknownMethod(_) => "plugin_unknown_method",
            PluginError::InvalidArgs(_) => "plugin_invalid_args",
            PluginError::Panicked(_) => "plugin_panicked",
            PluginError::Failed(_) => "plugin_failed",
        }
    }
}

/// # Errors produced by the plugin [`Registry`](crate::Registry).
///
/// The host process must treat every variant as terminal and exit non-zero.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum RegistryError {
    /// A plugin with the same name is already registered.
    #[error("plugin with name `{0}` is already registered")]
    DuplicateName(String),

    /// A plugin failed to configure.
    #[error("failed to configure plugin `{name}`: {source}")]
    Configure {
        /// Plugin name.
        name: String,
        /// What the plugin reported.
        source: PluginError,
    },

    /// A plugin's run returned an error.
    #[error("plugin `{name}` failed: {source}")]
    Plugin {
        /// Plugin name.
        name: String,
        /// What the plugin reported.
        source: PluginError,
    },

    /// A plugin's stop returned an error.
    #[error("failed to stop plugin `{name}`: {source}")]
    Stop {
        /// Plugin name.
        name: String,
        /// What the plugin reported.
        source: PluginError,
    },

    /// A remote call into a plugin failed.
    #[error("call `{name}.{method}` failed: {source}")]
    Call {
        /// Plugin name.
        name: String,
        /// Method name.
        method: String,
        /// What the plugin reported.
        source: PluginError,
    },

    /// No plugin with the given name is registered.
    #[error("no plugin named `{0}` is registered")]
    UnknownPlugin(String),

    /// The plugin exists but is not remotely callable.
    #[error("plugin `{0}` is not remotely callable")]
    NotRemote(String),
}

impl RegistryError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    ///
    /// # Example
    /// ```
    /// use hostvisor::RegistryError;
    ///
    /// let err = RegistryError::DuplicateName("supervisor".into());
    /// assert_eq!(err.as_label(), "registry_duplicate_name");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            RegistryError::DuplicateName(_) => "registry_duplicate_name",
            RegistryError::Configure { .. } => "registry_configure",
            RegistryError::Plugin { .. } => "registry_plugin",
            RegistryError::Stop { .. } => "registry_stop",
            RegistryError::Call { .. } => "registry_call",
            RegistryError::UnknownPlugin(_) => "registry_unknown_plugin",
            RegistryError::NotRemote(_) => "registry_not_remote",
        }
    }
}
