use std::path::PathBuf;

/// Errors raised by a simulator collaborator.
///
/// Any of these reaching the control loop is fatal: agent and lane
/// identifiers are meaningless once the simulator connection is gone.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SimulatorError {
    #[error("simulator connection lost")]
    Disconnected,

    #[error("unknown agent '{0}'")]
    UnknownAgent(String),

    #[error("unknown lane '{0}'")]
    UnknownLane(String),

    #[error("invalid phase string '{0}' (expected only r, y, g, G)")]
    InvalidPhase(String),

    #[error("simulator protocol error: {0}")]
    Protocol(String),
}

/// Errors that abort the control loop.
#[derive(Debug, thiserror::Error)]
pub enum ControlError {
    #[error("simulator unavailable: {0}")]
    SimulatorUnavailable(#[from] SimulatorError),

    #[error("state encoder emits {encoder} values but the value function expects {value_function}")]
    DimensionMismatch {
        encoder: usize,
        value_function: usize,
    },

    #[error("action set has {action_set} actions but the value function has {value_function}")]
    ActionCountMismatch {
        action_set: usize,
        value_function: usize,
    },

    #[error("control loop has not been started")]
    NotStarted,

    #[error("control loop has already finished")]
    AlreadyFinished,

    #[error("simulator reports no controlled agents")]
    NoAgents,
}

/// Errors that can occur during checkpoint operations.
#[derive(Debug, thiserror::Error)]
pub enum CheckpointError {
    #[error("no 'latest' symlink found in {0}")]
    NoLatestSymlink(PathBuf),

    #[error("failed to read metadata from {path}: {source}")]
    MetadataRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse metadata from {path}: {source}")]
    MetadataParse {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("failed to save value function: {0}")]
    ModelSave(String),

    #[error("failed to load value function: {0}")]
    ModelLoad(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Errors that can occur when loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    FileRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse TOML: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("config validation error: {0}")]
    Validation(String),
}
