//! Error types for homelab

use thiserror::Error;

/// Main error type for homelab
#[derive(Error, Debug)]
pub enum LabError {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Remote host could not be reached; raised before any mutation
    #[error("Cannot connect to {host}: {reason}")]
    Connectivity { host: String, reason: String },

    /// Package installation failed
    #[error("Installation failed: {0}")]
    Install(String),

    /// A mutating command (mount, export append, cluster create, start) failed
    #[error("Mutation failed: {0}")]
    Mutation(String),

    /// A verification read-back command could not be executed successfully
    #[error("Verification failed: {0}")]
    Verification(String),

    /// External command exited with a non-zero status
    #[error("Command `{command}` failed (exit {}): {output}", exit_label(.code))]
    CommandFailed {
        command: String,
        code: Option<i32>,
        output: String,
    },

    /// External program could not be started
    #[error("Failed to spawn `{program}`: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// Step graph error (duplicate, unknown dependency, cycle)
    #[error("Step graph error: {0}")]
    Graph(String),

    /// A step aborted
    #[error("Step '{step}' failed: {source}")]
    StepFailed {
        step: String,
        #[source]
        source: Box<LabError>,
    },

    /// Network error
    #[error("Network error: {0}")]
    Network(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl LabError {
    /// Wrap an error with the id of the step it aborted
    pub fn in_step(self, step: impl Into<String>) -> Self {
        LabError::StepFailed {
            step: step.into(),
            source: Box::new(self),
        }
    }
}

fn exit_label(code: &Option<i32>) -> String {
    match code {
        Some(code) => code.to_string(),
        None => "signal".to_string(),
    }
}

/// Result type for homelab operations
pub type LabResult<T> = Result<T, LabError>;

impl From<serde_json::Error> for LabError {
    fn from(err: serde_json::Error) -> Self {
        LabError::Serialization(err.to_string())
    }
}

impl From<toml::de::Error> for LabError {
    fn from(err: toml::de::Error) -> Self {
        LabError::Config(err.to_string())
    }
}

impl From<toml::ser::Error> for LabError {
    fn from(err: toml::ser::Error) -> Self {
        LabError::Serialization(err.to_string())
    }
}

impl From<config::ConfigError> for LabError {
    fn from(err: config::ConfigError) -> Self {
        LabError::Config(err.to_string())
    }
}
