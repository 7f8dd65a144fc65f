//! Error handling for the provisioner
//!
//! Provides centralized error handling with proper error types using thiserror.
//! Every fallible operation in the library returns [`ProvisionError`].

use thiserror::Error;

/// Main error type for image provisioning
#[derive(Error, Debug)]
pub enum ProvisionError {
    /// IO errors (file operations inside the image root, mount point handling)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Missing or invalid command-line input
    #[error("Usage error: {0}")]
    Usage(String),

    /// Configuration errors (loading, parsing, validation)
    #[error("Configuration error: {0}")]
    Config(String),

    /// An external command exited unsuccessfully
    #[error("Command `{command}` failed (exit code {}): {stderr}", display_code(.code))]
    Command {
        command: String,
        code: Option<i32>,
        stderr: String,
    },

    /// Partition mapping output did not have the expected structure
    #[error("Partition mapping error: {0}")]
    Mapping(String),

    /// Host environment or input validation errors
    #[error("Validation error: {0}")]
    Validation(String),

    /// Provision state machine errors
    #[error("State error: {0}")]
    State(String),

    /// A termination signal arrived while provisioning
    #[error("Interrupted by signal {0}")]
    Interrupted(i32),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

fn display_code(code: &Option<i32>) -> String {
    match code {
        Some(code) => code.to_string(),
        None => "none".to_string(),
    }
}

/// Result type alias for provisioning operations
pub type Result<T> = std::result::Result<T, ProvisionError>;

impl ProvisionError {
    /// Create a usage error
    pub fn usage(msg: impl Into<String>) -> Self {
        Self::Usage(msg.into())
    }

    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a mapping error
    pub fn mapping(msg: impl Into<String>) -> Self {
        Self::Mapping(msg.into())
    }

    /// Create a validation error
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Create a state error
    pub fn state(msg: impl Into<String>) -> Self {
        Self::State(msg.into())
    }

    /// Process exit status for this error.
    ///
    /// A failed external command propagates its own exit status, an
    /// interruption maps to `128 + signal`, everything else is 1.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Command { code: Some(code), .. } if *code != 0 => *code,
            Self::Interrupted(sig) => 128 + sig,
            _ => 1,
        }
    }
}
