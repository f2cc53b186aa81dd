use thiserror::Error;

/// CLI-level error categories mapped to exit codes.
#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Validation(#[from] ferroscan_core::ValidationError),

    #[error(transparent)]
    Config(#[from] ferroscan_core::ConfigError),

    #[error("invalid input: {0}")]
    Input(String),

    #[error(transparent)]
    Serialization(#[from] serde_json::Error),

    #[error("failed to read '{path}': {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl CliError {
    pub const fn exit_code(&self) -> u8 {
        match self {
            Self::Validation(_) => 2,
            Self::Config(_) => 2,
            Self::Input(_) => 2,
            Self::Serialization(_) => 4,
            Self::Read { .. } => 10,
            Self::Io(_) => 10,
        }
    }
}
