use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read env file {path}: {source}")]
    EnvFile {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid env file: empty key at line {0}")]
    EmptyKey(usize),

    #[error("Invalid env file: malformed line {0} (expected KEY=VALUE)")]
    MalformedLine(usize),

    #[error("Invalid value '{value}' for {key}: {reason}")]
    InvalidValue {
        key: String,
        value: String,
        reason: String,
    },

    #[error("Could not determine the home directory")]
    NoHomeDir,
}
