//! Error types for brokkr-core

use thiserror::Error;

/// Result type alias using brokkr-core's Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Core error types for Brokkr
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration file not found
    #[error("Configuration file not found: {path}")]
    ConfigNotFound { path: String },

    /// Invalid configuration value
    #[error("Invalid configuration: {message}")]
    InvalidConfig { message: String },

    /// YAML parsing error
    #[error("YAML parsing error: {0}")]
    YamlParse(#[from] serde_yaml_ng::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Executable missing from PATH
    #[error("Command not found: {program}")]
    CommandNotFound { program: String },

    /// External command could not be spawned or waited on
    #[error("Failed to run {program}: {source}")]
    CommandSpawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// Could not determine the home directory
    #[error("Could not determine home directory")]
    HomeDirNotFound,
}

impl Error {
    /// Create a config not found error
    pub fn config_not_found(path: impl Into<String>) -> Self {
        Self::ConfigNotFound { path: path.into() }
    }

    /// Create an invalid config error
    pub fn invalid_config(message: impl Into<String>) -> Self {
        Self::InvalidConfig {
            message: message.into(),
        }
    }

    /// Create a spawn error, mapping `NotFound` to [`Error::CommandNotFound`]
    pub fn command_spawn(program: impl Into<String>, source: std::io::Error) -> Self {
        let program = program.into();
        if source.kind() == std::io::ErrorKind::NotFound {
            Self::CommandNotFound { program }
        } else {
            Self::CommandSpawn { program, source }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_spawn_not_found_maps_to_command_not_found() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        let err = Error::command_spawn("op", io);
        assert!(matches!(err, Error::CommandNotFound { ref program } if program == "op"));
        assert_eq!(err.to_string(), "Command not found: op");
    }

    #[test]
    fn test_command_spawn_other_errors_keep_source() {
        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let err = Error::command_spawn("op", io);
        assert!(matches!(err, Error::CommandSpawn { .. }));
        assert!(err.to_string().contains("denied"));
    }
}
