use thiserror::Error;

/// Failure while turning one discovery candidate into a live command.
#[derive(Error, Debug)]
pub enum DiscoveryError {
    #[error("Unable to instantiate command candidate '{candidate}': {reason}")]
    Instantiation { candidate: String, reason: String },

    #[error("Command candidate '{candidate}' reuses the name '{name}'; keeping the first")]
    DuplicateName { candidate: String, name: String },
}

/// Errors reported by the naming client boundary (bridge or test doubles).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NamingError {
    /// Remote endpoint could not be reached.
    #[error("communication failure: {0}")]
    Communication(String),

    /// Environment/protocol mismatch or missing vendor client support.
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("name not found: {0}")]
    NotFound(String),

    #[error("naming error: {0}")]
    Naming(String),
}

#[derive(Error, Debug)]
pub enum ConnectionError {
    #[error("Unknown server type: {key} (available: {available})")]
    UnknownServerType { key: String, available: String },

    #[error("Unable to connect to remote server {url}: {reason}")]
    Unreachable { url: String, reason: String },

    #[error(
        "Unable to create initial context (missing libraries?): {reason}{}",
        .properties.as_deref().map(|p| format!(" ({p})")).unwrap_or_default()
    )]
    Misconfigured {
        reason: String,
        /// Composed property set, only filled in verbose mode.
        properties: Option<String>,
    },
}

#[derive(Error, Debug)]
pub enum ProfileError {
    #[error("Server type already registered: {key}")]
    AlreadyRegistered { key: String },
}

/// Raised by a command while executing against a connection context.
#[derive(Error, Debug)]
pub enum ExecutionError {
    #[error("Missing parameter: --{param}")]
    MissingParameter { param: String },

    #[error("Naming operation failed: {0}")]
    Naming(#[from] NamingError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Error, Debug)]
pub enum RegistryError {
    #[error("No commands available")]
    NoCommandsAvailable,

    #[error("No command was specified")]
    NoCommandSpecified,

    #[error("Unknown command: {name}")]
    UnknownCommand { name: String },

    #[error(transparent)]
    Connection(#[from] ConnectionError),

    #[error("Command '{command}' failed: {source}")]
    Execution {
        command: String,
        #[source]
        source: ExecutionError,
    },
}

impl RegistryError {
    /// Usage-class failures (nothing was attempted against the server).
    pub fn is_usage(&self) -> bool {
        matches!(
            self,
            RegistryError::NoCommandSpecified | RegistryError::UnknownCommand { .. }
        )
    }
}
