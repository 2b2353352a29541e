use thiserror::Error;

#[derive(Error, Debug)]
pub enum PanekeeperError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Session error: {0}")]
    Session(String),

    #[error("IPC error: {0}")]
    Ipc(String),

    #[error("Timed out after {0}ms")]
    Timeout(u64),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Already exists: {0}")]
    AlreadyExists(String),

    #[error("Invalid transition: {0}")]
    InvalidTransition(String),

    #[error("Persistence error: {0}")]
    Persistence(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type PanekeeperResult<T> = Result<T, PanekeeperError>;

impl From<std::io::Error> for PanekeeperError {
    fn from(e: std::io::Error) -> Self {
        PanekeeperError::Internal(e.to_string())
    }
}
