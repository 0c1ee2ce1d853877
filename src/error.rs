use thiserror::Error;

#[derive(Debug, Error)]
pub enum RemindBotError {
    #[error("validation error: {0}")]
    Validation(String),
    #[error("admission denied: {0}")]
    AdmissionDenied(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("dispatch error: {0}")]
    Dispatch(String),
    #[error("storage error: {0}")]
    Storage(String),
    #[error("configuration error: {0}")]
    Config(String),
    #[error("serialization error: {0}")]
    Serialization(String),
}

impl From<diesel::result::Error> for RemindBotError {
    fn from(err: diesel::result::Error) -> Self {
        RemindBotError::Storage(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, RemindBotError>;
