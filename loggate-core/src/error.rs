use thiserror::Error;

pub type Result<T> = std::result::Result<T, GateError>;

#[derive(Error, Debug)]
pub enum GateError {
    /// Never says whether the identity was unknown or the secret was wrong.
    #[error("authentication denied")]
    AuthenticationDenied,

    #[error("malformed request: {0}")]
    MalformedRequest(String),

    #[error("integrity failure: expected {expected}, computed {actual}")]
    IntegrityFailure { expected: String, actual: String },

    #[error("backend unavailable: {0}")]
    BackendUnavailable(String),

    #[error("destination does not exist: {0}")]
    DestinationMissing(String),

    #[error("backend used before configuration")]
    NotConfigured,

    #[error("credential already exists for {0}")]
    AlreadyExists(String),

    #[error("stored secret hash is malformed")]
    InvalidHash,

    #[error("secret hashing failed")]
    HashingFailed,

    #[error("storage error: {0}")]
    Storage(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

impl GateError {
    /// HTTP status the server answers with when this error ends a request.
    pub fn status_code(&self) -> u16 {
        match self {
            GateError::AuthenticationDenied => 401,
            GateError::MalformedRequest(_) => 400,
            // Integrity failures are reported in the body, not the status line.
            GateError::IntegrityFailure { .. } => 200,
            _ => 500,
        }
    }
}

impl From<rusqlite::Error> for GateError {
    fn from(error: rusqlite::Error) -> Self {
        GateError::Storage(error.to_string())
    }
}

impl From<tokio::task::JoinError> for GateError {
    fn from(error: tokio::task::JoinError) -> Self {
        GateError::Internal(format!("blocking task failed: {}", error))
    }
}

impl From<object_store::Error> for GateError {
    fn from(error: object_store::Error) -> Self {
        GateError::BackendUnavailable(error.to_string())
    }
}
