use thiserror::Error;

#[derive(Debug, Error)]
pub enum BrowserError {
    #[error("Connection failed: {0}")]
    ConnectionFailure(String),

    #[error("Key '{0}' does not exist")]
    NotFound(String),

    #[error("Index {index} is out of range for list '{key}'")]
    IndexError { key: String, index: usize },

    #[error("Invalid input: {0}")]
    ValidationFailure(String),

    #[error("Operation '{operation}' is not supported on {kind} keys")]
    TypeMismatch {
        operation: &'static str,
        kind: &'static str,
    },

    #[error("Key '{key}' has unsupported type '{type_name}'")]
    UnsupportedType { key: String, type_name: String },

    #[error("Unexpected reply from {command}: {detail}")]
    MalformedReply {
        command: &'static str,
        detail: String,
    },

    #[error("Store call timed out")]
    Timeout,

    #[error("Store error: {0}")]
    Store(#[source] redis::RedisError),

    #[error("Profile store error: {0}")]
    Profile(String),
}

pub type BrowserResult<T> = Result<T, BrowserError>;

impl From<redis::RedisError> for BrowserError {
    fn from(e: redis::RedisError) -> Self {
        if e.is_io_error()
            || e.is_connection_refusal()
            || e.is_connection_dropped()
            || is_auth_rejection(&e)
        {
            BrowserError::ConnectionFailure(e.to_string())
        } else {
            BrowserError::Store(e)
        }
    }
}

fn is_auth_rejection(e: &redis::RedisError) -> bool {
    let message = e.to_string();
    ["NOAUTH", "WRONGPASS", "invalid password", "Authentication"]
        .iter()
        .any(|marker| message.contains(marker))
}

impl From<std::io::Error> for BrowserError {
    fn from(e: std::io::Error) -> Self {
        BrowserError::Profile(e.to_string())
    }
}
