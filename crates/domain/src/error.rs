/// Shared error type used across all SessionGuard crates.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("provider: {0}")]
    Provider(String),

    #[error("storage: {0}")]
    Storage(String),

    #[error("token: {0}")]
    Token(String),

    #[error("auth: {0}")]
    Auth(String),

    #[error("timeout: {0}")]
    Timeout(String),

    #[error("JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("session corruption: {0}")]
    Corruption(String),

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, Error>;
