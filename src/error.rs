use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("not found")]
    NotFound,

    #[error("already exists")]
    AlreadyExists,

    #[error("token lookup collision")]
    TokenLookupCollision,

    #[error("namespace is the primary namespace of another user")]
    PrimaryNamespaceGrant,

    #[error("invalid token format")]
    InvalidToken,

    #[error("malformed password hash")]
    InvalidHash,

    #[error("token does not match stored hash")]
    HashMismatch,

    #[error("token expired")]
    TokenExpired,

    #[error("path escapes the data directory")]
    PathEscape,

    #[error("unauthorized")]
    Unauthorized,

    #[error("forbidden")]
    Forbidden,

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("invalid configuration: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, Error>;
