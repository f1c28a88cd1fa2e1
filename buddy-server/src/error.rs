use thiserror::Error;

pub type CoreResult<T> = std::result::Result<T, CoreError>;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum CoreError {
    #[error("username already taken: {0}")]
    DuplicateUsername(String),
    #[error("invalid username: {0:?}")]
    InvalidUsername(String),
    #[error("user not found: {0}")]
    UserNotFound(String),
    #[error("a user cannot befriend themselves")]
    SelfFriendship,
    #[error("friendship already exists between {0} and {1}")]
    DuplicateFriendship(String, String),
    #[error("import aborted: {0}")]
    ImportAborted(String),
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
}

/// Any fault raised by a storage backend.
#[derive(Debug, Error, Clone, PartialEq)]
#[error("{0}")]
pub struct StorageError(pub String);

impl From<sled::Error> for StorageError {
    fn from(err: sled::Error) -> Self {
        Self(err.to_string())
    }
}

impl From<serde_json::Error> for StorageError {
    fn from(err: serde_json::Error) -> Self {
        Self(format!("corrupt record: {err}"))
    }
}

impl<T> From<std::sync::PoisonError<T>> for StorageError {
    fn from(_: std::sync::PoisonError<T>) -> Self {
        Self(String::from("store lock poisoned"))
    }
}

impl<T> From<std::sync::PoisonError<T>> for CoreError {
    fn from(err: std::sync::PoisonError<T>) -> Self {
        Self::Storage(err.into())
    }
}
