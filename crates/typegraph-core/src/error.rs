use thiserror::Error;

#[derive(Error, Debug)]
pub enum TypeGraphError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("base type no longer exists in the store: {0}")]
    BaseTypeUnavailable(String),

    #[error("declaration store error: {0}")]
    Store(String),

    #[error("listener error: {0}")]
    Listener(String),
}

pub type Result<T> = std::result::Result<T, TypeGraphError>;
