use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    /// Network or transport failure while retrieving a document.
    #[error("fetch error: {0}")]
    Fetch(String),

    /// The retrieved bytes are not a well-formed feed document.
    #[error("parse error: {0}")]
    Parse(String),

    /// No known layout matched a published-date text.
    #[error("couldn't parse date: {0:?}")]
    Date(String),

    /// An entry with the same link is already stored.
    #[error("duplicate entry: {0}")]
    Duplicate(String),

    #[error("database error: {0}")]
    Database(#[from] tokio_rusqlite::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("{0} not found")]
    NotFound(String),
}

pub type Result<T> = std::result::Result<T, AppError>;
