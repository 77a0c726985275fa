use thiserror::Error;

#[derive(Error, Debug)]
pub enum NlqError {
    #[error("Introspection error: {0}")]
    Introspection(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Gateway error: {0}")]
    Gateway(String),

    #[error("Synthesis error: {0}")]
    Synthesis(String),

    #[error("Unsafe query: {0}")]
    UnsafeQuery(String),

    #[error("Execution error: {0}")]
    Execution(String),

    #[error("Config error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, NlqError>;
