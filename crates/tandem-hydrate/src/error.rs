use thiserror::Error;

#[derive(Error, Debug)]
pub enum HydrateError {
    #[error("Snapshot serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Malformed hydration markup: {0}")]
    Markup(String),
}

pub type Result<T> = std::result::Result<T, HydrateError>;
