use thiserror::Error;

pub type Result<T> = std::result::Result<T, GroundingError>;

#[derive(Error, Debug)]
pub enum GroundingError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Embedding error: {0}")]
    Embedding(String),

    #[error("Extraction error: {0}")]
    Extraction(String),

    #[error("Index error: {0}")]
    Index(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Other error: {0}")]
    Other(#[from] anyhow::Error),
}

pub mod chunker;
pub mod commands;
pub mod config;
pub mod coverage;
pub mod embeddings;
pub mod ingest;
pub mod retriever;
pub mod store;
