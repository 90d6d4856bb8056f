//! Error types for Engram

use thiserror::Error;

/// Main error type for memory operations
#[derive(Error, Debug)]
pub enum MemoryError {
    /// Record store errors (SQLite, file system, etc.)
    #[error("Record store error: {0}")]
    Record(String),

    /// Semantic index errors (LanceDB, vector search)
    #[error("Index error: {0}")]
    Index(String),

    /// Embedding generation errors
    #[error("Embedding error: {0}")]
    Embedding(String),

    /// Text generation errors (summarization backend)
    #[error("Generation error: {0}")]
    Generation(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Database errors
    #[error("Database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Connection pool errors
    #[error("Connection pool error: {0}")]
    Pool(#[from] r2d2::Error),
}

/// Result type alias for memory operations
pub type Result<T> = std::result::Result<T, MemoryError>;
