use std::path::PathBuf;
use thiserror::Error;

use crate::db::DatabaseError;
use crate::metadata::MetadataError;

#[derive(Error, Debug)]
pub enum AudioFetchError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Request rejected: {0}")]
    Request(#[from] RequestError),

    #[error("Extraction error: {0}")]
    Extraction(#[from] ExtractionError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("Metadata error: {0}")]
    Metadata(#[from] MetadataError),

    #[error("Logging setup failed: {0}")]
    Logging(String),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config JSON: {0}")]
    ParseJson(#[from] serde_json::Error),

    #[error("Config validation failed: {message}")]
    Validation { message: String },
}

/// Errors surfaced synchronously to the caller before any job work starts.
#[derive(Error, Debug)]
pub enum RequestError {
    #[error("No URL provided")]
    MissingUrl,

    #[error("Unsupported audio format '{0}'")]
    UnsupportedFormat(String),

    #[error("Could not find a video identifier in '{0}'")]
    IdentifierNotFound(String),

    #[error("Invalid artifact name '{0}'")]
    InvalidArtifactName(String),

    #[error("Store unavailable: {0}")]
    Store(#[from] DatabaseError),
}

impl RequestError {
    /// Store failures are transient; everything else is a bad request.
    pub fn is_retryable(&self) -> bool {
        matches!(self, RequestError::Store(_))
    }
}

#[derive(Error, Debug)]
pub enum ExtractionError {
    #[error("Failed to launch '{program}': {source}")]
    Launch {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{message}")]
    Exhausted { attempts: usize, message: String },

    #[error("Artifact storage failed: {0}")]
    Storage(#[from] StorageError),
}

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Failed to create directory '{path}': {source}")]
    CreateDirectory {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to remove file '{path}': {source}")]
    RemoveFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to read directory '{path}': {source}")]
    ReadDirectory {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to move '{from}' to '{to}': {source}")]
    Promote {
        from: PathBuf,
        to: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

pub type Result<T> = std::result::Result<T, AudioFetchError>;
