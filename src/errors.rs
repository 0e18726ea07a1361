//! Error types for the commcards application.
//!
//! This module defines custom error types that categorize the failures that
//! can cross the boundary of the card store: storage, parsing, import
//! validation and caller-side input validation. The reducer itself never
//! produces an error.

use std::{io, path::PathBuf};

use thiserror::Error;

/// The main error type for the commcards application.
#[derive(Error, Debug)]
pub enum CardsError {
    /// Errors related to file I/O operations.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Errors related to serialization/deserialization operations.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Imported or stored text is not valid JSON at all.
    #[error("Not valid JSON: {message}")]
    InvalidJson { message: String },

    /// The JSON parsed, but does not have the `{cards: [...], groups: [...]}` shape.
    #[error("Wrong data shape: {message}")]
    InvalidShape { message: String },

    /// The key-value backend refused a read, write or delete.
    #[error("Storage failure for key {key}: {message}")]
    StorageFailed { key: String, message: String },

    /// Errors related to the persistence scheduler.
    #[error("Persistence failed: {message}")]
    PersistenceFailed { message: String },

    /// Input rejected before it reached the store (empty title, bad color, ...).
    #[error("Invalid input: {message}")]
    InvalidInput { message: String },

    /// Card was not found when performing an operation.
    #[error("Card not found: {id}")]
    CardNotFound { id: String },

    /// Group was not found when performing an operation.
    #[error("Group not found: {id}")]
    GroupNotFound { id: String },

    /// Errors related to configuration.
    #[error("Configuration error: {message}")]
    ConfigError { message: String },

    /// Directory creation or access failed.
    #[error("Failed to create or access directory: {path}")]
    DirectoryError { path: PathBuf },

    /// file not found
    #[error("File not found: {file_path}")]
    FileNotFound { file_path: String },

    /// Generic application error with a custom message.
    #[error("{message}")]
    ApplicationError { message: String },
}

impl CardsError {
    /// True for the two import validation failures, which the caller reports
    /// as a rejection rather than an internal fault.
    pub fn is_import_rejection(&self) -> bool {
        matches!(
            self,
            CardsError::InvalidJson { .. } | CardsError::InvalidShape { .. }
        )
    }
}
