//! Error types for the state store.

use crate::types::OperationId;
use thiserror::Error;

/// Main error type for state store operations.
#[derive(Debug, Error)]
pub enum StateError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid tag: {0:?}")]
    InvalidTag(String),

    #[error("Invalid operation: {0}")]
    InvalidOperation(String),

    #[error("Operation already recorded: {0}")]
    DuplicateOperation(OperationId),

    #[error("Operation not found: {0}")]
    OperationNotFound(OperationId),

    #[error("Type mismatch: expected {expected}, got {got}")]
    TypeMismatch { expected: String, got: String },

    #[error("Unknown value type: {0}")]
    UnknownValueType(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Deserialization error: {0}")]
    Deserialization(String),

    #[error("Corruption detected: {0}")]
    Corruption(String),

    #[error("Invalid save format: {0}")]
    InvalidFormat(String),

    #[error("Checksum mismatch: expected {expected}, got {got}")]
    ChecksumMismatch { expected: u32, got: u32 },

    #[error("Save slot is locked by another process")]
    Locked,

    #[error("Configuration error: {0}")]
    Config(String),
}

impl From<serde_json::Error> for StateError {
    fn from(e: serde_json::Error) -> Self {
        StateError::Serialization(e.to_string())
    }
}

impl From<rmp_serde::encode::Error> for StateError {
    fn from(e: rmp_serde::encode::Error) -> Self {
        StateError::Serialization(e.to_string())
    }
}

impl From<rmp_serde::decode::Error> for StateError {
    fn from(e: rmp_serde::decode::Error) -> Self {
        StateError::Deserialization(e.to_string())
    }
}

/// Result type for state store operations.
pub type Result<T> = std::result::Result<T, StateError>;
