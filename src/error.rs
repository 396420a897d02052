//! Error types for dcf-leads.
//!
//! Each boundary owns one enum. Failures are handled where they occur; the
//! top-level [`Error`] only exists so the CLI can report any of them uniformly.

use std::time::Duration;

/// Top-level error type for the library.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Persistence error: {0}")]
    Database(#[from] DatabaseError),

    #[error("Workflow error: {0}")]
    Workflow(#[from] WorkflowError),

    #[error("Transcript error: {0}")]
    Transcript(#[from] TranscriptError),

    #[error("Invalid lead: {0}")]
    Validation(#[from] LeadValidationError),

    #[error("Lead edit rejected: {0}")]
    Edit(#[from] EditError),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("Failed to parse settings file {path}: {message}")]
    ParseError { path: String, message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Durable store failures (reads and writes against the leads table).
#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    #[error("Store is not configured: {0}")]
    NotConfigured(String),

    #[error("Request to store failed: {0}")]
    Transport(String),

    #[error("Store rejected request with status {status}: {message}")]
    Rejected { status: u16, message: String },

    #[error("Entity not found: {entity} with id {id}")]
    NotFound { entity: String, id: String },

    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Object storage failures.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("Object storage is not configured: {0}")]
    NotConfigured(String),

    #[error("Object already exists at '{path}'")]
    AlreadyExists { path: String },

    #[error("Upload request failed: {0}")]
    Transport(String),

    #[error("Object storage rejected request with status {status}: {message}")]
    Rejected { status: u16, message: String },
}

/// Change-notification channel failures. These are logged, never surfaced.
#[derive(Debug, thiserror::Error)]
pub enum RealtimeError {
    #[error("Realtime is not configured: {0}")]
    NotConfigured(String),

    #[error("WebSocket error: {0}")]
    Socket(String),

    #[error("Channel join for '{topic}' was refused: {reason}")]
    JoinRefused { topic: String, reason: String },

    #[error("Malformed realtime message: {0}")]
    Decode(String),

    #[error("No heartbeat reply within {0:?}")]
    HeartbeatTimeout(Duration),
}

/// Workflow trigger failures.
#[derive(Debug, thiserror::Error)]
pub enum WorkflowError {
    #[error("Webhook URL for {workflow} is not configured")]
    NotConfigured { workflow: &'static str },

    #[error("Webhook request failed: {status} {reason}")]
    Dispatch { status: u16, reason: String },

    #[error("Webhook request could not be sent: {0}")]
    Transport(String),

    #[error("{workflow} is already running for lead {lead_id}")]
    AlreadyRunning {
        lead_id: String,
        workflow: &'static str,
    },
}

/// Transcript upload failures. No partial state is left behind on any of these.
#[derive(Debug, thiserror::Error)]
pub enum TranscriptError {
    #[error("Only .txt files are allowed (got '{file_name}')")]
    UnsupportedFormat { file_name: String },

    #[error("File size must be less than 10MB (got {size} bytes)")]
    FileTooLarge { size: u64 },

    #[error("Failed to read transcript file: {0}")]
    Read(#[from] std::io::Error),

    #[error("Failed to write transcript file: {0}")]
    Write(std::io::Error),

    #[error("Failed to store transcript: {0}")]
    Storage(#[from] StorageError),

    #[error("Failed to save transcript on lead: {0}")]
    Persistence(#[from] DatabaseError),

    #[error("Lead {0} no longer exists")]
    LeadMissing(String),
}

/// Rejections for a new-lead submission.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LeadValidationError {
    #[error("{field} is required")]
    MissingField { field: &'static str },
}

/// Rejections for user edits that the detail view refuses before any round trip.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EditError {
    #[error("Upload transcript first")]
    TranscriptRequired,

    #[error("{field} is already being updated")]
    InFlight { field: &'static str },
}

/// Result type alias for the library.
pub type Result<T> = std::result::Result<T, Error>;
