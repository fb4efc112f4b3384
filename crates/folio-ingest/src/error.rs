//! Ingest error types
//!
//! `IngestError` is what the orchestrator surfaces to its caller. Collaborator
//! failures (`StoreError`, `LookupError`, `JobQueueError`) stay typed so the
//! persistence gateway can decide what is worth retrying.

use thiserror::Error;

use crate::graph::EntityId;

/// Result type alias for ingest operations
pub type Result<T> = std::result::Result<T, IngestError>;

/// Errors surfaced by the ingest pipeline
#[derive(Error, Debug)]
pub enum IngestError {
    #[error("Malformed descriptor: {0}")]
    MalformedDescriptor(String),

    #[error("Ordering node '{label}' references unknown file '{reference}'")]
    DanglingOrderingReference { label: String, reference: String },

    #[error("Error retrieving metadata for '{identifier}'")]
    RemoteMetadata {
        identifier: String,
        #[source]
        source: LookupError,
    },

    #[error("Failed to attach content to {target}: {source}")]
    ContentAttach {
        target: EntityId,
        #[source]
        source: ContentFailure,
    },

    #[error("Failed to write metadata for {target}: {source}")]
    MetadataWrite {
        target: EntityId,
        #[source]
        source: StoreError,
    },

    #[error("Failed to persist {target}: {source}")]
    Persistence {
        target: EntityId,
        #[source]
        source: StoreError,
    },

    #[error("Failed to schedule deferred work for {target}: {source}")]
    Scheduling {
        target: EntityId,
        #[source]
        source: JobQueueError,
    },

    #[error("Order given has the wrong number of elements (should be {expected})")]
    OrderMismatch { expected: usize, actual: usize },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid target: {0}")]
    InvalidTarget(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP client error: {0}")]
    HttpClient(#[from] reqwest::Error),
}

impl IngestError {
    /// Identifier of the entity (or external record) the failure concerns
    ///
    /// Lets callers retry or clean up by hand, since nothing is rolled back.
    pub fn offending_identifier(&self) -> Option<&str> {
        match self {
            IngestError::DanglingOrderingReference { reference, .. } => Some(reference),
            IngestError::RemoteMetadata { identifier, .. } => Some(identifier),
            IngestError::ContentAttach { target, .. }
            | IngestError::MetadataWrite { target, .. }
            | IngestError::Persistence { target, .. }
            | IngestError::Scheduling { target, .. } => Some(target.as_str()),
            IngestError::NotFound(id) => Some(id),
            _ => None,
        }
    }
}

/// Object store and search index failures
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// Worth retrying with the identical payload
    #[error("Transient failure during {operation}: {message}")]
    Transient { operation: String, message: String },

    #[error("{operation} rejected (status {status:?}): {message}")]
    Rejected {
        operation: String,
        status: Option<u16>,
        message: String,
    },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl StoreError {
    pub fn transient(operation: &str, message: impl Into<String>) -> Self {
        StoreError::Transient {
            operation: operation.to_string(),
            message: message.into(),
        }
    }

    pub fn rejected(operation: &str, status: Option<u16>, message: impl Into<String>) -> Self {
        StoreError::Rejected {
            operation: operation.to_string(),
            status,
            message: message.into(),
        }
    }

    pub fn is_transient(&self) -> bool {
        matches!(self, StoreError::Transient { .. })
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::Serialization(err.to_string())
    }
}

/// Response markers of a request mangled in transit (bad content type,
/// truncated body, digest mismatch) rather than refused on its merits
const CORRUPTION_MARKERS: &[&str] = &[
    "unsupported contenttype",
    "unsupported content type",
    "malformed",
    "incompletebody",
    "baddigest",
    "invaliddigest",
    "requesttimeout",
];

/// Classify an HTTP failure status into the store error taxonomy
///
/// 5xx, 408 and 429 are transient. A 400 is transient only when the response
/// reads like transport corruption; every other 4xx propagates immediately.
pub fn classify_status(operation: &str, status: u16, detail: &str) -> StoreError {
    match status {
        404 => StoreError::NotFound(format!("{}: {}", operation, detail)),
        408 | 429 | 500..=599 => {
            StoreError::transient(operation, format!("status {}: {}", status, detail))
        },
        400 => {
            let lowered = detail.to_lowercase();
            if CORRUPTION_MARKERS.iter().any(|m| lowered.contains(m)) {
                StoreError::transient(operation, format!("status 400: {}", detail))
            } else {
                StoreError::rejected(operation, Some(status), detail)
            }
        },
        _ => StoreError::rejected(operation, Some(status), detail),
    }
}

/// Reading or storing a file's bytes failed
#[derive(Error, Debug)]
pub enum ContentFailure {
    #[error("could not read {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("could not fetch {uri}: {message}")]
    Fetch { uri: String, message: String },

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Bibliographic lookup failures
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LookupError {
    #[error("no record for '{0}'")]
    NotFound(String),

    #[error("lookup service unavailable: {0}")]
    Unavailable(String),

    #[error("unreadable record: {0}")]
    Malformed(String),
}

/// Job scheduler failures
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum JobQueueError {
    #[error("job queue is closed")]
    Closed,

    #[error("no job queue configured")]
    Unavailable,
}
