//! Error types for asset synchronization.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur during a sync pass.
#[derive(Error, Debug)]
pub enum SyncError {
    /// I/O error while reading, writing or deleting local files.
    #[error(transparent)]
    IoError(#[from] io::Error),

    /// Transport-level HTTP failure (timeout, connection error). Retryable.
    #[error(transparent)]
    ReqwestError(#[from] reqwest::Error),

    /// The remote answered 429. Retryable after a fixed wait.
    #[error("Rate limited by {url}")]
    RateLimited { url: String },

    /// The body ended before `Content-Length` bytes arrived. Retryable.
    #[error("File size mismatch for {url}: expected {expected} bytes, got {received} bytes")]
    IncompleteBody {
        url: String,
        expected: u64,
        received: u64,
    },

    /// A transient failure kept happening until the retry budget ran out.
    #[error("Request to {url} failed after {attempts} attempts: {source}")]
    RetriesExhausted {
        url: String,
        attempts: usize,
        #[source]
        source: Box<SyncError>,
    },

    /// Non-2xx response other than 429. Never retried.
    #[error("Figma API error (HTTP {status}): {body}")]
    Api { status: u16, body: String },

    /// The requested node id does not exist in the remote file.
    #[error("The node {node_id} was not found in file with key {file_key}")]
    NodeNotFound { file_key: String, node_id: String },

    /// The remote returned something that cannot be used.
    #[error("Malformed response: {0}")]
    MalformedResponse(String),

    /// The document's source URL does not have the expected shape.
    #[error("Invalid Figma URL '{url}': {reason}")]
    InvalidSourceUrl { url: String, reason: String },

    /// The token cannot be sent as a header value.
    #[error("Invalid API token: {0}")]
    InvalidToken(String),

    /// The format cannot be compared against an existing file.
    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    /// A node's name is empty once illegal characters are removed.
    #[error("Element {node_id} does not have a name defined. Check {url}")]
    EmptyName { node_id: String, url: String },

    /// Two nodes map to the same file name in one format pass.
    #[error("Duplicated element with name '{name}' at {url}")]
    DuplicateName { name: String, url: String },

    /// Image decoding or hashing failed.
    #[error("Failed to decode image {path}: {reason}")]
    Image { path: PathBuf, reason: String },

    /// SVG parsing or rasterization failed.
    #[error("Failed to rasterize SVG: {0}")]
    Svg(String),

    /// A spawned task panicked or was cancelled.
    #[error("Task failed: {0}")]
    TaskFailed(String),
}

impl SyncError {
    /// Whether the retrying client may try the request again.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::ReqwestError(_) | Self::RateLimited { .. } | Self::IncompleteBody { .. }
        )
    }
}
