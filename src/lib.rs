//! figsync - Keep exported Figma assets in documentation folders up to date
//!
//! This library fetches the export tree behind a document's Figma link, downloads every
//! exported asset and reconciles it with the files already on disk, reporting what
//! happened to each asset.
//!
//! # Features
//!
//! - **Retrying Client**: Transient failures and rate limiting are retried on a fixed budget
//! - **Batch Resolution**: Export URLs are requested in one batch, falling back to per-node requests
//! - **Perceptual Comparison**: Files are only rewritten when they changed visually (or byte-wise for SVG)
//! - **Parallel Downloads**: Bounded worker pool per format pass
//! - **Reconciliation**: Stale files are deleted, missing ones reported
//!
//! # Example
//!
//! ```no_run
//! use figsync::{DocumentJob, SyncConfig, Synchronizer};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let mut config = SyncConfig::default();
//! config.client.token = std::env::var("FIGMA_TOKEN")?;
//! let synchronizer = Synchronizer::new(config)?;
//!
//! let job = DocumentJob {
//!     source_url: "https://www.figma.com/file/KEY/Docs?node-id=1-2".to_string(),
//!     export_dir: "docs/figma".into(),
//!     referenced: Default::default(),
//! };
//! synchronizer.sync_document(&job).await?;
//! # Ok(())
//! # }
//! ```

mod client;
mod collector;
mod error;
mod orchestrator;
mod pipeline;
mod reconcile;
mod resolver;
mod similarity;
mod source;
mod types;

pub mod report;

pub use client::{FigmaClient, FIGMA_TOKEN_HEADER};
pub use collector::{classify, collect, flatten, ExportPlan};
pub use error::SyncError;
pub use orchestrator::Synchronizer;
pub use pipeline::{
    decide, run_format_pass, sanitize_name, DecisionOptions, DownloadStats, FormatPass,
    PassOutcome,
};
pub use reconcile::{reconcile, ReconcileOptions};
pub use resolver::resolve;
pub use similarity::{average_hash, hash_similarity, rasterize_svg, similarity};
pub use source::{node_url, SourceUrl};
pub use types::{
    default_workers, ClassificationRecord, ClientConfig, DocumentJob, DownloadTotals,
    ExportCandidate, ExportNode, ExportSetting, Format, ResolvedAsset, RetryConfig, SyncConfig,
    UpdateAction, DEFAULT_API_URL,
};
