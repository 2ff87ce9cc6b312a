//! Data structures for asset synchronization.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashSet};
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

/// Default Figma REST endpoint.
pub const DEFAULT_API_URL: &str = "https://api.figma.com/v1";

/// Export format of a node.
///
/// The declaration order is the order in which format passes run.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "UPPERCASE")]
pub enum Format {
    Svg,
    Png,
    Jpg,
}

impl Format {
    /// All formats, in pass order.
    pub const ALL: [Format; 3] = [Format::Svg, Format::Png, Format::Jpg];

    /// Lowercase file extension without the dot; also the `format` query value.
    pub fn extension(self) -> &'static str {
        match self {
            Format::Svg => "svg",
            Format::Png => "png",
            Format::Jpg => "jpg",
        }
    }

    /// Parses an export setting's format string (case-insensitive).
    pub fn parse(value: &str) -> Option<Format> {
        match value.to_ascii_uppercase().as_str() {
            "SVG" => Some(Format::Svg),
            "PNG" => Some(Format::Png),
            "JPG" | "JPEG" => Some(Format::Jpg),
            _ => None,
        }
    }

    /// Maps a file name's extension back to a format.
    pub fn from_file_name(file_name: &str) -> Option<Format> {
        let (_, ext) = file_name.rsplit_once('.')?;
        Format::ALL
            .into_iter()
            .find(|f| f.extension().eq_ignore_ascii_case(ext))
    }
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

/// One entry of a node's `exportSettings`.
#[derive(Deserialize, Debug, Clone)]
pub struct ExportSetting {
    pub format: String,
}

/// A node of the remote document tree.
#[derive(Deserialize, Debug, Clone)]
pub struct ExportNode {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default = "visible_by_default")]
    pub visible: bool,
    #[serde(default, rename = "exportSettings")]
    pub export_settings: Vec<ExportSetting>,
    #[serde(default)]
    pub children: Vec<ExportNode>,
}

fn visible_by_default() -> bool {
    true
}

impl ExportNode {
    /// Distinct known formats this node is exported as. Unknown formats (e.g. PDF) are ignored.
    pub fn export_formats(&self) -> BTreeSet<Format> {
        self.export_settings
            .iter()
            .filter_map(|s| Format::parse(&s.format))
            .collect()
    }

    /// Formats declared more than once in this node's export settings.
    pub fn repeated_formats(&self) -> BTreeSet<Format> {
        let mut seen = HashSet::new();
        self.export_settings
            .iter()
            .filter_map(|s| Format::parse(&s.format))
            .filter(|f| !seen.insert(*f))
            .collect()
    }
}

/// A top-level node eligible for download.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportCandidate {
    pub id: String,
    pub name: String,
    pub formats: BTreeSet<Format>,
}

/// Download URL for one node in one format. Produced by the resolver, consumed once.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedAsset {
    pub node_id: String,
    pub name: String,
    pub format: Format,
    pub download_url: String,
}

/// Outcome kinds of a classification record.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UpdateAction {
    None,
    Update,
    UpdateSimilarity,
    Delete,
    FigmaMissing,
    Unused,
    Duplicate,
    Hidden,
    NotTopLevel,
    Ignore,
}

impl UpdateAction {
    /// Whether the action counts against `max_updates`.
    pub fn counts_as_update(self) -> bool {
        !matches!(self, UpdateAction::None | UpdateAction::FigmaMissing)
    }
}

/// What happened to one named asset during a pass.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ClassificationRecord {
    /// File name including extension.
    pub asset_name: String,
    /// Link to the node in Figma, when the asset maps to a node.
    pub remote_url: Option<String>,
    pub similarity: Option<f64>,
    pub action: UpdateAction,
}

impl ClassificationRecord {
    pub fn new(asset_name: impl Into<String>, action: UpdateAction) -> Self {
        Self {
            asset_name: asset_name.into(),
            remote_url: None,
            similarity: None,
            action,
        }
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.remote_url = Some(url.into());
        self
    }

    pub fn with_similarity(mut self, similarity: f64) -> Self {
        self.similarity = Some(similarity);
        self
    }
}

/// Retry policy of the API client.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Retries after the first attempt, shared by transport failures and 429 responses.
    pub max_retries: usize,
    /// Sleep before retrying a 429 response.
    pub rate_limit_wait: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            rate_limit_wait: Duration::from_secs(20),
        }
    }
}

/// Configuration for the Figma API client.
///
/// # Example
///
/// ```
/// use figsync::ClientConfig;
///
/// let config = ClientConfig {
///     token: "figd_secret".to_string(),
///     ..Default::default()
/// };
/// assert_eq!(config.api_base_url, "https://api.figma.com/v1");
/// ```
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Personal access token, sent as `X-Figma-Token` on every request.
    pub token: String,
    /// Base URL of the REST API.
    pub api_base_url: String,
    /// Per-request timeout.
    pub timeout: Duration,
    pub retry: RetryConfig,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            token: String::new(),
            api_base_url: DEFAULT_API_URL.to_string(),
            timeout: Duration::from_secs(5 * 60),
            retry: RetryConfig::default(),
        }
    }
}

/// Configuration for a sync run.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    pub client: ClientConfig,
    /// Worker count for downloads and per-id URL resolution (default: `max(cpus, 4)`).
    pub workers: usize,
    /// Images whose similarity is below this percentage are overwritten (default: 95).
    pub similarity_threshold: f64,
    /// Record duplicate names instead of failing the pass.
    pub ignore_duplicates: bool,
    /// Skip the exact byte comparison of visually similar SVGs.
    pub svg_visual_check_only: bool,
    /// Delete stale files from the export directory after a pass.
    pub empty_export_folder: bool,
    /// Keep stale files even when `empty_export_folder` is set.
    pub no_delete: bool,
    /// Only export assets the document references; others are recorded as unused.
    pub only_referenced: bool,
    /// Destinations that are never downloaded.
    pub ignore_paths: Vec<PathBuf>,
    /// Stop processing documents after this many updates (0 = unlimited).
    pub max_updates: usize,
    /// Draw a progress bar per format pass.
    pub show_progress: bool,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            client: ClientConfig::default(),
            workers: default_workers(),
            similarity_threshold: 95.0,
            ignore_duplicates: false,
            svg_visual_check_only: false,
            empty_export_folder: false,
            no_delete: false,
            only_referenced: false,
            ignore_paths: Vec::new(),
            max_updates: 0,
            show_progress: false,
        }
    }
}

/// `max(available_parallelism, 4)`.
pub fn default_workers() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
        .max(4)
}

/// One document to synchronize, as handed over by the markdown scanner.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct DocumentJob {
    /// Figma URL from the document's front matter.
    pub source_url: String,
    /// Directory the document's assets are exported into.
    pub export_dir: PathBuf,
    /// Asset file names the document currently references.
    #[serde(default)]
    pub referenced: BTreeSet<String>,
}

/// Download totals for one invocation.
#[derive(Serialize, Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DownloadTotals {
    pub count: u64,
    pub bytes: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_parse_and_extension() {
        assert_eq!(Format::parse("SVG"), Some(Format::Svg));
        assert_eq!(Format::parse("png"), Some(Format::Png));
        assert_eq!(Format::parse("PDF"), None);
        assert_eq!(Format::from_file_name("logo.SVG"), Some(Format::Svg));
        assert_eq!(Format::from_file_name("notes.txt"), None);
        assert_eq!(Format::from_file_name("README"), None);
    }

    #[test]
    fn test_node_defaults_and_formats() {
        let node: ExportNode = serde_json::from_str(
            r#"{"id": "1:2", "name": "logo", "exportSettings": [
                {"format": "PNG"}, {"format": "SVG"}, {"format": "PNG"}, {"format": "PDF"}
            ]}"#,
        )
        .unwrap();

        assert!(node.visible);
        assert!(node.children.is_empty());
        assert_eq!(
            node.export_formats().into_iter().collect::<Vec<_>>(),
            vec![Format::Svg, Format::Png]
        );
        assert_eq!(
            node.repeated_formats().into_iter().collect::<Vec<_>>(),
            vec![Format::Png]
        );
    }

    #[test]
    fn test_default_workers_floor() {
        assert!(default_workers() >= 4);
        assert_eq!(SyncConfig::default().similarity_threshold, 95.0);
    }

    #[test]
    fn test_update_budget_counts_all_but_none_and_missing() {
        assert!(!UpdateAction::None.counts_as_update());
        assert!(!UpdateAction::FigmaMissing.counts_as_update());
        for action in [
            UpdateAction::Update,
            UpdateAction::UpdateSimilarity,
            UpdateAction::Delete,
            UpdateAction::Unused,
            UpdateAction::Duplicate,
            UpdateAction::Hidden,
            UpdateAction::NotTopLevel,
            UpdateAction::Ignore,
        ] {
            assert!(action.counts_as_update(), "{:?}", action);
        }
    }
}
