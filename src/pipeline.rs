//! Download and decision pipeline for one format pass.

use crate::client::FigmaClient;
use crate::error::SyncError;
use crate::similarity::similarity_blocking;
use crate::source::node_url;
use crate::types::{
    ClassificationRecord, DownloadTotals, ExportCandidate, Format, ResolvedAsset, UpdateAction,
};
use std::collections::{HashMap, HashSet};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

/// Characters that cannot appear in a file name on any supported platform.
const ILLEGAL_NAME_CHARS: [char; 9] = ['<', '>', ':', '"', '/', '\\', '|', '?', '*'];

/// Download totals shared by every pass of one [`crate::Synchronizer`].
#[derive(Debug, Default)]
pub struct DownloadStats {
    count: AtomicU64,
    bytes: AtomicU64,
}

impl DownloadStats {
    pub fn record(&self, bytes: usize) {
        self.count.fetch_add(1, Ordering::Relaxed);
        self.bytes.fetch_add(bytes as u64, Ordering::Relaxed);
    }

    pub fn totals(&self) -> DownloadTotals {
        DownloadTotals {
            count: self.count.load(Ordering::Relaxed),
            bytes: self.bytes.load(Ordering::Relaxed),
        }
    }
}

/// Knobs of the overwrite decision.
#[derive(Debug, Clone)]
pub struct DecisionOptions {
    pub similarity_threshold: f64,
    pub ignore_duplicates: bool,
    pub svg_visual_check_only: bool,
}

/// Everything one format pass needs.
pub struct FormatPass<'a> {
    pub client: &'a FigmaClient,
    pub file_key: &'a str,
    pub format: Format,
    pub export_dir: &'a Path,
    pub candidates: &'a [&'a ExportCandidate],
    pub urls: HashMap<String, String>,
    pub ignore_paths: &'a [PathBuf],
    pub options: DecisionOptions,
    pub workers: usize,
    pub stats: &'a Arc<DownloadStats>,
    pub pb: &'a indicatif::ProgressBar,
}

/// Result of a format pass.
#[derive(Debug, Default)]
pub struct PassOutcome {
    /// Records sorted by asset name.
    pub records: Vec<ClassificationRecord>,
    /// File names downloaded in this pass, including first-time writes that have no record.
    pub produced: Vec<String>,
}

#[derive(Debug, Default)]
struct AssetOutcome {
    records: Vec<ClassificationRecord>,
    produced: Option<String>,
}

struct PassContext {
    client: FigmaClient,
    file_key: String,
    format: Format,
    export_dir: PathBuf,
    ignore_paths: HashSet<PathBuf>,
    options: DecisionOptions,
    /// Names claimed in this pass. Scoped to one format.
    names: Mutex<HashSet<String>>,
    stats: Arc<DownloadStats>,
    aborted: AtomicBool,
    pb: indicatif::ProgressBar,
}

impl PassContext {
    /// Atomically claims `name`; false when another node of this pass already holds it.
    fn claim(&self, name: &str) -> bool {
        self.names
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name.to_string())
    }

    fn is_aborted(&self) -> bool {
        self.aborted.load(Ordering::SeqCst)
    }
}

/// Removes characters that are illegal in file names, after trimming whitespace.
pub fn sanitize_name(name: &str) -> String {
    name.trim()
        .chars()
        .filter(|c| !c.is_control() && !ILLEGAL_NAME_CHARS.contains(c))
        .collect()
}

/// Decides what to do with an asset whose destination already exists.
///
/// Below the threshold the file is always replaced. At or above it, only SVGs can still be
/// replaced, when their bytes differ and the exact check is enabled.
pub fn decide(
    format: Format,
    similarity: f64,
    threshold: f64,
    identical: bool,
    svg_visual_check_only: bool,
) -> UpdateAction {
    if similarity < threshold {
        UpdateAction::UpdateSimilarity
    } else if format == Format::Svg && !svg_visual_check_only && !identical {
        UpdateAction::Update
    } else {
        UpdateAction::None
    }
}

/// Downloads every candidate of one format with bounded parallelism and decides, per asset,
/// whether the local file is written.
///
/// The first fatal error stops the pass: no further asset is written and the error is
/// returned. Files written before that point stay on disk.
pub async fn run_format_pass(pass: FormatPass<'_>) -> Result<PassOutcome, SyncError> {
    let ctx = Arc::new(PassContext {
        client: pass.client.clone(),
        file_key: pass.file_key.to_string(),
        format: pass.format,
        export_dir: pass.export_dir.to_path_buf(),
        ignore_paths: pass.ignore_paths.iter().cloned().collect(),
        options: pass.options,
        names: Mutex::new(HashSet::new()),
        stats: Arc::clone(pass.stats),
        aborted: AtomicBool::new(false),
        pb: pass.pb.clone(),
    });
    let semaphore = Arc::new(Semaphore::new(pass.workers.max(1)));
    let mut tasks = JoinSet::new();

    let assets: Vec<ResolvedAsset> = pass
        .candidates
        .iter()
        .filter_map(|candidate| {
            let Some(download_url) = pass.urls.get(&candidate.id) else {
                warn!(
                    "No export URL for {} ({}), skipping",
                    candidate.name, candidate.id
                );
                ctx.pb.inc(1);
                return None;
            };
            Some(ResolvedAsset {
                node_id: candidate.id.clone(),
                name: candidate.name.clone(),
                format: pass.format,
                download_url: download_url.clone(),
            })
        })
        .collect();

    for asset in assets {
        let ctx = Arc::clone(&ctx);
        let semaphore = Arc::clone(&semaphore);

        tasks.spawn(async move {
            let _permit = semaphore
                .acquire_owned()
                .await
                .map_err(|e| SyncError::TaskFailed(e.to_string()))?;
            let result = process_asset(&ctx, asset).await;
            if result.is_err() {
                ctx.aborted.store(true, Ordering::SeqCst);
            }
            ctx.pb.inc(1);
            result
        });
    }

    let mut outcome = PassOutcome::default();
    while let Some(joined) = tasks.join_next().await {
        let asset = match joined {
            Ok(Ok(asset)) => asset,
            Ok(Err(e)) => {
                error!("Download task failed: {}", e);
                ctx.aborted.store(true, Ordering::SeqCst);
                tasks.abort_all();
                ctx.pb.abandon_with_message("❌ Download failed!");
                return Err(e);
            }
            Err(e) => {
                error!("Task join error: {}", e);
                ctx.aborted.store(true, Ordering::SeqCst);
                tasks.abort_all();
                ctx.pb.abandon_with_message("❌ Download failed!");
                return Err(SyncError::TaskFailed(e.to_string()));
            }
        };
        outcome.records.extend(asset.records);
        outcome.produced.extend(asset.produced);
    }

    outcome
        .records
        .sort_by(|a, b| a.asset_name.cmp(&b.asset_name));
    outcome.produced.sort();
    ctx.pb.finish_with_message(format!("✅ {} pass done", pass.format));
    Ok(outcome)
}

async fn process_asset(ctx: &PassContext, asset: ResolvedAsset) -> Result<AssetOutcome, SyncError> {
    let node_id = asset.node_id.as_str();
    let extension = asset.format.extension();
    let remote_url = node_url(&ctx.file_key, node_id);
    let mut outcome = AssetOutcome::default();

    let trimmed = asset.name.trim();
    let name = sanitize_name(trimmed);
    if name != trimmed {
        warn!(
            "Figma has element name set to '{}.{}'. It will be changed to '{}.{}'",
            trimmed, extension, name, extension
        );
    }
    if name.is_empty() {
        return Err(SyncError::EmptyName {
            node_id: node_id.to_string(),
            url: remote_url,
        });
    }
    let file_name = format!("{}.{}", name, extension);

    if !ctx.claim(&name) {
        if !ctx.options.ignore_duplicates {
            return Err(SyncError::DuplicateName {
                name: file_name,
                url: remote_url,
            });
        }
        warn!("Duplicated element with name '{}' at {}", file_name, remote_url);
        outcome.records.push(
            ClassificationRecord::new(&file_name, UpdateAction::Duplicate).with_url(&remote_url),
        );
    }
    let is_duplicate = !outcome.records.is_empty();

    let destination = ctx.export_dir.join(&file_name);
    if ctx.ignore_paths.contains(&destination) {
        if is_duplicate {
            return Ok(outcome);
        }
        info!(
            "File {} will be skipped due to being part of the ignored list.",
            destination.display()
        );
        outcome.records.push(
            ClassificationRecord::new(&file_name, UpdateAction::Ignore).with_url(&remote_url),
        );
        return Ok(outcome);
    }

    let previous = match tokio::fs::read(&destination).await {
        Ok(bytes) => Some(bytes),
        Err(e) if e.kind() == io::ErrorKind::NotFound => None,
        Err(e) => return Err(e.into()),
    };

    if ctx.is_aborted() {
        return Ok(AssetOutcome::default());
    }
    info!(
        "Downloading {} ({}) from {}",
        file_name, node_id, asset.download_url
    );
    let current = ctx.client.download(&asset.download_url).await?;
    ctx.stats.record(current.len());
    outcome.produced = Some(file_name.clone());

    let previous = match previous {
        Some(previous) if !is_duplicate => previous,
        _ => {
            info!("Writing {} to {}", file_name, destination.display());
            write_asset(ctx, &destination, &current).await?;
            return Ok(outcome);
        }
    };

    let identical = previous == current;
    let (similarity, _, current) =
        similarity_blocking(ctx.format, previous, current, &destination).await?;
    let action = decide(
        ctx.format,
        similarity,
        ctx.options.similarity_threshold,
        identical,
        ctx.options.svg_visual_check_only,
    );

    match action {
        UpdateAction::UpdateSimilarity => info!(
            "Writing {} to {} since similarity is {:.2} % (below threshold of {} %)",
            file_name,
            destination.display(),
            similarity,
            ctx.options.similarity_threshold
        ),
        UpdateAction::Update => info!("Writing {} to {}", file_name, destination.display()),
        _ => debug!("{} is up to date ({:.2} %)", file_name, similarity),
    }
    if action != UpdateAction::None {
        write_asset(ctx, &destination, &current).await?;
    }

    outcome.records.push(
        ClassificationRecord::new(&file_name, action)
            .with_url(&remote_url)
            .with_similarity(similarity),
    );
    Ok(outcome)
}

async fn write_asset(ctx: &PassContext, destination: &Path, bytes: &[u8]) -> Result<(), SyncError> {
    if ctx.is_aborted() {
        return Ok(());
    }
    if let Some(parent) = destination.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::write(destination, bytes).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_name() {
        assert_eq!(sanitize_name("  logo  "), "logo");
        assert_eq!(sanitize_name("a/b:c*d?"), "abcd");
        assert_eq!(sanitize_name("tab\there"), "tabhere");
        assert_eq!(sanitize_name(" <>| "), "");
        assert_eq!(sanitize_name("icon-24 (dark)"), "icon-24 (dark)");
    }

    #[test]
    fn test_decide_below_threshold_updates() {
        assert_eq!(
            decide(Format::Png, 80.0, 95.0, false, false),
            UpdateAction::UpdateSimilarity
        );
        assert_eq!(
            decide(Format::Svg, 94.99, 95.0, true, true),
            UpdateAction::UpdateSimilarity
        );
    }

    #[test]
    fn test_decide_threshold_boundary_is_exclusive() {
        assert_eq!(decide(Format::Png, 95.0, 95.0, false, false), UpdateAction::None);
        assert_eq!(decide(Format::Svg, 95.0, 95.0, true, false), UpdateAction::None);
    }

    #[test]
    fn test_decide_svg_byte_check() {
        assert_eq!(
            decide(Format::Svg, 100.0, 95.0, false, false),
            UpdateAction::Update
        );
        assert_eq!(
            decide(Format::Svg, 100.0, 95.0, false, true),
            UpdateAction::None
        );
        assert_eq!(decide(Format::Svg, 100.0, 95.0, true, false), UpdateAction::None);
    }

    #[test]
    fn test_decide_raster_has_no_byte_check() {
        assert_eq!(decide(Format::Png, 100.0, 95.0, false, false), UpdateAction::None);
    }

    #[test]
    fn test_stats_accumulate() {
        let stats = DownloadStats::default();
        stats.record(10);
        stats.record(32);
        assert_eq!(
            stats.totals(),
            DownloadTotals {
                count: 2,
                bytes: 42
            }
        );
    }
}
