//! Main orchestration logic for synchronizing documents.

use crate::client::FigmaClient;
use crate::collector::{classify, collect};
use crate::error::SyncError;
use crate::pipeline::{run_format_pass, sanitize_name, DecisionOptions, DownloadStats, FormatPass};
use crate::reconcile::{reconcile, ReconcileOptions};
use crate::resolver::resolve;
use crate::source::SourceUrl;
use crate::types::{
    ClassificationRecord, DocumentJob, DownloadTotals, ExportCandidate, Format, SyncConfig,
    UpdateAction,
};
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::{info, warn};

/// Runs sync passes for one or more documents, sharing a client and download totals.
///
/// # Example
///
/// ```no_run
/// use figsync::{DocumentJob, SyncConfig, Synchronizer};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let mut config = SyncConfig::default();
/// config.client.token = "figd_secret".to_string();
/// let synchronizer = Synchronizer::new(config)?;
///
/// let job = DocumentJob {
///     source_url: "https://www.figma.com/file/KEY/Docs?node-id=1-2".to_string(),
///     export_dir: "docs/figma".into(),
///     referenced: ["logo.svg".to_string()].into(),
/// };
/// let records = synchronizer.sync_document(&job).await?;
/// println!("{} records, {:?}", records.len(), synchronizer.totals());
/// # Ok(())
/// # }
/// ```
pub struct Synchronizer {
    client: FigmaClient,
    config: SyncConfig,
    stats: Arc<DownloadStats>,
    updates: AtomicUsize,
}

impl Synchronizer {
    pub fn new(config: SyncConfig) -> Result<Self, SyncError> {
        let client = FigmaClient::new(&config.client)?;
        Ok(Self {
            client,
            config,
            stats: Arc::new(DownloadStats::default()),
            updates: AtomicUsize::new(0),
        })
    }

    /// Downloads so far, across every document this instance processed.
    pub fn totals(&self) -> DownloadTotals {
        self.stats.totals()
    }

    /// False once `max_updates` records that change something have been produced.
    pub fn within_update_budget(&self) -> bool {
        self.config.max_updates == 0
            || self.updates.load(Ordering::Relaxed) < self.config.max_updates
    }

    /// Synchronizes one document's export directory against its Figma node.
    ///
    /// This is the main entry point. It performs the following steps:
    ///
    /// 1. Fetches the node tree and classifies nested, hidden and duplicate exports
    /// 2. Per format (SVG, PNG, JPG): resolves URLs, downloads, and writes changed assets
    /// 3. Reconciles the export directory against the produced and referenced files
    ///
    /// Records come back in that order. A fatal error aborts the document; files already
    /// written stay on disk.
    pub async fn sync_document(
        &self,
        job: &DocumentJob,
    ) -> Result<Vec<ClassificationRecord>, SyncError> {
        let source = SourceUrl::parse(&job.source_url)?;
        info!("Inspecting {}", job.source_url);

        let root = collect(&self.client, &source.file_key, &source.node_id).await?;
        let plan = classify(&root, &source.file_key);

        let mut records = plan.records.clone();
        let mut covered: HashSet<String> = HashSet::new();

        for (format, candidates) in plan.by_format() {
            let (candidates, unused) = self.split_referenced(candidates, format, job);
            for candidate in unused {
                let name = format!("{}.{}", sanitize_name(&candidate.name), format);
                let url = source.node_url(&candidate.id);
                warn!("{} has an export defined but is not used. {}", name, url);
                records.push(ClassificationRecord::new(name, UpdateAction::Unused).with_url(url));
            }
            if candidates.is_empty() {
                continue;
            }

            let ids: Vec<String> = candidates.iter().map(|c| c.id.clone()).collect();
            let urls = resolve(
                &self.client,
                &source.file_key,
                &ids,
                format,
                self.config.workers,
            )
            .await?;

            let pb = self.progress_bar(candidates.len(), format);
            let outcome = run_format_pass(FormatPass {
                client: &self.client,
                file_key: &source.file_key,
                format,
                export_dir: &job.export_dir,
                candidates: &candidates,
                urls,
                ignore_paths: &self.config.ignore_paths,
                options: DecisionOptions {
                    similarity_threshold: self.config.similarity_threshold,
                    ignore_duplicates: self.config.ignore_duplicates,
                    svg_visual_check_only: self.config.svg_visual_check_only,
                },
                workers: self.config.workers,
                stats: &self.stats,
                pb: &pb,
            })
            .await?;

            covered.extend(outcome.produced);
            records.extend(outcome.records);
        }

        let totals = self.totals();
        info!(
            "Downloaded {} files, totaling {}",
            totals.count,
            indicatif::HumanBytes(totals.bytes)
        );

        covered.extend(records.iter().map(|r| r.asset_name.clone()));
        records.extend(reconcile(
            &job.export_dir,
            &covered,
            &job.referenced,
            ReconcileOptions {
                empty_export_folder: self.config.empty_export_folder,
                no_delete: self.config.no_delete,
            },
        )?);

        let changed = records
            .iter()
            .filter(|r| r.action.counts_as_update())
            .count();
        self.updates.fetch_add(changed, Ordering::Relaxed);
        Ok(records)
    }

    /// Splits candidates into those to export and, with `only_referenced`, the unused rest.
    fn split_referenced<'a>(
        &self,
        candidates: Vec<&'a ExportCandidate>,
        format: Format,
        job: &DocumentJob,
    ) -> (Vec<&'a ExportCandidate>, Vec<&'a ExportCandidate>) {
        if !self.config.only_referenced {
            return (candidates, Vec::new());
        }
        candidates.into_iter().partition(|c| {
            let name = format!("{}.{}", sanitize_name(&c.name), format);
            job.referenced.contains(&name)
        })
    }

    fn progress_bar(&self, len: usize, format: Format) -> indicatif::ProgressBar {
        if !self.config.show_progress {
            return indicatif::ProgressBar::hidden();
        }
        let pb = indicatif::ProgressBar::new(len as u64);
        if let Ok(style) = indicatif::ProgressStyle::default_bar().template(
            "{spinner:.cyan} [{bar:40.cyan/blue}] {pos}/{len} {msg} | {elapsed_precise} elapsed",
        ) {
            pb.set_style(style.progress_chars("█▓▒░ "));
        }
        pb.set_message(format!("📦 Downloading {} {} assets", len, format));
        pb
    }
}
