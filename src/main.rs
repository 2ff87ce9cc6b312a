use anyhow::{bail, Context};
use clap::Parser;
use figsync::report::{self, DocumentReport};
use figsync::{DocumentJob, RetryConfig, SyncConfig, Synchronizer};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "figsync")]
#[command(about = "Synchronize exported Figma assets into documentation folders", long_about = None)]
#[command(version)]
struct Args {
    /// Figma personal access token
    #[arg(long, env = "FIGMA_TOKEN", hide_env_values = true)]
    token: String,

    /// JSON file listing documents: [{"source_url", "export_dir", "referenced"}]
    #[arg(long, conflicts_with_all = ["url", "export_dir"])]
    manifest: Option<PathBuf>,

    /// Figma URL of a single document
    #[arg(long)]
    url: Option<String>,

    /// Export directory of a single document
    #[arg(long)]
    export_dir: Option<PathBuf>,

    /// Asset file names the single document references (comma-separated)
    #[arg(long, value_delimiter = ',')]
    asset: Vec<String>,

    /// Destination paths that are never downloaded (comma-separated)
    #[arg(long, value_delimiter = ',')]
    ignore: Vec<PathBuf>,

    /// Record duplicate element names instead of failing
    #[arg(long)]
    ignore_duplicates: bool,

    /// Only perform the visual similarity check for SVG files
    #[arg(long)]
    svg_visual_check_only: bool,

    /// Images below this similarity (0-100) are updated
    #[arg(long, default_value_t = 95.0)]
    similarity: f64,

    /// Delete files from the export folder that are neither exported nor referenced
    #[arg(long)]
    empty_export_folder: bool,

    /// Never delete files, even with --empty-export-folder
    #[arg(long)]
    no_delete: bool,

    /// Only export assets the document references
    #[arg(long)]
    only_referenced: bool,

    /// Stop processing documents after N updates (0 = unlimited)
    #[arg(long, default_value_t = 0)]
    max_updates: usize,

    /// Parallel workers (default: max(cpus, 4))
    #[arg(long)]
    workers: Option<usize>,

    /// Retries for transient failures and rate limiting
    #[arg(long, default_value_t = 3)]
    retries: usize,

    /// Wait after a 429 response (e.g. "20s")
    #[arg(long, default_value = "20s", value_parser = humantime::parse_duration)]
    rate_limit_wait: Duration,

    /// Figma API base URL
    #[arg(long, default_value = figsync::DEFAULT_API_URL)]
    api_url: String,

    /// File to write the markdown report to
    #[arg(long)]
    report: Option<PathBuf>,

    /// Print classification records as JSON
    #[arg(long)]
    json: bool,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,
}

impl Args {
    fn jobs(&self) -> anyhow::Result<Vec<DocumentJob>> {
        if let Some(manifest) = &self.manifest {
            let content = std::fs::read_to_string(manifest)
                .with_context(|| format!("reading manifest {}", manifest.display()))?;
            return serde_json::from_str(&content)
                .with_context(|| format!("parsing manifest {}", manifest.display()));
        }
        match (&self.url, &self.export_dir) {
            (Some(url), Some(export_dir)) => Ok(vec![DocumentJob {
                source_url: url.clone(),
                export_dir: export_dir.clone(),
                referenced: self.asset.iter().cloned().collect(),
            }]),
            _ => bail!("either --manifest or both --url and --export-dir are required"),
        }
    }

    fn config(&self) -> SyncConfig {
        let mut config = SyncConfig {
            similarity_threshold: self.similarity,
            ignore_duplicates: self.ignore_duplicates,
            svg_visual_check_only: self.svg_visual_check_only,
            empty_export_folder: self.empty_export_folder,
            no_delete: self.no_delete,
            only_referenced: self.only_referenced,
            ignore_paths: self.ignore.clone(),
            max_updates: self.max_updates,
            show_progress: atty::is(atty::Stream::Stderr),
            ..Default::default()
        };
        if let Some(workers) = self.workers {
            config.workers = workers.max(1);
        }
        config.client.token = self.token.clone();
        config.client.api_base_url = self.api_url.clone();
        config.client.retry = RetryConfig {
            max_retries: self.retries,
            rate_limit_wait: self.rate_limit_wait,
        };
        config
    }
}

async fn run(args: Args) -> anyhow::Result<()> {
    if !(0.0..=100.0).contains(&args.similarity) {
        bail!("--similarity must be between 0 and 100");
    }
    let jobs = args.jobs()?;
    let synchronizer = Synchronizer::new(args.config()).context("creating Figma client")?;
    let started = std::time::Instant::now();

    let mut reports = Vec::new();
    for job in &jobs {
        if !synchronizer.within_update_budget() {
            warn!(
                "Reached {} updates, skipping remaining documents",
                args.max_updates
            );
            break;
        }
        info!("Processing export folder {}", job.export_dir.display());
        let records = synchronizer
            .sync_document(job)
            .await
            .with_context(|| format!("synchronizing {}", job.export_dir.display()))?;

        if args.json {
            println!("{}", serde_json::to_string_pretty(&records)?);
        }
        reports.push(DocumentReport {
            document: job.export_dir.display().to_string(),
            source_url: job.source_url.clone(),
            export_label: job
                .export_dir
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default(),
            records,
        });
    }

    let totals = synchronizer.totals();
    info!(
        "✅ Downloaded {} files ({}) in {}",
        totals.count,
        indicatif::HumanBytes(totals.bytes),
        humantime::format_duration(Duration::from_secs(started.elapsed().as_secs()))
    );

    if let Some(path) = &args.report {
        std::fs::write(path, report::render(&reports, totals))
            .with_context(|| format!("writing report {}", path.display()))?;
        info!("Report written to {}", path.display());
    }
    Ok(())
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    // Initialize tracing
    let log_level = if args.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("figsync={}", log_level)));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("🚀 figsync - Figma asset synchronizer");

    if let Err(e) = run(args).await {
        error!("❌ Error: {:#}", e);
        std::process::exit(1);
    }
}
