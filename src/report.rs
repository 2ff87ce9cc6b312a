//! Markdown report of a run.

use crate::types::{ClassificationRecord, DownloadTotals, UpdateAction};
use std::fmt::Write;

/// Records of one processed document.
#[derive(Debug, Clone)]
pub struct DocumentReport {
    /// Path of the markdown document.
    pub document: String,
    pub source_url: String,
    /// Folder label prefixed to asset names, e.g. `figma`.
    pub export_label: String,
    pub records: Vec<ClassificationRecord>,
}

fn status(record: &ClassificationRecord) -> Option<String> {
    let status = match record.action {
        UpdateAction::None => return None,
        UpdateAction::UpdateSimilarity => {
            format!("Similarity @ {:.2} %", record.similarity.unwrap_or_default())
        }
        UpdateAction::Update => "Update".to_string(),
        UpdateAction::Delete => "Delete".to_string(),
        UpdateAction::FigmaMissing => "Missing in Figma".to_string(),
        UpdateAction::Unused => "Not used".to_string(),
        UpdateAction::Duplicate => "Duplicate".to_string(),
        UpdateAction::Hidden => "Hidden".to_string(),
        UpdateAction::NotTopLevel => "Not top-level".to_string(),
        UpdateAction::Ignore => "Ignored".to_string(),
    };
    Some(status)
}

/// Renders the run as markdown. Documents where nothing changed are left out.
pub fn render(documents: &[DocumentReport], totals: DownloadTotals) -> String {
    let mut out = String::new();

    for doc in documents {
        let rows: Vec<(String, &ClassificationRecord)> = doc
            .records
            .iter()
            .filter_map(|r| status(r).map(|s| (s, r)))
            .collect();
        if rows.is_empty() {
            continue;
        }

        let _ = writeln!(out, ":memo: {} ([Figma]({}))", doc.document, doc.source_url);
        let _ = writeln!(out);
        let _ = writeln!(out, "Visual Asset | Status");
        let _ = writeln!(out, "------------ | ------");
        for (status, record) in rows {
            let asset = format!("{}/{}", doc.export_label, record.asset_name);
            match &record.remote_url {
                Some(url) => {
                    let _ = writeln!(out, "[{}]({}) | {}", asset, url, status);
                }
                None => {
                    let _ = writeln!(out, "{} | {}", asset, status);
                }
            }
        }
        let _ = writeln!(out);
    }

    let _ = writeln!(out, "**Summary:**");
    let _ = writeln!(out);
    let _ = writeln!(out, "Downloaded files: {}", totals.count);
    let _ = writeln!(out);
    let _ = writeln!(out, "Downloaded size: {}", indicatif::HumanBytes(totals.bytes));
    out
}
