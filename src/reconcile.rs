//! Export directory reconciliation.

use crate::error::SyncError;
use crate::types::{ClassificationRecord, Format, UpdateAction};
use std::collections::{BTreeSet, HashSet};
use std::io;
use std::path::Path;
use tracing::{debug, info};

/// How stale files are treated.
#[derive(Debug, Clone, Copy, Default)]
pub struct ReconcileOptions {
    /// Delete files that are neither produced nor referenced.
    pub empty_export_folder: bool,
    /// Keep stale files even in `empty_export_folder` mode.
    pub no_delete: bool,
}

/// Classifies the files of `export_dir` that the pass did not cover.
///
/// `covered` holds every file name that already has a record or was downloaded in the pass.
/// Referenced files that the pass did not produce become FIGMA_MISSING (left untouched);
/// unreferenced leftovers are deleted in `empty_export_folder` mode unless `no_delete` is set.
/// Each file name is classified at most once.
pub fn reconcile(
    export_dir: &Path,
    covered: &HashSet<String>,
    referenced: &BTreeSet<String>,
    options: ReconcileOptions,
) -> Result<Vec<ClassificationRecord>, SyncError> {
    let mut on_disk = BTreeSet::new();
    match std::fs::read_dir(export_dir) {
        Ok(entries) => {
            for entry in entries {
                let entry = entry?;
                if !entry.file_type()?.is_file() {
                    continue;
                }
                if let Some(name) = entry.file_name().to_str() {
                    on_disk.insert(name.to_string());
                }
            }
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => return Err(e.into()),
    }

    let mut classified: HashSet<&str> = HashSet::new();
    let mut records = Vec::new();

    for name in on_disk.iter().chain(referenced.iter()) {
        if covered.contains(name) || classified.contains(name.as_str()) {
            continue;
        }

        if referenced.contains(name) {
            classified.insert(name);
            if Format::from_file_name(name).is_none() {
                debug!("{} is referenced but is not a Figma export, ignoring", name);
                continue;
            }
            info!("{} is referenced but no longer exported by Figma", name);
            records.push(ClassificationRecord::new(name, UpdateAction::FigmaMissing));
            continue;
        }

        if !options.empty_export_folder {
            continue;
        }
        classified.insert(name);
        if options.no_delete {
            debug!("Keeping stale file {} (deletion disabled)", name);
            continue;
        }
        let path = export_dir.join(name);
        info!("Deleting file {}", path.display());
        std::fs::remove_file(&path)?;
        records.push(ClassificationRecord::new(name, UpdateAction::Delete));
    }

    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn set(names: &[&str]) -> BTreeSet<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    fn dir_with(files: &[&str]) -> TempDir {
        let dir = TempDir::new().unwrap();
        for f in files {
            std::fs::write(dir.path().join(f), b"x").unwrap();
        }
        dir
    }

    const EMPTY: ReconcileOptions = ReconcileOptions {
        empty_export_folder: true,
        no_delete: false,
    };

    #[test]
    fn test_stale_file_deleted() {
        let dir = dir_with(&["old.png", "logo.svg"]);
        let covered: HashSet<String> = ["logo.svg".to_string()].into();

        let records = reconcile(dir.path(), &covered, &BTreeSet::new(), EMPTY).unwrap();

        assert_eq!(records, vec![ClassificationRecord::new("old.png", UpdateAction::Delete)]);
        assert!(!dir.path().join("old.png").exists());
        assert!(dir.path().join("logo.svg").exists());
    }

    #[test]
    fn test_stale_file_kept_without_mode() {
        let dir = dir_with(&["old.png"]);
        let options = ReconcileOptions::default();

        let records = reconcile(dir.path(), &HashSet::new(), &BTreeSet::new(), options).unwrap();

        assert!(records.is_empty());
        assert!(dir.path().join("old.png").exists());
    }

    #[test]
    fn test_no_delete_override() {
        let dir = dir_with(&["old.png"]);
        let options = ReconcileOptions {
            empty_export_folder: true,
            no_delete: true,
        };

        let records = reconcile(dir.path(), &HashSet::new(), &BTreeSet::new(), options).unwrap();

        assert!(records.is_empty());
        assert!(dir.path().join("old.png").exists());
    }

    #[test]
    fn test_referenced_but_missing_in_figma() {
        let dir = dir_with(&["missing.svg"]);
        let referenced = set(&["missing.svg", "gone.png", "diagram.drawio"]);

        let records = reconcile(dir.path(), &HashSet::new(), &referenced, EMPTY).unwrap();

        assert_eq!(
            records,
            vec![
                ClassificationRecord::new("missing.svg", UpdateAction::FigmaMissing),
                ClassificationRecord::new("gone.png", UpdateAction::FigmaMissing),
            ]
        );
        assert!(dir.path().join("missing.svg").exists());
    }

    #[test]
    fn test_missing_export_dir() {
        let dir = TempDir::new().unwrap();
        let records = reconcile(
            &dir.path().join("figma"),
            &HashSet::new(),
            &set(&["a.png"]),
            EMPTY,
        )
        .unwrap();
        assert_eq!(
            records,
            vec![ClassificationRecord::new("a.png", UpdateAction::FigmaMissing)]
        );
    }
}
