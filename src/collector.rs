//! Export tree collection and classification.

use crate::client::FigmaClient;
use crate::error::SyncError;
use crate::source::node_url;
use crate::types::{ClassificationRecord, ExportCandidate, ExportNode, Format, UpdateAction};
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap, HashSet};
use tracing::{info, warn};

#[derive(Deserialize, Debug)]
struct NodesResponse {
    #[serde(default)]
    nodes: HashMap<String, Option<NodeEntry>>,
}

#[derive(Deserialize, Debug)]
struct NodeEntry {
    document: ExportNode,
}

/// Fetches the subtree rooted at `node_id`.
///
/// Fails with [`SyncError::NodeNotFound`] when the file does not contain the node.
pub async fn collect(
    client: &FigmaClient,
    file_key: &str,
    node_id: &str,
) -> Result<ExportNode, SyncError> {
    let response: NodesResponse = client
        .get(&format!("files/{}/nodes", file_key), &[("ids", node_id)])
        .await?;

    response
        .nodes
        .into_iter()
        .find(|(id, _)| id == node_id)
        .and_then(|(_, entry)| entry)
        .map(|entry| entry.document)
        .ok_or_else(|| SyncError::NodeNotFound {
            file_key: file_key.to_string(),
            node_id: node_id.to_string(),
        })
}

/// Result of classifying a fetched tree.
#[derive(Debug, Default)]
pub struct ExportPlan {
    /// Anomalies found in the tree, in traversal order.
    pub records: Vec<ClassificationRecord>,
    /// Visible top-level nodes with export settings.
    pub eligible: Vec<ExportCandidate>,
}

/// Descendants of `root` in pre-order (parent before children), excluding `root` itself.
pub fn flatten(root: &ExportNode) -> Vec<&ExportNode> {
    let mut out = Vec::new();
    let mut stack: Vec<&ExportNode> = root.children.iter().rev().collect();
    while let Some(node) = stack.pop() {
        out.push(node);
        stack.extend(node.children.iter().rev());
    }
    out
}

/// Classifies every exportable descendant of `root`.
///
/// Each `(node, format)` gets at most one anomaly: a nested node is NOT_TOP_LEVEL, a hidden
/// top-level node is HIDDEN, and a top-level node that lists a format twice is DUPLICATE
/// (a warning; the format is still exported once).
pub fn classify(root: &ExportNode, file_key: &str) -> ExportPlan {
    let top_level: HashSet<&str> = root.children.iter().map(|c| c.id.as_str()).collect();
    let mut plan = ExportPlan::default();

    for node in flatten(root) {
        let formats = node.export_formats();
        if formats.is_empty() {
            continue;
        }
        let url = node_url(file_key, &node.id);

        if !top_level.contains(node.id.as_str()) {
            for format in &formats {
                let name = format!("{}.{}", node.name, format);
                warn!("{} is not defined at the top-level {}", name, url);
                plan.records.push(
                    ClassificationRecord::new(name, UpdateAction::NotTopLevel).with_url(&url),
                );
            }
            continue;
        }

        if !node.visible {
            for format in &formats {
                let name = format!("{}.{}", node.name, format);
                warn!("{} has exports but is hidden {}", name, url);
                plan.records
                    .push(ClassificationRecord::new(name, UpdateAction::Hidden).with_url(&url));
            }
            continue;
        }

        if node.export_settings.len() > 1 {
            warn!("Multiple exports defined in element {} from {}", node.name, url);
        }
        for format in node.repeated_formats() {
            let name = format!("{}.{}", node.name, format);
            plan.records
                .push(ClassificationRecord::new(name, UpdateAction::Duplicate).with_url(&url));
        }

        plan.eligible.push(ExportCandidate {
            id: node.id.clone(),
            name: node.name.clone(),
            formats,
        });
    }

    info!("Found {} elements to export.", plan.eligible.len());
    plan
}

impl ExportPlan {
    /// Eligible candidates grouped by format, in pass order. Formats without candidates are absent.
    pub fn by_format(&self) -> BTreeMap<Format, Vec<&ExportCandidate>> {
        let mut grouped: BTreeMap<_, Vec<&ExportCandidate>> = BTreeMap::new();
        for candidate in &self.eligible {
            for format in &candidate.formats {
                grouped.entry(*format).or_default().push(candidate);
            }
        }
        grouped
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tree() -> ExportNode {
        serde_json::from_value(serde_json::json!({
            "id": "0:1",
            "name": "Page",
            "children": [
                {
                    "id": "1:1",
                    "name": "logo",
                    "exportSettings": [{"format": "SVG"}, {"format": "PNG"}],
                    "children": [
                        {"id": "1:2", "name": "inner", "exportSettings": [{"format": "PNG"}]}
                    ]
                },
                {"id": "1:3", "name": "ghost", "visible": false, "exportSettings": [{"format": "SVG"}]},
                {"id": "1:4", "name": "icon", "exportSettings": [{"format": "PNG"}, {"format": "PNG"}]},
                {"id": "1:5", "name": "frame", "children": [
                    {"id": "1:6", "name": "deep", "children": [
                        {"id": "1:7", "name": "deeper", "exportSettings": [{"format": "SVG"}]}
                    ]}
                ]}
            ]
        }))
        .unwrap()
    }

    #[test]
    fn test_flatten_is_pre_order() {
        let root = tree();
        let ids: Vec<&str> = flatten(&root).iter().map(|n| n.id.as_str()).collect();
        assert_eq!(ids, vec!["1:1", "1:2", "1:3", "1:4", "1:5", "1:6", "1:7"]);
    }

    #[test]
    fn test_nested_exports_are_not_top_level() {
        let plan = classify(&tree(), "KEY");

        let nested: Vec<&str> = plan
            .records
            .iter()
            .filter(|r| r.action == UpdateAction::NotTopLevel)
            .map(|r| r.asset_name.as_str())
            .collect();
        assert_eq!(nested, vec!["inner.png", "deeper.svg"]);
        assert!(plan.eligible.iter().all(|c| c.id != "1:2" && c.id != "1:7"));
        assert_eq!(
            plan.records[0].remote_url.as_deref(),
            Some("https://www.figma.com/file/KEY/?node-id=1:2")
        );
    }

    #[test]
    fn test_hidden_and_duplicate_settings() {
        let plan = classify(&tree(), "KEY");

        let hidden: Vec<_> = plan
            .records
            .iter()
            .filter(|r| r.action == UpdateAction::Hidden)
            .collect();
        assert_eq!(hidden.len(), 1);
        assert_eq!(hidden[0].asset_name, "ghost.svg");

        let duplicate: Vec<_> = plan
            .records
            .iter()
            .filter(|r| r.action == UpdateAction::Duplicate)
            .collect();
        assert_eq!(duplicate.len(), 1);
        assert_eq!(duplicate[0].asset_name, "icon.png");

        let ids: Vec<&str> = plan.eligible.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["1:1", "1:4"]);
    }

    #[test]
    fn test_by_format_groups_in_pass_order() {
        let plan = classify(&tree(), "KEY");
        let grouped = plan.by_format();

        let formats: Vec<Format> = grouped.keys().copied().collect();
        assert_eq!(formats, vec![Format::Svg, Format::Png]);
        assert_eq!(grouped[&Format::Svg].len(), 1);
        assert_eq!(grouped[&Format::Png].len(), 2);
    }

    #[test]
    fn test_empty_tree_yields_empty_plan() {
        let root: ExportNode =
            serde_json::from_value(serde_json::json!({"id": "0:1", "name": "Page"})).unwrap();
        let plan = classify(&root, "KEY");
        assert!(plan.records.is_empty());
        assert!(plan.by_format().is_empty());
    }
}
