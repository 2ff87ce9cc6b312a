//! Figma source URL handling.

use crate::error::SyncError;

const FILE_MARKERS: [&str; 2] = ["figma.com/file/", "figma.com/design/"];
const NODE_MARKER: &str = "node-id=";

/// File key and node id extracted from a document's Figma URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceUrl {
    pub file_key: String,
    pub node_id: String,
}

impl SourceUrl {
    /// Parses a URL such as `https://www.figma.com/file/AbC123/Docs?node-id=12-34&t=x`.
    ///
    /// The node id is percent-decoded, cut at the first `&`, and `-` becomes `:`.
    pub fn parse(url: &str) -> Result<Self, SyncError> {
        let invalid = |reason: &str| SyncError::InvalidSourceUrl {
            url: url.to_string(),
            reason: reason.to_string(),
        };

        let after_marker = FILE_MARKERS
            .iter()
            .find_map(|marker| url.find(marker).map(|i| &url[i + marker.len()..]))
            .ok_or_else(|| invalid("expected a figma.com/file/<key>/ path"))?;
        let file_key = after_marker
            .split(['/', '?'])
            .next()
            .filter(|key| !key.is_empty())
            .ok_or_else(|| invalid("missing file key"))?;

        let raw_node = url
            .find(NODE_MARKER)
            .map(|i| &url[i + NODE_MARKER.len()..])
            .ok_or_else(|| invalid("missing node-id parameter"))?;
        let decoded = urlencoding::decode(raw_node).map_err(|e| invalid(&e.to_string()))?;
        let node_id = decoded.split('&').next().unwrap_or_default().replace('-', ":");
        if node_id.is_empty() {
            return Err(invalid("empty node-id parameter"));
        }

        Ok(Self {
            file_key: file_key.to_string(),
            node_id,
        })
    }

    /// Link to a node of this file, used in classification records.
    pub fn node_url(&self, node_id: &str) -> String {
        node_url(&self.file_key, node_id)
    }
}

/// `https://www.figma.com/file/<key>/?node-id=<id>`
pub fn node_url(file_key: &str, node_id: &str) -> String {
    format!("https://www.figma.com/file/{}/?node-id={}", file_key, node_id)
}
