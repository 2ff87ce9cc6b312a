//! Shared fixtures for the integration tests.

#![allow(dead_code)]

use figsync::{ClientConfig, DocumentJob, RetryConfig, SyncConfig};
use image::{DynamicImage, ImageFormat, Rgba, RgbaImage};
use serde_json::{json, Value};
use std::io::Cursor;
use std::path::Path;
use std::time::Duration;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub const FILE_KEY: &str = "KEY";
pub const SOURCE_URL: &str = "https://www.figma.com/file/KEY/Docs?node-id=0-1";

pub const LOGO_SVG: &str = r##"<svg xmlns="http://www.w3.org/2000/svg" width="16" height="16"><rect width="8" height="16" fill="#ffffff"/></svg>"##;
pub const LOGO_SVG_REFORMATTED: &str = r##"<svg height="16" width="16" xmlns="http://www.w3.org/2000/svg">
  <rect fill="#fff" height="16" width="8" />
</svg>"##;

/// 16x16 PNG, left half black and right half white (or the reverse).
pub fn split_png(dark_left: bool) -> Vec<u8> {
    let image = RgbaImage::from_fn(16, 16, |x, _| {
        if (x < 8) == dark_left {
            Rgba([0, 0, 0, 255])
        } else {
            Rgba([255, 255, 255, 255])
        }
    });
    let mut out = Cursor::new(Vec::new());
    DynamicImage::ImageRgba8(image)
        .write_to(&mut out, ImageFormat::Png)
        .unwrap();
    out.into_inner()
}

pub fn config(server: &MockServer) -> SyncConfig {
    SyncConfig {
        client: ClientConfig {
            token: "secret".to_string(),
            api_base_url: server.uri(),
            timeout: Duration::from_secs(10),
            retry: RetryConfig {
                max_retries: 1,
                rate_limit_wait: Duration::from_millis(10),
            },
        },
        workers: 4,
        ..Default::default()
    }
}

pub fn job(export_dir: &Path, referenced: &[&str]) -> DocumentJob {
    DocumentJob {
        source_url: SOURCE_URL.to_string(),
        export_dir: export_dir.to_path_buf(),
        referenced: referenced.iter().map(|s| s.to_string()).collect(),
    }
}

/// Top-level child with the given export formats.
pub fn node(id: &str, name: &str, formats: &[&str]) -> Value {
    let settings: Vec<Value> = formats.iter().map(|f| json!({ "format": f })).collect();
    json!({ "id": id, "name": name, "exportSettings": settings })
}

/// Serves the tree for node `0:1` with the given top-level children.
pub async fn mount_tree(server: &MockServer, children: Vec<Value>) {
    Mock::given(method("GET"))
        .and(path(format!("/files/{}/nodes", FILE_KEY)))
        .and(query_param("ids", "0:1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "nodes": {
                "0:1": { "document": { "id": "0:1", "name": "Page", "children": children } }
            }
        })))
        .mount(server)
        .await;
}

/// Serves the batch export URLs for `ids` (comma-joined) in `format`, pointing at `/assets/<file>`.
pub async fn mount_images(server: &MockServer, format: &str, ids: &[(&str, &str)]) {
    let joined: Vec<&str> = ids.iter().map(|(id, _)| *id).collect();
    let images: serde_json::Map<String, Value> = ids
        .iter()
        .map(|(id, file)| {
            (
                id.to_string(),
                Value::String(format!("{}/assets/{}", server.uri(), file)),
            )
        })
        .collect();
    Mock::given(method("GET"))
        .and(path(format!("/images/{}", FILE_KEY)))
        .and(query_param("ids", joined.join(",")))
        .and(query_param("format", format))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "err": null, "images": images })))
        .mount(server)
        .await;
}

pub async fn mount_asset(server: &MockServer, file: &str, bytes: Vec<u8>, expected_calls: u64) {
    Mock::given(method("GET"))
        .and(path(format!("/assets/{}", file)))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(bytes))
        .expect(expected_calls)
        .mount(server)
        .await;
}
