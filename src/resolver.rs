//! Export URL resolution.

use crate::client::FigmaClient;
use crate::error::SyncError;
use crate::types::Format;
use futures_util::{stream, StreamExt, TryStreamExt};
use serde::Deserialize;
use std::collections::HashMap;
use tracing::{info, warn};

#[derive(Deserialize, Debug)]
struct ImagesResponse {
    #[serde(default)]
    err: Option<String>,
    #[serde(default)]
    images: HashMap<String, Option<String>>,
}

/// Resolves download URLs for `ids` in `format`.
///
/// One batched request is tried first. If it fails for any reason, or does not return a
/// URL for every id, the ids are resolved one at a time with up to `concurrency`
/// requests in flight. Ids that still have no URL are left out of the map.
pub async fn resolve(
    client: &FigmaClient,
    file_key: &str,
    ids: &[String],
    format: Format,
    concurrency: usize,
) -> Result<HashMap<String, String>, SyncError> {
    if ids.is_empty() {
        return Ok(HashMap::new());
    }
    info!(
        "Obtaining download urls for {} {} elements...",
        ids.len(),
        format
    );

    match resolve_batch(client, file_key, ids, format).await {
        Ok(urls) => Ok(urls),
        Err(e) => {
            warn!(
                "Export using single request failed ({}). Switching to independent export mode...",
                e
            );
            resolve_each(client, file_key, ids, format, concurrency).await
        }
    }
}

async fn resolve_batch(
    client: &FigmaClient,
    file_key: &str,
    ids: &[String],
    format: Format,
) -> Result<HashMap<String, String>, SyncError> {
    let joined = ids.join(",");
    let response = request_images(client, file_key, &joined, format).await?;

    let mut urls = HashMap::with_capacity(ids.len());
    for id in ids {
        let url = response
            .get(id)
            .cloned()
            .ok_or_else(|| SyncError::MalformedResponse(format!("no export URL for node {}", id)))?;
        urls.insert(id.clone(), url);
    }
    Ok(urls)
}

async fn resolve_each(
    client: &FigmaClient,
    file_key: &str,
    ids: &[String],
    format: Format,
    concurrency: usize,
) -> Result<HashMap<String, String>, SyncError> {
    let resolved: Vec<Option<(String, String)>> = stream::iter(ids)
        .map(|id| async move {
            let mut response = request_images(client, file_key, id, format).await?;
            let entry = response.remove(id).map(|url| (id.clone(), url));
            if entry.is_none() {
                warn!("Figma returned no export URL for node {}, skipping", id);
            }
            Ok::<_, SyncError>(entry)
        })
        .buffer_unordered(concurrency.max(1))
        .try_collect()
        .await?;

    Ok(resolved.into_iter().flatten().collect())
}

async fn request_images(
    client: &FigmaClient,
    file_key: &str,
    ids: &str,
    format: Format,
) -> Result<HashMap<String, String>, SyncError> {
    let response: ImagesResponse = client
        .get(
            &format!("images/{}", file_key),
            &[("ids", ids), ("format", format.extension())],
        )
        .await?;

    if let Some(err) = response.err {
        return Err(SyncError::MalformedResponse(err));
    }
    Ok(response
        .images
        .into_iter()
        .filter_map(|(id, url)| url.map(|url| (id, url)))
        .collect())
}
