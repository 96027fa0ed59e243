//! Storage content operations.

use crate::client::ProxmoxClient;
use crate::error::{OperationContext, ProxmoxError, ProxmoxResult};
use crate::transport::ApiRequest;
use crate::types::*;

pub struct StorageManager<'a> {
    client: &'a ProxmoxClient,
}

impl<'a> StorageManager<'a> {
    pub fn new(client: &'a ProxmoxClient) -> Self {
        Self { client }
    }

    /// Have the node fetch a remote image into `storage`. Returns the task
    /// UPID; the download itself runs asynchronously on the node.
    pub async fn download_iso_image(&self, payload: &DownloadIsoPayload) -> ProxmoxResult<Upid> {
        let ctx = OperationContext::new("download_iso_image").node(&payload.node);
        let form = build_download_form(payload).map_err(|e| e.with_context(&ctx))?;

        log::info!(
            "[Proxmox {}] downloading {} into {} as {}",
            payload.node,
            payload.url,
            payload.storage,
            payload.filename
        );
        self.client
            .send(
                ApiRequest::post(format!(
                    "/nodes/{}/storage/{}/download-url",
                    payload.node, payload.storage
                ))
                .form(form),
                &ctx,
            )
            .await
    }
}

pub(crate) fn build_download_form(payload: &DownloadIsoPayload) -> ProxmoxResult<Vec<(String, String)>> {
    validate_node(&payload.node)?;
    if payload.storage.is_empty()
        || !payload
            .storage
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
    {
        return Err(ProxmoxError::validation(format!(
            "Invalid storage id '{}'",
            payload.storage
        )));
    }

    let url = url::Url::parse(&payload.url)
        .map_err(|e| ProxmoxError::validation(format!("Invalid download URL '{}': {e}", payload.url)))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(ProxmoxError::validation(format!(
            "Download URL must be http or https, got '{}'",
            url.scheme()
        )));
    }

    let filename = payload.filename.trim();
    if filename.is_empty() || filename.contains('/') {
        return Err(ProxmoxError::validation(format!(
            "Invalid target file name '{}'",
            payload.filename
        )));
    }

    let mut form = vec![
        ("url".to_string(), payload.url.clone()),
        ("content".to_string(), payload.content.as_str().to_string()),
        ("filename".to_string(), filename.to_string()),
    ];
    match (&payload.checksum, &payload.checksum_algorithm) {
        (Some(sum), Some(algo)) => {
            form.push(("checksum".to_string(), sum.clone()));
            form.push(("checksum-algorithm".to_string(), algo.clone()));
        }
        (None, None) => {}
        _ => {
            return Err(ProxmoxError::validation(
                "checksum and checksumAlgorithm must be given together",
            ))
        }
    }
    Ok(form)
}
