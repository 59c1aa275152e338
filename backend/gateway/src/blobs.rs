//! Image upload proxy for the blob storage publisher.

use reqwest::Client;
use serde::Serialize;
use serde_json::Value;
use tracing::info;

use crate::errors::{GatewayError, Result};

#[derive(Clone)]
pub struct BlobStore {
    publisher_url: String,
    aggregator_url: String,
    epochs: u32,
    client: Client,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UploadedBlob {
    pub blob_id: String,
    pub url: String,
}

impl BlobStore {
    pub fn new(publisher_url: String, aggregator_url: String, epochs: u32, client: Client) -> Self {
        Self {
            publisher_url: publisher_url.trim_end_matches('/').to_string(),
            aggregator_url: aggregator_url.trim_end_matches('/').to_string(),
            epochs,
            client,
        }
    }

    /// Public read URL for a stored blob.
    pub fn blob_url(&self, blob_id: &str) -> String {
        format!("{}/v1/blobs/{blob_id}", self.aggregator_url)
    }

    pub async fn upload(&self, bytes: Vec<u8>) -> Result<UploadedBlob> {
        if bytes.is_empty() {
            return Err(GatewayError::BadRequest("Please select a file".to_string()));
        }
        let size = bytes.len();

        let response = self
            .client
            .put(format!("{}/v1/blobs", self.publisher_url))
            .query(&[("epochs", self.epochs)])
            .body(bytes)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(GatewayError::external(status.as_u16(), "Upload failed"));
        }

        let body: Value = response.json().await?;
        let blob_id = extract_blob_id(&body).ok_or_else(|| {
            GatewayError::external(status.as_u16(), "Could not find blobId in response")
        })?;
        info!("Stored {size}-byte blob {blob_id}");

        Ok(UploadedBlob {
            url: self.blob_url(&blob_id),
            blob_id,
        })
    }
}

/// The publisher reports either a newly created blob or one that was already
/// certified; the id lives in a different place for each.
pub fn extract_blob_id(body: &Value) -> Option<String> {
    [
        "/newlyCreated/blobObject/blobId",
        "/newlyCreated/blobId",
        "/alreadyCertified/blobId",
    ]
    .iter()
    .find_map(|pointer| body.pointer(pointer).and_then(Value::as_str))
    .map(String::from)
}
