use async_trait::async_trait;
use reqwest::{Client, StatusCode};

use crate::domain::{DomainError, DomainResult};

/// Result of probing one object in the store (§4.8): present with whatever
/// metadata the store reported, or absent (404).
#[derive(Debug, Clone)]
pub enum ProbeOutcome {
    Missing,
    Present { size_bytes: Option<i64>, checksum: Option<String> },
}

/// The second half of the "integration seam" spec.md's Design Notes name:
/// `ObjectStoreInspector` sits alongside `UrlSigner` as the contract a real
/// S3/R2/GCS deployment implements.
#[async_trait]
pub trait ObjectStoreInspector: Send + Sync {
    async fn probe(&self, download_url: &str) -> DomainResult<ProbeOutcome>;
    async fn list_inventory(&self) -> DomainResult<Vec<String>>;
}

pub struct HttpObjectStoreInspector {
    client: Client,
    inventory_url: Option<String>,
}

impl HttpObjectStoreInspector {
    pub fn new(client: Client, inventory_url: Option<String>) -> Self {
        Self { client, inventory_url }
    }

    fn checksum_from_headers(headers: &reqwest::header::HeaderMap) -> Option<String> {
        if let Some(v) = headers.get("x-amz-meta-sha256").and_then(|v| v.to_str().ok()) {
            return Some(v.to_ascii_lowercase());
        }
        headers
            .get(reqwest::header::ETAG)
            .and_then(|v| v.to_str().ok())
            .map(|etag| etag.trim_matches('"').to_ascii_lowercase())
    }

    fn size_from_headers(headers: &reqwest::header::HeaderMap) -> Option<i64> {
        headers
            .get(reqwest::header::CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<i64>().ok())
    }
}

#[async_trait]
impl ObjectStoreInspector for HttpObjectStoreInspector {
    async fn probe(&self, download_url: &str) -> DomainResult<ProbeOutcome> {
        let head_resp = self
            .client
            .head(download_url)
            .send()
            .await
            .map_err(|err| DomainError::Internal(anyhow::anyhow!("object probe transport error: {err}")))?;

        let resp = if matches!(head_resp.status(), StatusCode::METHOD_NOT_ALLOWED | StatusCode::NOT_IMPLEMENTED) {
            self.client
                .get(download_url)
                .header(reqwest::header::RANGE, "bytes=0-0")
                .send()
                .await
                .map_err(|err| DomainError::Internal(anyhow::anyhow!("object probe transport error: {err}")))?
        } else {
            head_resp
        };

        if resp.status() == StatusCode::NOT_FOUND {
            return Ok(ProbeOutcome::Missing);
        }
        if !resp.status().is_success() && resp.status() != StatusCode::PARTIAL_CONTENT {
            return Err(DomainError::Internal(anyhow::anyhow!(
                "object probe returned unexpected status {}",
                resp.status()
            )));
        }

        Ok(ProbeOutcome::Present {
            size_bytes: Self::size_from_headers(resp.headers()),
            checksum: Self::checksum_from_headers(resp.headers()),
        })
    }

    async fn list_inventory(&self) -> DomainResult<Vec<String>> {
        let Some(url) = &self.inventory_url else {
            return Ok(Vec::new());
        };

        let resp = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|err| DomainError::Internal(anyhow::anyhow!("inventory listing transport error: {err}")))?;

        if !resp.status().is_success() {
            return Err(DomainError::Internal(anyhow::anyhow!(
                "inventory listing returned status {}",
                resp.status()
            )));
        }

        let keys: Vec<String> = resp
            .json()
            .await
            .map_err(|err| DomainError::Internal(anyhow::anyhow!("inventory listing decode error: {err}")))?;

        Ok(keys)
    }
}
