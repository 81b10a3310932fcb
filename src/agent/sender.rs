//! Batch delivery to the server's `/updates/` endpoint.

use anyhow::{bail, Result};
use async_trait::async_trait;
use std::time::Duration;

use crate::metric::Metric;

#[async_trait]
pub trait BatchSender: Send + Sync {
    async fn send(&self, batch: &[Metric]) -> Result<()>;
}

/// POSTs each batch as a JSON array. No retries: a failed send is the
/// caller's to log and drop.
pub struct HttpSender {
    client: reqwest::Client,
    url: String,
}

impl HttpSender {
    pub fn new(address: &str) -> Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(5))
            .build()?;
        Ok(HttpSender {
            client,
            url: batch_url(address),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

/// `localhost:8080` → `http://localhost:8080/updates/`. Addresses that already
/// carry a scheme are kept as given.
pub fn batch_url(address: &str) -> String {
    let base = address.trim().trim_end_matches('/');
    if base.starts_with("http://") || base.starts_with("https://") {
        format!("{}/updates/", base)
    } else {
        format!("http://{}/updates/", base)
    }
}

#[async_trait]
impl BatchSender for HttpSender {
    async fn send(&self, batch: &[Metric]) -> Result<()> {
        let resp = self.client.post(&self.url).json(batch).send().await?;
        let status = resp.status();
        let body = resp.bytes().await?;
        if !status.is_success() {
            bail!(
                "server rejected batch with {}: {}",
                status,
                String::from_utf8_lossy(&body).trim()
            );
        }
        Ok(())
    }
}
