use std::time::Duration;

use async_trait::async_trait;
use tracing::info;
use url::Url;

use super::error::{CrawlError, Result};
use super::types::CrawlResult;

/// What the destination answered to the pushed payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishReceipt {
    pub status: u16,
    pub status_text: String,
    pub body: String,
}

impl std::fmt::Display for PublishReceipt {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({}) : {}", self.status, self.status_text, self.body)
    }
}

#[async_trait]
pub trait ResultPublisher: Send + Sync {
    async fn publish(&self, result: &CrawlResult) -> Result<PublishReceipt>;
}

/// POSTs the crawl result as JSON to a webhook.
pub struct WebhookPublisher {
    client: reqwest::Client,
    url: Url,
}

impl WebhookPublisher {
    pub fn new(url: Url) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(|e| CrawlError::Publish(format!("http client build failed: {e}")))?;
        Ok(Self { client, url })
    }
}

#[async_trait]
impl ResultPublisher for WebhookPublisher {
    async fn publish(&self, result: &CrawlResult) -> Result<PublishReceipt> {
        info!(
            host = self.url.host_str().unwrap_or_default(),
            statuses = result.ideas_by_statuses.len(),
            ideas = result.idea_count(),
            "pushing results"
        );

        let resp = self
            .client
            .post(self.url.clone())
            .json(result)
            .send()
            .await
            .map_err(|e| CrawlError::Publish(e.to_string()))?;

        let status = resp.status();
        let body = resp.text().await;
        if !status.is_success() {
            return Err(CrawlError::PublishRejected {
                status: status.as_u16(),
                message: body.unwrap_or_else(|e| format!("<unreadable response body: {e}>")),
            });
        }
        let body = body.map_err(|e| {
            CrawlError::Publish(format!(
                "endpoint answered {} but its response body could not be read: {e}",
                status.as_u16()
            ))
        })?;

        Ok(PublishReceipt {
            status: status.as_u16(),
            status_text: status.canonical_reason().unwrap_or_default().to_string(),
            body,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn receipt_renders_like_an_http_status_line() {
        let receipt = PublishReceipt {
            status: 200,
            status_text: "OK".to_string(),
            body: "stored 12 ideas".to_string(),
        };
        assert_eq!(receipt.to_string(), "200 (OK) : stored 12 ideas");
    }
}
