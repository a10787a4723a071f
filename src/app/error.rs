use thiserror::Error;

pub type Result<T> = std::result::Result<T, CrawlError>;

#[derive(Debug, Error)]
pub enum CrawlError {
    #[error("configuration error: {0}")]
    Config(String),

    /// Browser or driver failure outside of a page navigation.
    #[error("browser session error: {0}")]
    Session(String),

    #[error("navigation to {url} failed: {message}")]
    Navigation { url: String, message: String },

    #[error("extraction failed on {url}: {message}")]
    Extraction { url: String, message: String },

    #[error("publish rejected (status {status}): {message}")]
    PublishRejected { status: u16, message: String },

    #[error("publish failed: {0}")]
    Publish(String),
}

impl CrawlError {
    pub fn extraction(url: &str, message: impl Into<String>) -> Self {
        CrawlError::Extraction {
            url: url.to_string(),
            message: message.into(),
        }
    }

    pub fn navigation(url: &str, message: impl Into<String>) -> Self {
        CrawlError::Navigation {
            url: url.to_string(),
            message: message.into(),
        }
    }

    /// Short stage label used in the operator-facing failure line.
    pub fn stage(&self) -> &'static str {
        match self {
            CrawlError::Config(_) => "configuration",
            CrawlError::Session(_) => "browser session",
            CrawlError::Navigation { .. } => "navigation",
            CrawlError::Extraction { .. } => "extraction",
            CrawlError::PublishRejected { .. } | CrawlError::Publish(_) => "publish",
        }
    }
}
