use clap::{ArgAction, Parser, ValueEnum};
use serde::Serialize;

#[derive(Debug, Parser, Clone)]
#[command(
    name = "wishwatch",
    version,
    about = "Crawls a wishlist portal with a headless browser and pushes the ideas to a webhook"
)]
pub struct Cli {
    #[arg(
        long,
        env = "PORTAL_URL",
        value_name = "URL",
        default_value = "https://wishlist.webflow.com/"
    )]
    pub portal_url: String,

    #[arg(long, env = "CRAWL_DELAY_MS", value_name = "MS", default_value_t = 1500)]
    pub delay_ms: u64,

    #[arg(long, env = "NAV_TIMEOUT_MS", value_name = "MS", default_value_t = 15000)]
    pub nav_timeout_ms: u64,

    #[arg(long, value_name = "N", default_value_t = 200)]
    pub max_pages: usize,

    #[arg(long, value_name = "N", default_value_t = 1)]
    pub recent_pages: usize,

    #[arg(long, default_value_t = false)]
    pub no_enrich: bool,

    #[arg(long, default_value_t = false)]
    pub dry_run: bool,

    #[arg(
        long,
        env = "WEBDRIVER_URL",
        value_name = "URL",
        default_value = "http://localhost:4444"
    )]
    pub webdriver_url: String,

    #[arg(long, value_enum, default_value_t = BrowserArg::Chrome)]
    pub webdriver_browser: BrowserArg,

    #[arg(long, env = "WEBDRIVER_BINARY", value_name = "PATH")]
    pub webdriver_binary: Option<String>,

    #[arg(long, default_value_t = false)]
    pub no_webdriver_autostart: bool,

    #[arg(long, value_name = "MS", default_value_t = 12000)]
    pub webdriver_start_timeout_ms: u64,

    #[arg(long, default_value_t = false, action = ArgAction::SetTrue)]
    pub headed: bool,
}

#[derive(Debug, Copy, Clone, ValueEnum, PartialEq, Eq)]
pub enum BrowserArg {
    Chrome,
    Firefox,
    Edge,
}

/// One status category discovered in the portal's filter navigation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusFilter {
    pub name: String,
    pub id: String,
    #[serde(rename = "url")]
    pub listing_url: String,
}

/// One idea card as it appears on a listing page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IdeaSummary {
    pub name: String,
    #[serde(rename = "preview")]
    pub preview_text: String,
    #[serde(rename = "userImage")]
    pub author_image: String,
    #[serde(rename = "userName")]
    pub author_name: String,
    #[serde(rename = "date")]
    pub created_date: String,
    pub category: String,
    // Display strings, kept verbatim ("1.2k", "12").
    pub vote_count: String,
    pub comment_count: String,
    pub status: Option<String>,
    #[serde(rename = "url")]
    pub detail_url: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IdeaContent {
    pub content_text: String,
    pub content_html: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EnrichedIdea {
    #[serde(flatten)]
    pub summary: IdeaSummary,
    /// `None` when the crawl ran without enrichment.
    #[serde(flatten)]
    pub content: Option<IdeaContent>,
}

impl EnrichedIdea {
    pub fn unenriched(summary: IdeaSummary) -> Self {
        Self {
            summary,
            content: None,
        }
    }

    /// Text the relevance check runs against: the detail body when present,
    /// the listing preview otherwise.
    pub fn relevance_text(&self) -> &str {
        self.content
            .as_ref()
            .map(|c| c.content_text.as_str())
            .unwrap_or(&self.summary.preview_text)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusIdeas {
    #[serde(flatten)]
    pub status: StatusFilter,
    pub ideas: Vec<EnrichedIdea>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CrawlResult {
    pub ideas_by_statuses: Vec<StatusIdeas>,
    pub recent_ideas: Vec<EnrichedIdea>,
}

impl CrawlResult {
    pub fn idea_count(&self) -> usize {
        self.ideas_by_statuses
            .iter()
            .map(|s| s.ideas.len())
            .sum::<usize>()
            + self.recent_ideas.len()
    }
}

/// Snapshot of a rendered DOM: final location plus serialized document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedPage {
    pub url: String,
    pub html: String,
}

/// Opaque handle to a secondary browser tab.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TabHandle(pub String);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Enrichment {
    Full,
    Skip,
}
