// Test doubles for the crawl pipeline.
//
// - MockRenderer (PageRenderer): URL -> HTML map, records every load
// - RecordingPublisher (ResultPublisher): keeps every payload it is handed
// - MockLauncher (BrowserLauncher): hands out MockRenderers, counts launches
//
// Plus HTML builders that mirror the portal markup the extractor expects.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;

use crate::app::config::Config;
use crate::app::error::{CrawlError, Result};
use crate::app::publish::{PublishReceipt, ResultPublisher};
use crate::app::types::{CrawlResult, RenderedPage, TabHandle};
use crate::app::webdriver::{BrowserLauncher, PageRenderer};

// ---------------------------------------------------------------------------
// MockRenderer
// ---------------------------------------------------------------------------

/// Serves registered HTML by URL. Unregistered URLs fail like a navigation
/// timeout would.
#[derive(Default)]
pub struct MockRenderer {
    pages: HashMap<String, String>,
    navigations: Mutex<Vec<String>>,
    tab_loads: Mutex<Vec<String>>,
    open_tabs: Mutex<HashSet<String>>,
    tabs_opened: Mutex<usize>,
}

impl MockRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_page(mut self, url: &str, html: impl Into<String>) -> Self {
        self.pages.insert(url.to_string(), html.into());
        self
    }

    /// URLs loaded in the listing tab, in order.
    pub fn navigations(&self) -> Vec<String> {
        self.navigations.lock().unwrap().clone()
    }

    /// URLs loaded in side tabs, in order.
    pub fn tab_loads(&self) -> Vec<String> {
        self.tab_loads.lock().unwrap().clone()
    }

    pub fn tabs_opened(&self) -> usize {
        *self.tabs_opened.lock().unwrap()
    }

    pub fn tabs_still_open(&self) -> usize {
        self.open_tabs.lock().unwrap().len()
    }

    /// Every load, listing tab and side tabs together.
    pub fn total_loads(&self) -> usize {
        self.navigations.lock().unwrap().len() + self.tab_loads.lock().unwrap().len()
    }

    fn render(&self, url: &str) -> Result<RenderedPage> {
        self.pages
            .get(url)
            .map(|html| RenderedPage {
                url: url.to_string(),
                html: html.clone(),
            })
            .ok_or_else(|| CrawlError::navigation(url, "timeout: no page registered"))
    }
}

#[async_trait]
impl PageRenderer for MockRenderer {
    async fn navigate(&self, url: &str) -> Result<RenderedPage> {
        self.navigations.lock().unwrap().push(url.to_string());
        self.render(url)
    }

    async fn open_tab(&self) -> Result<TabHandle> {
        let mut opened = self.tabs_opened.lock().unwrap();
        *opened += 1;
        let handle = format!("tab-{}", *opened);
        self.open_tabs.lock().unwrap().insert(handle.clone());
        Ok(TabHandle(handle))
    }

    async fn navigate_tab(&self, tab: &TabHandle, url: &str) -> Result<RenderedPage> {
        if !self.open_tabs.lock().unwrap().contains(&tab.0) {
            return Err(CrawlError::Session(format!("tab {} is not open", tab.0)));
        }
        self.tab_loads.lock().unwrap().push(url.to_string());
        self.render(url)
    }

    async fn close_tab(&self, tab: TabHandle) -> Result<()> {
        if self.open_tabs.lock().unwrap().remove(&tab.0) {
            Ok(())
        } else {
            Err(CrawlError::Session(format!("tab {} is not open", tab.0)))
        }
    }
}

// ---------------------------------------------------------------------------
// RecordingPublisher
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct RecordingPublisher {
    published: Mutex<Vec<CrawlResult>>,
}

impl RecordingPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn published(&self) -> Vec<CrawlResult> {
        self.published.lock().unwrap().clone()
    }
}

#[async_trait]
impl ResultPublisher for RecordingPublisher {
    async fn publish(&self, result: &CrawlResult) -> Result<PublishReceipt> {
        self.published.lock().unwrap().push(result.clone());
        Ok(PublishReceipt {
            status: 200,
            status_text: "OK".to_string(),
            body: "recorded".to_string(),
        })
    }
}

// ---------------------------------------------------------------------------
// MockLauncher
// ---------------------------------------------------------------------------

/// Launches a fresh [`MockRenderer`] over the registered pages and keeps the
/// last one handed back at shutdown for inspection.
#[derive(Default)]
pub struct MockLauncher {
    pages: HashMap<String, String>,
    launches: AtomicUsize,
    shutdowns: AtomicUsize,
    last: Mutex<Option<MockRenderer>>,
}

impl MockLauncher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_page(mut self, url: &str, html: impl Into<String>) -> Self {
        self.pages.insert(url.to_string(), html.into());
        self
    }

    pub fn launches(&self) -> usize {
        self.launches.load(Ordering::SeqCst)
    }

    pub fn shutdowns(&self) -> usize {
        self.shutdowns.load(Ordering::SeqCst)
    }

    /// Listing-tab navigations of the most recently shut down browser.
    pub fn last_navigations(&self) -> Vec<String> {
        self.last
            .lock()
            .unwrap()
            .as_ref()
            .map(MockRenderer::navigations)
            .unwrap_or_default()
    }
}

#[async_trait]
impl BrowserLauncher for MockLauncher {
    type Browser = MockRenderer;

    async fn launch(&self, _config: &Config) -> Result<MockRenderer> {
        self.launches.fetch_add(1, Ordering::SeqCst);
        Ok(MockRenderer {
            pages: self.pages.clone(),
            ..MockRenderer::default()
        })
    }

    async fn shutdown(&self, browser: MockRenderer) {
        self.shutdowns.fetch_add(1, Ordering::SeqCst);
        *self.last.lock().unwrap() = Some(browser);
    }
}

// ---------------------------------------------------------------------------
// Portal markup
// ---------------------------------------------------------------------------

/// An idea card as rendered on a listing page.
#[derive(Debug, Clone)]
pub struct CardFixture {
    pub title: String,
    pub slug: String,
    pub created: String,
    pub status: Option<String>,
}

impl CardFixture {
    pub fn new(title: &str, slug: &str) -> Self {
        Self {
            title: title.to_string(),
            slug: slug.to_string(),
            created: "Created Jan 5, 2024 by Jane Doe".to_string(),
            status: None,
        }
    }

    pub fn with_status(mut self, status: &str) -> Self {
        self.status = Some(status.to_string());
        self
    }

    pub fn html(&self) -> String {
        let pill = self
            .status
            .as_ref()
            .map(|s| format!("<span class=\"status-pill\">{s}</span>"))
            .unwrap_or_default();
        format!(
            r#"<li class="idea">
    <a class="idea-link" href="/ideas/{slug}"><h3>{title}</h3></a>
    <div class="description">{title} preview</div>
    <div class="avatar"><img src="/avatars/{slug}.png"></div>
    <div class="idea-meta-created">
        <span class="idea-meta-secondary">{created}</span>
        <span class="idea-meta-secondary">General</span>
    </div>
    <span class="vote-count">7</span>
    <span class="comment-count">2</span>
    {pill}
</li>"#,
            slug = self.slug,
            title = self.title,
            created = self.created,
        )
    }
}

pub fn listing_page(cards: &[CardFixture], next: Option<&str>) -> String {
    let items = cards.iter().map(CardFixture::html).collect::<String>();
    let pagination = next
        .map(|href| {
            format!("<div class=\"pagination\"><a rel=\"next\" href=\"{href}\">Next</a></div>")
        })
        .unwrap_or_default();
    format!(
        "<html><body><div class=\"portal-content\"><ul class=\"list-ideas\">{items}</ul>{pagination}</div></body></html>"
    )
}

/// A landing page listing `(name, id, href)` status filters.
pub fn landing_page(statuses: &[(&str, &str, &str)]) -> String {
    let links = statuses
        .iter()
        .map(|(name, id, href)| {
            format!("<li><a href=\"{href}\" data-url-param-toggle-value=\"{id}\">{name}</a></li>")
        })
        .collect::<String>();
    format!(
        "<html><body><ul class=\"statuses filters\">{links}</ul><div class=\"portal-content\"></div></body></html>"
    )
}

pub fn detail_page(body: &str) -> String {
    format!(
        "<html><body><div class=\"portal-content\"><div class=\"idea-description\"><p>{body}</p></div></div></body></html>"
    )
}
