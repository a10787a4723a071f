use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use tracing::{debug, error, info, warn};

use super::config::Config;
use super::error::Result;
use super::extract::{
    extract_idea_content, extract_idea_summaries, extract_next_page_url, extract_statuses,
};
use super::publish::{PublishReceipt, ResultPublisher};
use super::spam::SpamFilter;
use super::types::{
    CrawlResult, EnrichedIdea, Enrichment, IdeaContent, IdeaSummary, StatusFilter, StatusIdeas,
};
use super::webdriver::PageRenderer;

/// Enforces the fixed pause before each request to the portal.
#[derive(Debug)]
pub struct Pacer {
    delay: Duration,
    paced: AtomicUsize,
}

impl Pacer {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            paced: AtomicUsize::new(0),
        }
    }

    pub async fn pace(&self) {
        self.paced.fetch_add(1, Ordering::Relaxed);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
    }

    /// Number of requests paced so far.
    pub fn paced(&self) -> usize {
        self.paced.load(Ordering::Relaxed)
    }
}

/// What to crawl, independent of how pages are rendered.
#[derive(Debug, Clone)]
pub struct CrawlPlan {
    pub portal_url: String,
    pub recent_url: String,
    pub max_pages: usize,
    pub recent_pages: usize,
    pub enrichment: Enrichment,
}

impl From<&Config> for CrawlPlan {
    fn from(config: &Config) -> Self {
        Self {
            portal_url: config.portal_url.clone(),
            recent_url: config.recent_url.clone(),
            max_pages: config.max_pages,
            recent_pages: config.recent_pages,
            enrichment: config.enrichment,
        }
    }
}

enum PageState {
    Fetching(String),
    HasIdeas { next: Option<String> },
    Done,
}

/// Follow a listing's "next" links from `start_url`, collecting every idea
/// card in page order.
///
/// Stops when a page has no next link, when a next link points at a page
/// already visited, or after `max_pages` pages.
pub async fn paginate<R: PageRenderer + ?Sized>(
    renderer: &R,
    pacer: &Pacer,
    start_url: &str,
    max_pages: usize,
) -> Result<Vec<IdeaSummary>> {
    let mut ideas = Vec::new();
    let mut visited = HashSet::<String>::new();
    let mut pages = 0usize;
    let mut state = PageState::Fetching(start_url.to_string());

    loop {
        state = match state {
            PageState::Fetching(url) => {
                let page = renderer.navigate(&url).await?;
                pages += 1;
                visited.insert(url);
                visited.insert(page.url.clone());

                let found = extract_idea_summaries(&page)?;
                debug!(url = page.url.as_str(), ideas = found.len(), "listing page parsed");
                ideas.extend(found);
                PageState::HasIdeas {
                    next: extract_next_page_url(&page)?,
                }
            }
            PageState::HasIdeas { next: None } => PageState::Done,
            PageState::HasIdeas { next: Some(next) } => {
                if visited.contains(&next) {
                    warn!(url = next.as_str(), pages, "pagination loops back to a visited page");
                    PageState::Done
                } else if pages >= max_pages.max(1) {
                    info!(start = start_url, pages, "page limit reached");
                    PageState::Done
                } else {
                    pacer.pace().await;
                    PageState::Fetching(next)
                }
            }
            PageState::Done => return Ok(ideas),
        };
    }
}

/// Run the paginator once per status filter, in discovery order.
pub async fn crawl_statuses<R: PageRenderer + ?Sized>(
    renderer: &R,
    pacer: &Pacer,
    statuses: Vec<StatusFilter>,
    max_pages: usize,
) -> Result<Vec<(StatusFilter, Vec<IdeaSummary>)>> {
    let mut out = Vec::with_capacity(statuses.len());
    for status in statuses {
        pacer.pace().await;
        let ideas = paginate(renderer, pacer, &status.listing_url, max_pages)
            .await
            .inspect_err(|e| {
                error!(status = status.name.as_str(), error = %e, "status listing failed")
            })?;
        info!(status = status.name.as_str(), ideas = ideas.len(), "status listing collected");
        out.push((status, ideas));
    }
    Ok(out)
}

/// Attach detail-page content to every summary, preserving input order.
/// Each detail page is loaded in its own tab so the listing tab is left alone.
pub async fn enrich<R: PageRenderer + ?Sized>(
    renderer: &R,
    pacer: &Pacer,
    ideas: Vec<IdeaSummary>,
    mode: Enrichment,
) -> Result<Vec<EnrichedIdea>> {
    if mode == Enrichment::Skip {
        return Ok(ideas.into_iter().map(EnrichedIdea::unenriched).collect());
    }

    let mut out = Vec::with_capacity(ideas.len());
    for summary in ideas {
        pacer.pace().await;
        let content = fetch_idea_content(renderer, &summary.detail_url).await?;
        out.push(EnrichedIdea {
            summary,
            content: Some(content),
        });
    }
    Ok(out)
}

async fn fetch_idea_content<R: PageRenderer + ?Sized>(
    renderer: &R,
    url: &str,
) -> Result<IdeaContent> {
    let tab = renderer.open_tab().await?;
    let loaded = renderer.navigate_tab(&tab, url).await;
    let closed = renderer.close_tab(tab).await;
    let page = loaded?;
    closed?;
    extract_idea_content(&page)
}

async fn refine<R: PageRenderer + ?Sized>(
    renderer: &R,
    pacer: &Pacer,
    plan: &CrawlPlan,
    spam: &SpamFilter,
    context: &str,
    summaries: Vec<IdeaSummary>,
) -> Result<Vec<EnrichedIdea>> {
    let scraped = summaries.len();
    let enriched = enrich(renderer, pacer, summaries, plan.enrichment).await?;
    let kept = spam.retain(enriched);
    info!(
        context,
        scraped,
        kept = kept.len(),
        dropped = scraped - kept.len(),
        "ideas filtered"
    );
    Ok(kept)
}

/// Crawl every status listing and the recent view, then enrich and filter
/// each listing context.
pub async fn crawl<R: PageRenderer + ?Sized>(
    renderer: &R,
    pacer: &Pacer,
    plan: &CrawlPlan,
    spam: &SpamFilter,
) -> Result<CrawlResult> {
    let landing = renderer.navigate(&plan.portal_url).await?;
    let statuses = extract_statuses(&landing)?;
    info!(count = statuses.len(), "status filters discovered");

    let by_status = crawl_statuses(renderer, pacer, statuses, plan.max_pages).await?;

    pacer.pace().await;
    let recent = paginate(renderer, pacer, &plan.recent_url, plan.recent_pages).await?;
    info!(ideas = recent.len(), "recent ideas collected");

    let mut ideas_by_statuses = Vec::with_capacity(by_status.len());
    for (status, summaries) in by_status {
        let ideas = refine(renderer, pacer, plan, spam, &status.name, summaries).await?;
        ideas_by_statuses.push(StatusIdeas { status, ideas });
    }
    let recent_ideas = refine(renderer, pacer, plan, spam, "recent", recent).await?;

    Ok(CrawlResult {
        ideas_by_statuses,
        recent_ideas,
    })
}

/// Crawl, then hand the result to the publisher exactly once.
pub async fn crawl_and_publish<R, P>(
    renderer: &R,
    publisher: &P,
    pacer: &Pacer,
    plan: &CrawlPlan,
    spam: &SpamFilter,
) -> Result<PublishReceipt>
where
    R: PageRenderer + ?Sized,
    P: ResultPublisher + ?Sized,
{
    let result = crawl(renderer, pacer, plan, spam).await?;
    info!(
        statuses = result.ideas_by_statuses.len(),
        ideas = result.idea_count(),
        paced_requests = pacer.paced(),
        "crawl finished"
    );
    publisher.publish(&result).await
}
