//! Pure extraction over rendered portal pages.
//!
//! Every function takes a [`RenderedPage`] snapshot and parses it with
//! `scraper`; nothing here touches the browser.

use std::sync::LazyLock;

use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use url::Url;

use super::error::{CrawlError, Result};
use super::types::{IdeaContent, IdeaSummary, RenderedPage, StatusFilter};

const STATUS_LINKS: &str = "ul.statuses.filters a";
const IDEA_CARDS: &str = ".portal-content ul.list-ideas > li.idea";
const NEXT_PAGE_LINK: &str = ".portal-content .pagination a[rel=\"next\"]";
const IDEA_BODY: &str = ".portal-content .idea-description";

const CARD_TITLE: &str = "h3";
const CARD_PREVIEW: &str = ".description";
const CARD_AVATAR: &str = ".avatar img";
const CARD_CREATED: &str = ".idea-meta-created .idea-meta-secondary:first-child";
const CARD_CATEGORY: &str = ".idea-meta-created .idea-meta-secondary:last-child";
const CARD_VOTES: &str = ".vote-count";
const CARD_COMMENTS: &str = ".comment-count";
const CARD_STATUS: &str = ".status-pill";
const CARD_LINK: &str = ".idea-link";

static CREATED_DATE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)^Created (.+) by.+$").expect("static regex"));
static CREATED_BY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)^.+ by (.+)$").expect("static regex"));

pub fn extract_statuses(page: &RenderedPage) -> Result<Vec<StatusFilter>> {
    let doc = Html::parse_document(&page.html);
    let selector = selector(STATUS_LINKS, &page.url)?;

    let mut statuses = Vec::new();
    for link in doc.select(&selector) {
        let name = element_text(&link);
        let href = link.value().attr("href").ok_or_else(|| {
            CrawlError::extraction(&page.url, format!("status filter '{name}' has no href"))
        })?;
        let listing_url = resolve_href(&page.url, href).ok_or_else(|| {
            CrawlError::extraction(&page.url, format!("status filter '{name}' has bad href {href}"))
        })?;
        statuses.push(StatusFilter {
            name,
            id: link
                .value()
                .attr("data-url-param-toggle-value")
                .unwrap_or_default()
                .to_string(),
            listing_url,
        });
    }

    Ok(statuses)
}

/// Parse every idea card of a listing page. A card missing any required
/// node fails the whole page.
pub fn extract_idea_summaries(page: &RenderedPage) -> Result<Vec<IdeaSummary>> {
    let doc = Html::parse_document(&page.html);
    let cards = selector(IDEA_CARDS, &page.url)?;

    doc.select(&cards)
        .enumerate()
        .map(|(index, card)| parse_card(&card, index, &page.url))
        .collect()
}

pub fn extract_next_page_url(page: &RenderedPage) -> Result<Option<String>> {
    let doc = Html::parse_document(&page.html);
    let selector = selector(NEXT_PAGE_LINK, &page.url)?;

    Ok(doc
        .select(&selector)
        .next()
        .and_then(|el| el.value().attr("href"))
        .and_then(|href| resolve_href(&page.url, href.trim())))
}

pub fn extract_idea_content(page: &RenderedPage) -> Result<IdeaContent> {
    let doc = Html::parse_document(&page.html);
    let selector = selector(IDEA_BODY, &page.url)?;
    let body = doc
        .select(&selector)
        .next()
        .ok_or_else(|| CrawlError::extraction(&page.url, "idea description node missing"))?;

    Ok(IdeaContent {
        content_text: element_text(&body),
        content_html: body.inner_html().trim().to_string(),
    })
}

/// Split a `Created <date> by <name>` line into `(date, name)`.
///
/// Both patterns run on the same trimmed string and must both match.
pub fn split_created_line(line: &str) -> Option<(String, String)> {
    let line = line.trim();
    let date = CREATED_DATE.captures(line)?.get(1)?.as_str().trim();
    let name = CREATED_BY.captures(line)?.get(1)?.as_str().trim();
    if date.is_empty() || name.is_empty() {
        return None;
    }
    Some((date.to_string(), name.to_string()))
}

fn parse_card(card: &ElementRef<'_>, index: usize, page_url: &str) -> Result<IdeaSummary> {
    let missing = |what: &str| {
        CrawlError::extraction(page_url, format!("idea card #{} is missing {what}", index + 1))
    };
    let required_text = |css: &str, what: &str| -> Result<String> {
        first_match(card, css, page_url)?
            .map(|el| element_text(&el))
            .ok_or_else(|| missing(what))
    };

    let name = required_text(CARD_TITLE, "its title")?;
    let preview_text = required_text(CARD_PREVIEW, "its preview")?;
    let created_line = required_text(CARD_CREATED, "its created line")?;
    let category = required_text(CARD_CATEGORY, "its category")?;
    let vote_count = required_text(CARD_VOTES, "its vote count")?;
    let comment_count = required_text(CARD_COMMENTS, "its comment count")?;

    let author_image = first_match(card, CARD_AVATAR, page_url)?
        .and_then(|el| el.value().attr("src"))
        .and_then(|src| resolve_href(page_url, src.trim()))
        .ok_or_else(|| missing("its author image"))?;
    let detail_url = first_match(card, CARD_LINK, page_url)?
        .and_then(|el| el.value().attr("href"))
        .and_then(|href| resolve_href(page_url, href.trim()))
        .ok_or_else(|| missing("its detail link"))?;

    let (created_date, author_name) = split_created_line(&created_line).ok_or_else(|| {
        CrawlError::extraction(
            page_url,
            format!(
                "idea card #{} has an unrecognized created line: {created_line:?}",
                index + 1
            ),
        )
    })?;

    let status = first_match(card, CARD_STATUS, page_url)?.map(|el| element_text(&el));

    Ok(IdeaSummary {
        name,
        preview_text,
        author_image,
        author_name,
        created_date,
        category,
        vote_count,
        comment_count,
        status,
        detail_url,
    })
}

fn first_match<'a>(
    scope: &ElementRef<'a>,
    css: &str,
    page_url: &str,
) -> Result<Option<ElementRef<'a>>> {
    let selector = selector(css, page_url)?;
    Ok(scope.select(&selector).next())
}

fn selector(css: &str, page_url: &str) -> Result<Selector> {
    Selector::parse(css)
        .map_err(|e| CrawlError::extraction(page_url, format!("invalid selector {css}: {e}")))
}

fn element_text(el: &ElementRef<'_>) -> String {
    el.text().collect::<String>().trim().to_string()
}

fn resolve_href(page_url: &str, href: &str) -> Option<String> {
    if href.is_empty()
        || href.starts_with('#')
        || href.starts_with("mailto:")
        || href.starts_with("javascript:")
    {
        return None;
    }

    if href.starts_with("http://") || href.starts_with("https://") {
        return Url::parse(href).ok().map(|u| u.to_string());
    }
    let base = Url::parse(page_url).ok()?;
    base.join(href).ok().map(|u| u.to_string())
}
