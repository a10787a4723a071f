use std::path::{Path, PathBuf};
use std::time::Duration;

use tracing::info;
use url::Url;

use super::error::{CrawlError, Result};
use super::types::{BrowserArg, Cli, Enrichment};

/// Lower bound on the pause between two requests to the portal.
pub const MIN_REQUEST_DELAY: Duration = Duration::from_millis(1500);

/// The portal product vocabulary. Matching is case-sensitive substring
/// matching, so both spellings are listed where both occur in practice.
/// Plain English words ("form", "page", "site") are left out: as substrings
/// they match almost any text.
pub const DEFAULT_SPAM_KEYWORDS: &[&str] = &[
    "webflow",
    "Webflow",
    "CMS",
    "hosting",
    "Hosting",
    "Designer",
    "Editor",
    "interactions",
    "Interactions",
    "ecommerce",
    "Ecommerce",
    "e-commerce",
    "E-commerce",
    "symbols",
    "Symbols",
    "collections",
    "Collections",
    "Memberships",
    "memberships",
    "Logic",
    "localization",
    "Localization",
    "breakpoint",
    "Breakpoint",
    "Lottie",
];

#[derive(Debug, Clone)]
pub struct WebDriverOptions {
    pub endpoint: String,
    pub browser: BrowserArg,
    pub binary: Option<String>,
    pub autostart: bool,
    pub start_timeout: Duration,
    pub headless: bool,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub push_url: Url,
    pub portal_url: String,
    pub recent_url: String,
    pub request_delay: Duration,
    pub nav_timeout: Duration,
    pub max_pages: usize,
    pub recent_pages: usize,
    pub enrichment: Enrichment,
    pub dry_run: bool,
    pub spam_keywords: Vec<String>,
    pub webdriver: WebDriverOptions,
}

impl Config {
    /// Resolve configuration from the parsed CLI and an environment lookup.
    /// Call [`load_dotenv`] before parsing the CLI so `.env` values are
    /// visible to both.
    pub fn resolve(cli: &Cli, lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let push_url = lookup("PUSH_URL")
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .ok_or_else(|| {
                CrawlError::Config(
                    "PUSH_URL must be set (environment or .env file)".to_string(),
                )
            })?;
        let push_url = parse_http_url("PUSH_URL", &push_url)?;

        let portal = parse_http_url("portal URL", &cli.portal_url)?;
        let mut recent = portal.clone();
        recent.query_pairs_mut().append_pair("sort", "recent");

        let spam_keywords = match lookup("SPAM_KEYWORDS") {
            Some(raw) => parse_keyword_list(&raw),
            None => DEFAULT_SPAM_KEYWORDS.iter().map(|s| s.to_string()).collect(),
        };
        if spam_keywords.is_empty() {
            return Err(CrawlError::Config(
                "SPAM_KEYWORDS is set but contains no keywords".to_string(),
            ));
        }

        if cli.nav_timeout_ms == 0 {
            return Err(CrawlError::Config(
                "navigation timeout must be greater than zero".to_string(),
            ));
        }

        Ok(Self {
            push_url,
            portal_url: portal.to_string(),
            recent_url: recent.to_string(),
            request_delay: Duration::from_millis(cli.delay_ms).max(MIN_REQUEST_DELAY),
            nav_timeout: Duration::from_millis(cli.nav_timeout_ms),
            max_pages: cli.max_pages.max(1),
            recent_pages: cli.recent_pages.max(1),
            enrichment: if cli.no_enrich {
                Enrichment::Skip
            } else {
                Enrichment::Full
            },
            dry_run: cli.dry_run,
            spam_keywords,
            webdriver: WebDriverOptions {
                endpoint: cli.webdriver_url.clone(),
                browser: cli.webdriver_browser,
                binary: cli.webdriver_binary.clone(),
                autostart: !cli.no_webdriver_autostart,
                start_timeout: Duration::from_millis(cli.webdriver_start_timeout_ms),
                headless: !cli.headed,
            },
        })
    }

    /// Log the effective settings without leaking webhook credentials.
    pub fn log_redacted(&self) {
        info!(
            portal = self.portal_url.as_str(),
            push_host = self.push_url.host_str().unwrap_or_default(),
            delay_ms = self.request_delay.as_millis() as u64,
            nav_timeout_ms = self.nav_timeout.as_millis() as u64,
            max_pages = self.max_pages,
            recent_pages = self.recent_pages,
            enrich = matches!(self.enrichment, Enrichment::Full),
            keywords = self.spam_keywords.len(),
            "configuration loaded"
        );
    }
}

/// Load a `.env` file (the one found from the working directory when `path`
/// is `None`) into the process environment. Variables already set in the
/// environment keep their value. A missing file is not an error.
pub fn load_dotenv(path: Option<&Path>) -> Result<Option<PathBuf>> {
    let loaded = match path {
        Some(path) => dotenvy::from_path(path).map(|_| path.to_path_buf()),
        None => dotenvy::dotenv(),
    };
    match loaded {
        Ok(path) => Ok(Some(path)),
        Err(err) if err.not_found() => Ok(None),
        Err(err) => Err(CrawlError::Config(format!(".env could not be read: {err}"))),
    }
}

fn parse_http_url(label: &str, raw: &str) -> Result<Url> {
    let url = Url::parse(raw)
        .map_err(|e| CrawlError::Config(format!("{label} is not a valid URL ({raw}): {e}")))?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(CrawlError::Config(format!(
            "{label} must use http or https, got {other}"
        ))),
    }
}

fn parse_keyword_list(raw: &str) -> Vec<String> {
    let mut out = Vec::new();
    for keyword in raw.split(',').map(str::trim).filter(|k| !k.is_empty()) {
        if !out.iter().any(|k: &String| k == keyword) {
            out.push(keyword.to_string());
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use clap::Parser;

    use super::*;
    use crate::app::spam::SpamFilter;
    use crate::app::types::{EnrichedIdea, IdeaSummary};

    fn cli(args: &[&str]) -> Cli {
        let mut argv = vec!["wishwatch"];
        argv.extend_from_slice(args);
        Cli::parse_from(argv)
    }

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect::<HashMap<_, _>>();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn missing_push_url_is_a_config_error() {
        let err = Config::resolve(&cli(&[]), lookup(&[])).unwrap_err();
        assert!(matches!(err, CrawlError::Config(_)));
        assert_eq!(err.stage(), "configuration");
    }

    #[test]
    fn blank_push_url_is_a_config_error() {
        let err = Config::resolve(&cli(&[]), lookup(&[("PUSH_URL", "   ")])).unwrap_err();
        assert!(matches!(err, CrawlError::Config(_)));
    }

    #[test]
    fn non_http_push_url_is_rejected() {
        let err =
            Config::resolve(&cli(&[]), lookup(&[("PUSH_URL", "ftp://example.com/x")])).unwrap_err();
        assert!(matches!(err, CrawlError::Config(_)));
    }

    #[test]
    fn defaults_follow_portal_conventions() {
        let config = Config::resolve(
            &cli(&[]),
            lookup(&[("PUSH_URL", "https://hooks.example.com/ideas")]),
        )
        .unwrap();

        assert_eq!(config.portal_url, "https://wishlist.webflow.com/");
        assert_eq!(config.recent_url, "https://wishlist.webflow.com/?sort=recent");
        assert_eq!(config.request_delay, Duration::from_millis(1500));
        assert_eq!(config.nav_timeout, Duration::from_secs(15));
        assert_eq!(config.recent_pages, 1);
        assert_eq!(config.enrichment, Enrichment::Full);
        assert!(config.webdriver.headless);
        assert!(config.webdriver.autostart);
        assert_eq!(config.spam_keywords.len(), DEFAULT_SPAM_KEYWORDS.len());
    }

    #[test]
    fn request_delay_never_drops_below_floor() {
        let config = Config::resolve(
            &cli(&["--delay-ms", "200"]),
            lookup(&[("PUSH_URL", "https://hooks.example.com/ideas")]),
        )
        .unwrap();
        assert_eq!(config.request_delay, MIN_REQUEST_DELAY);

        let config = Config::resolve(
            &cli(&["--delay-ms", "4000"]),
            lookup(&[("PUSH_URL", "https://hooks.example.com/ideas")]),
        )
        .unwrap();
        assert_eq!(config.request_delay, Duration::from_secs(4));
    }

    #[test]
    fn keyword_override_keeps_order_and_drops_blanks() {
        let config = Config::resolve(
            &cli(&["--no-enrich"]),
            lookup(&[
                ("PUSH_URL", "https://hooks.example.com/ideas"),
                ("SPAM_KEYWORDS", "webflow, hosting,,CMS,hosting"),
            ]),
        )
        .unwrap();
        assert_eq!(config.spam_keywords, vec!["webflow", "hosting", "CMS"]);
        assert_eq!(config.enrichment, Enrichment::Skip);
    }

    #[test]
    fn default_keywords_drop_ordinary_spam() {
        let filter = SpamFilter::new(DEFAULT_SPAM_KEYWORDS).unwrap();
        let idea = |text: &str| {
            EnrichedIdea::unenriched(IdeaSummary {
                name: "idea".to_string(),
                preview_text: text.to_string(),
                author_image: "https://cdn.example.com/a.png".to_string(),
                author_name: "Jane Doe".to_string(),
                created_date: "Jan 5, 2024".to_string(),
                category: "General".to_string(),
                vote_count: "0".to_string(),
                comment_count: "0".to_string(),
                status: None,
                detail_url: "https://wishlist.example.com/ideas/1".to_string(),
            })
        };

        for spam in [
            "Buy cheap replica watches, more information on my website",
            "Best casino platform, click here",
            "I need a formal dress for prom",
            "Check out my page for the best style tips",
        ] {
            assert!(!filter.is_relevant(&idea(spam)), "{spam}");
        }
        assert!(filter.is_relevant(&idea("Bind CMS fields to Interactions in the Designer")));
        assert!(filter.is_relevant(&idea("Webflow should support Lottie in Memberships")));
    }

    #[test]
    fn empty_keyword_override_is_rejected() {
        let err = Config::resolve(
            &cli(&[]),
            lookup(&[
                ("PUSH_URL", "https://hooks.example.com/ideas"),
                ("SPAM_KEYWORDS", " , "),
            ]),
        )
        .unwrap_err();
        assert!(matches!(err, CrawlError::Config(_)));
    }
}
