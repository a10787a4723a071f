use regex::Regex;

use super::error::{CrawlError, Result};
use super::types::EnrichedIdea;

/// Keeps ideas whose text mentions at least one product keyword.
///
/// Keywords are literal, case-sensitive substrings joined into a single
/// alternation, so "webflow" also matches inside "webflows".
#[derive(Debug, Clone)]
pub struct SpamFilter {
    pattern: Regex,
}

impl SpamFilter {
    pub fn new<S: AsRef<str>>(keywords: &[S]) -> Result<Self> {
        if keywords.is_empty() {
            return Err(CrawlError::Config("spam filter needs at least one keyword".to_string()));
        }
        let alternation = keywords
            .iter()
            .map(|k| regex::escape(k.as_ref()))
            .collect::<Vec<_>>()
            .join("|");
        let pattern = Regex::new(&alternation)
            .map_err(|e| CrawlError::Config(format!("spam keyword pattern rejected: {e}")))?;
        Ok(Self { pattern })
    }

    pub fn is_relevant(&self, idea: &EnrichedIdea) -> bool {
        self.pattern.is_match(idea.relevance_text())
    }

    pub fn retain(&self, ideas: Vec<EnrichedIdea>) -> Vec<EnrichedIdea> {
        ideas.into_iter().filter(|idea| self.is_relevant(idea)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::types::{IdeaContent, IdeaSummary};

    fn idea(preview: &str, content: Option<&str>) -> EnrichedIdea {
        EnrichedIdea {
            summary: IdeaSummary {
                name: "idea".to_string(),
                preview_text: preview.to_string(),
                author_image: "https://cdn.example.com/a.png".to_string(),
                author_name: "Jane Doe".to_string(),
                created_date: "Jan 5, 2024".to_string(),
                category: "General".to_string(),
                vote_count: "3".to_string(),
                comment_count: "0".to_string(),
                status: None,
                detail_url: "https://wishlist.example.com/ideas/1".to_string(),
            },
            content: content.map(|text| IdeaContent {
                content_text: text.to_string(),
                content_html: format!("<p>{text}</p>"),
            }),
        }
    }

    fn filter() -> SpamFilter {
        SpamFilter::new(&["webflow", "hosting", "CMS"]).unwrap()
    }

    #[test]
    fn keyword_anywhere_in_content_keeps_the_idea() {
        assert!(filter().is_relevant(&idea("", Some("Please improve our hosting plan"))));
    }

    #[test]
    fn off_topic_content_is_dropped() {
        assert!(!filter().is_relevant(&idea("", Some("my cat's birthday"))));
    }

    #[test]
    fn matching_is_case_sensitive() {
        assert!(!filter().is_relevant(&idea("", Some("HOSTING and Webflow"))));
        assert!(filter().is_relevant(&idea("", Some("cms and CMS"))));
    }

    #[test]
    fn keywords_match_inside_longer_words() {
        assert!(filter().is_relevant(&idea("", Some("I love webflows"))));
    }

    #[test]
    fn content_wins_over_preview_when_enriched() {
        assert!(!filter().is_relevant(&idea("webflow preview", Some("nothing relevant"))));
        assert!(filter().is_relevant(&idea("webflow preview", None)));
    }

    #[test]
    fn keywords_are_literal_not_patterns() {
        let filter = SpamFilter::new(&["C++", "a.b"]).unwrap();
        assert!(filter.is_relevant(&idea("", Some("written in C++"))));
        assert!(!filter.is_relevant(&idea("", Some("axb"))));
    }

    #[test]
    fn retain_keeps_input_order() {
        let kept = filter().retain(vec![
            idea("", Some("CMS one")),
            idea("", Some("cat")),
            idea("", Some("hosting two")),
        ]);
        let texts = kept
            .iter()
            .map(|i| i.relevance_text().to_string())
            .collect::<Vec<_>>();
        assert_eq!(texts, vec!["CMS one", "hosting two"]);
    }

    #[test]
    fn empty_keyword_list_is_rejected() {
        let none: [&str; 0] = [];
        assert!(SpamFilter::new(&none).is_err());
    }
}
