//! Wishlist portal crawler: discovers status filters, walks every listing,
//! enriches ideas from their detail pages, drops off-topic entries and pushes
//! the result to a webhook.

pub mod app;

#[cfg(any(test, feature = "test-support"))]
pub mod testing;

pub use app::error::{CrawlError, Result};
pub use app::types::{
    CrawlResult, EnrichedIdea, Enrichment, IdeaContent, IdeaSummary, RenderedPage, StatusFilter,
    StatusIdeas, TabHandle,
};
