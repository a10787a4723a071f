use std::time::Duration;

use serde_json::Value;
use wishwatch::app::crawl::{CrawlPlan, Pacer, crawl, crawl_and_publish};
use wishwatch::app::spam::SpamFilter;
use wishwatch::testing::{
    CardFixture, MockRenderer, RecordingPublisher, detail_page, landing_page, listing_page,
};
use wishwatch::{CrawlError, Enrichment};

const PORTAL: &str = "https://wishlist.example.com/";
const RECENT: &str = "https://wishlist.example.com/?sort=recent";

fn url(path: &str) -> String {
    format!("https://wishlist.example.com{path}")
}

fn plan(enrichment: Enrichment) -> CrawlPlan {
    CrawlPlan {
        portal_url: PORTAL.to_string(),
        recent_url: RECENT.to_string(),
        max_pages: 20,
        recent_pages: 1,
        enrichment,
    }
}

fn spam() -> SpamFilter {
    SpamFilter::new(&["webflow", "hosting", "CMS"]).unwrap()
}

/// Two statuses with two ideas each, and a recent view whose second idea is
/// also listed under "Planned".
fn portal() -> MockRenderer {
    MockRenderer::new()
        .on_page(
            PORTAL,
            landing_page(&[
                ("Planned", "planned", "/?status=planned"),
                ("Shipped", "shipped", "/?status=shipped"),
            ]),
        )
        .on_page(
            &url("/?status=planned"),
            listing_page(
                &[
                    CardFixture::new("Custom hosting regions", "hosting-regions")
                        .with_status("Planned"),
                    CardFixture::new("Birthday reminders", "birthday").with_status("Planned"),
                ],
                None,
            ),
        )
        .on_page(
            &url("/?status=shipped"),
            listing_page(
                &[
                    CardFixture::new("CMS filters", "cms-filters").with_status("Shipped"),
                    CardFixture::new("Nested collections", "nested").with_status("Shipped"),
                ],
                None,
            ),
        )
        .on_page(
            RECENT,
            listing_page(
                &[
                    CardFixture::new("Free pizza", "pizza"),
                    CardFixture::new("Custom hosting regions", "hosting-regions")
                        .with_status("Planned"),
                ],
                None,
            ),
        )
        .on_page(
            &url("/ideas/hosting-regions"),
            detail_page("Let us choose where our hosting plan serves from."),
        )
        .on_page(&url("/ideas/birthday"), detail_page("Remind me of my cat's birthday"))
        .on_page(
            &url("/ideas/cms-filters"),
            detail_page("Filter CMS items by multi-reference fields."),
        )
        .on_page(
            &url("/ideas/nested"),
            detail_page("Nested lists for webflows with many collections."),
        )
        .on_page(&url("/ideas/pizza"), detail_page("Everyone deserves free pizza"))
}

#[tokio::test]
async fn full_crawl_enriches_filters_and_publishes_once() {
    let renderer = portal();
    let publisher = RecordingPublisher::new();
    let pacer = Pacer::new(Duration::ZERO);

    let receipt = crawl_and_publish(&renderer, &publisher, &pacer, &plan(Enrichment::Full), &spam())
        .await
        .unwrap();
    assert_eq!(receipt.status, 200);

    // six summaries enriched, the shared idea once per context
    assert_eq!(renderer.tab_loads().len(), 6);
    assert_eq!(
        renderer
            .tab_loads()
            .iter()
            .filter(|u| u.ends_with("/ideas/hosting-regions"))
            .count(),
        2
    );
    assert_eq!(renderer.tabs_still_open(), 0);
    assert_eq!(
        renderer.navigations(),
        vec![
            PORTAL.to_string(),
            url("/?status=planned"),
            url("/?status=shipped"),
            RECENT.to_string(),
        ]
    );
    // two statuses + recent view + six detail pages
    assert_eq!(pacer.paced(), 9);

    let published = publisher.published();
    assert_eq!(published.len(), 1);
    let result = &published[0];

    assert_eq!(result.ideas_by_statuses.len(), 2);
    let planned = &result.ideas_by_statuses[0];
    assert_eq!(planned.status.name, "Planned");
    assert_eq!(planned.status.id, "planned");
    assert_eq!(planned.ideas.len(), 1);
    assert_eq!(planned.ideas[0].summary.name, "Custom hosting regions");

    let shipped = &result.ideas_by_statuses[1];
    assert_eq!(shipped.status.name, "Shipped");
    assert_eq!(
        shipped
            .ideas
            .iter()
            .map(|i| i.summary.name.as_str())
            .collect::<Vec<_>>(),
        vec!["CMS filters", "Nested collections"]
    );

    assert_eq!(result.recent_ideas.len(), 1);
    assert_eq!(result.recent_ideas[0].summary.name, "Custom hosting regions");
    assert_eq!(
        result.recent_ideas[0].content.as_ref().unwrap().content_text,
        "Let us choose where our hosting plan serves from."
    );
}

#[tokio::test]
async fn published_payload_uses_portal_field_names() {
    let renderer = portal();
    let pacer = Pacer::new(Duration::ZERO);

    let result = crawl(&renderer, &pacer, &plan(Enrichment::Full), &spam())
        .await
        .unwrap();
    let json = serde_json::to_value(&result).unwrap();

    let status = &json["ideasByStatuses"][0];
    assert_eq!(status["name"], "Planned");
    assert_eq!(status["id"], "planned");
    assert_eq!(status["url"], url("/?status=planned"));

    let idea = &status["ideas"][0];
    assert_eq!(idea["name"], "Custom hosting regions");
    assert_eq!(idea["preview"], "Custom hosting regions preview");
    assert_eq!(idea["userImage"], url("/avatars/hosting-regions.png"));
    assert_eq!(idea["userName"], "Jane Doe");
    assert_eq!(idea["date"], "Jan 5, 2024");
    assert_eq!(idea["category"], "General");
    assert_eq!(idea["voteCount"], "7");
    assert_eq!(idea["commentCount"], "2");
    assert_eq!(idea["status"], "Planned");
    assert_eq!(idea["url"], url("/ideas/hosting-regions"));
    assert_eq!(
        idea["contentHtml"],
        "<p>Let us choose where our hosting plan serves from.</p>"
    );

    let recent = json["recentIdeas"].as_array().unwrap();
    assert_eq!(recent.len(), 1);
}

#[tokio::test]
async fn fast_mode_filters_on_preview_text() {
    let renderer = portal();
    let pacer = Pacer::new(Duration::ZERO);

    let result = crawl(&renderer, &pacer, &plan(Enrichment::Skip), &spam())
        .await
        .unwrap();

    assert!(renderer.tab_loads().is_empty());
    // previews are "<title> preview": only titles carrying a keyword survive
    assert_eq!(result.ideas_by_statuses[0].ideas.len(), 1);
    assert_eq!(result.ideas_by_statuses[1].ideas.len(), 1);
    assert_eq!(result.recent_ideas.len(), 1);

    let json = serde_json::to_value(&result).unwrap();
    let idea = &json["recentIdeas"][0];
    assert!(idea.get("contentText").is_none());
    assert_eq!(idea["status"], "Planned");
    assert_eq!(json["ideasByStatuses"][1]["ideas"][0]["name"], "CMS filters");
}

#[tokio::test]
async fn unbadged_ideas_serialize_a_null_status() {
    let renderer = MockRenderer::new()
        .on_page(PORTAL, landing_page(&[]))
        .on_page(
            RECENT,
            listing_page(&[CardFixture::new("webflow things", "things")], None),
        );
    let pacer = Pacer::new(Duration::ZERO);

    let result = crawl(&renderer, &pacer, &plan(Enrichment::Skip), &spam())
        .await
        .unwrap();
    let json = serde_json::to_value(&result).unwrap();

    assert_eq!(json["ideasByStatuses"], Value::Array(Vec::new()));
    assert_eq!(json["recentIdeas"][0]["status"], Value::Null);
}

#[tokio::test]
async fn malformed_card_aborts_before_publishing() {
    let broken = CardFixture::new("No title here", "untitled");
    let listing = listing_page(&[CardFixture::new("Fine", "fine"), broken], None)
        .replace("<h3>No title here</h3>", "");

    let renderer = MockRenderer::new()
        .on_page(PORTAL, landing_page(&[("Planned", "planned", "/?status=planned")]))
        .on_page(&url("/?status=planned"), listing);
    let publisher = RecordingPublisher::new();
    let pacer = Pacer::new(Duration::ZERO);

    let err = crawl_and_publish(&renderer, &publisher, &pacer, &plan(Enrichment::Full), &spam())
        .await
        .unwrap_err();

    assert!(matches!(err, CrawlError::Extraction { .. }));
    assert!(publisher.published().is_empty());
    assert!(renderer.tab_loads().is_empty());
}

#[tokio::test]
async fn unreachable_detail_page_aborts_the_run() {
    let renderer = MockRenderer::new()
        .on_page(PORTAL, landing_page(&[]))
        .on_page(
            RECENT,
            listing_page(&[CardFixture::new("Webflow API", "api")], None),
        );
    let publisher = RecordingPublisher::new();
    let pacer = Pacer::new(Duration::ZERO);

    let err = crawl_and_publish(&renderer, &publisher, &pacer, &plan(Enrichment::Full), &spam())
        .await
        .unwrap_err();

    assert!(matches!(err, CrawlError::Navigation { .. }));
    assert!(publisher.published().is_empty());
    assert_eq!(renderer.tabs_still_open(), 0);
}
