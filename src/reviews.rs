// src/reviews.rs
//! Review retrieval. One [`ReviewStrategy`] is chosen per run and fills the
//! review list of every product's accumulator.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, warn};

use crate::config::{HarvestConfig, ReviewStrategyKind};
use crate::error::Result;
use crate::extract::extract;
use crate::fetch::{FetchRequest, Fetcher};
use crate::normalize::normalize_rating;
use crate::page::{Document, Page, Queryable};
use crate::pagination::{PageStep, PageWalker};
use crate::record::{Accumulator, RawReview};
use crate::rules::Rules;
use crate::urls::{listing_id_from_url, resolve, shop_reviews_url};

/// Path of the listing page's bespoke reviews endpoint.
pub const REVIEWS_ENDPOINT: &str = "/api/v3/ajax/bespoke/member/neu/specs/reviews";

/// Reads every review block of a parsed page or fragment.
///
/// Hrefs are resolved against `base_url`. The first container selector that
/// matches anything decides the layout.
pub fn parse_reviews(doc: &Document, base_url: &str, rules: &Rules) -> Vec<RawReview> {
    let r = &rules.reviews;
    let scopes = r
        .containers
        .iter()
        .map(|sel| doc.scopes(sel))
        .find(|found| !found.is_empty())
        .unwrap_or_default();

    scopes
        .iter()
        .map(|scope| RawReview {
            profile: extract(scope, &r.profile).and_then(|href| resolve(base_url, &href)),
            rating: extract(scope, &r.rating).and_then(|raw| normalize_rating(&raw).ok()),
            date: extract(scope, &r.date),
            content: extract(scope, &r.content),
            listing_id: review_listing_id(scope, base_url, rules),
        })
        .collect()
}

fn review_listing_id<Q: Queryable>(scope: &Q, base_url: &str, rules: &Rules) -> Option<String> {
    let raw = extract(scope, &rules.reviews.listing_id)?;
    if raw.chars().all(|c| c.is_ascii_digit()) {
        return Some(raw);
    }
    let url = resolve(base_url, &raw)?;
    listing_id_from_url(&url).ok()
}

/// Gathers reviews for one product into its accumulator.
///
/// Called once per chain, after the product page has been read. Transport
/// errors are returned and end the chain; anything else degrades to fewer
/// reviews.
#[async_trait]
pub trait ReviewStrategy: Send + Sync {
    fn kind(&self) -> ReviewStrategyKind;

    async fn collect(&self, fetcher: &dyn Fetcher, product: &Page, acc: &mut Accumulator) -> Result<()>;
}

/// Builds the strategy a run was configured with.
pub fn strategy_for(config: &HarvestConfig, rules: Arc<Rules>) -> Box<dyn ReviewStrategy> {
    match config.review_strategy {
        ReviewStrategyKind::Inline => Box::new(InlineReviews { rules }),
        ReviewStrategyKind::DataEndpoint => Box::new(DataEndpointReviews {
            rules,
            endpoint: format!("{}{}", config.base_url.trim_end_matches('/'), REVIEWS_ENDPOINT),
        }),
        ReviewStrategyKind::FullHistory => Box::new(FullHistoryReviews {
            rules,
            max_pages: config.max_review_pages,
        }),
    }
}

/// Reviews rendered on the product page; no further fetch.
pub struct InlineReviews {
    rules: Arc<Rules>,
}

#[async_trait]
impl ReviewStrategy for InlineReviews {
    fn kind(&self) -> ReviewStrategyKind {
        ReviewStrategyKind::Inline
    }

    async fn collect(&self, _fetcher: &dyn Fetcher, product: &Page, acc: &mut Accumulator) -> Result<()> {
        let reviews = parse_reviews(&product.document(), &product.url, &self.rules);
        let kept = acc.append_reviews(reviews);
        debug!(listing = acc.id(), kept, "inline reviews");
        Ok(())
    }
}

/// One POST to the bespoke reviews endpoint, answered with a JSON envelope that
/// embeds the review markup.
pub struct DataEndpointReviews {
    rules: Arc<Rules>,
    endpoint: String,
}

#[derive(Debug, Default, Deserialize)]
struct SpecEnvelope {
    #[serde(default)]
    output: SpecOutput,
}

#[derive(Debug, Default, Deserialize)]
struct SpecOutput {
    #[serde(default)]
    reviews: String,
}

fn spec_payload(listing_id: &str, shop_id: &str) -> serde_json::Value {
    json!({
        "log_performance_metrics": false,
        "specs": {
            "reviews": [
                "Etsy\\Modules\\ListingPage\\Reviews\\ApiSpec",
                {
                    "listing_id": listing_id,
                    "shop_id": shop_id,
                    "render_complete": true,
                    "active_tab": "same_listing_reviews",
                    "should_use_pagination": false,
                    "sort_option": "Relevancy"
                }
            ]
        }
    })
}

#[async_trait]
impl ReviewStrategy for DataEndpointReviews {
    fn kind(&self) -> ReviewStrategyKind {
        ReviewStrategyKind::DataEndpoint
    }

    async fn collect(&self, fetcher: &dyn Fetcher, product: &Page, acc: &mut Accumulator) -> Result<()> {
        let (shop_id, page_token) = {
            let doc = product.document();
            (
                extract(&doc, &self.rules.product.shop_id),
                extract(&doc, &self.rules.product.csrf_token),
            )
        };
        let Some(shop_id) = shop_id else {
            warn!(listing = acc.id(), "no shop id on product page, skipping review request");
            return Ok(());
        };

        let mut request = FetchRequest::post_json(&self.endpoint, spec_payload(acc.id(), &shop_id))
            .header("x-requested-with", "XMLHttpRequest");
        match page_token.or_else(|| fetcher.session_token()) {
            Some(token) => request = request.header("x-csrf-token", token),
            None => debug!(listing = acc.id(), "no session token for review request"),
        }

        let response = fetcher.fetch(&request).await?;
        let envelope: SpecEnvelope = match response.json() {
            Ok(env) => env,
            Err(e) => {
                warn!(listing = acc.id(), "unreadable review envelope: {}", e);
                return Ok(());
            }
        };
        let reviews = parse_reviews(
            &Document::parse_fragment(&envelope.output.reviews),
            &product.url,
            &self.rules,
        );
        let kept = acc.append_reviews(reviews);
        debug!(listing = acc.id(), kept, "endpoint reviews");
        Ok(())
    }
}

/// The seller's complete review history, walked page by page and filtered to
/// the listing under assembly.
pub struct FullHistoryReviews {
    rules: Arc<Rules>,
    max_pages: Option<u32>,
}

impl FullHistoryReviews {
    fn page_cap_reached(&self, acc: &Accumulator) -> bool {
        self.max_pages
            .is_some_and(|max| acc.cursor().pages_followed >= max)
    }

    fn read_page(&self, page: &Page) -> PageStep<RawReview> {
        let doc = page.document();
        PageStep {
            items: parse_reviews(&doc, &page.url, &self.rules),
            next: extract(&doc, &self.rules.reviews.next_page).and_then(|href| resolve(&page.url, &href)),
        }
    }
}

#[async_trait]
impl ReviewStrategy for FullHistoryReviews {
    fn kind(&self) -> ReviewStrategyKind {
        ReviewStrategyKind::FullHistory
    }

    /// Walks from the accumulator's review cursor. A fresh cursor starts at
    /// the shop's review listing; a cursor with pages behind it and no next
    /// page means the history was already walked.
    async fn collect(&self, fetcher: &dyn Fetcher, product: &Page, acc: &mut Accumulator) -> Result<()> {
        let cursor = acc.cursor();
        let start = match (&cursor.next_page, cursor.pages_followed) {
            (Some(next), _) => Some(next.clone()),
            (None, 0) => {
                let doc = product.document();
                extract(&doc, &self.rules.product.shop_link)
                    .and_then(|href| resolve(&product.url, &href))
                    .and_then(|link| shop_reviews_url(&link))
            }
            (None, _) => return Ok(()),
        };
        let Some(start) = start else {
            warn!(listing = acc.id(), "no shop link on product page, skipping review history");
            return Ok(());
        };

        acc.cursor_mut().next_page = Some(start.clone());
        let mut walker = PageWalker::new(start);
        while !acc.is_review_full() && !self.page_cap_reached(acc) {
            let Ok(url) = walker.next_url(true) else {
                acc.cursor_mut().next_page = None;
                break;
            };
            let page = fetcher.fetch(&FetchRequest::get(&url)).await?;
            let step = self.read_page(&page);
            walker.observe(&step);

            let listing = acc.id().to_string();
            let own = step
                .items
                .into_iter()
                .filter(|r| r.listing_id.as_deref() == Some(listing.as_str()));
            acc.append_reviews(own);

            let cursor = acc.cursor_mut();
            cursor.next_page = step.next;
            cursor.pages_followed += 1;
        }
        debug!(
            listing = acc.id(),
            pages = acc.cursor().pages_followed,
            kept = acc.review_len(),
            "review history"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::HarvestError;
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// Serves fixed pages by URL and logs what was fetched.
    struct ShopPages {
        pages: HashMap<String, String>,
        fetched: Mutex<Vec<String>>,
    }

    impl ShopPages {
        fn new(pages: &[(&str, String)]) -> Self {
            Self {
                pages: pages.iter().map(|(u, b)| (u.to_string(), b.clone())).collect(),
                fetched: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl Fetcher for ShopPages {
        async fn fetch(&self, request: &FetchRequest) -> Result<Page> {
            self.fetched.lock().unwrap().push(request.url.clone());
            self.pages
                .get(&request.url)
                .map(|body| Page::new(&request.url, body.clone()))
                .ok_or_else(|| HarvestError::Transport {
                    url: request.url.clone(),
                    message: "not found".into(),
                })
        }
    }

    const REVIEWS: &str = r#"
      <div data-review-region="r1">
        <a href="/people/ann?ref=review">Ann</a>
        <input name="rating" value="5">
        <p class="text-caption">Ann Mar 3, 2019</p>
        <p id="review-preview-toggle-0">Lovely   glaze,
            fast shipping.</p>
        <a href="/listing/555/mug">Mug</a>
      </div>
      <div data-review-region="r2">
        <span>Deactivated user</span>
        <input name="rating" value="1">
        <p id="review-preview-toggle-1">Never arrived</p>
      </div>"#;

    #[test]
    fn test_parse_reviews() {
        let rules = Rules::etsy().unwrap();
        let doc = Document::parse_fragment(REVIEWS);
        let reviews = parse_reviews(&doc, "https://www.etsy.com/listing/555/mug", &rules);
        assert_eq!(reviews.len(), 2);

        let first = &reviews[0];
        assert_eq!(first.profile.as_deref(), Some("https://www.etsy.com/people/ann?ref=review"));
        assert_eq!(first.rating, Some(5.0));
        assert_eq!(first.date.as_deref(), Some("Ann Mar 3, 2019"));
        assert_eq!(first.content.as_deref(), Some("Lovely glaze, fast shipping."));
        assert_eq!(first.listing_id.as_deref(), Some("555"));

        assert_eq!(reviews[1].profile, None);
        assert_eq!(reviews[1].listing_id, None);
    }

    #[test]
    fn test_spec_payload_carries_identifier_pair() {
        let payload = spec_payload("555", "77");
        assert_eq!(payload["specs"]["reviews"][1]["listing_id"], "555");
        assert_eq!(payload["specs"]["reviews"][1]["shop_id"], "77");
    }

    #[test]
    fn test_strategy_for_follows_config() {
        let rules = Arc::new(Rules::etsy().unwrap());
        for kind in [
            ReviewStrategyKind::Inline,
            ReviewStrategyKind::DataEndpoint,
            ReviewStrategyKind::FullHistory,
        ] {
            let config = HarvestConfig {
                review_strategy: kind,
                ..Default::default()
            };
            assert_eq!(strategy_for(&config, rules.clone()).kind(), kind);
        }
    }

    #[tokio::test]
    async fn test_full_history_resumes_from_cursor() {
        let first_page = "https://www.etsy.com/shop/ClayWorks/reviews";
        let second_page = "https://www.etsy.com/shop/ClayWorks/reviews?page=2";
        let site = ShopPages::new(&[
            (
                first_page,
                format!(r#"{REVIEWS}<a rel="next" href="/shop/ClayWorks/reviews?page=2">Next</a>"#),
            ),
            (
                second_page,
                r#"<div data-review-region="r3"><a href="/people/bob">Bob</a>
                   <p id="review-preview-toggle-2">Second batch</p>
                   <a href="/listing/555/mug">Mug</a></div>"#
                    .to_string(),
            ),
        ]);
        let product = Page::new(
            "https://www.etsy.com/listing/555/mug",
            r#"<a href="/shop/ClayWorks?ref=l2-shopheader-name">ClayWorks</a>"#,
        );
        let rules = Arc::new(Rules::etsy().unwrap());
        let mut acc = Accumulator::create("555");

        let one_page = FullHistoryReviews {
            rules: rules.clone(),
            max_pages: Some(1),
        };
        one_page.collect(&site, &product, &mut acc).await.unwrap();
        assert_eq!(acc.review_len(), 1);
        assert_eq!(acc.cursor().pages_followed, 1);
        assert_eq!(acc.cursor().next_page.as_deref(), Some(second_page));

        let unlimited = FullHistoryReviews { rules, max_pages: None };
        unlimited.collect(&site, &product, &mut acc).await.unwrap();
        assert_eq!(acc.review_len(), 2);
        assert_eq!(acc.cursor().pages_followed, 2);
        assert_eq!(acc.cursor().next_page, None);

        // the walked history is not fetched again
        unlimited.collect(&site, &product, &mut acc).await.unwrap();
        assert_eq!(*site.fetched.lock().unwrap(), vec![first_page, second_page]);
        assert_eq!(acc.finalize().reviews[1].content.as_deref(), Some("Second batch"));
    }
}
