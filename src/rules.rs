// src/rules.rs
//! Selector tables for Etsy markup.
//!
//! Each field lists its candidate queries newest layout first; older layouts
//! stay as fallbacks because listing pages are served from several templates
//! at once.

use scraper::Selector;

use crate::error::{HarvestError, Result};
use crate::extract::FieldRule;
use crate::page::Query;

/// Queries for a search results page.
#[derive(Debug, Clone)]
pub struct ResultsRules {
    pub product_links: FieldRule,
}

impl ResultsRules {
    pub fn etsy() -> Result<Self> {
        Ok(Self {
            product_links: FieldRule::new(
                "product_links",
                vec![
                    Query::attr(r#"a[class*="organic-impression"]"#, "href")?,
                    Query::attr("a.listing-link", "href")?,
                ],
            )
            .raw(),
        })
    }
}

/// Queries for a product (listing) page.
#[derive(Debug, Clone)]
pub struct ProductRules {
    pub unavailable: FieldRule,
    pub title: FieldRule,
    pub price: FieldRule,
    pub description: FieldRule,
    pub options: FieldRule,
    pub rating: FieldRule,
    pub review_count: FieldRule,
    pub image_urls: FieldRule,
    pub image_slots: FieldRule,
    pub overview: FieldRule,
    pub favorited_by: FieldRule,
    pub store_name: FieldRule,
    pub store_location: FieldRule,
    pub return_location: FieldRule,
    pub shop_id: FieldRule,
    pub shop_link: FieldRule,
    pub csrf_token: FieldRule,
}

impl ProductRules {
    pub fn etsy() -> Result<Self> {
        Ok(Self {
            unavailable: FieldRule::new("unavailable", vec![Query::text("h2")?.matching("Darn")?]),
            title: FieldRule::new(
                "title",
                vec![
                    Query::attr(r#"meta[property="og:title"]"#, "content")?,
                    Query::text("h1[data-listing-id]")?,
                    Query::text("h1")?,
                ],
            ),
            price: FieldRule::new(
                "price",
                vec![
                    Query::attr(r#"meta[property="etsymarketplace:price_value"]"#, "content")?,
                    Query::attr(r#"meta[property="product:price:amount"]"#, "content")?,
                    Query::text(r#"[data-buy-box-region*="price"] span"#)?,
                ],
            ),
            description: FieldRule::new(
                "description",
                vec![
                    Query::text(r#"[id*="description-text"]"#)?,
                    Query::attr(r#"meta[property="og:description"]"#, "content")?,
                ],
            ),
            options: FieldRule::new(
                "options",
                vec![
                    Query::lines(r#"[id*="inventory-variation-select"]"#)?,
                    Query::lines(r#"[data-buy-box-region="variation"] label"#)?,
                ],
            )
            .raw(),
            rating: FieldRule::new(
                "rating",
                vec![
                    Query::attr(r##"a[href="#reviews"] input[name="rating"]"##, "value")?,
                    Query::attr(r#"input[name="initial-rating"]"#, "value")?,
                    Query::attr(r#"[itemprop="ratingValue"]"#, "content")?,
                ],
            )
            .raw(),
            review_count: FieldRule::new(
                "review_count",
                vec![
                    Query::text(r##"a[href="#reviews"] span:last-child"##)?.matching(r"(\d[\d,]*)")?,
                    Query::attr(r#"[itemprop="reviewCount"]"#, "content")?,
                ],
            )
            .raw(),
            image_urls: FieldRule::new(
                "image_urls",
                vec![
                    Query::attr("#image-carousel li img", "data-src-zoom-image")?,
                    Query::attr("#image-carousel li img", "src")?,
                    Query::attr(r#"meta[property="og:image"]"#, "content")?,
                ],
            )
            .raw(),
            image_slots: FieldRule::new("image_count", vec![Query::html("#image-carousel li")?]),
            overview: FieldRule::new(
                "overview",
                vec![Query::text(".listing-page-overview-component li")?],
            )
            .joined(","),
            favorited_by: FieldRule::new(
                "favorited_by",
                vec![
                    Query::text(r#"#item-overview a[href*="/favoriters"]"#)?.matching(r"(\d[\d,]*)")?,
                    Query::text(".listing-page-favorites-link")?.matching(r"(\d[\d,]*)")?,
                    Query::text(r#"a[href*="/favoriters"]"#)?.matching(r"(\d[\d,]*)")?,
                ],
            )
            .raw(),
            store_name: FieldRule::new(
                "store_name",
                vec![
                    Query::text(r#"span[itemprop="title"]"#)?,
                    Query::text("#shop-info .text-title-smaller")?,
                    Query::attr("[data-shop-name]", "data-shop-name")?,
                ],
            ),
            store_location: FieldRule::new("store_location", vec![Query::text("#shop-info > div")?]),
            return_location: FieldRule::new(
                "return_location",
                vec![Query::text(".js-estimated-delivery ~ div")?],
            ),
            shop_id: FieldRule::new(
                "shop_id",
                vec![
                    Query::attr("[data-shop-id]", "data-shop-id")?,
                    Query::attr(r#"meta[name="shop_id"]"#, "content")?,
                ],
            )
            .raw(),
            shop_link: FieldRule::new("shop_link", vec![Query::attr(r#"a[href*="/shop/"]"#, "href")?]).raw(),
            csrf_token: FieldRule::new(
                "csrf_token",
                vec![Query::attr(r#"meta[name="csrf_nonce"]"#, "content")?],
            )
            .raw(),
        })
    }

    /// Title rule with the heading carrying this listing's id tried right
    /// after the OpenGraph title.
    pub fn title_for(&self, listing_id: &str) -> Result<FieldRule> {
        let pinned = Query::text(&format!(r#"h1[data-listing-id="{listing_id}"]"#))?;
        let mut rule = self.title.clone();
        let at = rule.queries.len().min(1);
        rule.queries.insert(at, pinned);
        Ok(rule)
    }
}

/// Queries for review blocks, shared by every review strategy.
#[derive(Debug, Clone)]
pub struct ReviewRules {
    pub containers: Vec<Selector>,
    pub profile: FieldRule,
    pub rating: FieldRule,
    pub date: FieldRule,
    pub content: FieldRule,
    pub listing_id: FieldRule,
    pub next_page: FieldRule,
}

impl ReviewRules {
    pub fn etsy() -> Result<Self> {
        Ok(Self {
            containers: vec![selector("[data-review-region]")?, selector(".review-item")?],
            profile: FieldRule::new("reviewer_profile", vec![Query::attr(r#"a[href*="/people/"]"#, "href")?]).raw(),
            rating: FieldRule::new(
                "review_rating",
                vec![
                    Query::attr(r#"input[name="rating"]"#, "value")?,
                    Query::attr("[data-rating]", "data-rating")?,
                ],
            )
            .raw(),
            date: FieldRule::new(
                "review_date",
                vec![
                    Query::text("[data-review-date]")?,
                    Query::text(".review-date")?,
                    Query::text("p.text-caption")?,
                ],
            ),
            content: FieldRule::new(
                "review_content",
                vec![
                    Query::text(r#"[id^="review-preview-toggle"]"#)?,
                    Query::text(".review-text")?,
                    Query::text("p.prose")?,
                ],
            ),
            listing_id: FieldRule::new(
                "review_listing",
                vec![
                    Query::attr("[data-listing-id]", "data-listing-id")?,
                    Query::attr(r#"a[href*="/listing/"]"#, "href")?,
                ],
            )
            .raw(),
            next_page: FieldRule::new(
                "next_review_page",
                vec![
                    Query::attr(r#"a[rel="next"]"#, "href")?,
                    Query::attr(r#"[data-reviews-pagination] a[aria-label*="Next"]"#, "href")?,
                ],
            )
            .raw(),
        })
    }
}

/// Every table the harvester needs, built once per run.
#[derive(Debug, Clone)]
pub struct Rules {
    pub results: ResultsRules,
    pub product: ProductRules,
    pub reviews: ReviewRules,
}

impl Rules {
    pub fn etsy() -> Result<Self> {
        Ok(Self {
            results: ResultsRules::etsy()?,
            product: ProductRules::etsy()?,
            reviews: ReviewRules::etsy()?,
        })
    }
}

fn selector(css: &str) -> Result<Selector> {
    Selector::parse(css).map_err(|e| HarvestError::InvalidSelector(format!("{css}: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tables_parse() {
        let rules = Rules::etsy().unwrap();
        assert_eq!(rules.product.title.queries.len(), 3);
        assert_eq!(rules.reviews.containers.len(), 2);
    }

    #[test]
    fn test_title_for_pins_listing_heading() {
        let rules = ProductRules::etsy().unwrap();
        let title = rules.title_for("555").unwrap();
        assert_eq!(title.queries[0].css(), r#"meta[property="og:title"]"#);
        assert_eq!(title.queries[1].css(), r#"h1[data-listing-id="555"]"#);
        assert_eq!(title.queries.len(), 4);
    }
}
