// src/urls.rs
//! Named URL parsing helpers. Each returns `None` or `MalformedValue` on an
//! unexpected shape instead of indexing into split strings.

use url::Url;

use crate::error::{HarvestError, Result};

const PAGE_PARAM: &str = "page";

/// Results page `page` for a search term, e.g. `https://www.etsy.com/search?q=mug&page=1`.
pub fn search_url(base_url: &str, term: &str, page: u32) -> Result<String> {
    let mut url = Url::parse(base_url)
        .and_then(|b| b.join("/search"))
        .map_err(|_| HarvestError::Config(format!("invalid base url {base_url:?}")))?;
    url.query_pairs_mut()
        .append_pair("q", term)
        .append_pair(PAGE_PARAM, &page.to_string());
    Ok(url.to_string())
}

/// Current value of the numeric `page` parameter; a URL without one is page 1.
pub fn page_number(url: &str) -> Option<u32> {
    let parsed = Url::parse(url).ok()?;
    match parsed.query_pairs().find(|(k, _)| k == PAGE_PARAM) {
        Some((_, v)) => v.parse().ok(),
        None => Some(1),
    }
}

/// Same URL with the `page` parameter incremented by one. Other parameters
/// keep their order.
pub fn next_results_url(url: &str) -> Option<String> {
    let current = page_number(url)?;
    let mut parsed = Url::parse(url).ok()?;
    let pairs: Vec<(String, String)> = parsed
        .query_pairs()
        .filter(|(k, _)| k != PAGE_PARAM)
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();
    parsed
        .query_pairs_mut()
        .clear()
        .extend_pairs(pairs)
        .append_pair(PAGE_PARAM, &(current + 1).to_string());
    Some(parsed.to_string())
}

/// The numeric listing id from a product URL such as
/// `https://www.etsy.com/listing/1234567/handmade-mug?ref=search`.
pub fn listing_id_from_url(url: &str) -> Result<String> {
    let parsed = Url::parse(url).map_err(|_| HarvestError::malformed("listing url", url))?;
    let mut segments = parsed
        .path_segments()
        .ok_or_else(|| HarvestError::malformed("listing url", url))?;
    segments
        .by_ref()
        .find(|s| *s == "listing")
        .and_then(|_| segments.next())
        .filter(|id| !id.is_empty() && id.chars().all(|c| c.is_ascii_digit()))
        .map(str::to_string)
        .ok_or_else(|| HarvestError::malformed("listing url", url))
}

/// Listing URL without slug, query or fragment.
pub fn canonical_listing_url(url: &str, id: &str) -> String {
    match Url::parse(url) {
        Ok(parsed) => format!(
            "{}://{}/listing/{}",
            parsed.scheme(),
            parsed.host_str().unwrap_or_default(),
            id
        ),
        Err(_) => url.to_string(),
    }
}

/// Resolve a possibly relative href against the page it was found on.
pub fn resolve(base: &str, href: &str) -> Option<String> {
    let base = Url::parse(base).ok()?;
    base.join(href.trim()).ok().map(|u| u.to_string())
}

/// The shop's full review listing, from any link into the shop
/// (`/shop/Name`, `/shop/Name?ref=...`, `/shop/Name/reviews`).
pub fn shop_reviews_url(shop_link: &str) -> Option<String> {
    let mut url = Url::parse(shop_link).ok()?;
    let name = {
        let mut segments = url.path_segments()?;
        segments.find(|s| *s == "shop")?;
        segments.next().filter(|s| !s.is_empty())?.to_string()
    };
    url.set_path(&format!("/shop/{name}/reviews"));
    url.set_query(None);
    url.set_fragment(None);
    Some(url.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_search_url_starts_at_page_one() {
        assert_eq!(
            search_url("https://www.etsy.com", "3d printed", 1).unwrap(),
            "https://www.etsy.com/search?q=3d+printed&page=1"
        );
        assert!(search_url("not a url", "mug", 1).is_err());
    }

    #[test]
    fn test_next_results_url_increments_page() {
        let first = "https://www.etsy.com/search?q=mug&page=1";
        let second = next_results_url(first).unwrap();
        assert_eq!(second, "https://www.etsy.com/search?q=mug&page=2");
        assert_eq!(page_number(&second), Some(2));
        assert_eq!(
            next_results_url("https://www.etsy.com/search?q=mug").unwrap(),
            "https://www.etsy.com/search?q=mug&page=2"
        );
        assert_eq!(next_results_url("https://www.etsy.com/search?q=mug&page=x"), None);
    }

    #[test]
    fn test_listing_id() {
        assert_eq!(
            listing_id_from_url("https://www.etsy.com/listing/1234567/handmade-mug?ref=search").unwrap(),
            "1234567"
        );
        assert_eq!(
            listing_id_from_url("https://www.etsy.com/uk/listing/42").unwrap(),
            "42"
        );
        for bad in ["https://www.etsy.com/shop/Foo", "https://www.etsy.com/listing/", "nope"] {
            assert!(matches!(
                listing_id_from_url(bad),
                Err(HarvestError::MalformedValue { .. })
            ));
        }
    }

    #[test]
    fn test_canonical_listing_url() {
        assert_eq!(
            canonical_listing_url("https://www.etsy.com/listing/9/mug?ref=x#reviews", "9"),
            "https://www.etsy.com/listing/9"
        );
    }

    #[test]
    fn test_shop_reviews_url() {
        assert_eq!(
            shop_reviews_url("https://www.etsy.com/shop/ClayWorks?ref=shop_sugg").unwrap(),
            "https://www.etsy.com/shop/ClayWorks/reviews"
        );
        assert_eq!(shop_reviews_url("https://www.etsy.com/people/someone"), None);
    }

    #[test]
    fn test_resolve_relative() {
        assert_eq!(
            resolve("https://www.etsy.com/shop/A/reviews?page=1", "?page=2").unwrap(),
            "https://www.etsy.com/shop/A/reviews?page=2"
        );
    }
}
