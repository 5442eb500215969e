// src/record.rs
//! Product records and the accumulator that builds one across a fetch chain.

use serde::Serialize;

/// One harvested product, immutable once produced by [`Accumulator::finalize`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProductRecord {
    pub id: String,
    pub url: String,
    pub title: Option<String>,
    pub description: Option<String>,
    pub price: Option<f64>,
    pub options: Vec<String>,
    pub rating: Option<f64>,
    pub review_count: Option<u32>,
    pub image_count: Option<u32>,
    pub image_urls: Vec<String>,
    pub overview: Option<String>,
    pub favorited_by: Option<u32>,
    pub store_name: Option<String>,
    pub store_location: Option<String>,
    pub return_location: Option<String>,
    pub reviews: Vec<ReviewEntry>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReviewEntry {
    /// 1-based, contiguous over the kept reviews of one record.
    pub seq: u32,
    pub profile: String,
    pub rating: Option<f64>,
    pub date: Option<String>,
    pub content: Option<String>,
}

/// A review as scraped, before it is accepted into a record.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawReview {
    pub profile: Option<String>,
    pub rating: Option<f64>,
    pub date: Option<String>,
    pub content: Option<String>,
    /// Listing the review belongs to, when the page says.
    pub listing_id: Option<String>,
}

/// A single field write. Writing a field again replaces the previous value.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Url(String),
    Title(String),
    Description(String),
    Price(f64),
    Options(Vec<String>),
    Rating(f64),
    ReviewCount(u32),
    ImageCount(u32),
    ImageUrls(Vec<String>),
    Overview(String),
    FavoritedBy(u32),
    StoreName(String),
    StoreLocation(String),
    ReturnLocation(String),
}

/// Where a paginating review strategy left off.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReviewCursor {
    pub next_page: Option<String>,
    pub pages_followed: u32,
}

/// The record under construction for one product, plus the chain-local state
/// needed to resume review pagination.
///
/// Owned by exactly one chain. Each step takes it by `&mut` after the previous
/// step's response has been handled, so no lock is involved.
#[derive(Debug)]
pub struct Accumulator {
    record: ProductRecord,
    cursor: ReviewCursor,
    review_cap: Option<usize>,
}

impl Accumulator {
    pub fn create(id: impl Into<String>) -> Self {
        Self {
            record: ProductRecord {
                id: id.into(),
                url: String::new(),
                title: None,
                description: None,
                price: None,
                options: Vec::new(),
                rating: None,
                review_count: None,
                image_count: None,
                image_urls: Vec::new(),
                overview: None,
                favorited_by: None,
                store_name: None,
                store_location: None,
                return_location: None,
                reviews: Vec::new(),
            },
            cursor: ReviewCursor::default(),
            review_cap: None,
        }
    }

    /// Limits how many reviews this record keeps.
    pub fn with_review_cap(mut self, cap: Option<usize>) -> Self {
        self.review_cap = cap;
        self
    }

    pub fn id(&self) -> &str {
        &self.record.id
    }

    pub fn record(&self) -> &ProductRecord {
        &self.record
    }

    pub fn set_field(&mut self, value: FieldValue) {
        let r = &mut self.record;
        match value {
            FieldValue::Url(v) => r.url = v,
            FieldValue::Title(v) => r.title = Some(v),
            FieldValue::Description(v) => r.description = Some(v),
            FieldValue::Price(v) => r.price = Some(v),
            FieldValue::Options(v) => r.options = v,
            FieldValue::Rating(v) => r.rating = Some(v),
            FieldValue::ReviewCount(v) => r.review_count = Some(v),
            FieldValue::ImageCount(v) => r.image_count = Some(v),
            FieldValue::ImageUrls(v) => r.image_urls = v,
            FieldValue::Overview(v) => r.overview = Some(v),
            FieldValue::FavoritedBy(v) => r.favorited_by = Some(v),
            FieldValue::StoreName(v) => r.store_name = Some(v),
            FieldValue::StoreLocation(v) => r.store_location = Some(v),
            FieldValue::ReturnLocation(v) => r.return_location = Some(v),
        }
    }

    /// Adds reviews after the ones already kept.
    ///
    /// Reviews without a reviewer profile are dropped without consuming a
    /// sequence number. Stops at the review cap. Returns how many were kept.
    pub fn append_reviews(&mut self, entries: impl IntoIterator<Item = RawReview>) -> usize {
        let mut kept = 0;
        for raw in entries {
            if self.is_review_full() {
                break;
            }
            let Some(profile) = raw.profile.filter(|p| !p.is_empty()) else {
                continue;
            };
            let seq = self.record.reviews.len() as u32 + 1;
            self.record.reviews.push(ReviewEntry {
                seq,
                profile,
                rating: raw.rating,
                date: raw.date,
                content: raw.content,
            });
            kept += 1;
        }
        kept
    }

    pub fn review_len(&self) -> usize {
        self.record.reviews.len()
    }

    pub fn is_review_full(&self) -> bool {
        self.review_cap
            .is_some_and(|cap| self.record.reviews.len() >= cap)
    }

    pub fn cursor(&self) -> &ReviewCursor {
        &self.cursor
    }

    pub fn cursor_mut(&mut self) -> &mut ReviewCursor {
        &mut self.cursor
    }

    pub fn finalize(self) -> ProductRecord {
        self.record
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn review(profile: Option<&str>, content: &str) -> RawReview {
        RawReview {
            profile: profile.map(String::from),
            content: Some(content.to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn test_set_field_overwrites() {
        let mut acc = Accumulator::create("123");
        acc.set_field(FieldValue::Title("First".into()));
        acc.set_field(FieldValue::Title("Second".into()));
        acc.set_field(FieldValue::Price(12.5));
        let record = acc.finalize();
        assert_eq!(record.id, "123");
        assert_eq!(record.title.as_deref(), Some("Second"));
        assert_eq!(record.price, Some(12.5));
        assert_eq!(record.rating, None);
    }

    #[test]
    fn test_reviews_without_profile_do_not_take_a_number() {
        let mut acc = Accumulator::create("1");
        let kept = acc.append_reviews(vec![
            review(Some("/people/ann"), "great"),
            review(None, "deactivated"),
            review(Some(""), "blank profile"),
            review(Some("/people/bob"), "fine"),
        ]);
        assert_eq!(kept, 2);
        acc.append_reviews(vec![review(None, "gone"), review(Some("/people/cy"), "ok")]);

        let record = acc.finalize();
        let seqs: Vec<u32> = record.reviews.iter().map(|r| r.seq).collect();
        let who: Vec<&str> = record.reviews.iter().map(|r| r.profile.as_str()).collect();
        assert_eq!(seqs, vec![1, 2, 3]);
        assert_eq!(who, vec!["/people/ann", "/people/bob", "/people/cy"]);
    }

    #[test]
    fn test_review_cap_stops_growth() {
        let mut acc = Accumulator::create("1").with_review_cap(Some(2));
        let kept = acc.append_reviews(vec![
            review(Some("a"), "1"),
            review(Some("b"), "2"),
            review(Some("c"), "3"),
        ]);
        assert_eq!(kept, 2);
        assert!(acc.is_review_full());
        assert_eq!(acc.append_reviews(vec![review(Some("d"), "4")]), 0);
        assert_eq!(acc.review_len(), 2);
    }

    #[test]
    fn test_cursor_travels_with_accumulator() {
        let mut acc = Accumulator::create("1");
        acc.cursor_mut().next_page = Some("https://example.com/reviews?page=2".into());
        acc.cursor_mut().pages_followed += 1;
        assert_eq!(acc.cursor().pages_followed, 1);
        assert!(acc.cursor().next_page.is_some());
    }
}
