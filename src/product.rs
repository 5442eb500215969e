// src/product.rs
//! Product page handling: the unavailable check and the product-level fields
//! written into a fresh accumulator.

use tracing::debug;

use crate::error::Result;
use crate::extract::{count_matches, extract, extract_list};
use crate::normalize::{
    normalize_count, normalize_price, normalize_rating, normalize_return_location,
    normalize_store_location,
};
use crate::page::{Page, Queryable};
use crate::record::{Accumulator, FieldValue};
use crate::rules::ProductRules;
use crate::urls::canonical_listing_url;

/// Outcome of reading a product page.
#[derive(Debug)]
pub enum ProductPage {
    /// The listing is gone; the chain ends without a record.
    Unavailable,
    Available(Accumulator),
}

/// Reads a product page into a new accumulator for `listing_id`.
pub fn assemble_product(
    page: &Page,
    listing_id: &str,
    rules: &ProductRules,
    review_cap: Option<usize>,
) -> Result<ProductPage> {
    let doc = page.document();
    if extract(&doc, &rules.unavailable).is_some() {
        return Ok(ProductPage::Unavailable);
    }

    let mut acc = Accumulator::create(listing_id).with_review_cap(review_cap);
    acc.set_field(FieldValue::Url(canonical_listing_url(&page.url, listing_id)));
    fill_fields(&doc, listing_id, rules, &mut acc)?;
    Ok(ProductPage::Available(acc))
}

fn fill_fields<Q: Queryable>(
    doc: &Q,
    listing_id: &str,
    rules: &ProductRules,
    acc: &mut Accumulator,
) -> Result<()> {
    if let Some(title) = extract(doc, &rules.title_for(listing_id)?) {
        acc.set_field(FieldValue::Title(title));
    }
    if let Some(description) = extract(doc, &rules.description) {
        acc.set_field(FieldValue::Description(description));
    }
    if let Some(raw) = extract(doc, &rules.price) {
        repaired(acc, normalize_price(&raw).map(FieldValue::Price));
    }

    let options: Vec<String> = extract_list(doc, &rules.options)
        .iter()
        .filter_map(|lines| assemble_option(lines))
        .collect();
    if !options.is_empty() {
        acc.set_field(FieldValue::Options(options));
    }

    if let Some(raw) = extract(doc, &rules.rating) {
        repaired(acc, normalize_rating(&raw).map(FieldValue::Rating));
    }
    if let Some(raw) = extract(doc, &rules.review_count) {
        repaired(acc, normalize_count(&raw).map(FieldValue::ReviewCount));
    }

    let image_urls = extract_list(doc, &rules.image_urls);
    let slots = count_matches(doc, &rules.image_slots);
    let image_count = if slots > 0 { slots } else { image_urls.len() };
    acc.set_field(FieldValue::ImageCount(image_count as u32));
    if !image_urls.is_empty() {
        acc.set_field(FieldValue::ImageUrls(image_urls));
    }

    if let Some(overview) = extract(doc, &rules.overview) {
        acc.set_field(FieldValue::Overview(overview));
    }
    if let Some(raw) = extract(doc, &rules.favorited_by) {
        repaired(acc, normalize_count(&raw).map(FieldValue::FavoritedBy));
    }
    if let Some(name) = extract(doc, &rules.store_name) {
        acc.set_field(FieldValue::StoreName(name));
    }
    if let Some(raw) = extract(doc, &rules.store_location) {
        acc.set_field(FieldValue::StoreLocation(normalize_store_location(&raw)));
    }
    if let Some(raw) = extract(doc, &rules.return_location) {
        acc.set_field(FieldValue::ReturnLocation(normalize_return_location(&raw)));
    }
    Ok(())
}

// A value that fails to parse leaves its field unset; the record still emits.
fn repaired(acc: &mut Accumulator, value: Result<FieldValue>) {
    match value {
        Ok(v) => acc.set_field(v),
        Err(e) => debug!(listing = acc.id(), "dropping field: {}", e),
    }
}

/// Turns one variation control's text lines into `"Label: v1, v2"`.
///
/// The quantity selector, whose first entry is `1`, is skipped.
pub fn assemble_option(lines: &str) -> Option<String> {
    let parts: Vec<&str> = lines
        .lines()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect();
    match parts.as_slice() {
        [] => None,
        ["1", ..] => None,
        [label] => Some(label.to_string()),
        [label, values @ ..] => Some(format!(
            "{}: {}",
            label.trim_end_matches(':'),
            values.join(", ")
        )),
    }
}
