// src/page.rs
//! Fetched pages and the structured queries run against them.
//!
//! A [`Page`] is the raw response and is cheap to move between tasks. Parsing
//! it yields a [`Document`], which must stay inside synchronous code: the
//! parsed tree is not `Send`, so every chain step parses, extracts into owned
//! values and drops the document before its next `.await`.

use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use serde::de::DeserializeOwned;

use crate::error::{HarvestError, Result};

/// A fetched response body together with the URL it was fetched from.
#[derive(Debug, Clone)]
pub struct Page {
    pub url: String,
    pub body: String,
}

impl Page {
    pub fn new(url: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            body: body.into(),
        }
    }

    pub fn document(&self) -> Document {
        Document::parse(&self.body)
    }

    /// Deserializes the body as a JSON envelope.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T> {
        Ok(serde_json::from_str(&self.body)?)
    }
}

/// What a query reads from each matched element.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Output {
    /// All descendant text joined by single spaces.
    Text,
    /// Descendant text nodes, trimmed, empties dropped, one per line.
    Lines,
    /// Inner markup, tags included.
    Html,
    /// Value of the named attribute; elements without it yield nothing.
    Attr(String),
}

/// One structured query: a CSS selector, what to read from the matches and an
/// optional text filter.
///
/// When a filter is present only values it matches survive; if the pattern has
/// a capture group the first group replaces the value.
#[derive(Debug, Clone)]
pub struct Query {
    css: String,
    selector: Selector,
    output: Output,
    pattern: Option<Regex>,
}

impl Query {
    pub fn new(css: &str, output: Output) -> Result<Self> {
        let selector =
            Selector::parse(css).map_err(|e| HarvestError::InvalidSelector(format!("{css}: {e}")))?;
        Ok(Self {
            css: css.to_string(),
            selector,
            output,
            pattern: None,
        })
    }

    pub fn text(css: &str) -> Result<Self> {
        Self::new(css, Output::Text)
    }

    pub fn lines(css: &str) -> Result<Self> {
        Self::new(css, Output::Lines)
    }

    pub fn html(css: &str) -> Result<Self> {
        Self::new(css, Output::Html)
    }

    pub fn attr(css: &str, attr: &str) -> Result<Self> {
        Self::new(css, Output::Attr(attr.to_string()))
    }

    pub fn matching(mut self, pattern: &str) -> Result<Self> {
        let re = Regex::new(pattern)
            .map_err(|e| HarvestError::InvalidSelector(format!("{pattern}: {e}")))?;
        self.pattern = Some(re);
        Ok(self)
    }

    pub fn css(&self) -> &str {
        &self.css
    }

    pub fn selector(&self) -> &Selector {
        &self.selector
    }

    fn read(&self, element: ElementRef<'_>) -> Option<String> {
        let raw = match &self.output {
            Output::Text => element.text().collect::<Vec<_>>().join(" "),
            Output::Lines => element
                .text()
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .collect::<Vec<_>>()
                .join("\n"),
            Output::Html => element.inner_html(),
            Output::Attr(name) => element.value().attr(name)?.to_string(),
        };
        self.filter(raw)
    }

    fn filter(&self, raw: String) -> Option<String> {
        let Some(re) = &self.pattern else {
            return Some(raw);
        };
        let caps = re.captures(&raw)?;
        let picked = caps.get(1).or_else(|| caps.get(0))?;
        Some(picked.as_str().to_string())
    }

    fn run<'a>(&self, elements: impl Iterator<Item = ElementRef<'a>>) -> Vec<String> {
        elements.filter_map(|el| self.read(el)).collect()
    }
}

/// Anything a [`Query`] can be evaluated against.
///
/// Returns one raw value per matched element, empty strings included; deciding
/// what counts as "found" is the extraction engine's job.
pub trait Queryable {
    fn query(&self, query: &Query) -> Vec<String>;
}

/// A parsed page or markup fragment.
pub struct Document {
    html: Html,
}

impl Document {
    pub fn parse(markup: &str) -> Self {
        Self {
            html: Html::parse_document(markup),
        }
    }

    pub fn parse_fragment(markup: &str) -> Self {
        Self {
            html: Html::parse_fragment(markup),
        }
    }

    /// Every element matching `selector`, each usable as its own query root.
    pub fn scopes(&self, selector: &Selector) -> Vec<Fragment<'_>> {
        self.html.select(selector).map(Fragment).collect()
    }
}

impl Queryable for Document {
    fn query(&self, query: &Query) -> Vec<String> {
        query.run(self.html.select(query.selector()))
    }
}

/// A single element of a [`Document`], queried relative to itself.
#[derive(Clone, Copy)]
pub struct Fragment<'a>(ElementRef<'a>);

impl Queryable for Fragment<'_> {
    fn query(&self, query: &Query) -> Vec<String> {
        query.run(self.0.select(query.selector()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MARKUP: &str = r#"
        <html><head>
          <meta property="og:title" content="Ceramic Mug">
        </head><body>
          <h2>Darn, this item is unavailable</h2>
          <ul id="image-carousel"><li><img src="a.jpg"></li><li><img src="b.jpg"></li></ul>
          <a class="fav" href="/listing/1/favoriters">1,204 favorites</a>
          <div class="review"><p>first</p></div>
          <div class="review"><p>second</p></div>
        </body></html>"#;

    #[test]
    fn test_attr_and_text_queries() {
        let doc = Document::parse(MARKUP);
        let title = Query::attr(r#"meta[property="og:title"]"#, "content").unwrap();
        assert_eq!(doc.query(&title), vec!["Ceramic Mug"]);

        let imgs = Query::attr("#image-carousel li img", "src").unwrap();
        assert_eq!(doc.query(&imgs), vec!["a.jpg", "b.jpg"]);
    }

    #[test]
    fn test_pattern_filter_uses_first_group() {
        let doc = Document::parse(MARKUP);
        let darn = Query::text("h2").unwrap().matching("Darn").unwrap();
        assert_eq!(doc.query(&darn), vec!["Darn"]);

        let favs = Query::text("a.fav").unwrap().matching(r"(\d[\d,]*)").unwrap();
        assert_eq!(doc.query(&favs), vec!["1,204"]);

        let missing = Query::text("h2").unwrap().matching("Sold out").unwrap();
        assert!(doc.query(&missing).is_empty());
    }

    #[test]
    fn test_scoped_queries_stay_inside_their_element() {
        let doc = Document::parse(MARKUP);
        let container = Selector::parse("div.review").unwrap();
        let p = Query::text("p").unwrap();
        let texts: Vec<Vec<String>> = doc.scopes(&container).iter().map(|s| s.query(&p)).collect();
        assert_eq!(texts, vec![vec!["first".to_string()], vec!["second".to_string()]]);
    }

    #[test]
    fn test_invalid_selector_is_an_error() {
        assert!(matches!(
            Query::text("div[[").unwrap_err(),
            HarvestError::InvalidSelector(_)
        ));
    }

    #[test]
    fn test_page_json_envelope() {
        #[derive(serde::Deserialize)]
        struct Envelope {
            output: String,
        }
        let page = Page::new("https://example.com/ajax", r#"{"output":"<p>hi</p>"}"#);
        let env: Envelope = page.json().unwrap();
        assert_eq!(env.output, "<p>hi</p>");
    }
}
