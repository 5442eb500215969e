// src/extract.rs
//! Ordered fallback extraction.
//!
//! A [`FieldRule`] lists candidate queries for one field. They are tried in
//! order and the first one producing a non-empty value wins; the rest are not
//! evaluated.

use crate::normalize::normalize_text;
use crate::page::{Query, Queryable};

/// How matches are cleaned before deciding whether a query found anything.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pipeline {
    /// Whitespace collapsed, tags stripped, trimmed.
    Text,
    /// Only trimmed. Used for URLs, attribute ids and line-structured values.
    Raw,
}

impl Pipeline {
    fn apply(self, raw: &str) -> String {
        match self {
            Pipeline::Text => normalize_text(raw),
            Pipeline::Raw => raw.trim().to_string(),
        }
    }
}

/// How the winning query's matches become a single value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Combine {
    First,
    Join(String),
}

#[derive(Debug, Clone)]
pub struct FieldRule {
    pub name: &'static str,
    pub queries: Vec<Query>,
    pub pipeline: Pipeline,
    pub combine: Combine,
}

impl FieldRule {
    pub fn new(name: &'static str, queries: Vec<Query>) -> Self {
        Self {
            name,
            queries,
            pipeline: Pipeline::Text,
            combine: Combine::First,
        }
    }

    pub fn raw(mut self) -> Self {
        self.pipeline = Pipeline::Raw;
        self
    }

    pub fn joined(mut self, separator: &str) -> Self {
        self.combine = Combine::Join(separator.to_string());
        self
    }

    /// Matches of the first query that finds anything, cleaned, empties
    /// removed. Empty when every query comes up dry.
    pub fn matches<Q: Queryable + ?Sized>(&self, page: &Q) -> Vec<String> {
        for query in &self.queries {
            let found: Vec<String> = page
                .query(query)
                .iter()
                .map(|raw| self.pipeline.apply(raw))
                .filter(|v| !v.is_empty())
                .collect();
            if !found.is_empty() {
                return found;
            }
        }
        Vec::new()
    }
}

/// Single value for `rule`, or `None` when the field is absent.
pub fn extract<Q: Queryable + ?Sized>(page: &Q, rule: &FieldRule) -> Option<String> {
    let mut found = rule.matches(page);
    if found.is_empty() {
        return None;
    }
    match &rule.combine {
        Combine::First => Some(found.swap_remove(0)),
        Combine::Join(sep) => Some(found.join(sep)),
    }
}

/// Every match of the winning query, for list-valued fields.
pub fn extract_list<Q: Queryable + ?Sized>(page: &Q, rule: &FieldRule) -> Vec<String> {
    rule.matches(page)
}

/// Number of elements the winning query matched, including ones with no text.
pub fn count_matches<Q: Queryable + ?Sized>(page: &Q, rule: &FieldRule) -> usize {
    rule.queries
        .iter()
        .map(|q| page.query(q).len())
        .find(|n| *n > 0)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::page::Document;
    use std::cell::RefCell;
    use std::collections::HashMap;

    /// Answers queries from a fixed table and records which ones were asked.
    struct CountingPage {
        answers: HashMap<String, Vec<String>>,
        asked: RefCell<Vec<String>>,
    }

    impl CountingPage {
        fn new(answers: &[(&str, &[&str])]) -> Self {
            Self {
                answers: answers
                    .iter()
                    .map(|(css, vals)| (css.to_string(), vals.iter().map(|v| v.to_string()).collect()))
                    .collect(),
                asked: RefCell::new(Vec::new()),
            }
        }
    }

    impl Queryable for CountingPage {
        fn query(&self, query: &Query) -> Vec<String> {
            self.asked.borrow_mut().push(query.css().to_string());
            self.answers.get(query.css()).cloned().unwrap_or_default()
        }
    }

    fn rule(css: &[&str]) -> FieldRule {
        FieldRule::new("title", css.iter().map(|c| Query::text(c).unwrap()).collect())
    }

    #[test]
    fn test_first_match_short_circuits() {
        let page = CountingPage::new(&[("h1", &["Mug"]), ("h2", &["Other"])]);
        assert_eq!(extract(&page, &rule(&["h1", "h2", "h3"])), Some("Mug".to_string()));
        assert_eq!(*page.asked.borrow(), vec!["h1"]);
    }

    #[test]
    fn test_falls_through_empty_and_blank_matches() {
        let page = CountingPage::new(&[("h1", &["  ", "<br>"]), ("h2", &["Backup  title"])]);
        assert_eq!(
            extract(&page, &rule(&["h1", "h2", "h3"])),
            Some("Backup title".to_string())
        );
        assert_eq!(*page.asked.borrow(), vec!["h1", "h2"]);
    }

    #[test]
    fn test_all_queries_empty_is_absent() {
        let page = CountingPage::new(&[]);
        assert_eq!(extract(&page, &rule(&["h1", "h2"])), None);
        assert_eq!(page.asked.borrow().len(), 2);
    }

    #[test]
    fn test_join_and_list() {
        let doc = Document::parse("<ul class='o'><li>Handmade</li><li> Materials: oak </li></ul>");
        let overview = FieldRule::new("overview", vec![Query::text(".o li").unwrap()]).joined(",");
        assert_eq!(extract(&doc, &overview), Some("Handmade,Materials: oak".to_string()));
        assert_eq!(extract_list(&doc, &overview), vec!["Handmade", "Materials: oak"]);
    }

    #[test]
    fn test_count_includes_textless_elements() {
        let doc = Document::parse("<ul id='c'><li><img src='a'></li><li><img src='b'></li></ul>");
        let images = FieldRule::new("images", vec![Query::text("#c li").unwrap()]);
        assert_eq!(count_matches(&doc, &images), 2);
        assert!(extract(&doc, &images).is_none());
    }
}
