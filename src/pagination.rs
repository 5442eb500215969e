// src/pagination.rs
//! The "fetch a page, take its items, follow its next reference" loop shared by
//! the results list and paginated reviews.

use std::collections::HashSet;

use crate::budget::CrawlBudget;

/// What one page yielded.
#[derive(Debug, Clone, PartialEq)]
pub struct PageStep<T> {
    pub items: Vec<T>,
    pub next: Option<String>,
}

/// Why a walk stopped. Neither cause is an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    /// No further page reference was found.
    Exhausted,
    /// The budget refused further work.
    BudgetClosed,
}

/// Tracks the position of one paginated walk.
///
/// Call [`PageWalker::next_url`] before each fetch and [`PageWalker::observe`]
/// with the page's [`PageStep`] afterwards.
#[derive(Debug)]
pub struct PageWalker {
    pending: Option<String>,
    visited: HashSet<String>,
    pages: u32,
    empty_is_exhaustion: bool,
}

impl PageWalker {
    pub fn new(start: impl Into<String>) -> Self {
        Self {
            pending: Some(start.into()),
            visited: HashSet::new(),
            pages: 0,
            empty_is_exhaustion: false,
        }
    }

    /// Walker for a results list, where a page without items ends the walk
    /// even if a next page could be derived.
    pub fn results(start: impl Into<String>) -> Self {
        Self {
            empty_is_exhaustion: true,
            ..Self::new(start)
        }
    }

    /// Pages handed out so far.
    pub fn pages(&self) -> u32 {
        self.pages
    }

    /// URL of the next page to fetch, or why there is none.
    ///
    /// `may_continue` is the caller's budget decision and is only consulted
    /// for pages after the first one.
    pub fn next_url(&mut self, may_continue: bool) -> Result<String, Termination> {
        if self.pages > 0 && !may_continue {
            return Err(Termination::BudgetClosed);
        }
        let url = self.pending.take().ok_or(Termination::Exhausted)?;
        // a link back to a page already seen would loop forever
        if !self.visited.insert(url.clone()) {
            return Err(Termination::Exhausted);
        }
        self.pages += 1;
        Ok(url)
    }

    /// Same as [`PageWalker::next_url`] with the decision taken from a budget.
    pub fn next_url_within(&mut self, budget: &CrawlBudget) -> Result<String, Termination> {
        let open = budget.can_start_more();
        self.next_url(open)
    }

    /// Records what the last fetched page yielded.
    pub fn observe<T>(&mut self, step: &PageStep<T>) {
        self.pending = if self.empty_is_exhaustion && step.items.is_empty() {
            None
        } else {
            step.next.clone()
        };
    }
}
