// src/harvester.rs
//! Drives a run: walks the search results, starts one chain per product and
//! forwards finalized records.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::budget::CrawlBudget;
use crate::config::HarvestConfig;
use crate::error::Result;
use crate::extract::extract_list;
use crate::fetch::{FetchRequest, Fetcher};
use crate::page::Page;
use crate::pagination::{PageStep, PageWalker, Termination};
use crate::product::{ProductPage, assemble_product};
use crate::record::ProductRecord;
use crate::reviews::{ReviewStrategy, strategy_for};
use crate::rules::Rules;
use crate::urls::{listing_id_from_url, next_results_url, resolve, search_url};

/// How one product chain ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChainOutcome {
    Emitted,
    /// The listing page carried the unavailable marker.
    Unavailable,
    /// A fetch failed or the record could not be delivered.
    Failed,
    /// The product was already harvested in this run.
    Duplicate,
    /// The budget closed before a slot came free; nothing was fetched.
    Skipped,
}

#[derive(Debug, Clone, PartialEq)]
pub struct HarvestSummary {
    pub pages: u32,
    pub emitted: usize,
    pub unavailable: usize,
    pub failed: usize,
    pub duplicates: usize,
    pub skipped: usize,
    pub termination: Termination,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl HarvestSummary {
    fn new(started_at: DateTime<Utc>) -> Self {
        Self {
            pages: 0,
            emitted: 0,
            unavailable: 0,
            failed: 0,
            duplicates: 0,
            skipped: 0,
            termination: Termination::Exhausted,
            started_at,
            finished_at: started_at,
        }
    }

    fn count(&mut self, outcome: ChainOutcome) {
        match outcome {
            ChainOutcome::Emitted => self.emitted += 1,
            ChainOutcome::Unavailable => self.unavailable += 1,
            ChainOutcome::Failed => self.failed += 1,
            ChainOutcome::Duplicate => self.duplicates += 1,
            ChainOutcome::Skipped => self.skipped += 1,
        }
    }
}

/// Records arriving while a spawned harvest runs, plus the task's summary.
pub struct HarvestStream {
    pub receiver: mpsc::Receiver<ProductRecord>,
    pub handle: JoinHandle<Result<HarvestSummary>>,
}

pub struct Harvester {
    config: HarvestConfig,
    fetcher: Arc<dyn Fetcher>,
    rules: Arc<Rules>,
    strategy: Box<dyn ReviewStrategy>,
    budget: CrawlBudget,
}

impl Harvester {
    pub fn new(config: HarvestConfig, fetcher: Arc<dyn Fetcher>) -> Result<Self> {
        config.validate()?;
        let rules = Arc::new(Rules::etsy()?);
        let strategy = strategy_for(&config, rules.clone());
        let budget = CrawlBudget::new(config.max_items);
        Ok(Self {
            config,
            fetcher,
            rules,
            strategy,
            budget,
        })
    }

    pub fn budget(&self) -> &CrawlBudget {
        &self.budget
    }

    /// Runs the harvest on its own task and hands records out as they
    /// finalize.
    pub fn spawn(self, buffer: usize) -> HarvestStream {
        let (tx, receiver) = mpsc::channel(buffer.max(1));
        let handle = tokio::spawn(async move { self.run(tx).await });
        HarvestStream { receiver, handle }
    }

    /// Walks the results until they run out or the budget closes, sending
    /// every finalized record to `sink`.
    ///
    /// Fails only if the first results page cannot be fetched; later failures
    /// end the affected chain or the walk and are logged.
    pub async fn run(&self, sink: mpsc::Sender<ProductRecord>) -> Result<HarvestSummary> {
        let mut summary = HarvestSummary::new(Utc::now());
        let start = search_url(&self.config.base_url, &self.config.search, 1)?;
        let mut walker = PageWalker::results(start);
        let seen = Mutex::new(HashSet::new());

        info!(
            search = %self.config.search,
            strategy = %self.strategy.kind(),
            max_items = ?self.budget.max(),
            "starting harvest"
        );

        summary.termination = loop {
            let url = match walker.next_url_within(&self.budget) {
                Ok(url) => url,
                Err(termination) => break termination,
            };
            let page_no = walker.pages();
            let page = match self.fetcher.fetch(&FetchRequest::get(&url)).await {
                Ok(page) => page,
                Err(e) if page_no == 1 => return Err(e),
                Err(e) => {
                    error!(url = %url, "Failed to fetch results page {}: {}", page_no, e);
                    break Termination::Exhausted;
                }
            };

            let step = self.read_results(&url, &page);
            walker.observe(&step);
            info!("Fetched page {}: {} products", page_no, step.items.len());

            let outcomes: Vec<ChainOutcome> = stream::iter(step.items)
                .map(|link| self.run_chain(link, &seen, &sink))
                .buffer_unordered(self.config.concurrency)
                .collect()
                .await;
            for outcome in outcomes {
                summary.count(outcome);
            }
        };

        summary.pages = walker.pages();
        summary.finished_at = Utc::now();
        info!(
            pages = summary.pages,
            emitted = summary.emitted,
            unavailable = summary.unavailable,
            failed = summary.failed,
            termination = ?summary.termination,
            "harvest finished"
        );
        Ok(summary)
    }

    fn read_results(&self, url: &str, page: &Page) -> PageStep<String> {
        let doc = page.document();
        let items = extract_list(&doc, &self.rules.results.product_links)
            .into_iter()
            .filter_map(|href| resolve(&page.url, &href))
            .collect();
        PageStep {
            items,
            next: next_results_url(url),
        }
    }

    /// One product's fetch chain: product page, reviews, finalize, deliver.
    async fn run_chain(
        &self,
        link: String,
        seen: &Mutex<HashSet<String>>,
        sink: &mpsc::Sender<ProductRecord>,
    ) -> ChainOutcome {
        let id = match listing_id_from_url(&link) {
            Ok(id) => id,
            Err(e) => {
                warn!(url = %link, "not a listing link: {}", e);
                return ChainOutcome::Failed;
            }
        };
        let fresh = match seen.lock() {
            Ok(mut ids) => ids.insert(id.clone()),
            Err(poisoned) => poisoned.into_inner().insert(id.clone()),
        };
        if !fresh {
            return ChainOutcome::Duplicate;
        }
        // waits while every slot is held by a chain that may still give it back
        let Some(permit) = self.budget.start().await else {
            debug!(listing = %id, "budget closed, not starting chain");
            return ChainOutcome::Skipped;
        };

        let page = match self.fetcher.fetch(&FetchRequest::get(&link)).await {
            Ok(page) => page,
            Err(e) => {
                error!(url = %link, "product chain failed: {}", e);
                return ChainOutcome::Failed;
            }
        };

        let assembled = assemble_product(
            &page,
            &id,
            &self.rules.product,
            self.config.max_reviews_per_product,
        );
        let mut acc = match assembled {
            Ok(ProductPage::Available(acc)) => acc,
            Ok(ProductPage::Unavailable) => {
                debug!(listing = %id, "listing unavailable");
                return ChainOutcome::Unavailable;
            }
            Err(e) => {
                error!(url = %link, "product chain failed: {}", e);
                return ChainOutcome::Failed;
            }
        };

        if let Err(e) = self.strategy.collect(self.fetcher.as_ref(), &page, &mut acc).await {
            error!(url = %link, "review chain failed: {}", e);
            return ChainOutcome::Failed;
        }

        let record = acc.finalize();
        if sink.send(record).await.is_err() {
            error!(listing = %id, "record channel closed");
            return ChainOutcome::Failed;
        }
        if permit.emitted() {
            info!("Reached {} items, closing harvest", self.budget.emitted());
        }
        ChainOutcome::Emitted
    }
}
