// src/lib.rs
//! Harvests Etsy product records, with their reviews, for a search term.
//!
//! Each product found on the search results becomes one fetch chain: the
//! listing page fills a fresh [`Accumulator`], the configured
//! [`ReviewStrategy`] adds reviews, and the finalized [`ProductRecord`] is sent
//! to the sink. A [`CrawlBudget`] caps how many records a run emits.

pub mod budget;
pub mod config;
pub mod error;
pub mod extract;
pub mod fetch;
pub mod harvester;
pub mod normalize;
pub mod page;
pub mod pagination;
pub mod product;
pub mod record;
pub mod reviews;
pub mod rules;
pub mod sink;
pub mod urls;

use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{error, info};
use uuid::Uuid;

pub use budget::CrawlBudget;
pub use config::{HarvestConfig, ReviewStrategyKind};
pub use error::{HarvestError, Result};
pub use fetch::{FetchRequest, Fetcher, HttpFetcher};
pub use harvester::{ChainOutcome, HarvestStream, HarvestSummary, Harvester};
pub use page::Page;
pub use pagination::Termination;
pub use record::{Accumulator, ProductRecord, ReviewEntry};
pub use reviews::ReviewStrategy;
pub use sink::{CsvSink, RecordSink};

/// Outcome of [`run_harvest`].
#[derive(Debug, Clone)]
pub struct HarvestReport {
    pub output: PathBuf,
    pub written: usize,
    pub summary: HarvestSummary,
}

/// Runs a full harvest over HTTP and writes the records to a CSV file.
///
/// Without a configured output path the file is named `products_<uuid>.csv`.
pub async fn run_harvest(config: HarvestConfig) -> Result<HarvestReport> {
    let output = config
        .output
        .clone()
        .unwrap_or_else(|| PathBuf::from(format!("products_{}.csv", Uuid::new_v4())));
    let fetcher = Arc::new(HttpFetcher::new(&config)?);
    let harvester = Harvester::new(config, fetcher)?;

    // --- CSV Writer Setup with a Channel ---
    let (tx, rx) = mpsc::channel::<ProductRecord>(100);
    let sink = CsvSink::create(&output)?;
    let writer_handle = tokio::spawn(sink::drain(rx, sink));

    let summary = harvester.run(tx).await;

    // --- Finalization ---
    // run() consumed the sender, so the writer sees the channel close.
    let written = match writer_handle.await {
        Ok(Ok(n)) => n,
        Ok(Err(e)) => return Err(e),
        Err(e) => {
            error!("Writer task panicked: {}", e);
            0
        }
    };
    let summary = summary?;

    info!("Data for {} products saved to {}", written, output.display());
    Ok(HarvestReport {
        output,
        written,
        summary,
    })
}

// --- Python Bindings ---
#[cfg(feature = "python")]
mod python {
    use pyo3::{prelude::*, wrap_pyfunction};

    use crate::{HarvestConfig, run_harvest};

    /// `rs_run_harvest(search, strategy="inline", max_items=None) -> str`,
    /// returning the path of the CSV file written.
    #[pyfunction]
    #[pyo3(signature = (search, strategy = "inline", max_items = None))]
    fn rs_run_harvest(search: String, strategy: &str, max_items: Option<usize>) -> PyResult<String> {
        let review_strategy = strategy
            .parse()
            .map_err(|e: crate::HarvestError| pyo3::exceptions::PyValueError::new_err(e.to_string()))?;
        let config = HarvestConfig {
            search,
            review_strategy,
            max_items,
            ..Default::default()
        };

        let rt = tokio::runtime::Runtime::new()
            .map_err(|e| pyo3::exceptions::PyRuntimeError::new_err(e.to_string()))?;

        match rt.block_on(run_harvest(config)) {
            Ok(report) => Ok(report.output.display().to_string()),
            Err(e) => Err(pyo3::exceptions::PyValueError::new_err(e.to_string())),
        }
    }

    #[pymodule]
    fn rust_scrapetsy(m: &Bound<'_, PyModule>) -> PyResult<()> {
        m.add_function(wrap_pyfunction!(rs_run_harvest, m)?)?;
        Ok(())
    }
}
