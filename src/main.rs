use std::path::PathBuf;

use clap::Parser;
use rust_scrapetsy::{HarvestConfig, HarvestError, ReviewStrategyKind, run_harvest};
use tracing_subscriber::EnvFilter;

/// Harvest Etsy products and their reviews for a search term into a CSV file.
#[derive(Debug, Parser)]
#[command(name = "scrapetsy", version)]
struct Cli {
    /// Search term, e.g. "3d printed"
    #[arg(short, long, env = "SCRAPETSY_SEARCH")]
    search: Option<String>,

    /// Review strategy: inline (1), data_endpoint (2) or full_history (3)
    #[arg(short = 'r', long, env = "SCRAPETSY_STRATEGY")]
    strategy: Option<ReviewStrategyKind>,

    /// Stop after this many products
    #[arg(short, long, env = "SCRAPETSY_MAX_ITEMS")]
    max_items: Option<usize>,

    /// Keep at most this many reviews per product
    #[arg(long)]
    max_reviews: Option<usize>,

    /// Concurrent product chains per results page
    #[arg(short, long)]
    concurrency: Option<usize>,

    /// TOML file with harvest settings; flags override it
    #[arg(long, env = "SCRAPETSY_CONFIG")]
    config: Option<PathBuf>,

    /// CSV output path (default: products_<uuid>.csv)
    #[arg(short, long)]
    output: Option<PathBuf>,
}

impl Cli {
    fn into_config(self) -> Result<HarvestConfig, HarvestError> {
        let mut config = match &self.config {
            Some(path) => HarvestConfig::load(path)?,
            None => HarvestConfig::default(),
        };
        if let Some(search) = self.search {
            config.search = search;
        }
        if let Some(strategy) = self.strategy {
            config.review_strategy = strategy;
        }
        if self.max_items.is_some() {
            config.max_items = self.max_items;
        }
        if self.max_reviews.is_some() {
            config.max_reviews_per_product = self.max_reviews;
        }
        if let Some(concurrency) = self.concurrency {
            config.concurrency = concurrency;
        }
        if self.output.is_some() {
            config.output = self.output;
        }
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> Result<(), HarvestError> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("rust_scrapetsy=info,scrapetsy=info")),
        )
        .init();

    let config = Cli::parse().into_config()?;
    match run_harvest(config).await {
        Ok(report) => {
            println!(
                "Saved {} products to {} ({:?})",
                report.written,
                report.output.display(),
                report.summary.termination
            );
            Ok(())
        }
        Err(e) => {
            eprintln!("An error occurred during scraping: {}", e);
            Err(e)
        }
    }
}
