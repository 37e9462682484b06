//! Main application entry point

use std::path::PathBuf;
use std::sync::Arc;
use anyhow::{anyhow, Result};
use clap::{Parser, Subcommand};
use tracing::info;

use ax_core::events::events::{BrowserFailed, BrowserLoaded, DrillChanged, TabFailed, TabLoaded};
use ax_core::events::{handler_from_fn, EventBus};
use ax_core::Dimension;
use ax_data::{DefaultFetcher, EngineSlot, ExplorerConfig, Granularity, PagedFetcher, SourceCache};
use ax_views::{DrillSession, ViewerContext};

mod repl;
mod sample_data;

/// Drill through award and contract statistics
#[derive(Parser, Debug)]
#[command(name = "award-explorer", version, about)]
struct Cli {
    /// JSON configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Dataset root, a URL or a directory
    #[arg(long)]
    base: Option<String>,

    /// Time slice: all_time, YYYY or YYYY-qN
    #[arg(long)]
    granularity: Option<String>,

    /// Dimension of the top-level table
    #[arg(long)]
    dataset: Option<String>,

    /// Rows per page of the top-level table
    #[arg(long)]
    page_size: Option<usize>,

    /// Quiet period before the table refreshes, in milliseconds
    #[arg(long)]
    debounce_ms: Option<u64>,

    /// Keep downloaded files in memory
    #[arg(long)]
    cache: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Browse the dataset interactively (default)
    Explore,
    /// Write a sample dataset of Arrow files
    Generate {
        /// Output directory
        #[arg(default_value = "data")]
        out: PathBuf,
        /// Number of contracts
        #[arg(long, default_value_t = 2000)]
        contracts: usize,
        #[arg(long, default_value_t = 42)]
        seed: u32,
    },
}

impl Cli {
    /// Config file (or defaults) with command line overrides applied
    fn config(&self) -> Result<ExplorerConfig> {
        let mut config = match &self.config {
            Some(path) => ExplorerConfig::load(path)?,
            None => ExplorerConfig::default(),
        };

        if let Some(base) = &self.base {
            config.base = base.clone();
        }
        if let Some(granularity) = &self.granularity {
            config.granularity = granularity.parse::<Granularity>().map_err(|e| anyhow!("{}", e))?;
        }
        if let Some(dataset) = &self.dataset {
            config.dataset = dataset.parse::<Dimension>()?;
        }
        if let Some(page_size) = self.page_size {
            config.page_size = page_size;
        }
        if let Some(debounce_ms) = self.debounce_ms {
            config.debounce_ms = debounce_ms;
        }
        config.cache_sources |= self.cache;

        config.validate()?;
        Ok(config)
    }
}

/// Print progress notifications as they arrive
fn subscribe_progress(events: &EventBus) {
    events.subscribe::<DrillChanged>(handler_from_fn(|event| {
        if let Some(e) = event.as_any().downcast_ref::<DrillChanged>() {
            if e.depth > 0 {
                println!("» drill depth {}: {}", e.depth, e.breadcrumb);
            }
        }
    }));
    events.subscribe::<TabLoaded>(handler_from_fn(|event| {
        if let Some(e) = event.as_any().downcast_ref::<TabLoaded>() {
            match e.total_count {
                Some(total) => println!("» {} loaded ({} of {})", e.tab, e.rows, total),
                None => println!("» {} loaded ({} rows)", e.tab, e.rows),
            }
        }
    }));
    events.subscribe::<TabFailed>(handler_from_fn(|event| {
        if let Some(e) = event.as_any().downcast_ref::<TabFailed>() {
            println!("» {} failed: {}", e.tab, e.error);
        }
    }));
    events.subscribe::<BrowserLoaded>(handler_from_fn(|event| {
        if let Some(e) = event.as_any().downcast_ref::<BrowserLoaded>() {
            println!("» page {} ready ({} of {} entities); type 'list' to show", e.page + 1, e.rows, e.total_count);
        }
    }));
    events.subscribe::<BrowserFailed>(handler_from_fn(|event| {
        if let Some(e) = event.as_any().downcast_ref::<BrowserFailed>() {
            println!("» table failed: {}", e.error);
        }
    }));
}

async fn explore(config: ExplorerConfig) -> Result<()> {
    let slot = EngineSlot::new();
    let engine = slot.acquire()?;

    let mut fetcher = DefaultFetcher::new(config.request_timeout())?;
    if config.cache_sources {
        fetcher = fetcher.with_cache(Arc::new(SourceCache::new(config.cache_entries)));
    }

    let ctx = ViewerContext::new(
        PagedFetcher::new(engine, Arc::new(fetcher)),
        tokio::runtime::Handle::current(),
    );
    subscribe_progress(&ctx.events);

    let session = DrillSession::new(ctx, &config);
    repl::run(session).await
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();
    match cli.command {
        Some(Command::Generate { ref out, contracts, seed }) => {
            sample_data::create_sample_dataset(out, contracts, seed)?;
        }
        Some(Command::Explore) | None => {
            let config = cli.config()?;
            info!("Starting award explorer on {} ({})", config.base, config.granularity);
            explore(config).await?;
        }
    }

    Ok(())
}
