use anyhow::{Context, Result};
use clap::Parser;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use table_harvester::config::HarvestConfig;
use table_harvester::harvest::SourceTask;
use table_harvester::snapshot::SnapshotFetcher;
use table_harvester::{block_on_with_grace, FetchError, RawTable, ResultSink, TableFetcher};
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

/// Extract, normalize and merge scraped tables from several sources.
#[derive(Parser, Debug)]
#[command(name = "table-harvester", version)]
struct Args {
    /// Run configuration (JSON)
    #[arg(short, long)]
    config: PathBuf,

    /// Overrides `output.dir` from the config
    #[arg(short, long)]
    output_dir: Option<PathBuf>,

    /// Drop duplicate records (same group label and values)
    #[arg(long)]
    dedupe: bool,
}

// how long exit waits for fetches abandoned after their deadline
const SHUTDOWN_GRACE: Duration = Duration::from_secs(1);

fn main() -> Result<()> {
    let env = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt::Subscriber::builder().with_env_filter(env).init();

    let args = Args::parse();

    let mut config = HarvestConfig::load(&args.config)
        .with_context(|| format!("loading {}", args.config.display()))?;
    if let Some(dir) = args.output_dir {
        config.output.dir = dir;
    }
    if args.dedupe {
        config.dedupe = true;
    }

    // snapshot paths are relative to the config file
    let base = args.config.parent().unwrap_or_else(|| Path::new("."));

    let mut tasks = Vec::with_capacity(config.sources.len());
    for source in &config.sources {
        let fetcher: Arc<dyn TableFetcher> = match &source.snapshot {
            Some(path) => Arc::new(SnapshotFetcher::new(base.join(path))),
            None => {
                let id = source.id.clone();
                Arc::new(move || -> Result<Vec<RawTable>, FetchError> {
                    Err(FetchError::Unavailable(format!("no snapshot configured for '{}'", id)))
                })
            }
        };
        let assembler = config.assembler_for(source)?;
        tasks.push(SourceTask::from_parts(
            source.id.clone(),
            fetcher,
            Arc::new(assembler),
        ));
    }

    info!(domain = ?config.domain, sources = tasks.len(), "startup");

    let aggregator = config.aggregator();
    let sink = config.sink();
    let (result, written) = block_on_with_grace(
        async move {
            let result = aggregator.run(tasks).await;
            let written = sink.persist(&result).await;
            (result, written)
        },
        SHUTDOWN_GRACE,
    )
    .context("starting runtime")?;
    let written = written.context("writing exports")?;

    for path in &written {
        info!("wrote {}", path.display());
    }
    info!(
        total_records = result.summary.total_records,
        sources_used = result.summary.sources_used,
        failed = ?result.summary.failed_sources,
        "all done"
    );
    Ok(())
}
