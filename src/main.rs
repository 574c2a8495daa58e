use anyhow::Context;
use chrono::Duration as ChronoDuration;
use clap::Parser;
use newstrader::config::AppConfig;
use newstrader::exchange::{BinanceGateway, ExchangeGateway, PaperGateway};
use newstrader::execution::OrderExecutor;
use newstrader::news::{ArticleProvider, ArticleSource, CryptoNewsClient};
use newstrader::oracle::{OpenAiOracle, TradeAdvisor};
use newstrader::persistence::PositionStore;
use newstrader::{CycleOutcome, TradingLoop};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Debug, Parser)]
#[command(name = "newstrader", about = "Trade crypto on news through an AI oracle")]
struct Cli {
    /// TOML config file (defaults to ./newstrader.toml when present)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Run one news cycle and exit
    #[arg(long)]
    once: bool,

    /// Read balances and prices live but only log orders
    #[arg(long)]
    dry_run: bool,

    /// Print the stored open positions and exit
    #[arg(long)]
    show_positions: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let config = AppConfig::load(cli.config.as_deref())?;
    let _log_guard = setup_logging(&config)?;

    let store = if cli.dry_run {
        PositionStore::new(paper_store_path(&config.store.positions_path))
    } else {
        PositionStore::new(&config.store.positions_path)
    };

    // Reading the local book needs no credentials
    if cli.show_positions {
        return show_positions(&store);
    }

    if let Err(e) = config.validate() {
        tracing::error!("✗ {}", e);
        return Err(e.into());
    }

    tracing::info!("🚀 newstrader starting{}", if cli.dry_run { " (dry run)" } else { "" });

    // ============================================================================
    // Collaborators
    // ============================================================================

    let retry = config.retry_policy();

    let binance = BinanceGateway::new(
        config.exchange.api_key.clone(),
        config.exchange.secret_key.clone(),
        config.exchange.base_url.as_str(),
        config.exchange.requests_per_second,
        Duration::from_secs(config.exchange.timeout_secs),
    )?;
    let gateway: Arc<dyn ExchangeGateway> = if cli.dry_run {
        Arc::new(PaperGateway::new(binance))
    } else {
        Arc::new(binance)
    };

    let mut sources: Vec<Box<dyn ArticleSource>> = Vec::new();
    for feed in config.feeds()? {
        sources.push(Box::new(CryptoNewsClient::new(
            config.news.api_key.clone(),
            config.news.base_url.as_str(),
            config.news.items,
            feed,
            Duration::from_secs(config.news.timeout_secs),
        )?));
    }
    let provider = ArticleProvider::new(
        sources,
        ChronoDuration::minutes(config.news.initial_lookback_minutes),
    );

    let oracle = OpenAiOracle::new(
        config.oracle.api_key.clone(),
        config.oracle.model.as_str(),
        config.oracle.base_url.as_str(),
        Duration::from_secs(config.oracle.timeout_secs),
        retry,
    )?;
    let advisor = TradeAdvisor::new(Box::new(oracle), config.advice_parser());

    let executor = OrderExecutor::new(gateway, store, config.execution_settings(), retry);

    let mut trading_loop = TradingLoop::new(
        provider,
        advisor,
        executor,
        Duration::from_secs(config.schedule.cycle_interval_secs),
        Duration::from_secs(config.schedule.exit_check_interval_secs),
    );

    // ============================================================================
    // Run
    // ============================================================================

    if cli.once {
        return match trading_loop.run_guarded_cycle().await {
            CycleOutcome::Failed(reason) => Err(anyhow::anyhow!(reason)),
            CycleOutcome::NoArticles => Ok(()),
            CycleOutcome::Executed(report) => {
                tracing::info!(
                    "✓ Single cycle done: {} orders, {} skipped",
                    report.submitted.len(),
                    report.skipped.len()
                );
                Ok(())
            }
        };
    }

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("⚠️  Received Ctrl+C, shutting down...");
        }
        _ = trading_loop.run() => {}
    }

    Ok(())
}

fn setup_logging(config: &AppConfig) -> anyhow::Result<Option<WorkerGuard>> {
    let filter = || {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.logging.filter))
    };

    let (file_layer, guard) = match &config.logging.file {
        Some(path) => {
            let directory = path
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .unwrap_or_else(|| Path::new("."));
            let file_name = path
                .file_name()
                .with_context(|| format!("Log file path {} has no file name", path.display()))?;
            let appender = tracing_appender::rolling::never(directory, file_name);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer()
                .with_writer(writer)
                .with_ansi(false)
                .with_filter(filter());
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_filter(filter()))
        .with(file_layer)
        .try_init()
        .context("Failed to install tracing subscriber")?;

    Ok(guard)
}

/// Dry runs keep their own book next to the live one (`positions.paper.json`)
fn paper_store_path(live: &Path) -> PathBuf {
    let stem = live
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "positions".to_string());
    live.with_file_name(format!("{}.paper.json", stem))
}

fn show_positions(store: &PositionStore) -> anyhow::Result<()> {
    let positions = store.load()?;
    if positions.is_empty() {
        println!("No open positions in {}", store.path().display());
        return Ok(());
    }

    println!("{:<10} {:<32} {:<32}", "ASSET", "BOUGHT", "FORCED EXIT");
    for (asset, position) in &positions {
        println!(
            "{:<10} {:<32} {:<32}",
            asset,
            position.buy_time.to_rfc3339(),
            position.sell_time.to_rfc3339()
        );
    }
    Ok(())
}
