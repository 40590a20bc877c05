//! scanner: daily market-signal scans over FMP price history.
//!
//! Usage:
//!   cargo run -p scanner-cli -- --policy premium
//!   cargo run -p scanner-cli -- --policy breakout-up --penny
//!   cargo run -p scanner-cli -- --policy ratings --sp500
//!   cargo run -p scanner-cli -- --policy movers --sp500
//!   cargo run -p scanner-cli -- --policy premium --symbols AAPL MSFT --dry-run

use std::sync::Arc;

use fmp_client::{FmpClient, PennyStockUniverse, Sp500Universe};
use notification_service::{TelegramConfig, TelegramNotifier};
use result_store::ResultStore;
use scan_orchestrator::{ScanOrchestrator, StaticUniverse};
use scanner_core::{ResultSink, ScanConfig, ScanPolicy, UniverseSource};

/// Liquid large-cap and sector-ETF names, the default premium-selling universe.
const DEFAULT_UNIVERSE: &[&str] = &[
    "NVDA", "AAPL", "GOOG", "GOOGL", "MSFT", "AMZN", "META", "AVGO", "TSLA", "BRK-B",
    "LLY", "WMT", "JPM", "V", "ORCL", "XOM", "MA", "JNJ", "BAC", "ABBV", "NFLX",
    "PLTR", "COST", "AMD", "MU", "HD", "GE", "PG", "CVX", "WFC", "UNH", "CSCO",
    "KO", "MS", "GS", "CAT", "IBM", "MRK", "AXP", "RTX", "PM", "CRM", "LRCX",
    "TMO", "TMUS", "C", "MCD", "ABT", "AMAT", "APP", "DIS", "ISRG", "LIN", "PEP",
    "BX", "QCOM", "SCHW", "GEV", "AMGN", "INTU", "T", "INTC", "UBER", "TJX", "BKNG",
    "BA", "APH", "VZ", "NEE", "ANET", "BLK", "KLAC", "DHR", "ACN", "TXN", "COF",
    "SPGI", "NOW", "GILD", "PFE", "BSX", "ADBE", "LOW", "UNP", "ADI", "SYK", "WELL",
    "ETN", "DE", "PGR", "HON", "CB", "MDT", "COP", "PANW", "PLD", "LMT", "IBKR",
    "VRTX", "KKR",
    "XLB", "XLC", "XLY", "XLP", "XLE", "XLF", "XLV", "XLI", "XLRE", "XLK", "XLU",
    "GLD", "GBTC",
];

enum Universe {
    Default,
    Sp500,
    Penny,
    Symbols(Vec<String>),
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "scanner_cli=info,fmp_client=warn".into()),
        )
        .init();

    let args: Vec<String> = std::env::args().collect();
    let dry_run = args.iter().any(|a| a == "--dry-run");

    let policy = match args
        .iter()
        .position(|a| a == "--policy")
        .and_then(|i| args.get(i + 1))
        .map(String::as_str)
    {
        Some("premium") => ScanPolicy::PremiumSelling,
        Some("breakout-up") => ScanPolicy::BreakoutUp,
        Some("breakout-down") => ScanPolicy::BreakoutDown,
        Some("ratings") => ScanPolicy::RatingChange,
        Some("movers") => {
            return run_movers(&args, dry_run).await;
        }
        _ => {
            print_usage();
            std::process::exit(1);
        }
    };

    let db_path = db_path(&args);
    let universe_choice = universe_choice(&args);

    let client = Arc::new(FmpClient::new(required_api_key()?));
    let universe = build_universe(&client, universe_choice);
    let config = ScanConfig::default();
    let orchestrator = ScanOrchestrator::new(client.clone(), config.clone());

    if policy == ScanPolicy::RatingChange {
        let changes = orchestrator
            .run_rating_scan(client.as_ref(), universe.as_ref(), config.top_n)
            .await?;
        tracing::info!("{} grade changes collected", changes.len());

        if !dry_run {
            let store = ResultStore::connect(&format!("sqlite:{db_path}?mode=rwc")).await?;
            let inserted = store.insert_grade_changes(&changes).await?;
            tracing::info!("{} new grade changes archived", inserted);

            if let Some(notifier) = telegram_notifier() {
                let today = store.grade_changes_fetched_today().await?;
                if let Err(e) = notifier.send_grade_digest(&today).await {
                    tracing::warn!("grade digest not delivered: {}", e);
                }
            }
        }
        return Ok(());
    }

    let report = orchestrator.run_scan(policy, universe.as_ref()).await?;

    for candidate in &report.candidates {
        tracing::info!(
            "{}: score {} ({})",
            candidate.symbol,
            candidate.score,
            candidate.breakdown.join("; ")
        );
    }

    if dry_run {
        tracing::info!(
            "dry run: {} candidates, {} soft, nothing archived or sent",
            report.candidates.len(),
            report.soft_candidates.len()
        );
        return Ok(());
    }

    let mut sinks: Vec<Box<dyn ResultSink>> = Vec::new();
    sinks.push(Box::new(
        ResultStore::connect(&format!("sqlite:{db_path}?mode=rwc")).await?,
    ));
    if let Some(notifier) = telegram_notifier() {
        sinks.push(Box::new(notifier));
    }

    for sink in &sinks {
        if let Err(e) = sink.publish(&report).await {
            tracing::warn!("sink {} failed: {}", sink.name(), e);
        }
    }

    Ok(())
}

async fn run_movers(args: &[String], dry_run: bool) -> anyhow::Result<()> {
    let client = Arc::new(FmpClient::new(required_api_key()?));
    let universe = build_universe(&client, universe_choice(args));
    let config = ScanConfig::default();
    let orchestrator = ScanOrchestrator::new(client.clone(), config.clone());

    let movers = orchestrator
        .run_top_movers(client.as_ref(), universe.as_ref(), config.top_n)
        .await?;

    for q in movers.gainers.iter().chain(&movers.losers) {
        tracing::info!("{}: {:.2} ({:+.2}%)", q.symbol, q.price, q.change_percent);
    }

    if !dry_run {
        if let Some(notifier) = telegram_notifier() {
            if let Err(e) = notifier.send_movers(&movers.gainers, &movers.losers).await {
                tracing::warn!("movers digest not delivered: {}", e);
            }
        }
    }

    Ok(())
}

fn required_api_key() -> anyhow::Result<String> {
    std::env::var("FMP_API_KEY").map_err(|_| anyhow::anyhow!("FMP_API_KEY must be set"))
}

fn telegram_notifier() -> Option<TelegramNotifier> {
    match TelegramConfig::from_env() {
        Some(config) => Some(TelegramNotifier::new(config)),
        None => {
            tracing::info!("Telegram alerts disabled (set TELEGRAM_BOT_TOKEN and TELEGRAM_CHAT_ID)");
            None
        }
    }
}

fn db_path(args: &[String]) -> String {
    args.iter()
        .position(|a| a == "--db")
        .and_then(|i| args.get(i + 1))
        .cloned()
        .unwrap_or_else(|| "scanner.db".to_string())
}

fn universe_choice(args: &[String]) -> Universe {
    if args.iter().any(|a| a == "--sp500") {
        Universe::Sp500
    } else if args.iter().any(|a| a == "--penny") {
        Universe::Penny
    } else if let Some(idx) = args.iter().position(|a| a == "--symbols") {
        let symbols: Vec<String> = args[idx + 1..]
            .iter()
            .take_while(|a| !a.starts_with("--"))
            .map(|s| s.to_uppercase())
            .collect();
        Universe::Symbols(symbols)
    } else {
        Universe::Default
    }
}

fn build_universe(client: &Arc<FmpClient>, choice: Universe) -> Box<dyn UniverseSource> {
    match choice {
        Universe::Default => Box::new(StaticUniverse(
            DEFAULT_UNIVERSE.iter().map(|s| s.to_string()).collect(),
        )),
        Universe::Sp500 => Box::new(Sp500Universe(Arc::clone(client))),
        Universe::Penny => Box::new(PennyStockUniverse(Arc::clone(client))),
        Universe::Symbols(symbols) => Box::new(StaticUniverse(symbols)),
    }
}

fn print_usage() {
    eprintln!("Usage:");
    eprintln!("  scanner --policy premium                 Premium-selling scan over the default universe");
    eprintln!("  scanner --policy breakout-up --penny     Upward breakouts over the penny-stock screen");
    eprintln!("  scanner --policy breakout-down --penny   Downward breakouts over the penny-stock screen");
    eprintln!("  scanner --policy ratings --sp500         Analyst grade changes across the S&P 500");
    eprintln!("  scanner --policy movers --sp500          Top gainers and losers by percent change");
    eprintln!();
    eprintln!("Options:");
    eprintln!("  --symbols AAPL MSFT ...   Scan specific symbols");
    eprintln!("  --db PATH                 SQLite archive path (default: scanner.db)");
    eprintln!("  --dry-run                 Log results without archiving or sending alerts");
}
