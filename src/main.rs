use std::path::PathBuf;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand, ValueEnum};

use trendbot::config::AppConfig;
use trendbot::exchange::{ExchangeClient, OkxClient};
use trendbot::execution::Orchestrator;
use trendbot::markets::MarketCatalog;
use trendbot::models::{new_client_order_id, OrderIntent, OrderType, Side};
use trendbot::precision;
use trendbot::risk::RiskManager;
use trendbot::scheduler;
use trendbot::state::FileStateStore;
use trendbot::strategy::{EmaRsiStrategy, Strategy};

#[derive(Parser)]
#[command(name = "trendbot", version, about = "EMA/RSI trend-following trading loop")]
struct Cli {
    /// Config file (without extension), defaults to config/trading
    #[arg(long, global = true)]
    config: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Evaluate one tick, or keep ticking with --loop
    Run {
        /// Unified symbol override, e.g. BTC/USDT:USDT
        #[arg(long)]
        symbol: Option<String>,
        /// Timeframe override, e.g. 5m
        #[arg(long)]
        timeframe: Option<String>,
        /// Force paper mode (no real orders)
        #[arg(long)]
        paper: bool,
        /// Loop forever instead of evaluating once
        #[arg(long = "loop")]
        run_loop: bool,
        /// Seconds between ticks
        #[arg(long)]
        interval_secs: Option<u64>,
    },
    /// Download instrument metadata into the market catalog
    SyncMarkets,
    /// Place a single risk-sized order with precision and minimum checks
    Order {
        #[arg(long, value_enum)]
        side: SideArg,
        /// Order type
        #[arg(long = "type", value_enum, default_value = "limit")]
        order_type: TypeArg,
        /// Required for limit orders; optional reference for market orders
        #[arg(long)]
        price: Option<f64>,
        /// Force paper mode (no real orders)
        #[arg(long)]
        paper: bool,
    },
    /// Verify exchange connectivity and credentials
    CheckAccount,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum SideArg {
    Buy,
    Sell,
}

impl From<SideArg> for Side {
    fn from(value: SideArg) -> Self {
        match value {
            SideArg::Buy => Side::Buy,
            SideArg::Sell => Side::Sell,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum TypeArg {
    Market,
    Limit,
}

impl From<TypeArg> for OrderType {
    fn from(value: TypeArg) -> Self {
        match value {
            TypeArg::Market => OrderType::Market,
            TypeArg::Limit => OrderType::Limit,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::from_path("config/.env").ok();
    dotenvy::dotenv().ok();
    setup_logging();

    let cli = Cli::parse();
    let config_path = cli.config.as_deref();

    match cli.command {
        Command::Run {
            symbol,
            timeframe,
            paper,
            run_loop,
            interval_secs,
        } => cmd_run(config_path, symbol, timeframe, paper, run_loop, interval_secs).await,
        Command::SyncMarkets => cmd_sync_markets(config_path).await,
        Command::Order {
            side,
            order_type,
            price,
            paper,
        } => cmd_order(config_path, side.into(), order_type.into(), price, paper).await,
        Command::CheckAccount => cmd_check_account(config_path).await,
    }
}

fn setup_logging() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("trendbot=info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

async fn cmd_run(
    config_path: Option<&str>,
    symbol: Option<String>,
    timeframe: Option<String>,
    paper: bool,
    run_loop: bool,
    interval_secs: Option<u64>,
) -> anyhow::Result<()> {
    let mut cfg = AppConfig::load(config_path)?;
    if let Some(symbol) = symbol {
        cfg.symbol = symbol;
    }
    if let Some(timeframe) = timeframe {
        cfg.timeframe = timeframe;
    }
    if let Some(secs) = interval_secs {
        cfg.interval_secs = secs;
    }
    if paper {
        cfg.paper = true;
    }
    cfg.validate()
        .context("configuration rejected after CLI overrides")?;

    let catalog = MarketCatalog::load(&cfg.markets_file).with_context(|| {
        format!(
            "cannot load market catalog {}; run `trendbot sync-markets` first",
            cfg.markets_file.display()
        )
    })?;
    let market = catalog.get(&cfg.symbol)?.clone();

    let store = FileStateStore::new(&cfg.state_dir).context("cannot open state directory")?;
    let exchange = OkxClient::from_env(cfg.paper)?;
    let strategy = Box::new(EmaRsiStrategy::new(cfg.strategy.clone()));
    let risk = RiskManager::new(cfg.risk.clone());

    tracing::info!(
        "trendbot starting: {} {} strategy={} paper={} loop={}",
        cfg.symbol,
        cfg.timeframe,
        strategy.name(),
        cfg.paper,
        run_loop
    );

    let interval = cfg.interval_secs;
    let orchestrator = Orchestrator::new(exchange, store, strategy, risk, market, cfg);

    if run_loop {
        scheduler::run_loop(&orchestrator, interval).await;
        Ok(())
    } else {
        let result = orchestrator.run_tick().await;
        scheduler::report_tick(&result);
        result?;
        Ok(())
    }
}

async fn cmd_sync_markets(config_path: Option<&str>) -> anyhow::Result<()> {
    // The catalog path comes from config when available; sync itself has no
    // other configuration dependency
    let markets_file = match AppConfig::load(config_path) {
        Ok(cfg) => cfg.markets_file,
        Err(e) => {
            tracing::debug!("no usable config ({e}), using default catalog path");
            PathBuf::from("config/markets.json")
        }
    };

    let client = OkxClient::from_env(true)?;
    let instruments = client.fetch_instruments("SWAP").await?;
    let catalog = MarketCatalog::from_instruments(&instruments);
    if catalog.is_empty() {
        bail!("exchange returned no live instruments");
    }

    catalog.save(&markets_file)?;
    tracing::info!(
        "Saved {} markets -> {}",
        catalog.len(),
        markets_file.display()
    );
    Ok(())
}

async fn cmd_order(
    config_path: Option<&str>,
    side: Side,
    order_type: OrderType,
    price_arg: Option<f64>,
    paper: bool,
) -> anyhow::Result<()> {
    let cfg = AppConfig::load(config_path)?;
    let paper = paper || cfg.paper;

    let catalog = MarketCatalog::load(&cfg.markets_file).with_context(|| {
        format!(
            "cannot load market catalog {}; run `trendbot sync-markets` first",
            cfg.markets_file.display()
        )
    })?;
    let market = catalog.get(&cfg.symbol)?.clone();

    let client = OkxClient::from_env(paper)?;
    let free = client.fetch_free_balance(cfg.quote_ccy()).await?;

    let risk = RiskManager::new(cfg.risk.clone());
    let notional = risk.order_notional(free);
    if notional <= 0.0 {
        bail!("no free {} to allocate", cfg.quote_ccy());
    }

    let price = match order_type {
        OrderType::Limit => match price_arg {
            Some(p) if p > 0.0 => p,
            _ => bail!("limit order requires --price > 0"),
        },
        OrderType::Market => match price_arg {
            Some(p) if p > 0.0 => p,
            _ => client.fetch_last_price(&market.id).await?,
        },
    };
    if price <= 0.0 {
        bail!("unable to determine a valid price");
    }

    let amount = notional / price;
    let (price, amount) = precision::quantize(&market, price, amount);
    if !precision::meets_min_limits(&market, price, amount) {
        bail!("order fails min limits: price={price}, amount={amount}");
    }

    let intent = OrderIntent {
        symbol: market.id.clone(),
        side,
        order_type,
        amount,
        price: match order_type {
            OrderType::Limit => Some(price),
            OrderType::Market => None,
        },
        client_order_id: new_client_order_id(),
        reduce_only: cfg.reduce_only,
        td_mode: cfg.td_mode.clone(),
        pos_side: cfg.pos_side.clone(),
        post_only: cfg.post_only && order_type == OrderType::Limit,
    };

    tracing::info!(
        "Placing order: {} {} {} amount={} price={} paper={}",
        cfg.symbol,
        intent.side.as_str(),
        intent.order_type.as_str(),
        amount,
        price,
        paper
    );
    let ack = client.submit_order(&intent).await?;
    tracing::info!("Order result: {:?}", ack);
    Ok(())
}

async fn cmd_check_account(config_path: Option<&str>) -> anyhow::Result<()> {
    let quote = AppConfig::load(config_path)
        .map(|cfg| cfg.quote_ccy().to_string())
        .unwrap_or_else(|_| "USDT".to_string());

    let client = OkxClient::from_env(true)?;
    match client.fetch_free_balance(&quote).await {
        Ok(free) => {
            tracing::info!("Free {} balance: {}", quote, free);
            tracing::info!("Private connectivity verified.");
        }
        Err(e) => {
            tracing::warn!("Private endpoint failed ({e}), falling back to public check...");
            let instruments = client.fetch_instruments("SWAP").await?;
            tracing::info!(
                "Loaded {} instruments. Public connectivity verified.",
                instruments.len()
            );
        }
    }
    Ok(())
}
