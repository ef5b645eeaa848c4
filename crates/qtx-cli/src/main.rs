use std::path::PathBuf;

use anyhow::Result;
use chrono::Utc;
use clap::{Parser, Subcommand};
use qtx_config::Configuration;
use qtx_md::SyntheticMarketData;
use qtx_schemas::Side;
use qtx_trader::{is_market_hours, PaperTrader};

#[derive(Parser)]
#[command(name = "qtx")]
#[command(about = "Paper-trading order execution and risk-containment engine", long_about = None)]
struct Cli {
    #[command(subcommand)]
    cmd: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Database commands
    Db {
        #[command(subcommand)]
        cmd: DbCmd,
    },

    /// Compute the effective configuration's content hash + canonical JSON
    ConfigHash {
        /// Optional YAML overlay path, merged over the defaults
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Paper-trading commands
    Trade {
        #[command(subcommand)]
        cmd: TradeCmd,
    },
}

#[derive(Subcommand)]
enum DbCmd {
    Status,
    Migrate,
}

#[derive(Subcommand)]
enum TradeCmd {
    /// Place a market buy order against the synthetic quote source
    Buy {
        #[arg(long)]
        symbol: String,
        #[arg(long)]
        qty: i64,
        #[arg(long)]
        config: Option<PathBuf>,
    },
    /// Place a market sell order against the synthetic quote source
    Sell {
        #[arg(long)]
        symbol: String,
        #[arg(long)]
        qty: i64,
        #[arg(long)]
        config: Option<PathBuf>,
    },
    /// Print whether the market is open right now
    Hours,
    /// Print positions, recent trades, and recent snapshots from the database
    Summary,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();

    match cli.cmd {
        Commands::Db { cmd } => {
            let pool = qtx_db::connect_from_env().await?;
            match cmd {
                DbCmd::Status => {
                    let s = qtx_db::status(&pool).await?;
                    println!("db_ok={} has_positions_table={}", s.ok, s.has_positions_table);
                }
                DbCmd::Migrate => {
                    qtx_db::migrate(&pool).await?;
                    println!("migrations_applied=true");
                }
            }
        }

        Commands::ConfigHash { config } => {
            let loaded = Configuration::load(config.as_deref())?;
            let hash = loaded.content_hash()?;
            println!("config_hash={hash}");
            println!("{}", serde_json::to_string_pretty(&loaded)?);
        }

        Commands::Trade { cmd } => match cmd {
            TradeCmd::Buy { symbol, qty, config } => place_order(symbol, qty, Side::Buy, config).await?,
            TradeCmd::Sell { symbol, qty, config } => place_order(symbol, qty, Side::Sell, config).await?,
            TradeCmd::Hours => {
                println!("market_open={}", is_market_hours(Utc::now()));
            }
            TradeCmd::Summary => print_summary().await?,
        },
    }

    Ok(())
}

async fn place_order(symbol: String, qty: i64, side: Side, config_path: Option<PathBuf>) -> Result<()> {
    let config = Configuration::load(config_path.as_deref())?;
    let pool = qtx_db::connect_from_env().await.ok();
    if let Some(pool) = &pool {
        qtx_db::migrate(pool).await?;
    }

    let now = Utc::now();
    let trader = PaperTrader::new(config, Box::new(SyntheticMarketData::new()), pool, now);

    let order_id = trader.place_market_order(&symbol, qty, side, false, None, now).await;
    match order_id {
        Some(id) => {
            let summary = trader.get_performance_summary().await;
            println!("order_id={id}");
            println!("cash={}", summary.cash.to_f64());
            println!("equity={}", summary.equity.to_f64());
        }
        None => println!("order rejected"),
    }
    Ok(())
}

async fn print_summary() -> Result<()> {
    let pool = qtx_db::connect_from_env().await?;

    let positions = qtx_db::load_positions(&pool).await?;
    println!("-- positions --");
    for position in &positions {
        println!(
            "{} qty={} avg_cost={}",
            position.symbol,
            position.quantity,
            position.avg_cost.to_f64()
        );
    }

    let trades = qtx_db::load_trades(&pool, None, 20).await?;
    println!("-- recent trades --");
    for trade in &trades {
        println!(
            "{} side={} qty={} price={:.2} pnl={:?}",
            trade.symbol,
            trade.side,
            trade.qty,
            trade.price as f64 / 1_000_000.0,
            trade.pnl.map(|pnl| pnl as f64 / 1_000_000.0)
        );
    }

    let snapshots = qtx_db::load_snapshots(&pool, 10).await?;
    println!("-- recent snapshots --");
    for snapshot in &snapshots {
        println!(
            "{} portfolio_value={:.2} cash={:.2}",
            snapshot.timestamp,
            snapshot.portfolio_value as f64 / 1_000_000.0,
            snapshot.cash as f64 / 1_000_000.0
        );
    }

    Ok(())
}
