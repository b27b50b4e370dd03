use clap::{Parser, Subcommand};
use comfy_table::{presets::UTF8_FULL, Cell, Table};
use configuration::settings::Config;
use core_types::{AssetType, OrderRequest};
use engine::{ExecutionEngine, PortfolioReport, PortfolioValuator};
// Import ledger types directly from the ledger crate
use ledger::connection::{connect, run_migrations};
use ledger::repository::PgLedger;
use ledger::LedgerStore;
use oracle_client::{AlphaVantageClient, PriceOracle};
use std::collections::HashMap;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

/// The main entry point for the tradesim application.
#[tokio::main]
async fn main() {
    // Load environment variables from .env file, if present
    dotenvy::dotenv().ok();

    // Initialize structured logging; RUST_LOG overrides the default level.
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    // Load the application configuration
    let config = configuration::load_config().expect("Failed to load config.toml");

    // Initialize the database connection and run migrations
    let db_pool = connect().await.expect("Failed to connect to the database");
    run_migrations(&db_pool)
        .await
        .expect("Failed to run database migrations");

    let store: Arc<dyn LedgerStore> = Arc::new(PgLedger::new(db_pool));
    let oracle: Arc<dyn PriceOracle> = Arc::new(AlphaVantageClient::new(&config.oracle));

    // Parse command-line arguments
    let cli = Cli::parse();

    // Execute the appropriate command
    let result = match cli.command {
        Commands::CreateAccount => handle_create_account(store, &config).await,
        Commands::AddAsset(args) => handle_add_asset(store, args).await,
        Commands::Assets { json } => handle_assets(store, json).await,
        Commands::Price(args) => handle_price(store, oracle, args).await,
        Commands::Order(args) => handle_order(store, oracle, args).await,
        Commands::Portfolio(args) => handle_portfolio(store, oracle, args).await,
        Commands::History(args) => handle_history(store, args).await,
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

// ==============================================================================
// CLI Structure
// ==============================================================================

/// A simulated trading ledger: market orders, cost-basis accounting, and
/// valued portfolios.
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a new trading account with the configured starting cash.
    CreateAccount,
    /// Register a tradable asset in the reference data.
    AddAsset(AddAssetArgs),
    /// List all tradable assets.
    Assets {
        /// Emit the asset list as JSON.
        #[arg(long)]
        json: bool,
    },
    /// Fetch the current oracle price for one asset.
    Price(PriceArgs),
    /// Place a market order.
    Order(OrderArgs),
    /// Show the valued portfolio of an account.
    Portfolio(PortfolioArgs),
    /// Show the trade history of an account, newest first.
    History(HistoryArgs),
}

#[derive(Parser)]
struct AddAssetArgs {
    /// The ticker symbol, e.g. "AAPL" or "BTCUSD".
    #[arg(long)]
    symbol: String,

    /// The display name, e.g. "Apple Inc.".
    #[arg(long)]
    name: String,

    /// The asset type: "stock" or "crypto".
    #[arg(long = "type")]
    asset_type: String,
}

#[derive(Parser)]
struct PriceArgs {
    /// The symbol to price.
    #[arg(long)]
    symbol: String,
}

#[derive(Parser)]
struct OrderArgs {
    /// The account placing the order.
    #[arg(long)]
    account: Uuid,

    /// The symbol to trade.
    #[arg(long)]
    symbol: String,

    /// The order side: "buy" or "sell".
    #[arg(long)]
    side: String,

    /// The quantity to trade, as a decimal string.
    #[arg(long)]
    quantity: String,
}

#[derive(Parser)]
struct PortfolioArgs {
    /// The account to value.
    #[arg(long)]
    account: Uuid,

    /// Emit the report as JSON instead of a table.
    #[arg(long)]
    json: bool,
}

#[derive(Parser)]
struct HistoryArgs {
    /// The account whose trades to list.
    #[arg(long)]
    account: Uuid,

    /// Emit the history as JSON instead of a table.
    #[arg(long)]
    json: bool,
}

// ==============================================================================
// Command Logic
// ==============================================================================

async fn handle_create_account(
    store: Arc<dyn LedgerStore>,
    config: &Config,
) -> anyhow::Result<()> {
    let account = store.create_account(config.trading.starting_cash).await?;
    println!(
        "Created account {} with starting cash {}",
        account.account_id, account.cash_balance
    );
    Ok(())
}

async fn handle_add_asset(store: Arc<dyn LedgerStore>, args: AddAssetArgs) -> anyhow::Result<()> {
    let asset_type: AssetType = args
        .asset_type
        .parse()
        .map_err(|_| anyhow::anyhow!("asset type must be 'stock' or 'crypto'"))?;
    let asset = store
        .insert_asset(&args.symbol, &args.name, asset_type)
        .await?;
    println!("Registered {} ({}) as {}", asset.symbol, asset.name, asset.asset_type);
    Ok(())
}

async fn handle_assets(store: Arc<dyn LedgerStore>, json: bool) -> anyhow::Result<()> {
    let assets = store.assets().await?;
    if json {
        println!("{}", serde_json::to_string_pretty(&assets)?);
        return Ok(());
    }

    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_header(vec!["Symbol", "Name", "Type"]);
    for asset in assets {
        table.add_row(vec![
            Cell::new(asset.symbol),
            Cell::new(asset.name),
            Cell::new(asset.asset_type),
        ]);
    }
    println!("{table}");
    Ok(())
}

async fn handle_price(
    store: Arc<dyn LedgerStore>,
    oracle: Arc<dyn PriceOracle>,
    args: PriceArgs,
) -> anyhow::Result<()> {
    let asset = store
        .asset_by_symbol(&args.symbol)
        .await?
        .ok_or_else(|| anyhow::anyhow!("asset '{}' not found", args.symbol))?;
    let price = oracle.quote(&asset.symbol, asset.asset_type).await?;
    println!("{}: {}", asset.symbol, price);
    Ok(())
}

async fn handle_order(
    store: Arc<dyn LedgerStore>,
    oracle: Arc<dyn PriceOracle>,
    args: OrderArgs,
) -> anyhow::Result<()> {
    let engine = ExecutionEngine::new(store, oracle);
    let request = OrderRequest {
        symbol: args.symbol,
        order_type: args.side,
        quantity: args.quantity,
    };
    let trade = engine.place_order(args.account, &request).await?;
    println!(
        "Settled {} {} {} at {} (trade {})",
        trade.side, trade.quantity, request.symbol, trade.price_at_execution, trade.trade_id
    );
    Ok(())
}

async fn handle_portfolio(
    store: Arc<dyn LedgerStore>,
    oracle: Arc<dyn PriceOracle>,
    args: PortfolioArgs,
) -> anyhow::Result<()> {
    let valuator = PortfolioValuator::new(store, oracle);
    let report = valuator.value_portfolio(args.account).await?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    print_portfolio_table(&report);
    Ok(())
}

fn print_portfolio_table(report: &PortfolioReport) {
    let mut table = Table::new();
    table.load_preset(UTF8_FULL).set_header(vec![
        "Symbol", "Name", "Quantity", "Avg Cost", "Price", "Cost", "Value", "P/L", "P/L %",
    ]);

    let na = || Cell::new("N/A");
    for row in &report.holdings {
        table.add_row(vec![
            Cell::new(&row.symbol),
            Cell::new(&row.name),
            Cell::new(row.quantity),
            Cell::new(row.average_cost),
            row.current_price.map_or_else(na, Cell::new),
            Cell::new(row.holding_cost),
            row.current_value.map_or_else(na, Cell::new),
            row.profit_loss.map_or_else(na, Cell::new),
            Cell::new(&row.profit_loss_percent),
        ]);
    }
    println!("{table}");

    println!("Cash balance:       {}", report.cash_balance);
    println!("Total value:        {}", report.summary.total_value);
    println!("Total cost:         {}", report.summary.total_cost);
    println!(
        "Overall P/L:        {} ({})",
        report.summary.overall_profit_loss, report.summary.overall_profit_loss_percent
    );
}

async fn handle_history(store: Arc<dyn LedgerStore>, args: HistoryArgs) -> anyhow::Result<()> {
    let trades = store.trades(args.account).await?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&trades)?);
        return Ok(());
    }

    // Resolve asset symbols once per distinct asset rather than per trade.
    let mut symbols: HashMap<Uuid, String> = HashMap::new();
    for trade in &trades {
        if !symbols.contains_key(&trade.asset_id) {
            let symbol = store
                .asset_by_id(trade.asset_id)
                .await?
                .map(|a| a.symbol)
                .unwrap_or_else(|| trade.asset_id.to_string());
            symbols.insert(trade.asset_id, symbol);
        }
    }

    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_header(vec!["Executed", "Symbol", "Side", "Quantity", "Price"]);
    for trade in &trades {
        table.add_row(vec![
            Cell::new(trade.executed_at.format("%Y-%m-%d %H:%M:%S")),
            Cell::new(&symbols[&trade.asset_id]),
            Cell::new(trade.side),
            Cell::new(trade.quantity),
            Cell::new(trade.price_at_execution),
        ]);
    }
    println!("{table}");
    Ok(())
}
