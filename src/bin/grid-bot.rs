// Grid Trading Engine - CLI
// Config management and paper runs against the in-memory venue

use std::sync::Arc;

use async_trait::async_trait;
use clap::{Parser, Subcommand};
use rust_decimal::Decimal;
use tracing::{error, info, warn};

use grid_trading_engine::core::{IntervalTicks, TickSource};
use grid_trading_engine::{
    shutdown_channel, Config, ConfigError, PaperVenue, RandomWalkFeed, RebalanceEngine,
    StopReason,
};

#[derive(Parser)]
#[command(name = "grid-bot")]
#[command(version)]
#[command(about = "Grid trading strategy engine", long_about = None)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Configuration file path
    #[arg(short, long, global = true, default_value = "config.toml")]
    config: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a default configuration file
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },

    /// Validate the configuration and print a summary
    Validate,

    /// Run the strategy against the paper venue
    Paper {
        /// Stop after this many cycles
        #[arg(long)]
        cycles: Option<usize>,

        /// Starting mid price of the simulated market
        #[arg(long, default_value = "4000")]
        start_price: Decimal,

        /// Simulated tick size
        #[arg(long, default_value = "0.1")]
        tick_size: Decimal,

        /// Maximum relative price move per tick
        #[arg(long, default_value = "0.002")]
        volatility: f64,

        /// Seed for a reproducible price walk
        #[arg(long)]
        seed: Option<u64>,
    },

    /// Initialize against the paper venue and print the status snapshot as JSON
    Status {
        /// Starting mid price of the simulated market
        #[arg(long, default_value = "4000")]
        start_price: Decimal,

        /// Simulated tick size
        #[arg(long, default_value = "0.1")]
        tick_size: Decimal,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Logging comes from the config file when it parses, defaults otherwise
    let logging = Config::from_file(&cli.config)
        .map(|c| c.logging)
        .unwrap_or_default();
    let _guard = grid_trading_engine::logging::init_logging(&logging, cli.verbose);

    info!("🚀 Grid Trading Engine v{}", env!("CARGO_PKG_VERSION"));
    info!("📁 Config: {}", cli.config);

    match cli.command {
        Commands::Init { force } => init_config(&cli.config, force)?,
        Commands::Validate => {
            let config = load_config_or_exit(&cli.config);
            print_summary(&config);
        }
        Commands::Paper { cycles, start_price, tick_size, volatility, seed } => {
            let config = load_config_or_exit(&cli.config);
            run_paper(config, cycles, start_price, tick_size, volatility, seed).await?;
        }
        Commands::Status { start_price, tick_size } => {
            let config = load_config_or_exit(&cli.config);
            show_status(config, start_price, tick_size).await?;
        }
    }

    Ok(())
}

/// Load config or exit with a helpful error message
fn load_config_or_exit(path: &str) -> Config {
    match Config::from_file(path) {
        Ok(config) => config,
        Err(e) => {
            error!("❌ Configuration Error");
            error!("{}", e);

            if matches!(e, ConfigError::FileRead(_)) {
                error!("");
                error!("💡 Quick fix:");
                error!("   1. Run: grid-bot init");
                error!("   2. Edit {} for your market", path);
                error!("   3. Try again");
            }

            std::process::exit(1);
        }
    }
}

fn init_config(path: &str, force: bool) -> Result<(), Box<dyn std::error::Error>> {
    if std::path::Path::new(path).exists() && !force {
        warn!("⚠️  {} already exists, skipping (use --force to overwrite)", path);
        return Ok(());
    }

    let config = Config::default();
    config.to_file(path)?;
    if config.logging.log_to_file {
        std::fs::create_dir_all(&config.logging.log_dir)?;
    }

    info!("📝 Created {}", path);
    info!("💡 Next steps:");
    info!("   1. Edit {} with your grid parameters", path);
    info!("   2. Run: grid-bot validate");
    info!("   3. Run: grid-bot paper --cycles 20");
    Ok(())
}

fn print_summary(config: &Config) {
    let grid = &config.grid;
    info!("✅ Configuration is valid");
    info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    info!("📈 Pair:          {}", grid.trading_pair);
    info!("📊 Grid levels:   {}", grid.grid_count);
    info!("💰 Order size:    {}", grid.order_size);
    info!("🛡️  Max position:  {}", grid.max_position_size);
    info!("↔️  Price range:   ±{}%", grid.price_range_percent);
    if grid.disable_stop_loss {
        info!("🚨 Stop-loss:     DISABLED");
    } else {
        info!("🚨 Stop-loss:     {}%", grid.stop_loss_percent);
    }
    info!("⏱️  Interval:      {}s", grid.check_interval_secs);
    info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
}

/// Interval ticks that move the simulated market before each cycle
struct PaperTicks {
    inner: IntervalTicks,
    feed: RandomWalkFeed,
    venue: Arc<PaperVenue>,
    remaining: Option<usize>,
}

#[async_trait]
impl TickSource for PaperTicks {
    async fn next_tick(&mut self) -> Option<()> {
        match self.remaining.as_mut() {
            Some(0) => return None,
            Some(n) => *n -= 1,
            None => {}
        }
        self.inner.next_tick().await?;
        let (bid, ask) = self.feed.step();
        self.venue.set_quote(bid, ask).await;
        Some(())
    }
}

fn paper_venue(config: &Config, start_price: Decimal, tick_size: Decimal) -> Arc<PaperVenue> {
    let half_spread = tick_size;
    Arc::new(PaperVenue::new(
        &config.grid.trading_pair,
        tick_size,
        start_price - half_spread,
        start_price + half_spread,
    ))
}

async fn run_paper(
    config: Config,
    cycles: Option<usize>,
    start_price: Decimal,
    tick_size: Decimal,
    volatility: f64,
    seed: Option<u64>,
) -> Result<(), Box<dyn std::error::Error>> {
    info!("🧪 Paper trading {} from {}", config.grid.trading_pair, start_price);

    let venue = paper_venue(&config, start_price, tick_size);
    let mut feed = RandomWalkFeed::new(start_price, tick_size, volatility);
    if let Some(seed) = seed {
        feed = feed.with_seed(seed);
    }
    let mut ticks = PaperTicks {
        inner: IntervalTicks::new(config.grid.check_interval()),
        feed,
        venue: venue.clone(),
        remaining: cycles,
    };

    let (handle, signal) = shutdown_channel();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("⌨️  Ctrl-C received");
            handle.initiate_shutdown();
        }
    });

    let mut engine =
        RebalanceEngine::new(venue.clone(), config.grid.clone(), config.engine.clone())?;
    let outcome = engine.run(&mut ticks, signal).await?;

    let (position, entry) = venue.position().await;
    info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    info!("🏁 Run finished after {} cycles ({:?})", outcome.cycles, outcome.reason);
    info!("📦 Orders placed on venue: {}", venue.total_orders_placed().await);
    info!("📍 Final position: {} (entry {:?})", position, entry);
    if let Some(drain) = &outcome.drain {
        info!(
            "🧹 Drain - cancelled: {}, failed: {}, abandoned: {}",
            drain.cancelled.len(),
            drain.failed.len(),
            drain.abandoned.len()
        );
    }
    if outcome.reason == StopReason::StopLoss {
        warn!("🚨 Run ended by stop-loss");
    }
    info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    Ok(())
}

async fn show_status(
    config: Config,
    start_price: Decimal,
    tick_size: Decimal,
) -> Result<(), Box<dyn std::error::Error>> {
    let venue = paper_venue(&config, start_price, tick_size);
    let mut engine = RebalanceEngine::new(venue, config.grid, config.engine)?;
    engine.initialize().await?;

    let status = engine.status();
    println!("{}", serde_json::to_string_pretty(&status)?);
    Ok(())
}
