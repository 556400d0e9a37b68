//! Signal Governor
//!
//! Turns scored FX signals into risk-bounded trades: resolves direction,
//! admits candidates against a fixed dollar risk and daily limits, and walks
//! open positions through a three-tier take-profit ladder with a trailing stop.

mod api;
mod bot;
mod error;
mod metrics;
mod models;
mod replay;
mod trading;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use chrono::{TimeZone, Utc};
use clap::{Parser, Subcommand};
use rust_decimal::Decimal;
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::api::{ChannelNotifier, GatewayClient, PaperExecution};
use crate::bot::{BotConfig, Collaborators, Governor};
use crate::models::{Direction, TradeIntent};
use crate::replay::ReplayFile;
use crate::trading::{GovernorConfig, PolicyMode, TradePlan, TradingSession};

/// Risk governor for scored FX trading signals.
#[derive(Parser)]
#[command(name = "sigov")]
#[command(about = "Admit, size and manage FX trades from scored signals", long_about = None)]
struct Cli {
    /// JSON configuration file (defaults are used when omitted)
    #[arg(short, long, env = "SIGOV_CONFIG")]
    config: Option<PathBuf>,

    /// Override the direction policy (contrarian, volume_gated)
    #[arg(short, long, env = "SIGOV_POLICY")]
    policy: Option<String>,

    /// Log level or filter directive (e.g. "info", "signal_governor=debug")
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// Emit logs and notifications as JSON lines
    #[arg(long)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the governor against the signal gateway with paper execution
    Run {
        /// Signal gateway base URL
        #[arg(short, long, env = "SIGOV_GATEWAY_URL", default_value = "http://127.0.0.1:8080")]
        gateway_url: String,

        /// Seconds between evaluation cycles
        #[arg(long, default_value = "60")]
        cycle_secs: u64,

        /// Seconds between price checks of open positions
        #[arg(long, default_value = "5")]
        tick_secs: u64,
    },

    /// Replay a recorded session file and print session statistics
    Replay {
        /// Replay file (JSON)
        file: PathBuf,
    },

    /// Show the effective configuration
    Config {
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },

    /// Compute stop, targets and lot size for a hypothetical trade
    Levels {
        symbol: String,

        /// BUY or SELL (the trade direction, after policy)
        direction: String,

        /// Entry price
        entry: Decimal,

        /// Average true range
        atr: Decimal,

        /// Signal strength, 0 to 10
        #[arg(short, long, default_value = "8.0")]
        strength: f64,

        /// UTC hour used for the session multiplier (defaults to now)
        #[arg(long)]
        hour: Option<u32>,
    },
}

fn init_logging(level: &str, json: bool) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .context("Invalid log filter")?;

    let builder = tracing_subscriber::fmt().with_env_filter(filter).with_target(false);
    if json {
        builder.json().try_init()
    } else {
        builder.try_init()
    }
    .map_err(|e| anyhow::anyhow!("Failed to install logger: {e}"))
}

fn load_config(cli: &Cli) -> Result<GovernorConfig> {
    let mut config = GovernorConfig::load(cli.config.as_deref())?;
    if let Some(policy) = &cli.policy {
        match PolicyMode::from_str(policy) {
            Some(mode) => config.policy = mode,
            None => bail!("Unknown policy '{}', expected contrarian or volume_gated", policy),
        }
    }
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_logging(&cli.log_level, cli.log_json)?;

    let config = load_config(&cli)?;

    match cli.command {
        Commands::Run {
            gateway_url,
            cycle_secs,
            tick_secs,
        } => {
            let bot_config = BotConfig {
                cycle_interval_secs: cycle_secs,
                tick_interval_secs: tick_secs,
                governor: config,
            };

            info!(
                gateway = %gateway_url,
                policy = bot_config.governor.policy.as_str(),
                "Starting signal governor"
            );

            let gateway = Arc::new(GatewayClient::with_base_url(gateway_url)?);
            let paper = Arc::new(PaperExecution::new());
            let (notifier, drain) = ChannelNotifier::spawn_logging(cli.log_json);
            let collaborators = Collaborators {
                signals: gateway.clone(),
                prices: gateway.clone(),
                execution: paper.clone(),
                notifier: Arc::new(notifier),
            };

            let risk = &bot_config.governor.risk;
            println!("\n=== Signal Governor ===");
            println!("Gateway:            {}", gateway.base_url());
            println!("Policy:             {}", bot_config.governor.policy.as_str());
            println!("Risk per trade:     ${}", risk.fixed_risk_amount);
            println!("Max concurrent:     {}", risk.max_concurrent_trades);
            println!("Daily drawdown cap: ${}", risk.max_daily_drawdown);
            println!("Symbols:            {}", bot_config.governor.symbols.join(", "));
            println!("Mode:               PAPER (orders are simulated)");
            println!("\nPress Ctrl+C to stop.\n");

            let governor = Governor::new(bot_config.governor, collaborators, Utc::now());
            if let Err(e) = governor
                .run(
                    Duration::from_secs(bot_config.cycle_interval_secs),
                    Duration::from_secs(bot_config.tick_interval_secs),
                )
                .await
            {
                tracing::error!(error = %e, "Governor error");
            }

            let snapshot = governor.ledger().snapshot();
            println!("\nDaily P&L:          ${}", snapshot.daily_pnl());
            println!("Open positions:     {}", governor.open_positions().len());
            println!("Paper orders open:  {}", paper.open_order_count());
            println!("Exit instructions:  {}", paper.instructions_applied());
            println!("{}", governor.session_stats());

            // Dropping the governor closes the channel and lets the drain finish
            drop(governor);
            drain.await.ok();
        }

        Commands::Replay { file } => {
            let replay = ReplayFile::load(&file)?;
            info!(cycles = replay.cycles.len(), file = %file.display(), "Replaying session");

            let (notifier, drain) = ChannelNotifier::spawn_logging(cli.log_json);
            let stats = replay::run_replay(&replay, config, Arc::new(notifier)).await?;
            drain.await.ok();

            println!("{}", stats);
        }

        Commands::Config { json } => {
            if json {
                println!("{}", serde_json::to_string_pretty(&config)?);
                return Ok(());
            }

            println!("\n=== Governor Configuration ===\n");
            println!("Universe:");
            println!("  Symbols:              {}", config.symbols.join(", "));
            println!("  Timeframes:           {}", config.timeframes.join(", "));
            println!("  Policy:               {}", config.policy.as_str());

            let risk = &config.risk;
            println!("\nRisk:");
            println!("  Fixed Risk:           ${}", risk.fixed_risk_amount);
            println!("  Max Concurrent:       {}", risk.max_concurrent_trades);
            println!("  Max Daily Drawdown:   ${}", risk.max_daily_drawdown);
            println!("  One Per Symbol/Day:   {}", risk.one_trade_per_symbol_per_day);
            println!("  Max Trades/Day:       {}", display_opt(risk.max_trades_per_day));
            println!("  Max Per Symbol/Day:   {}", display_opt(risk.max_trades_per_symbol_per_day));
            println!("  Daily Profit Target:  {}", display_opt(risk.daily_profit_target));
            println!("  Stop After Success:   {}", risk.stop_symbol_after_success);

            let signals = &config.signals;
            println!("\nSignals:");
            println!("  Min Strength:         {:.1}", signals.min_signal_strength);
            println!("  Priority Threshold:   {:.1}", signals.priority_threshold);
            println!("  Volume Threshold:     {:.1}", signals.volume_threshold);
            println!("  Reversal Exit:        {}", signals.reversal_exit);

            let exits = &config.exits;
            println!("\nExits (ATR multiples):");
            println!("  Stop:                 {}", exits.stop_atr);
            println!("  TP1 / TP2 / TP3:      {} / {} / {}", exits.tp1_atr, exits.tp2_atr, exits.tp3_atr);
            println!("  TP1 Close:            {} of remaining", exits.tp1_close_of_remaining);
            println!("  TP2 Close:            {} of original", exits.tp2_close_of_original);
            println!("  Trailing Distance:    {}", exits.trail_atr);
            println!("  Breakeven After TP1:  {}", exits.breakeven_after_tp1);

            let sessions = &config.sessions;
            println!("\nTrading Window (UTC):");
            println!("  Hours:                {:02}:00 - {:02}:00", sessions.trading_start_hour, sessions.trading_end_hour);
            println!("  Multipliers Enabled:  {}", config.multipliers.enabled);
        }

        Commands::Levels {
            symbol,
            direction,
            entry,
            atr,
            strength,
            hour,
        } => {
            let direction: Direction = direction.parse()?;
            let now = match hour {
                Some(h) => {
                    let today = Utc::now().date_naive();
                    let at = today
                        .and_hms_opt(h, 0, 0)
                        .with_context(|| format!("Invalid hour {}", h))?;
                    Utc.from_utc_datetime(&at)
                }
                None => Utc::now(),
            };

            let intent = TradeIntent {
                symbol: symbol.clone(),
                direction,
                strength_score: strength,
                volume_score: 0.0,
                entry_price_hint: entry,
                atr,
                priority_rank: 0,
                priority: false,
            };
            let plan = TradePlan::build(&intent, now, &config)?;

            println!("\n=== {} {} @ {} ===\n", direction, symbol, entry);
            println!("  Session:              {:?}", TradingSession::at(now));
            println!("  Distance Multiplier:  {}", plan.distance_multiplier);
            println!("  Stop:                 {}", plan.levels.stop);
            println!("  TP1:                  {}", plan.levels.tp1);
            println!("  TP2:                  {}", plan.levels.tp2);
            println!("  TP3:                  {}", plan.levels.tp3);
            println!("  Trail Distance:       {}", plan.levels.trail_distance);
            println!("  Lot Size:             {}", plan.lot_size);
            println!("  Risk at Stop:         ${}", plan.risk_amount.round_dp(2));
        }
    }

    Ok(())
}

fn display_opt<T: std::fmt::Display>(value: Option<T>) -> String {
    value.map_or_else(|| "off".to_string(), |v| v.to_string())
}
