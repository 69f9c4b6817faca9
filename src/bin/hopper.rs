//! Headless game driver.
//!
//! Runs the position engine against a live or synthetic price feed and takes
//! player commands on stdin. This is the thin frame-loop host; it owns no
//! game logic beyond wiring ticks, feeds, and commands together.
//!
//! # Usage
//!
//! ```bash
//! # Live Binance prices
//! cargo run --bin hopper
//!
//! # Offline, synthetic prices
//! cargo run --bin hopper -- --synthetic
//!
//! # Custom symbols and leverage
//! cargo run --bin hopper -- --symbols BTC,ETH --leverage 100
//! ```
//!
//! # Commands
//!
//! - `buy <SYMBOL>`: jump onto an asset column
//! - `sell`: jump back to cash
//! - `lev`: cycle leverage; `lev <n>` selects a step
//! - `status`: print the column board
//! - `quit`: settle up and print the session report

use std::time::Duration;

use chrono::Local;
use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use column_hopper::{
    BinanceFeed, BinanceFeedConfig, FeedEvent, GameConfig, JumpCoordinator, JumpTarget,
    LandOutcome, PriceSnapshot, PriceTable, SyntheticFeed, SyntheticFeedConfig,
};

#[derive(Parser)]
#[command(name = "hopper")]
#[command(version, about = "Column-jumping leveraged trading game", long_about = None)]
struct Args {
    /// Comma-separated symbols to track.
    #[arg(long, default_value = "BTC,ETH,ADA,DOT")]
    symbols: String,

    /// Leverage step in effect at startup.
    #[arg(long, default_value_t = 1000)]
    leverage: u32,

    /// Use the synthetic offline feed instead of Binance.
    #[arg(long)]
    synthetic: bool,

    /// Tick interval in milliseconds.
    #[arg(long, default_value_t = 250)]
    tick_ms: u64,
}

/// Session statistics, printed at exit.
struct SessionStats {
    started_at: chrono::DateTime<Local>,
    total_jumps: u32,
    liquidations: u32,
    peak_wallet: f64,
}

impl SessionStats {
    fn new(starting_wallet: f64) -> Self {
        Self {
            started_at: Local::now(),
            total_jumps: 0,
            liquidations: 0,
            peak_wallet: starting_wallet,
        }
    }

    fn observe_wallet(&mut self, wallet: f64) {
        if wallet > self.peak_wallet {
            self.peak_wallet = wallet;
        }
    }

    fn report(&self, final_wallet: f64) {
        let elapsed = Local::now().signed_duration_since(self.started_at);
        println!("--- session report ---");
        println!("started   {}", self.started_at.format("%Y-%m-%d %H:%M:%S"));
        println!("duration  {}s", elapsed.num_seconds());
        println!("jumps     {}", self.total_jumps);
        println!("margin calls {}", self.liquidations);
        println!("peak wallet  {:.2} USDT", self.peak_wallet);
        println!("final wallet {:.2} USDT", final_wallet);
    }
}

fn print_board(coordinator: &JumpCoordinator, snapshot: &PriceSnapshot, fresh: bool) {
    let feed_state = match (snapshot.is_connected(), fresh) {
        (false, _) => "disconnected",
        (true, false) => "stale",
        (true, true) => "live",
    };
    println!(
        "wallet {:.2} USDT | leverage x{} | {}",
        coordinator.wallet_display(snapshot),
        coordinator.leverage(),
        feed_state
    );
    for (index, symbol) in coordinator.symbols().iter().enumerate() {
        let price = snapshot
            .price_of(symbol)
            .map(|p| format!("{p:.4}"))
            .unwrap_or_else(|| "-".to_string());
        match coordinator.asset_display(index, snapshot) {
            Ok(display) => println!(
                "  {symbol:<5} {price:>14}  [{}] {}",
                display.action, display.secondary
            ),
            Err(e) => warn!(error = %e, "display failed"),
        }
    }
}

fn parse_target(coordinator: &JumpCoordinator, symbol: &str) -> Option<JumpTarget> {
    let wanted = symbol.to_uppercase();
    coordinator
        .symbols()
        .iter()
        .position(|s| *s == wanted)
        .map(JumpTarget::Asset)
}

fn handle_command(
    line: &str,
    coordinator: &mut JumpCoordinator,
    snapshot: &PriceSnapshot,
    fresh: bool,
    stats: &mut SessionStats,
) -> bool {
    let mut parts = line.split_whitespace();
    match parts.next() {
        Some("buy") | Some("jump") => {
            let Some(target) = parts.next().and_then(|s| parse_target(coordinator, s)) else {
                println!("unknown symbol (tracked: {})", coordinator.symbols().join(", "));
                return true;
            };
            match coordinator.land(target, snapshot) {
                Ok(LandOutcome::Ignored) => println!("already there"),
                Ok(outcome) => {
                    stats.total_jumps += 1;
                    if let Some(result) = outcome.jump_result() {
                        println!(
                            "settled {:.2} -> {:.2} USDT ({:+.2}%)",
                            result.old_value, result.new_value, result.percent_change
                        );
                    }
                    print_board(coordinator, snapshot, fresh);
                }
                Err(e) => warn!(error = %e, "jump rejected"),
            }
        }
        Some("sell") | Some("cash") => match coordinator.land(JumpTarget::Cash, snapshot) {
            Ok(LandOutcome::Ignored) => println!("already on cash"),
            Ok(outcome) => {
                stats.total_jumps += 1;
                if let Some(result) = outcome.jump_result() {
                    println!(
                        "settled {:.2} -> {:.2} USDT ({:+.2}%)",
                        result.old_value, result.new_value, result.percent_change
                    );
                }
            }
            Err(e) => warn!(error = %e, "jump rejected"),
        },
        Some("lev") => match parts.next() {
            Some(raw) => match raw.parse::<u32>() {
                Ok(step) => match coordinator.set_leverage(step) {
                    Ok(current) => println!("leverage x{current}"),
                    Err(e) => println!("{e}"),
                },
                Err(_) => println!("usage: lev [1|10|100|500|1000]"),
            },
            None => println!("leverage x{}", coordinator.cycle_leverage()),
        },
        Some("status") => print_board(coordinator, snapshot, fresh),
        Some("quit") | Some("exit") => return false,
        Some(other) => println!("unknown command: {other}"),
        None => {}
    }
    true
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let args = Args::parse();
    let symbols: Vec<String> = args
        .symbols
        .split(',')
        .map(|s| s.trim().to_uppercase())
        .filter(|s| !s.is_empty())
        .collect();

    let config = GameConfig {
        symbols: symbols.clone(),
        default_leverage: args.leverage,
        ..Default::default()
    };
    config.validate()?;

    let mut coordinator = JumpCoordinator::new(config)?;
    let stale_threshold = coordinator.config().stale_threshold();
    let mut table = PriceTable::new();
    let mut stats = SessionStats::new(coordinator.engine().wallet());

    let (tx, mut rx) = mpsc::channel::<FeedEvent>(1024);
    if args.synthetic {
        let defaults = SyntheticFeedConfig::default();
        let base_prices = symbols
            .iter()
            .map(|s| {
                let base = defaults
                    .base_prices
                    .iter()
                    .find(|(sym, _)| sym == s)
                    .map(|(_, p)| *p)
                    .unwrap_or(100.0);
                (s.clone(), base)
            })
            .collect();
        let feed_config = SyntheticFeedConfig {
            base_prices,
            ..defaults
        };
        tokio::spawn(SyntheticFeed::new(feed_config, tx).run());
    } else {
        let pairs: Vec<&str> = symbols.iter().map(|s| s.as_str()).collect();
        tokio::spawn(BinanceFeed::new(BinanceFeedConfig::for_symbols(&pairs), tx).run());
    }

    info!(symbols = %symbols.join(","), synthetic = args.synthetic, "game started");
    println!("commands: buy <SYMBOL> | sell | lev [n] | status | quit");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut ticker = tokio::time::interval(Duration::from_millis(args.tick_ms));
    let mut last_snapshot = table.snapshot();

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                // Drain the feed, then run one tick against one snapshot.
                while let Ok(event) = rx.try_recv() {
                    match event {
                        FeedEvent::Price(update) => { table.apply(update); }
                        FeedEvent::Connected(connected) => table.set_connected(connected),
                    }
                }
                last_snapshot = table.snapshot();
                let report = coordinator.tick(&last_snapshot);
                stats.observe_wallet(report.wallet_display);
                if let Some(event) = report.liquidation {
                    stats.liquidations += 1;
                    println!("!!! {event}");
                    print_board(&coordinator, &last_snapshot, table.is_fresh(stale_threshold));
                }
            }
            line = lines.next_line() => {
                match line? {
                    Some(line) => {
                        if !handle_command(
                            line.trim(),
                            &mut coordinator,
                            &last_snapshot,
                            table.is_fresh(stale_threshold),
                            &mut stats,
                        ) {
                            break;
                        }
                    }
                    None => break,
                }
            }
        }
    }

    // Settle any open position before reporting.
    if coordinator.placement().is_on_asset() {
        if let Ok(outcome) = coordinator.land(JumpTarget::Cash, &last_snapshot) {
            if let Some(result) = outcome.jump_result() {
                println!(
                    "closing position: {:.2} -> {:.2} USDT",
                    result.old_value, result.new_value
                );
            }
        }
    }
    stats.report(coordinator.engine().wallet());
    Ok(())
}
