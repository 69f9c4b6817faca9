//! Game configuration.
//!
//! All tunables of the position engine live here: the tradable symbol set,
//! fees, the liquidation rule, and the price-feed fallbacks. Values default
//! to the game's balance constants; hosts may deserialize a config file or
//! build one programmatically.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::errors::EngineError;

/// Configuration for the game engine.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GameConfig {
    /// Tradable asset symbols, in column order.
    #[serde(default = "default_symbols")]
    pub symbols: Vec<String>,

    /// Starting wallet balance in quote currency (USDT).
    #[serde(default = "default_starting_wallet")]
    pub starting_wallet: f64,

    /// Fee rate per leg (0.002 = 0.2%). Charged once inside position sizing
    /// at entry and once on the settled balance at exit.
    #[serde(default = "default_fee_rate")]
    pub fee_rate: f64,

    /// Liquidation threshold as a fraction of the player's own capital at
    /// entry. The position is force-closed when the would-be settled balance
    /// drops to or below `initial_wallet * liquidation_buffer`. This is a
    /// game-balance rule proportional to the player's stake, not a
    /// maintenance-margin formula on notional.
    #[serde(default = "default_liquidation_buffer")]
    pub liquidation_buffer: f64,

    /// Minimum wallet left after a forced liquidation, so the next position
    /// can still be sized.
    #[serde(default = "default_liquidation_floor")]
    pub liquidation_floor: f64,

    /// Entry price used when the feed has never delivered a price for a
    /// symbol, keeping the game playable offline.
    #[serde(default = "default_fallback_price")]
    pub fallback_price: f64,

    /// Feed staleness threshold in milliseconds. Exposed to hosts via
    /// freshness queries; the engine itself never refuses to trade on stale
    /// data.
    #[serde(default = "default_stale_threshold_ms")]
    pub stale_threshold_ms: u64,

    /// Leverage in effect at startup. Must be one of the enumerated steps.
    #[serde(default = "default_leverage")]
    pub default_leverage: u32,
}

fn default_symbols() -> Vec<String> {
    ["BTC", "ETH", "ADA", "DOT"].iter().map(|s| s.to_string()).collect()
}

fn default_starting_wallet() -> f64 {
    100.0
}

fn default_fee_rate() -> f64 {
    0.002
}

fn default_liquidation_buffer() -> f64 {
    0.05
}

fn default_liquidation_floor() -> f64 {
    0.01
}

fn default_fallback_price() -> f64 {
    50_000.0
}

fn default_stale_threshold_ms() -> u64 {
    10_000
}

fn default_leverage() -> u32 {
    1000
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            symbols: default_symbols(),
            starting_wallet: default_starting_wallet(),
            fee_rate: default_fee_rate(),
            liquidation_buffer: default_liquidation_buffer(),
            liquidation_floor: default_liquidation_floor(),
            fallback_price: default_fallback_price(),
            stale_threshold_ms: default_stale_threshold_ms(),
            default_leverage: default_leverage(),
        }
    }
}

impl GameConfig {
    /// Staleness threshold as a `Duration`.
    pub fn stale_threshold(&self) -> Duration {
        Duration::from_millis(self.stale_threshold_ms)
    }

    /// Validate the configuration at startup.
    pub fn validate(&self) -> Result<(), EngineError> {
        if self.symbols.is_empty() {
            return Err(EngineError::InvalidConfig("symbol list is empty".into()));
        }
        if self.starting_wallet <= 0.0 || !self.starting_wallet.is_finite() {
            return Err(EngineError::InvalidConfig(format!(
                "starting wallet must be positive, got {}",
                self.starting_wallet
            )));
        }
        if !(0.0..1.0).contains(&self.fee_rate) {
            return Err(EngineError::InvalidConfig(format!(
                "fee rate must be in [0, 1), got {}",
                self.fee_rate
            )));
        }
        if !(0.0..1.0).contains(&self.liquidation_buffer) {
            return Err(EngineError::InvalidConfig(format!(
                "liquidation buffer must be in [0, 1), got {}",
                self.liquidation_buffer
            )));
        }
        if self.fallback_price <= 0.0 || !self.fallback_price.is_finite() {
            return Err(EngineError::InvalidConfig(format!(
                "fallback price must be positive, got {}",
                self.fallback_price
            )));
        }
        if !crate::engine::LEVERAGE_STEPS.contains(&self.default_leverage) {
            return Err(EngineError::InvalidConfig(format!(
                "default leverage x{} is not an allowed step",
                self.default_leverage
            )));
        }
        Ok(())
    }
}
