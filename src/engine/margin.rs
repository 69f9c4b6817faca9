//! Margin position bookkeeping and valuation.
//!
//! Key pieces:
//! - **MarginPosition**: fixed entry terms (amount, price, own capital, leverage)
//! - **valuate**: the one mark-to-market implementation shared by real and
//!   virtual positions
//! - **MarginEngine**: wallet ownership, position lifecycle, liquidation rule
//!
//! Money flow convention: the entry fee is charged inside position sizing
//! (`position_size = wallet * leverage * (1 - fee)`), the exit fee on the
//! settled balance, so a round trip pays the fee twice. The wallet itself is
//! only written on settlement or liquidation, never while a position is open.

use std::time::Instant;

use tracing::warn;

use crate::config::GameConfig;
use crate::engine::leverage::LeverageSelector;
use crate::errors::EngineError;
use crate::prices::{is_valid_price, PriceSnapshot};

/// An open leveraged exposure with entry terms fixed for its lifetime.
///
/// The same struct serves as the real position and as the virtual "what-if"
/// positions of the comparison system; only the engine settles a real one
/// against the wallet.
#[derive(Debug, Clone)]
pub struct MarginPosition {
    /// Asset symbol.
    pub symbol: String,
    /// Units of the asset bought, fixed at entry.
    pub crypto_amount: f64,
    /// Price at entry.
    pub entry_price: f64,
    /// Wallet balance at entry (the player's own capital at risk).
    pub initial_wallet: f64,
    /// Notional exposure: `initial_wallet * leverage * (1 - fee)`.
    pub position_size: f64,
    /// Leverage multiplier in effect at entry.
    pub leverage: u32,
    /// When the position was opened.
    pub entry_time: Instant,
}

impl MarginPosition {
    /// Open a position from explicit terms.
    ///
    /// `position_size = wallet * leverage * (1 - fee)` and
    /// `crypto_amount = position_size / price`, so
    /// `position_size == crypto_amount * entry_price` holds by construction.
    pub fn open(
        symbol: &str,
        price: f64,
        wallet: f64,
        leverage: u32,
        fee_rate: f64,
    ) -> Result<Self, EngineError> {
        if !is_valid_price(price) {
            return Err(EngineError::InvalidPrice {
                symbol: symbol.to_string(),
                price,
            });
        }

        let position_size = wallet * leverage as f64 * (1.0 - fee_rate);
        let crypto_amount = position_size / price;

        Ok(Self {
            symbol: symbol.to_string(),
            crypto_amount,
            entry_price: price,
            initial_wallet: wallet,
            position_size,
            leverage,
            entry_time: Instant::now(),
        })
    }
}

/// Result of marking a position to a price.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Valuation {
    /// Current worth of the held units: `crypto_amount * current_price`.
    pub position_value: f64,
    /// P&L against the notional entry size.
    pub profit_loss: f64,
    /// What the wallet would settle to right now:
    /// `max(0, (initial_wallet + profit_loss) * (1 - fee))`.
    pub final_balance: f64,
}

/// Mark a position to `current_price`.
///
/// This is the single valuation implementation; real settlement, liquidation
/// checks, and every virtual comparison all go through it.
pub fn valuate(position: &MarginPosition, current_price: f64, fee_rate: f64) -> Valuation {
    let position_value = position.crypto_amount * current_price;
    let profit_loss = position_value - position.position_size;
    let final_balance = ((position.initial_wallet + profit_loss) * (1.0 - fee_rate)).max(0.0);
    Valuation {
        position_value,
        profit_loss,
        final_balance,
    }
}

/// Percentage of `numerator` over `denominator`, 0 when the denominator is
/// zero or near-zero. Keeps NaN/Infinity out of displayed state.
pub(crate) fn safe_percent(numerator: f64, denominator: f64) -> f64 {
    if denominator.abs() < 1e-9 {
        0.0
    } else {
        numerator / denominator * 100.0
    }
}

/// Wallet, position lifecycle, and the liquidation rule.
#[derive(Debug)]
pub struct MarginEngine {
    wallet: f64,
    fee_rate: f64,
    liquidation_buffer: f64,
    liquidation_floor: f64,
    leverage: LeverageSelector,
    position: Option<MarginPosition>,
    /// Last valid mark seen for the open position; valuation falls back to
    /// it when the snapshot has no usable price.
    last_mark: Option<f64>,
}

impl MarginEngine {
    /// Create an engine from the game configuration.
    pub fn new(config: &GameConfig) -> Result<Self, EngineError> {
        config.validate()?;
        Ok(Self {
            wallet: config.starting_wallet,
            fee_rate: config.fee_rate,
            liquidation_buffer: config.liquidation_buffer,
            liquidation_floor: config.liquidation_floor,
            leverage: LeverageSelector::new(config.default_leverage)?,
            position: None,
            last_mark: None,
        })
    }

    /// Current wallet balance. While a position is open this is still the
    /// pre-entry balance; use valuation for the live figure.
    pub fn wallet(&self) -> f64 {
        self.wallet
    }

    /// Fee rate per leg.
    pub fn fee_rate(&self) -> f64 {
        self.fee_rate
    }

    /// The open position, if any.
    pub fn position(&self) -> Option<&MarginPosition> {
        self.position.as_ref()
    }

    /// Whether a position is open.
    pub fn has_position(&self) -> bool {
        self.position.is_some()
    }

    /// Leverage selector (read).
    pub fn leverage(&self) -> &LeverageSelector {
        &self.leverage
    }

    /// Leverage selector (write, for set/cycle between positions).
    pub fn leverage_mut(&mut self) -> &mut LeverageSelector {
        &mut self.leverage
    }

    /// Open a position on `symbol` at `price` with the currently selected
    /// leverage. The wallet is not touched. The caller ensures any prior
    /// position was settled first.
    pub fn open_position(
        &mut self,
        symbol: &str,
        price: f64,
    ) -> Result<&MarginPosition, EngineError> {
        let position =
            MarginPosition::open(symbol, price, self.wallet, self.leverage.get(), self.fee_rate)?;
        self.last_mark = Some(price);
        Ok(self.position.insert(position))
    }

    /// Mark the open position to an explicit price.
    pub fn mark_to_market(&self, current_price: f64) -> Result<Valuation, EngineError> {
        let position = self.position.as_ref().ok_or(EngineError::NoOpenPosition)?;
        if !is_valid_price(current_price) {
            return Err(EngineError::InvalidPrice {
                symbol: position.symbol.clone(),
                price: current_price,
            });
        }
        Ok(valuate(position, current_price, self.fee_rate))
    }

    /// Refresh the cached mark from a snapshot. Call once per tick before
    /// reading valuations so later fallbacks within the tick see the same
    /// price.
    pub fn refresh_mark(&mut self, snapshot: &PriceSnapshot) {
        if let Some(position) = &self.position {
            if let Some(price) = snapshot.price_of(&position.symbol) {
                self.last_mark = Some(price);
            }
        }
    }

    /// Resolve the mark for the open position from a snapshot, falling back
    /// to the last good mark, then to the entry price. `None` without a
    /// position.
    pub fn resolved_mark(&self, snapshot: &PriceSnapshot) -> Option<f64> {
        let position = self.position.as_ref()?;
        if let Some(price) = snapshot.price_of(&position.symbol) {
            return Some(price);
        }
        if let Some(price) = self.last_mark {
            return Some(price);
        }
        warn!(symbol = %position.symbol, "no mark ever observed, valuing at entry price");
        Some(position.entry_price)
    }

    /// Snapshot-driven valuation of the open position. Never fails: a
    /// missing or invalid snapshot price freezes the valuation at the last
    /// good mark. `None` without a position.
    pub fn valuation(&self, snapshot: &PriceSnapshot) -> Option<Valuation> {
        let mark = self.resolved_mark(snapshot)?;
        let position = self.position.as_ref()?;
        Some(valuate(position, mark, self.fee_rate))
    }

    /// Whether the position would be margin-called at an explicit price.
    ///
    /// Fires when the settled balance drops to `initial_wallet *
    /// liquidation_buffer` or below: a threshold on the player's own capital,
    /// by game design, not a maintenance-margin formula on notional.
    pub fn should_liquidate_at(&self, current_price: f64) -> bool {
        let Some(position) = self.position.as_ref() else {
            return false;
        };
        if !is_valid_price(current_price) {
            return false;
        }
        let valuation = valuate(position, current_price, self.fee_rate);
        valuation.final_balance <= position.initial_wallet * self.liquidation_buffer
    }

    /// Snapshot-driven liquidation check, using the same mark resolution as
    /// valuation so one tick never mixes prices. Stale data alone never
    /// liquidates: a frozen mark yields a frozen balance.
    pub fn should_liquidate(&self, snapshot: &PriceSnapshot) -> bool {
        match self.resolved_mark(snapshot) {
            Some(mark) => self.should_liquidate_at(mark),
            None => false,
        }
    }

    /// Close the open position at `price`, settle the wallet to the final
    /// balance, and discard the position. Returns the settled wallet.
    pub fn close_position(&mut self, price: f64) -> Result<f64, EngineError> {
        let valuation = self.mark_to_market(price)?;
        self.wallet = valuation.final_balance;
        self.position = None;
        self.last_mark = None;
        Ok(self.wallet)
    }

    /// Force-close at `price` on a margin call. Same math as a close, with a
    /// floor on the settled wallet so the next position can still be sized.
    pub fn force_liquidate(&mut self, price: f64) -> Result<f64, EngineError> {
        let valuation = self.mark_to_market(price)?;
        let settled = valuation.final_balance.max(self.liquidation_floor);
        warn!(
            symbol = %self.position.as_ref().map(|p| p.symbol.as_str()).unwrap_or("?"),
            price,
            settled,
            "margin call: position force-closed"
        );
        self.wallet = settled;
        self.position = None;
        self.last_mark = None;
        Ok(self.wallet)
    }

    /// P&L of the open position against the player's own capital, in
    /// percent. 0 when flat or when the initial wallet was zero.
    pub fn profit_loss_percent(&self, snapshot: &PriceSnapshot) -> f64 {
        match (self.valuation(snapshot), self.position.as_ref()) {
            (Some(valuation), Some(position)) => safe_percent(
                valuation.final_balance - position.initial_wallet,
                position.initial_wallet,
            ),
            _ => 0.0,
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn engine() -> MarginEngine {
        MarginEngine::new(&GameConfig::default()).unwrap()
    }

    fn assert_close(actual: f64, expected: f64, tolerance: f64) {
        assert!(
            (actual - expected).abs() < tolerance,
            "expected {expected}, got {actual}"
        );
    }

    #[test]
    fn test_position_sizing_invariant() {
        for &leverage in &[1u32, 10, 100, 500, 1000] {
            for &fee in &[0.0, 0.002, 0.01, 0.25] {
                for &price in &[0.01, 1.0, 50_000.0, 2.5e6] {
                    let wallet = 137.5;
                    let position =
                        MarginPosition::open("BTC", price, wallet, leverage, fee).unwrap();

                    let expected_size = wallet * leverage as f64 * (1.0 - fee);
                    assert_close(
                        position.position_size,
                        expected_size,
                        expected_size.abs() * 1e-9,
                    );
                    // position_size == crypto_amount * entry_price by construction
                    assert_close(
                        position.crypto_amount * position.entry_price,
                        position.position_size,
                        position.position_size.abs() * 1e-9,
                    );
                }
            }
        }
    }

    #[test]
    fn test_open_rejects_invalid_price() {
        let mut engine = engine();
        for bad in [0.0, -5.0, f64::NAN, f64::INFINITY] {
            assert!(matches!(
                engine.open_position("BTC", bad),
                Err(EngineError::InvalidPrice { .. })
            ));
        }
        assert!(!engine.has_position());
    }

    #[test]
    fn test_open_does_not_touch_wallet() {
        let mut engine = engine();
        engine.open_position("BTC", 50_000.0).unwrap();
        assert_eq!(engine.wallet(), 100.0);
    }

    #[test]
    fn test_entry_sizing_concrete() {
        // wallet 100, leverage 1000, fee 0.002, entry at 50000
        let mut engine = engine();
        let position = engine.open_position("BTC", 50_000.0).unwrap();
        assert_close(position.position_size, 99_800.0, 1e-9);
        assert_close(position.crypto_amount, 1.996, 1e-12);
        assert_eq!(position.leverage, 1000);
        assert_eq!(position.initial_wallet, 100.0);
    }

    #[test]
    fn test_mark_to_market_gain() {
        let mut engine = engine();
        engine.open_position("BTC", 50_000.0).unwrap();

        // +0.1% on price = +50 per unit price move, 1.996 units held
        let valuation = engine.mark_to_market(50_050.0).unwrap();
        assert_close(valuation.position_value, 99_899.8, 1e-6);
        assert_close(valuation.profit_loss, 99.8, 1e-6);
        assert_close(valuation.final_balance, (100.0 + 99.8) * 0.998, 1e-6); // 199.4004
    }

    #[test]
    fn test_mark_to_market_loss_above_threshold() {
        let mut engine = engine();
        engine.open_position("BTC", 50_000.0).unwrap();

        let valuation = engine.mark_to_market(49_955.0).unwrap();
        assert_close(valuation.profit_loss, -89.82, 1e-6);
        assert_close(valuation.final_balance, (100.0 - 89.82) * 0.998, 1e-6); // ~10.16
        // Above the 5.0 threshold: no margin call yet.
        assert!(!engine.should_liquidate_at(49_955.0));
    }

    #[test]
    fn test_liquidation_fires_below_threshold() {
        let mut engine = engine();
        engine.open_position("BTC", 50_000.0).unwrap();

        let valuation = engine.mark_to_market(49_950.1).unwrap();
        assert!(valuation.final_balance <= 100.0 * 0.05);
        assert!(engine.should_liquidate_at(49_950.1));
    }

    #[test]
    fn test_liquidation_monotone_in_loss_direction() {
        let mut engine = engine();
        engine.open_position("BTC", 50_000.0).unwrap();

        // Find the first liquidating price on the way down, then every price
        // further from entry must also liquidate.
        assert!(engine.should_liquidate_at(49_950.0));
        for price in [49_949.0, 49_900.0, 49_000.0, 25_000.0, 1.0] {
            assert!(
                engine.should_liquidate_at(price),
                "price {price} should still liquidate"
            );
        }
        // And prices back toward entry above the trigger must not.
        for price in [49_960.0, 49_990.0, 50_000.0, 51_000.0] {
            assert!(!engine.should_liquidate_at(price));
        }
    }

    #[test]
    fn test_close_settles_wallet() {
        let mut engine = engine();
        engine.open_position("BTC", 50_000.0).unwrap();

        let settled = engine.close_position(50_050.0).unwrap();
        assert_close(settled, 199.4004, 1e-6);
        assert_eq!(engine.wallet(), settled);
        assert!(!engine.has_position());
    }

    #[test]
    fn test_close_clamps_at_zero_not_floor() {
        let mut engine = engine();
        engine.open_position("BTC", 50_000.0).unwrap();

        // Catastrophic move: settled balance clamps at 0 on a player close.
        let settled = engine.close_position(25_000.0).unwrap();
        assert_eq!(settled, 0.0);
    }

    #[test]
    fn test_force_liquidate_applies_floor() {
        let mut engine = engine();
        engine.open_position("BTC", 50_000.0).unwrap();

        let settled = engine.force_liquidate(25_000.0).unwrap();
        assert_eq!(settled, 0.01);
        assert_eq!(engine.wallet(), 0.01);
        assert!(!engine.has_position());
    }

    #[test]
    fn test_valuation_symmetry_with_free_function() {
        // The engine's mark-to-market and the shared valuate() must agree on
        // identical inputs (they are the same implementation).
        let mut engine = engine();
        engine.open_position("BTC", 50_000.0).unwrap();
        let position = engine.position().unwrap().clone();

        for price in [49_000.0, 50_000.0, 50_500.0, 62_000.0] {
            let from_engine = engine.mark_to_market(price).unwrap();
            let direct = valuate(&position, price, engine.fee_rate());
            assert_eq!(from_engine, direct);
        }
    }

    #[test]
    fn test_snapshot_valuation_falls_back_to_last_mark() {
        let mut engine = engine();
        engine.open_position("BTC", 50_000.0).unwrap();

        let live = PriceSnapshot::from_prices([("BTC", 50_050.0)]);
        engine.refresh_mark(&live);
        let at_live = engine.valuation(&live).unwrap();

        // Feed drops: snapshot no longer carries BTC. Valuation freezes at
        // the last good mark instead of failing or moving.
        let stale = PriceSnapshot::from_prices::<_, String>([]);
        let frozen = engine.valuation(&stale).unwrap();
        assert_eq!(at_live, frozen);
        assert!(!engine.should_liquidate(&stale));
    }

    #[test]
    fn test_valuation_with_no_mark_uses_entry_price() {
        let mut engine = engine();
        engine.open_position("BTC", 50_000.0).unwrap();
        // Wipe the entry mark to simulate a feed that never delivered.
        engine.last_mark = None;

        let empty = PriceSnapshot::from_prices::<_, String>([]);
        let valuation = engine.valuation(&empty).unwrap();
        // Flat at entry: P&L 0, balance = initial minus the exit fee.
        assert_close(valuation.profit_loss, 0.0, 1e-9);
        assert_close(valuation.final_balance, 100.0 * 0.998, 1e-9);
    }

    #[test]
    fn test_safe_percent_guards_zero_denominator() {
        assert_eq!(safe_percent(50.0, 0.0), 0.0);
        assert_eq!(safe_percent(50.0, 1e-12), 0.0);
        assert_close(safe_percent(50.0, 200.0), 25.0, 1e-12);
    }

    #[test]
    fn test_no_position_paths() {
        let engine = engine();
        let snapshot = PriceSnapshot::from_prices([("BTC", 50_000.0)]);
        assert!(engine.valuation(&snapshot).is_none());
        assert!(!engine.should_liquidate(&snapshot));
        assert!(matches!(
            engine.mark_to_market(50_000.0),
            Err(EngineError::NoOpenPosition)
        ));
    }
}
