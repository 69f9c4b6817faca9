//! Virtual "what-if" positions for the comparison display.
//!
//! Whenever a real position opens, one virtual position is synthesized for
//! every other tradable asset, entered at that asset's price at the same
//! instant with the same wallet, leverage, and fee. They are valued through
//! the same [`valuate`] implementation as the real position and never touch
//! the wallet. The whole set is anchored to the real entry: it is rebuilt
//! from scratch on a new position and discarded when the anchor closes,
//! never incrementally updated.

use std::collections::HashMap;

use crate::engine::margin::{safe_percent, valuate, MarginPosition};
use crate::prices::PriceSnapshot;

/// Tracks virtual positions for every non-active tradable asset.
#[derive(Debug, Default)]
pub struct ComparisonTracker {
    virtuals: HashMap<String, MarginPosition>,
    /// Notional size of the anchoring real position.
    total_budget: f64,
}

impl ComparisonTracker {
    /// Create an empty tracker.
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild the virtual set around a freshly opened real position.
    ///
    /// Every symbol except the active one gets a virtual position at its
    /// current snapshot price, sized from the same wallet, leverage, and fee
    /// the real entry used. Symbols without a valid price are skipped; they
    /// simply have no comparison until the next rebuild.
    pub fn rebuild(
        &mut self,
        active: &MarginPosition,
        symbols: &[String],
        snapshot: &PriceSnapshot,
        fee_rate: f64,
    ) {
        self.virtuals.clear();
        self.total_budget = active.position_size;

        for symbol in symbols {
            if *symbol == active.symbol {
                continue;
            }
            let Some(price) = snapshot.price_of(symbol) else {
                continue;
            };
            // Same terms as the real entry, entered at this symbol's price.
            if let Ok(position) = MarginPosition::open(
                symbol,
                price,
                active.initial_wallet,
                active.leverage,
                fee_rate,
            ) {
                self.virtuals.insert(symbol.clone(), position);
            }
        }
    }

    /// Discard all virtual positions (the anchor position closed).
    pub fn clear(&mut self) {
        self.virtuals.clear();
        self.total_budget = 0.0;
    }

    /// The virtual position for a symbol, if one exists.
    pub fn get(&self, symbol: &str) -> Option<&MarginPosition> {
        self.virtuals.get(symbol)
    }

    /// Number of virtual positions.
    pub fn len(&self) -> usize {
        self.virtuals.len()
    }

    /// Whether the set is empty.
    pub fn is_empty(&self) -> bool {
        self.virtuals.is_empty()
    }

    /// Notional size of the anchoring real position.
    pub fn total_budget(&self) -> f64 {
        self.total_budget
    }

    /// What the wallet would be had the player bought `symbol` instead.
    /// Identical valuation to the real position; `None` when there is no
    /// virtual position or no current price.
    pub fn virtual_balance(
        &self,
        symbol: &str,
        snapshot: &PriceSnapshot,
        fee_rate: f64,
    ) -> Option<f64> {
        let position = self.virtuals.get(symbol)?;
        let price = snapshot.price_of(symbol)?;
        Some(valuate(position, price, fee_rate).final_balance)
    }

    /// Virtual P&L for `symbol` as a percentage of the capital at entry.
    pub fn virtual_percent(
        &self,
        symbol: &str,
        snapshot: &PriceSnapshot,
        fee_rate: f64,
    ) -> Option<f64> {
        let position = self.virtuals.get(symbol)?;
        let balance = self.virtual_balance(symbol, snapshot, fee_rate)?;
        Some(safe_percent(
            balance - position.initial_wallet,
            position.initial_wallet,
        ))
    }
}

// ============================================================================
// Tests
// ============================================================================
