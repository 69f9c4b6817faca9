//! Read models for the presentation layer.
//!
//! Everything here is a pure read of the coordinator plus one immutable
//! price snapshot: the live wallet figure, the per-column label/secondary
//! text, and the comparison summary. Rendering (canvas, DOM, colors) happens
//! entirely outside the engine.

use crate::engine::coordinator::JumpCoordinator;
use crate::errors::EngineError;
use crate::prices::PriceSnapshot;

/// Action label shown on a volatile column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnAction {
    /// Landing here would open a position.
    Buy,
    /// Landing here (or on cash) would settle the active position.
    Sell,
}

impl std::fmt::Display for ColumnAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ColumnAction::Buy => write!(f, "buy"),
            ColumnAction::Sell => write!(f, "sell"),
        }
    }
}

/// Secondary line under the action label.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SecondaryInfo {
    /// A quote-currency amount.
    Money(f64),
    /// A signed percentage.
    Percent(f64),
}

impl std::fmt::Display for SecondaryInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SecondaryInfo::Money(value) => write!(f, "{value:.2} USDT"),
            SecondaryInfo::Percent(percent) => write!(f, "{percent:+.2}%"),
        }
    }
}

/// Display tuple for one volatile column.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AssetDisplay {
    pub action: ColumnAction,
    pub secondary: SecondaryInfo,
}

/// Summary of the active position against its what-if alternatives.
#[derive(Debug, Clone, PartialEq)]
pub struct ComparisonSnapshot {
    /// Symbol of the active position.
    pub active_symbol: String,
    /// Units held.
    pub active_amount: f64,
    /// Entry price.
    pub entry_price: f64,
    /// Live settled-balance value of the position.
    pub current_value: f64,
    /// P&L against the player's own capital at entry.
    pub profit_loss: f64,
    /// P&L as a percentage of that capital.
    pub percent_change: f64,
    /// Leverage frozen at entry.
    pub leverage: u32,
    /// Notional size of the position.
    pub total_budget: f64,
}

impl JumpCoordinator {
    /// Live wallet figure: the wallet itself on cash, the open position's
    /// mark-to-market settled balance otherwise.
    pub fn wallet_display(&self, snapshot: &PriceSnapshot) -> f64 {
        match self.engine().valuation(snapshot) {
            Some(valuation) => valuation.final_balance,
            None => self.engine().wallet(),
        }
    }

    /// Label and secondary text for the volatile column at `index`.
    ///
    /// On cash every column invites a buy and shows the wallet; the active
    /// column shows sell plus the live balance; the remaining columns show
    /// their what-if P&L in percent.
    pub fn asset_display(
        &self,
        index: usize,
        snapshot: &PriceSnapshot,
    ) -> Result<AssetDisplay, EngineError> {
        let symbols = self.symbols();
        if index >= symbols.len() {
            return Err(EngineError::UnknownAsset {
                index,
                count: symbols.len(),
            });
        }

        let display = match self.placement().asset_index() {
            None => AssetDisplay {
                action: ColumnAction::Buy,
                secondary: SecondaryInfo::Money(self.engine().wallet()),
            },
            Some(active) if active == index => AssetDisplay {
                action: ColumnAction::Sell,
                secondary: SecondaryInfo::Money(self.wallet_display(snapshot)),
            },
            Some(_) => {
                let percent = self
                    .comparisons()
                    .virtual_percent(&symbols[index], snapshot, self.engine().fee_rate())
                    .unwrap_or(0.0);
                AssetDisplay {
                    action: ColumnAction::Buy,
                    secondary: SecondaryInfo::Percent(percent),
                }
            }
        };
        Ok(display)
    }

    /// Comparison summary for the active position, `None` on cash.
    pub fn comparison_snapshot(&self, snapshot: &PriceSnapshot) -> Option<ComparisonSnapshot> {
        let position = self.engine().position()?;
        let valuation = self.engine().valuation(snapshot)?;

        Some(ComparisonSnapshot {
            active_symbol: position.symbol.clone(),
            active_amount: position.crypto_amount,
            entry_price: position.entry_price,
            current_value: valuation.final_balance,
            profit_loss: valuation.final_balance - position.initial_wallet,
            percent_change: self.engine().profit_loss_percent(snapshot),
            leverage: position.leverage,
            total_budget: self.comparisons().total_budget(),
        })
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GameConfig;
    use crate::engine::coordinator::JumpTarget;

    fn coordinator() -> JumpCoordinator {
        JumpCoordinator::new(GameConfig::default()).unwrap()
    }

    fn snapshot() -> PriceSnapshot {
        PriceSnapshot::from_prices([
            ("BTC", 50_000.0),
            ("ETH", 3_000.0),
            ("ADA", 0.45),
            ("DOT", 7.2),
        ])
    }

    #[test]
    fn test_on_cash_every_column_invites_buy() {
        let coordinator = coordinator();
        for index in 0..4 {
            let display = coordinator.asset_display(index, &snapshot()).unwrap();
            assert_eq!(display.action, ColumnAction::Buy);
            assert_eq!(display.secondary, SecondaryInfo::Money(100.0));
        }
        assert_eq!(coordinator.wallet_display(&snapshot()), 100.0);
        assert!(coordinator.comparison_snapshot(&snapshot()).is_none());
    }

    #[test]
    fn test_active_column_shows_sell_and_live_balance() {
        let mut coordinator = coordinator();
        coordinator.land(JumpTarget::Asset(0), &snapshot()).unwrap();

        let up = PriceSnapshot::from_prices([("BTC", 50_050.0), ("ETH", 3_000.0)]);
        let display = coordinator.asset_display(0, &up).unwrap();
        assert_eq!(display.action, ColumnAction::Sell);
        match display.secondary {
            SecondaryInfo::Money(value) => assert!((value - 199.4004).abs() < 1e-6),
            other => panic!("expected money, got {other:?}"),
        }
        assert!((coordinator.wallet_display(&up) - 199.4004).abs() < 1e-6);
    }

    #[test]
    fn test_inactive_columns_show_what_if_percent() {
        let mut coordinator = coordinator();
        coordinator.land(JumpTarget::Asset(0), &snapshot()).unwrap();

        // ETH moved +1% since entry.
        let moved = PriceSnapshot::from_prices([("BTC", 50_000.0), ("ETH", 3_030.0)]);
        let display = coordinator.asset_display(1, &moved).unwrap();
        assert_eq!(display.action, ColumnAction::Buy);
        match display.secondary {
            SecondaryInfo::Percent(percent) => assert!((percent - 995.804).abs() < 1e-6),
            other => panic!("expected percent, got {other:?}"),
        }
    }

    #[test]
    fn test_inactive_column_without_virtual_shows_flat() {
        let mut coordinator = coordinator();
        // Entry snapshot missing DOT: no virtual for it.
        let partial = PriceSnapshot::from_prices([("BTC", 50_000.0), ("ETH", 3_000.0)]);
        coordinator.land(JumpTarget::Asset(0), &partial).unwrap();

        let display = coordinator.asset_display(3, &partial).unwrap();
        assert_eq!(display.secondary, SecondaryInfo::Percent(0.0));
    }

    #[test]
    fn test_comparison_snapshot_fields() {
        let mut coordinator = coordinator();
        coordinator.land(JumpTarget::Asset(0), &snapshot()).unwrap();

        let up = PriceSnapshot::from_prices([("BTC", 50_050.0)]);
        let summary = coordinator.comparison_snapshot(&up).unwrap();
        assert_eq!(summary.active_symbol, "BTC");
        assert!((summary.active_amount - 1.996).abs() < 1e-12);
        assert_eq!(summary.entry_price, 50_000.0);
        assert!((summary.current_value - 199.4004).abs() < 1e-6);
        assert!((summary.profit_loss - 99.4004).abs() < 1e-6);
        assert!((summary.percent_change - 99.4004).abs() < 1e-6);
        assert_eq!(summary.leverage, 1000);
        assert!((summary.total_budget - 99_800.0).abs() < 1e-9);
    }

    #[test]
    fn test_display_formats() {
        assert_eq!(ColumnAction::Buy.to_string(), "buy");
        assert_eq!(ColumnAction::Sell.to_string(), "sell");
        assert_eq!(SecondaryInfo::Money(12.5).to_string(), "12.50 USDT");
        assert_eq!(SecondaryInfo::Percent(1.5).to_string(), "+1.50%");
        assert_eq!(SecondaryInfo::Percent(-2.25).to_string(), "-2.25%");
    }

    #[test]
    fn test_asset_display_rejects_unknown_index() {
        let coordinator = coordinator();
        assert!(coordinator.asset_display(7, &snapshot()).is_err());
    }
}
