//! Placement state machine and jump transitions.
//!
//! The player is always in exactly one place: on cash, or on one volatile
//! asset. Jumps between placements are two-phase to model the host's landing
//! animation: [`JumpCoordinator::start_jump`] opens the in-flight window and
//! [`JumpCoordinator::finish_jump`] executes the landing effect. Hosts
//! without an animation use [`JumpCoordinator::land`], which composes both.
//!
//! An asset-to-asset jump is a two-leg transaction: the sell leg settles the
//! wallet (reported to the caller as an intermediate result so presentation
//! can suppress "trade complete" feedback), then the buy leg re-enters on
//! the target from the just-settled wallet at the current leverage.
//!
//! Liquidation is autonomous: every [`JumpCoordinator::tick`] checks the
//! margin-call rule against the tick's snapshot and force-closes first,
//! taking priority over any in-flight jump. A landing that completes after a
//! liquidation is preempted and must not re-open a position.

use tracing::{debug, error, info, warn};

use crate::config::GameConfig;
use crate::engine::comparison::ComparisonTracker;
use crate::engine::margin::{safe_percent, MarginEngine};
use crate::errors::EngineError;
use crate::prices::PriceSnapshot;

/// Where the player currently stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Placement {
    /// On the stable (cash) column.
    OnCash,
    /// On the volatile column at this index.
    OnAsset(usize),
}

impl Placement {
    /// Asset index, if on a volatile column.
    pub fn asset_index(&self) -> Option<usize> {
        match self {
            Placement::OnCash => None,
            Placement::OnAsset(index) => Some(*index),
        }
    }

    /// Whether the player is on a volatile column.
    pub fn is_on_asset(&self) -> bool {
        matches!(self, Placement::OnAsset(_))
    }
}

/// Target of a jump.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JumpTarget {
    /// The stable (cash) column.
    Cash,
    /// The volatile column at this index.
    Asset(usize),
}

/// Settlement record of a landing, for presentation feedback.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct JumpResult {
    /// Wallet value before the settlement.
    pub old_value: f64,
    /// Wallet value after the settlement.
    pub new_value: f64,
    /// Change in percent of the old value (0 when the old value was zero).
    pub percent_change: f64,
    /// True for the sell leg of an asset-to-asset jump; presentation keeps
    /// the wallet display current but suppresses completion feedback.
    pub is_intermediate: bool,
}

/// Outcome of starting a jump.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JumpStart {
    /// The jump is now in flight; call `finish_jump` on landing.
    Started,
    /// Same-column target or a jump already in flight; nothing changed.
    Ignored,
}

/// Outcome of a landing.
#[derive(Debug, Clone, PartialEq)]
pub enum LandOutcome {
    /// No jump in flight, or a same-column landing; nothing changed.
    Ignored,
    /// Entered an asset from cash. No settlement occurred.
    Opened,
    /// Settled to cash.
    Settled(JumpResult),
    /// Asset-to-asset switch; the carried result is the intermediate sell leg.
    Switched(JumpResult),
    /// A liquidation fired while the jump was in flight; the landing had no
    /// effect.
    Preempted,
}

impl LandOutcome {
    /// The settlement record, if this landing settled the wallet.
    pub fn jump_result(&self) -> Option<&JumpResult> {
        match self {
            LandOutcome::Settled(result) | LandOutcome::Switched(result) => Some(result),
            _ => None,
        }
    }
}

/// A margin call that force-closed the player's position.
#[derive(Debug, Clone, PartialEq)]
pub struct LiquidationEvent {
    /// Symbol the position was on.
    pub symbol: String,
    /// Mark price the position settled at.
    pub price: f64,
    /// Wallet after the forced settlement (floored above zero).
    pub settled_wallet: f64,
}

impl std::fmt::Display for LiquidationEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "margin call on {} at {:.4}: wallet settled to {:.2}",
            self.symbol, self.price, self.settled_wallet
        )
    }
}

/// Result of one engine tick.
#[derive(Debug, Clone, PartialEq)]
pub struct TickReport {
    /// Live wallet figure for display: the wallet on cash, the open
    /// position's mark-to-market otherwise.
    pub wallet_display: f64,
    /// Set when this tick's margin-call check force-closed the position.
    pub liquidation: Option<LiquidationEvent>,
}

/// Owns the placement state machine plus the margin engine and comparison
/// tracker it drives.
#[derive(Debug)]
pub struct JumpCoordinator {
    config: GameConfig,
    engine: MarginEngine,
    comparisons: ComparisonTracker,
    placement: Placement,
    in_flight: Option<JumpTarget>,
    /// Set when a liquidation fires while a jump is in flight; the landing
    /// must then complete without effect.
    preempted: bool,
}

impl JumpCoordinator {
    /// Create a coordinator with the player on cash.
    pub fn new(config: GameConfig) -> Result<Self, EngineError> {
        let engine = MarginEngine::new(&config)?;
        Ok(Self {
            config,
            engine,
            comparisons: ComparisonTracker::new(),
            placement: Placement::OnCash,
            in_flight: None,
            preempted: false,
        })
    }

    /// Current placement.
    pub fn placement(&self) -> Placement {
        self.placement
    }

    /// The margin engine (read).
    pub fn engine(&self) -> &MarginEngine {
        &self.engine
    }

    /// The comparison tracker (read).
    pub fn comparisons(&self) -> &ComparisonTracker {
        &self.comparisons
    }

    /// Configured tradable symbols, in column order.
    pub fn symbols(&self) -> &[String] {
        &self.config.symbols
    }

    /// Game configuration.
    pub fn config(&self) -> &GameConfig {
        &self.config
    }

    /// Whether a jump is currently in flight.
    pub fn is_jump_in_flight(&self) -> bool {
        self.in_flight.is_some()
    }

    // --- leverage surface -------------------------------------------------

    /// Currently selected leverage.
    pub fn leverage(&self) -> u32 {
        self.engine.leverage().get()
    }

    /// Select a leverage step; off-step values are rejected and the current
    /// selection stands. Open positions keep the leverage frozen at entry.
    pub fn set_leverage(&mut self, leverage: u32) -> Result<u32, EngineError> {
        self.engine.leverage_mut().set(leverage)
    }

    /// Cycle to the next leverage step.
    pub fn cycle_leverage(&mut self) -> u32 {
        self.engine.leverage_mut().cycle()
    }

    // --- jump protocol ----------------------------------------------------

    /// Begin a jump toward `target`.
    ///
    /// Returns [`JumpStart::Ignored`] for a same-column target or while
    /// another jump is in flight; both are no-ops, not errors. An asset
    /// index outside the configured set is an error.
    pub fn start_jump(&mut self, target: JumpTarget) -> Result<JumpStart, EngineError> {
        if let JumpTarget::Asset(index) = target {
            if index >= self.config.symbols.len() {
                return Err(EngineError::UnknownAsset {
                    index,
                    count: self.config.symbols.len(),
                });
            }
        }

        if self.in_flight.is_some() {
            debug!(?target, "jump requested while another is in flight, ignoring");
            return Ok(JumpStart::Ignored);
        }

        let same_column = match (self.placement, target) {
            (Placement::OnCash, JumpTarget::Cash) => true,
            (Placement::OnAsset(current), JumpTarget::Asset(index)) => current == index,
            _ => false,
        };
        if same_column {
            debug!(?target, "same-column jump, ignoring");
            return Ok(JumpStart::Ignored);
        }

        self.in_flight = Some(target);
        self.preempted = false;
        Ok(JumpStart::Started)
    }

    /// Complete the in-flight jump against `snapshot` and execute its
    /// landing effect.
    ///
    /// Always returns a well-formed outcome; internal inconsistencies are
    /// logged and reported as [`LandOutcome::Ignored`] rather than
    /// propagated, so a bad landing can never take down the host's loop.
    pub fn finish_jump(&mut self, snapshot: &PriceSnapshot) -> LandOutcome {
        let Some(target) = self.in_flight.take() else {
            return LandOutcome::Ignored;
        };

        if self.preempted {
            self.preempted = false;
            info!(?target, "landing after liquidation, no effect");
            return LandOutcome::Preempted;
        }

        match (self.placement, target) {
            (Placement::OnCash, JumpTarget::Asset(index)) => match self.enter_leg(index, snapshot)
            {
                Ok(()) => LandOutcome::Opened,
                Err(e) => {
                    error!(error = %e, index, "buy leg failed");
                    LandOutcome::Ignored
                }
            },
            (Placement::OnAsset(_), JumpTarget::Cash) => {
                match self.settle_leg(snapshot, false) {
                    Ok(result) => LandOutcome::Settled(result),
                    Err(e) => {
                        error!(error = %e, "sell leg failed");
                        LandOutcome::Ignored
                    }
                }
            }
            (Placement::OnAsset(from), JumpTarget::Asset(to)) if from != to => {
                // Two legs: settle the old position, then immediately re-enter
                // on the target from the settled wallet.
                let sold = match self.settle_leg(snapshot, true) {
                    Ok(result) => result,
                    Err(e) => {
                        error!(error = %e, from, to, "sell leg failed");
                        return LandOutcome::Ignored;
                    }
                };
                if let Err(e) = self.enter_leg(to, snapshot) {
                    error!(error = %e, to, "buy leg failed after settlement");
                    return LandOutcome::Settled(sold);
                }
                LandOutcome::Switched(sold)
            }
            _ => LandOutcome::Ignored,
        }
    }

    /// Start and finish a jump in one call, for hosts without a landing
    /// animation.
    pub fn land(
        &mut self,
        target: JumpTarget,
        snapshot: &PriceSnapshot,
    ) -> Result<LandOutcome, EngineError> {
        match self.start_jump(target)? {
            JumpStart::Ignored => Ok(LandOutcome::Ignored),
            JumpStart::Started => Ok(self.finish_jump(snapshot)),
        }
    }

    /// Run one frame tick against `snapshot`.
    ///
    /// Refreshes the engine's mark, then evaluates the margin-call rule
    /// against the same snapshot the valuation uses. A firing liquidation
    /// settles immediately and preempts any in-flight jump.
    pub fn tick(&mut self, snapshot: &PriceSnapshot) -> TickReport {
        self.engine.refresh_mark(snapshot);

        let liquidation = if self.placement.is_on_asset() && self.engine.should_liquidate(snapshot)
        {
            self.liquidate(snapshot)
        } else {
            None
        };

        TickReport {
            wallet_display: self.wallet_display(snapshot),
            liquidation,
        }
    }

    /// Sell leg: settle the open position to cash at the snapshot mark.
    fn settle_leg(
        &mut self,
        snapshot: &PriceSnapshot,
        is_intermediate: bool,
    ) -> Result<JumpResult, EngineError> {
        let mark = self
            .engine
            .resolved_mark(snapshot)
            .ok_or(EngineError::NoOpenPosition)?;
        let old_value = self.engine.wallet();
        let new_value = self.engine.close_position(mark)?;
        self.comparisons.clear();
        self.placement = Placement::OnCash;

        info!(
            mark,
            old_value, new_value, is_intermediate, "position settled to cash"
        );
        Ok(JumpResult {
            old_value,
            new_value,
            percent_change: safe_percent(new_value - old_value, old_value),
            is_intermediate,
        })
    }

    /// Buy leg: open a position on the asset at `index` and rebuild the
    /// virtual comparison set around it.
    fn enter_leg(&mut self, index: usize, snapshot: &PriceSnapshot) -> Result<(), EngineError> {
        let symbol = self.config.symbols[index].clone();
        let price = match snapshot.price_of(&symbol) {
            Some(price) => price,
            None => {
                warn!(
                    symbol = %symbol,
                    fallback = self.config.fallback_price,
                    "no price for entry, using configured fallback"
                );
                self.config.fallback_price
            }
        };

        let position = self.engine.open_position(&symbol, price)?.clone();
        self.comparisons.rebuild(
            &position,
            &self.config.symbols,
            snapshot,
            self.engine.fee_rate(),
        );
        self.placement = Placement::OnAsset(index);

        info!(
            symbol = %position.symbol,
            entry_price = position.entry_price,
            position_size = position.position_size,
            leverage = position.leverage,
            "position opened"
        );
        Ok(())
    }

    /// Force-close on a margin call and return the event. Preempts any
    /// in-flight jump.
    fn liquidate(&mut self, snapshot: &PriceSnapshot) -> Option<LiquidationEvent> {
        let mark = self.engine.resolved_mark(snapshot)?;
        let symbol = self
            .engine
            .position()
            .map(|p| p.symbol.clone())
            .unwrap_or_default();

        let settled_wallet = match self.engine.force_liquidate(mark) {
            Ok(wallet) => wallet,
            Err(e) => {
                // Unreachable with a resolved mark, but never poison the tick.
                error!(error = %e, "forced liquidation failed");
                return None;
            }
        };

        self.comparisons.clear();
        self.placement = Placement::OnCash;
        if self.in_flight.is_some() {
            self.preempted = true;
        }

        Some(LiquidationEvent {
            symbol,
            price: mark,
            settled_wallet,
        })
    }
}

// ============================================================================
// Tests
// ============================================================================
