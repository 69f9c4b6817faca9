#![deny(unreachable_pub)]

//! Position & valuation engine for a column-jumping leveraged trading game.
//!
//! The player holds a wallet in quote currency and jumps between a stable
//! cash column and volatile asset columns. Landing on an asset opens a
//! leveraged margin position against live market prices; landing back on
//! cash settles it. The engine owns the placement state machine, the margin
//! bookkeeping, the virtual "what-if" comparison positions, and automatic
//! liquidation: everything with invariants. Rendering, input, and the
//! game's visual effects live with the host.
//!
//! Typical wiring:
//!
//! ```ignore
//! let config = GameConfig::default();
//! let mut coordinator = JumpCoordinator::new(config)?;
//! let mut table = PriceTable::new();
//!
//! // feed task pushes FeedEvents; the loop drains them, then ticks:
//! let snapshot = table.snapshot();
//! let report = coordinator.tick(&snapshot);
//! coordinator.land(JumpTarget::Asset(0), &snapshot)?;
//! ```

// Core modules
pub mod config;
pub mod engine;
pub mod errors;
pub mod prices;

// Feed module
pub mod feed;

// Re-exports
pub use config::GameConfig;
pub use engine::{
    valuate, AssetDisplay, ColumnAction, ComparisonSnapshot, ComparisonTracker, JumpCoordinator,
    JumpResult, JumpStart, JumpTarget, LandOutcome, LeverageSelector, LiquidationEvent,
    MarginEngine, MarginPosition, Placement, SecondaryInfo, TickReport, Valuation, LEVERAGE_STEPS,
};
pub use errors::{EngineError, FeedError};
pub use feed::{
    BinanceFeed, BinanceFeedConfig, FeedEvent, SymbolMapping, SyntheticFeed, SyntheticFeedConfig,
};
pub use prices::{PriceData, PriceSnapshot, PriceTable, PriceUpdate};
