//! Price cache and per-tick snapshots.
//!
//! The feed is the single writer: it pushes [`PriceUpdate`]s which are
//! ingest-validated into a [`PriceTable`]. The game loop is the single
//! reader: once per tick it takes an owned [`PriceSnapshot`] and runs every
//! computation of that tick (valuation, liquidation check, display) against
//! it, so one tick can never mix prices from different moments. A
//! multi-threaded host gets the same guarantee by swapping whole snapshots.
//!
//! Bad data never enters the table: zero, negative, or non-finite prices are
//! rejected at ingest, and a symbol absent from an update simply keeps its
//! prior entry ("no update this tick").

use std::collections::HashMap;
use std::time::{Duration, Instant};

use tracing::warn;

/// A single price update pushed by a feed.
#[derive(Debug, Clone)]
pub struct PriceUpdate {
    /// Game symbol (e.g. "BTC").
    pub symbol: String,
    /// Last trade price in quote currency.
    pub price: f64,
    /// 24h price change in percent.
    pub change_24h: f64,
    /// 24h base-asset volume.
    pub volume: f64,
    /// 24h high.
    pub high_24h: f64,
    /// 24h low.
    pub low_24h: f64,
}

/// Cached market data for one symbol.
#[derive(Debug, Clone, Copy)]
pub struct PriceData {
    /// Last trade price.
    pub price: f64,
    /// 24h price change in percent.
    pub change_24h: f64,
    /// 24h base-asset volume.
    pub volume: f64,
    /// 24h high.
    pub high_24h: f64,
    /// 24h low.
    pub low_24h: f64,
    /// When this entry was last written.
    pub updated_at: Instant,
}

/// Whether a price can be used as a mark.
pub(crate) fn is_valid_price(price: f64) -> bool {
    price.is_finite() && price > 0.0
}

/// Single-writer price cache fed by a price feed.
#[derive(Debug, Default)]
pub struct PriceTable {
    entries: HashMap<String, PriceData>,
    connected: bool,
    last_update: Option<Instant>,
}

impl PriceTable {
    /// Create an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Ingest one update. Returns `false` if the update was rejected.
    pub fn apply(&mut self, update: PriceUpdate) -> bool {
        if !is_valid_price(update.price) {
            warn!(
                symbol = %update.symbol,
                price = update.price,
                "rejecting invalid price update"
            );
            return false;
        }

        let now = Instant::now();
        self.entries.insert(
            update.symbol,
            PriceData {
                price: update.price,
                change_24h: update.change_24h,
                volume: update.volume,
                high_24h: update.high_24h,
                low_24h: update.low_24h,
                updated_at: now,
            },
        );
        self.last_update = Some(now);
        true
    }

    /// Record the feed's connection state.
    pub fn set_connected(&mut self, connected: bool) {
        self.connected = connected;
    }

    /// Whether the feed currently reports a live connection.
    pub fn is_connected(&self) -> bool {
        self.connected
    }

    /// Time since the last accepted update, if any update ever arrived.
    pub fn time_since_update(&self) -> Option<Duration> {
        self.last_update.map(|t| t.elapsed())
    }

    /// Whether any update arrived within `max_age`.
    pub fn is_fresh(&self, max_age: Duration) -> bool {
        match self.last_update {
            Some(t) => t.elapsed() <= max_age,
            None => false,
        }
    }

    /// Number of symbols with a cached price.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no symbol has a cached price yet.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Take an owned snapshot for one tick.
    pub fn snapshot(&self) -> PriceSnapshot {
        PriceSnapshot {
            entries: self.entries.clone(),
            connected: self.connected,
            taken_at: Instant::now(),
        }
    }
}

/// Immutable per-tick view of the price table.
///
/// Every price in a snapshot passed ingest validation, so `price_of`
/// returning `Some` implies a finite, positive mark.
#[derive(Debug, Clone)]
pub struct PriceSnapshot {
    entries: HashMap<String, PriceData>,
    connected: bool,
    taken_at: Instant,
}

impl PriceSnapshot {
    /// Build a snapshot directly from symbol/price pairs. Invalid prices are
    /// dropped, matching table ingest.
    pub fn from_prices<I, S>(prices: I) -> Self
    where
        I: IntoIterator<Item = (S, f64)>,
        S: Into<String>,
    {
        let now = Instant::now();
        let entries = prices
            .into_iter()
            .filter(|(_, p)| is_valid_price(*p))
            .map(|(s, p)| {
                (
                    s.into(),
                    PriceData {
                        price: p,
                        change_24h: 0.0,
                        volume: 0.0,
                        high_24h: p,
                        low_24h: p,
                        updated_at: now,
                    },
                )
            })
            .collect();
        Self {
            entries,
            connected: true,
            taken_at: now,
        }
    }

    /// Full market data for a symbol.
    pub fn get(&self, symbol: &str) -> Option<&PriceData> {
        self.entries.get(symbol)
    }

    /// Current price for a symbol, if known.
    pub fn price_of(&self, symbol: &str) -> Option<f64> {
        self.entries.get(symbol).map(|d| d.price)
    }

    /// Whether the feed was connected when the snapshot was taken.
    pub fn is_connected(&self) -> bool {
        self.connected
    }

    /// When the snapshot was taken.
    pub fn taken_at(&self) -> Instant {
        self.taken_at
    }

    /// Number of symbols in the snapshot.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the snapshot has no prices at all.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn update(symbol: &str, price: f64) -> PriceUpdate {
        PriceUpdate {
            symbol: symbol.to_string(),
            price,
            change_24h: 1.5,
            volume: 1000.0,
            high_24h: price * 1.02,
            low_24h: price * 0.98,
        }
    }

    #[test]
    fn test_apply_valid_update() {
        let mut table = PriceTable::new();
        assert!(table.apply(update("BTC", 50_000.0)));
        assert_eq!(table.len(), 1);
        assert_eq!(table.snapshot().price_of("BTC"), Some(50_000.0));
    }

    #[test]
    fn test_rejects_zero_negative_and_nan() {
        let mut table = PriceTable::new();
        assert!(!table.apply(update("BTC", 0.0)));
        assert!(!table.apply(update("BTC", -1.0)));
        assert!(!table.apply(update("BTC", f64::NAN)));
        assert!(!table.apply(update("BTC", f64::INFINITY)));
        assert!(table.is_empty());
        assert!(table.time_since_update().is_none());
    }

    #[test]
    fn test_missing_symbol_keeps_prior_entry() {
        let mut table = PriceTable::new();
        table.apply(update("BTC", 50_000.0));
        table.apply(update("ETH", 3_000.0));

        // Only ETH updates this round; BTC keeps its cached price.
        table.apply(update("ETH", 3_100.0));
        let snap = table.snapshot();
        assert_eq!(snap.price_of("BTC"), Some(50_000.0));
        assert_eq!(snap.price_of("ETH"), Some(3_100.0));
    }

    #[test]
    fn test_rejected_update_keeps_prior_entry() {
        let mut table = PriceTable::new();
        table.apply(update("BTC", 50_000.0));
        assert!(!table.apply(update("BTC", f64::NAN)));
        assert_eq!(table.snapshot().price_of("BTC"), Some(50_000.0));
    }

    #[test]
    fn test_snapshot_is_isolated_from_later_writes() {
        let mut table = PriceTable::new();
        table.apply(update("BTC", 50_000.0));
        let snap = table.snapshot();

        table.apply(update("BTC", 51_000.0));
        assert_eq!(snap.price_of("BTC"), Some(50_000.0));
        assert_eq!(table.snapshot().price_of("BTC"), Some(51_000.0));
    }

    #[test]
    fn test_freshness() {
        let mut table = PriceTable::new();
        assert!(!table.is_fresh(Duration::from_secs(10)));

        table.apply(update("BTC", 50_000.0));
        assert!(table.is_fresh(Duration::from_secs(10)));
        assert!(!table.is_fresh(Duration::ZERO));
    }

    #[test]
    fn test_from_prices_drops_invalid() {
        let snap = PriceSnapshot::from_prices([("BTC", 50_000.0), ("ETH", f64::NAN), ("ADA", 0.0)]);
        assert_eq!(snap.len(), 1);
        assert_eq!(snap.price_of("BTC"), Some(50_000.0));
        assert_eq!(snap.price_of("ETH"), None);
    }
}
