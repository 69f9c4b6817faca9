//! Synthetic price generator.
//!
//! Keeps the game playable with no exchange connection: one random walker
//! per symbol produces smooth, occasionally impulsive price movement and
//! emits the same [`PriceUpdate`]s the live feed would.
//!
//! The movement model layers:
//! - smooth lattice noise (faded interpolation over a hashed integer grid)
//! - randomly timed impulses every few seconds
//! - a slow sinusoidal micro-trend that occasionally flips direction
//! - momentum smoothing, so moves build and decay instead of jittering
//! - adaptive damping once a walker strays far from its base price

use std::time::Duration;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::feed::FeedEvent;
use crate::prices::PriceUpdate;

/// Configuration for the synthetic feed.
#[derive(Debug, Clone)]
pub struct SyntheticFeedConfig {
    /// Symbols and the base price each walker starts from.
    pub base_prices: Vec<(String, f64)>,
    /// Interval between emitted updates.
    pub update_interval: Duration,
    /// Time scale of the lattice noise.
    pub noise_scale: f64,
    /// Overall movement amplitude per step.
    pub impulse_factor: f64,
}

impl Default for SyntheticFeedConfig {
    fn default() -> Self {
        Self {
            base_prices: vec![
                ("BTC".to_string(), 65_000.0),
                ("ETH".to_string(), 3_200.0),
                ("ADA".to_string(), 0.45),
                ("DOT".to_string(), 7.2),
            ],
            update_interval: Duration::from_millis(250),
            noise_scale: 0.003,
            impulse_factor: 0.02,
        }
    }
}

/// Quintic fade curve for lattice interpolation.
fn fade(t: f64) -> f64 {
    t * t * t * (t * (t * 6.0 - 15.0) + 10.0)
}

fn lerp(a: f64, b: f64, t: f64) -> f64 {
    a + (b - a) * t
}

/// Deterministic hash of a lattice point into [-1, 1].
fn lattice_random(x: f64) -> f64 {
    let n = (x * 12.9898).sin() * 43758.5453;
    (n - n.floor()) * 2.0 - 1.0
}

/// Smooth noise in [-1, 1]: faded interpolation between lattice points.
fn smooth_noise(x: f64) -> f64 {
    let i = x.floor();
    let f = x - i;
    lerp(lattice_random(i), lattice_random(i + 1.0), fade(f))
}

/// One symbol's price walker.
#[derive(Debug)]
struct PriceWalker {
    symbol: String,
    base: f64,
    value: f64,
    session_high: f64,
    session_low: f64,
    time_ms: f64,
    momentum: f64,
    trend_direction: f64,
    micro_trend_phase: f64,
    last_impulse_ms: f64,
    next_impulse_gap_ms: f64,
    volatility_level: f64,
}

impl PriceWalker {
    fn new(symbol: String, base: f64) -> Self {
        Self {
            symbol,
            base,
            value: base,
            session_high: base,
            session_low: base,
            time_ms: 0.0,
            momentum: 0.0,
            trend_direction: 1.0,
            micro_trend_phase: 0.0,
            last_impulse_ms: 0.0,
            next_impulse_gap_ms: 4_000.0,
            volatility_level: 1.0,
        }
    }

    /// Advance by `dt_ms` and return the update for this step.
    fn step(&mut self, dt_ms: f64, config: &SyntheticFeedConfig, rng: &mut StdRng) -> PriceUpdate {
        self.time_ms += dt_ms;

        let noise = smooth_noise(self.time_ms * config.noise_scale);
        let impulse = self.impulse(rng);
        let micro_trend = self.micro_trend(dt_ms, rng);

        self.momentum =
            self.momentum * 0.95 + (noise * 0.3 + impulse * 0.5 + micro_trend * 0.2) * 0.1;

        let change = self.momentum * config.impulse_factor * self.volatility_level;
        // Walkers stay within two decades of their base so the game's scale
        // never degenerates.
        self.value = (self.value * (1.0 + change)).clamp(self.base * 0.1, self.base * 10.0);
        self.adjust_volatility();

        self.session_high = self.session_high.max(self.value);
        self.session_low = self.session_low.min(self.value);

        PriceUpdate {
            symbol: self.symbol.clone(),
            price: self.value,
            change_24h: (self.value / self.base - 1.0) * 100.0,
            volume: 0.0,
            high_24h: self.session_high,
            low_24h: self.session_low,
        }
    }

    /// Random impulse every 2-8 seconds, zero otherwise.
    fn impulse(&mut self, rng: &mut StdRng) -> f64 {
        if self.time_ms - self.last_impulse_ms > self.next_impulse_gap_ms {
            self.last_impulse_ms = self.time_ms;
            self.next_impulse_gap_ms = 2_000.0 + rng.gen::<f64>() * 6_000.0;
            (rng.gen::<f64>() - 0.5) * 2.0 * 0.1
        } else {
            0.0
        }
    }

    /// Slow sinusoidal drift with rare direction flips.
    fn micro_trend(&mut self, dt_ms: f64, rng: &mut StdRng) -> f64 {
        self.micro_trend_phase += dt_ms * 0.0005;
        if rng.gen::<f64>() < 0.001 {
            self.trend_direction = -self.trend_direction;
        }
        self.micro_trend_phase.sin() * self.trend_direction * 0.3
    }

    /// Damp movement for walkers far above their base.
    fn adjust_volatility(&mut self) {
        let ratio = self.value / self.base;
        self.volatility_level = if ratio > 5.0 {
            0.3
        } else if ratio > 2.0 {
            0.7
        } else {
            1.0
        };
    }
}

/// Offline price feed.
pub struct SyntheticFeed {
    config: SyntheticFeedConfig,
    walkers: Vec<PriceWalker>,
    rng: StdRng,
    tx: mpsc::Sender<FeedEvent>,
}

impl SyntheticFeed {
    /// Create a feed with a randomly seeded generator.
    pub fn new(config: SyntheticFeedConfig, tx: mpsc::Sender<FeedEvent>) -> Self {
        Self::with_rng(config, tx, StdRng::from_entropy())
    }

    /// Create a feed with an explicit generator (deterministic in tests).
    pub fn with_rng(config: SyntheticFeedConfig, tx: mpsc::Sender<FeedEvent>, rng: StdRng) -> Self {
        let walkers = config
            .base_prices
            .iter()
            .map(|(symbol, base)| PriceWalker::new(symbol.clone(), *base))
            .collect();
        Self {
            config,
            walkers,
            rng,
            tx,
        }
    }

    /// Run the feed (blocking, should be spawned).
    pub async fn run(mut self) {
        info!(
            symbols = self.walkers.len(),
            interval_ms = self.config.update_interval.as_millis() as u64,
            "synthetic feed started"
        );
        if self.tx.send(FeedEvent::Connected(true)).await.is_err() {
            return;
        }

        let dt_ms = self.config.update_interval.as_millis() as f64;
        let mut interval = tokio::time::interval(self.config.update_interval);
        loop {
            interval.tick().await;
            for walker in &mut self.walkers {
                let update = walker.step(dt_ms, &self.config, &mut self.rng);
                if self.tx.send(FeedEvent::Price(update)).await.is_err() {
                    debug!("feed channel closed, stopping synthetic feed");
                    return;
                }
            }
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fade_endpoints() {
        assert_eq!(fade(0.0), 0.0);
        assert_eq!(fade(1.0), 1.0);
        assert!(fade(0.5) > 0.0 && fade(0.5) < 1.0);
    }

    #[test]
    fn test_smooth_noise_bounded() {
        for i in 0..2_000 {
            let n = smooth_noise(i as f64 * 0.137);
            assert!((-1.0..=1.0).contains(&n), "noise {n} out of range");
        }
    }

    #[test]
    fn test_walker_stays_positive_and_bounded() {
        let config = SyntheticFeedConfig::default();
        let mut rng = StdRng::seed_from_u64(7);
        let mut walker = PriceWalker::new("BTC".to_string(), 65_000.0);

        for _ in 0..10_000 {
            let update = walker.step(250.0, &config, &mut rng);
            assert!(update.price.is_finite());
            assert!(update.price >= 6_500.0 && update.price <= 650_000.0);
            assert!(update.high_24h >= update.low_24h);
        }
    }

    #[test]
    fn test_walker_actually_moves() {
        let config = SyntheticFeedConfig::default();
        let mut rng = StdRng::seed_from_u64(42);
        let mut walker = PriceWalker::new("ETH".to_string(), 3_200.0);

        let mut moved = false;
        for _ in 0..1_000 {
            let update = walker.step(250.0, &config, &mut rng);
            if (update.price - 3_200.0).abs() > 1.0 {
                moved = true;
                break;
            }
        }
        assert!(moved, "walker never left its base price");
    }

    #[test]
    fn test_deterministic_with_seed() {
        let config = SyntheticFeedConfig::default();
        let run = |seed: u64| {
            let mut rng = StdRng::seed_from_u64(seed);
            let mut walker = PriceWalker::new("BTC".to_string(), 65_000.0);
            (0..500)
                .map(|_| walker.step(250.0, &config, &mut rng).price)
                .collect::<Vec<f64>>()
        };
        assert_eq!(run(3), run(3));
    }
}
