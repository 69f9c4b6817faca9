//! Leverage selection over the fixed step set.
//!
//! Leverage is a process-wide setting the player changes between positions;
//! each open position freezes the value in effect at entry. Only the
//! enumerated steps are selectable.

use crate::errors::EngineError;

/// The selectable leverage steps, in cycling order.
pub const LEVERAGE_STEPS: [u32; 5] = [1, 10, 100, 500, 1000];

/// Tracks the currently selected leverage.
#[derive(Debug, Clone)]
pub struct LeverageSelector {
    current: u32,
}

impl LeverageSelector {
    /// Create a selector. Fails if `initial` is not an enumerated step.
    pub fn new(initial: u32) -> Result<Self, EngineError> {
        if !LEVERAGE_STEPS.contains(&initial) {
            return Err(EngineError::InvalidLeverage { requested: initial });
        }
        Ok(Self { current: initial })
    }

    /// Currently selected leverage.
    pub fn get(&self) -> u32 {
        self.current
    }

    /// Select a leverage step. Rejects values outside the enumerated set,
    /// leaving the current selection unchanged.
    pub fn set(&mut self, leverage: u32) -> Result<u32, EngineError> {
        if !LEVERAGE_STEPS.contains(&leverage) {
            return Err(EngineError::InvalidLeverage {
                requested: leverage,
            });
        }
        self.current = leverage;
        Ok(self.current)
    }

    /// Advance to the next step, wrapping after the last.
    pub fn cycle(&mut self) -> u32 {
        let idx = LEVERAGE_STEPS
            .iter()
            .position(|&l| l == self.current)
            .unwrap_or(0);
        self.current = LEVERAGE_STEPS[(idx + 1) % LEVERAGE_STEPS.len()];
        self.current
    }

    /// The full step set, for display.
    pub fn available(&self) -> &'static [u32] {
        &LEVERAGE_STEPS
    }
}

impl Default for LeverageSelector {
    fn default() -> Self {
        Self { current: 1000 }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_rejects_off_step() {
        assert!(LeverageSelector::new(50).is_err());
        assert!(LeverageSelector::new(10).is_ok());
    }

    #[test]
    fn test_set_valid_step() {
        let mut selector = LeverageSelector::new(1).unwrap();
        assert_eq!(selector.set(500).unwrap(), 500);
        assert_eq!(selector.get(), 500);
    }

    #[test]
    fn test_set_invalid_keeps_current() {
        let mut selector = LeverageSelector::new(100).unwrap();
        assert_eq!(
            selector.set(42),
            Err(EngineError::InvalidLeverage { requested: 42 })
        );
        assert_eq!(selector.get(), 100);
    }

    #[test]
    fn test_cycle_visits_all_steps_in_order() {
        let mut selector = LeverageSelector::new(1).unwrap();
        let visited: Vec<u32> = (0..5).map(|_| selector.cycle()).collect();
        assert_eq!(visited, vec![10, 100, 500, 1000, 1]);
        assert_eq!(selector.get(), 1);
    }
}
