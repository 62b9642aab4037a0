//! Sliding detector that decides when price has been stable enough to
//! re-enter a position.

use crate::math::Price;

#[derive(Debug, Clone)]
pub struct StabilityWindow {
    threshold_ppm: u32,
    required: u32,
    last_price: Option<Price>,
    consecutive_stable: u32,
}

impl Default for StabilityWindow {
    fn default() -> Self {
        // defaults: threshold 0.5%, required 5.
        Self::new(5_000, 5)
    }
}

impl StabilityWindow {
    pub fn new(threshold_ppm: u32, required: u32) -> Self {
        Self {
            threshold_ppm,
            required,
            last_price: None,
            consecutive_stable: 0,
        }
    }

    /// Feed a new pool sample. Returns `true` iff the window now reports
    /// stable (`consecutive_stable >= required`).
    pub fn observe(&mut self, price: Price) -> bool {
        match self.last_price {
            None => {
                self.last_price = Some(price);
                self.consecutive_stable = 1;
                false
            }
            Some(last) => {
                if price.within_threshold_ppm(&last, self.threshold_ppm) {
                    self.consecutive_stable += 1;
                } else {
                    self.consecutive_stable = 0;
                    self.last_price = Some(price);
                }
                self.is_stable()
            }
        }
    }

    pub fn is_stable(&self) -> bool {
        self.consecutive_stable >= self.required
    }

    /// `consecutive_stable / required`, reportable progress.
    pub fn progress(&self) -> (u32, u32) {
        (self.consecutive_stable, self.required)
    }

    /// Clears both `last_price` and `consecutive_stable`.
    pub fn reset(&mut self) {
        self.last_price = None;
        self.consecutive_stable = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::U256;

    fn price_from_ppm_delta(base: u64, delta_ppm: i64) -> Price {
        let delta = (base as i128 * delta_ppm as i128) / 1_000_000;
        let value = (base as i128 + delta) as u64;
        Price::from_sqrt_price_x96(U256::from(value))
    }

    #[test]
    fn first_sample_is_never_stable() {
        let mut w = StabilityWindow::default();
        assert!(!w.observe(Price::from_sqrt_price_x96(U256::from(1_000_000u64))));
        assert_eq!(w.progress(), (1, 5));
    }

    #[test]
    fn stability_acceptance_scenario() {
        // threshold 0.5%, required 5, ppm deltas
        // (+100, -200, +50, +0, +100) relative to a moving base ⇒ stable on sample 5.
        let mut w = StabilityWindow::new(5_000, 5);
        let base: u64 = 1_000_000_000;
        let deltas = [0i64, 100, -200, 50, 0, 100];
        let mut stable_at = None;
        for (i, d) in deltas.iter().enumerate() {
            let p = price_from_ppm_delta(base, *d);
            if w.observe(p) {
                stable_at = Some(i);
                break;
            }
        }
        assert_eq!(stable_at, Some(5));
    }

    #[test]
    fn breach_resets_counter() {
        let mut w = StabilityWindow::new(5_000, 5);
        let base: u64 = 1_000_000_000;
        w.observe(price_from_ppm_delta(base, 0));
        assert!(w.observe(price_from_ppm_delta(base, 10)) == false);
        // A huge jump (6% in sqrtPrice ~ >10% in price) breaches threshold.
        w.observe(price_from_ppm_delta(base, 60_000));
        assert_eq!(w.progress().0, 0);
    }

    #[test]
    fn stability_not_reached_when_breach_midway() {
        let mut w = StabilityWindow::new(5_000, 5);
        let base: u64 = 1_000_000_000;
        let deltas = [0i64, 100, 60_000, 50, 0, 100];
        let mut any_stable = false;
        for d in deltas.iter() {
            if w.observe(price_from_ppm_delta(base, *d)) {
                any_stable = true;
            }
        }
        assert!(!any_stable);
    }
}
