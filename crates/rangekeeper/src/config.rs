//! Validated configuration consumed directly by the phase supervisor.
//! Loading from file/env/CLI lives in `main.rs`; this module only
//! defines the shape and its validation rules.

use crate::contracts::ContractAddresses;
use crate::error::CoreError;
use alloy_primitives::U256;
use serde::Deserialize;
use std::time::Duration;

#[derive(Debug, Clone, Deserialize)]
pub struct AgentConfig {
    #[serde(default = "default_monitoring_interval_secs")]
    pub monitoring_interval_secs: u64,
    #[serde(default = "default_stability_threshold_ppm")]
    pub stability_threshold_ppm: u32,
    #[serde(default = "default_stability_intervals")]
    pub stability_intervals: u32,
    #[serde(default = "default_range_width")]
    pub range_width: i32,
    pub tick_spacing: i32,
    #[serde(default = "default_slippage_bps")]
    pub slippage_bps: u32,
    pub max_token0: U256,
    pub max_token1: U256,
    #[serde(default = "default_breaker_window_secs")]
    pub circuit_breaker_window_secs: u64,
    #[serde(default = "default_breaker_threshold")]
    pub circuit_breaker_threshold: u32,
    #[serde(default = "default_dust_tolerance_wei")]
    pub dust_tolerance_wei: U256,
    pub contracts: ContractAddresses,
}

impl AgentConfig {
    pub fn monitoring_interval(&self) -> Duration {
        Duration::from_secs(self.monitoring_interval_secs)
    }

    pub fn circuit_breaker_window(&self) -> Duration {
        Duration::from_secs(self.circuit_breaker_window_secs)
    }
}

fn default_monitoring_interval_secs() -> u64 {
    60
}
fn default_stability_threshold_ppm() -> u32 {
    5_000
}
fn default_stability_intervals() -> u32 {
    5
}
fn default_range_width() -> i32 {
    10
}
fn default_slippage_bps() -> u32 {
    100
}
fn default_breaker_window_secs() -> u64 {
    5 * 60
}
fn default_breaker_threshold() -> u32 {
    5
}
fn default_dust_tolerance_wei() -> U256 {
    U256::from(crate::rebalance::DEFAULT_DUST_TOLERANCE_WEI)
}

impl AgentConfig {
    /// Returns every violation found as a
    /// single `Validation` error (joined message) so `main` can report
    /// every problem at once instead of failing on the first.
    pub fn validate(&self) -> Result<(), CoreError> {
        let mut problems = Vec::new();

        if self.monitoring_interval_secs < 60 {
            problems.push("monitoringInterval must be at least 60s".to_string());
        }
        if self.stability_threshold_ppm == 0 || self.stability_threshold_ppm >= 100_000 {
            problems.push("stabilityThreshold must be in (0, 0.1)".to_string());
        }
        if self.stability_intervals < 3 {
            problems.push("stabilityIntervals must be >= 3".to_string());
        }
        if self.range_width <= 0 || self.range_width % 2 != 0 {
            problems.push("rangeWidth must be a positive even integer".to_string());
        }
        if self.tick_spacing <= 0 {
            problems.push("tickSpacing must be positive".to_string());
        }
        if self.slippage_bps == 0 || self.slippage_bps > 5_000 {
            problems.push("slippageBps must be in [1, 5000]".to_string());
        }
        if self.circuit_breaker_window_secs == 0 {
            problems.push("circuitBreakerWindow must be > 0".to_string());
        }
        if self.circuit_breaker_threshold < 3 {
            problems.push("circuitBreakerThreshold must be >= 3".to_string());
        }

        if problems.is_empty() {
            Ok(())
        } else {
            Err(CoreError::Validation(problems.join("; ")))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::Address;

    fn sample() -> AgentConfig {
        AgentConfig {
            monitoring_interval_secs: default_monitoring_interval_secs(),
            stability_threshold_ppm: default_stability_threshold_ppm(),
            stability_intervals: default_stability_intervals(),
            range_width: default_range_width(),
            tick_spacing: 60,
            slippage_bps: default_slippage_bps(),
            max_token0: U256::from(1_000u64),
            max_token1: U256::from(1_000u64),
            circuit_breaker_window_secs: default_breaker_window_secs(),
            circuit_breaker_threshold: default_breaker_threshold(),
            dust_tolerance_wei: default_dust_tolerance_wei(),
            contracts: ContractAddresses {
                pool: Address::ZERO,
                token0: Address::ZERO,
                token1: Address::ZERO,
                position_manager: Address::ZERO,
                router: Address::ZERO,
                gauge: Address::ZERO,
                farming_center: Address::ZERO,
                reward_token: Address::ZERO,
                bonus_reward_token: Address::ZERO,
            },
        }
    }

    #[test]
    fn defaults_validate() {
        assert!(sample().validate().is_ok());
    }

    #[test]
    fn odd_range_width_rejected() {
        let mut cfg = sample();
        cfg.range_width = 5;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn slippage_out_of_bounds_rejected() {
        let mut cfg = sample();
        cfg.slippage_bps = 6_000;
        assert!(cfg.validate().is_err());
        cfg.slippage_bps = 0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn monitoring_interval_below_minimum_rejected() {
        let mut cfg = sample();
        cfg.monitoring_interval_secs = 10;
        assert!(cfg.validate().is_err());
    }
}
