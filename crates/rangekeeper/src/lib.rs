//! Autonomous position-repositioning control plane for a single
//! concentrated-liquidity position (one pool, one wallet, one agent
//! process per deployment).
//!
//! The module layout mirrors the components each file is responsible
//! for: pure math (`math`), the phase state machine (`supervisor`), the
//! collaborators it drives (`chain`, `contracts`), the idempotent
//! on-chain building blocks it sequences (`workflow`), and the
//! bookkeeping that survives across phase transitions (`ledger`,
//! `stability`, `breaker`, `report`).

pub mod breaker;
pub mod chain;
pub mod config;
pub mod contracts;
pub mod error;
pub mod ledger;
pub mod logging;
pub mod math;
pub mod metrics;
pub mod rebalance;
pub mod report;
pub mod stability;
pub mod supervisor;
pub mod workflow;
