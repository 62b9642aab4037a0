//! Top-level loop that advances the phase state machine, invokes
//! workflow primitives in order, checks cancellation, and feeds the
//! circuit breaker.

use crate::breaker::CircuitBreaker;
use crate::chain::{Chain, Value};
use crate::config::AgentConfig;
use crate::contracts::methods;
use crate::error::CoreError;
use crate::ledger::{IncentiveKey, Position, PositionLedger};
use crate::math::{is_out_of_range, Price};
use crate::rebalance::{plan_rebalance, SwapDirection};
use crate::report::{Report, ReportKind, ReportSink};
use crate::stability::StabilityWindow;
use crate::workflow::{mint, stake, swap, unstake, withdraw};
use alloy_primitives::{Address, U256};
use serde::Serialize;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio_util::sync::CancellationToken;

/// Cap on the exponential backoff applied between immediate-retry phases
/// (`Initializing`, `RebalancingRequired`, `ExecutingRebalancing` don't
/// otherwise pace themselves on a monitoring tick the way
/// `ActiveMonitoring`/`WaitingForStability` do).
const MAX_RETRY_BACKOFF: Duration = Duration::from_secs(30);

fn retry_backoff(consecutive_errors: u32) -> Duration {
    let secs = 1u64.saturating_shl(consecutive_errors.min(5));
    Duration::from_secs(secs).min(MAX_RETRY_BACKOFF)
}

/// State machine phases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Initializing,
    ActiveMonitoring,
    RebalancingRequired,
    WaitingForStability,
    ExecutingRebalancing,
    Halted,
}

/// Read-only pool snapshot.
#[derive(Debug, Clone, Copy)]
pub struct PoolSample {
    pub sqrt_price_x96: U256,
    pub tick: i32,
    pub liquidity: U256,
    pub fetched_at: u64,
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Owns the single active [`Position`], the lifetime financial counters,
/// the stability window, and the circuit breaker. Generic over `Chain` so tests can drive it against
/// [`crate::chain::test_support::FakeChain`].
pub struct Supervisor<C> {
    chain: C,
    config: AgentConfig,
    wallet: Address,
    ledger: PositionLedger,
    stability: StabilityWindow,
    breaker: CircuitBreaker,
    reports: ReportSink,
    cancel: CancellationToken,
    /// Consecutive transient errors since the last successful phase run,
    /// used only to pace the retry backoff in `run` — kept separate from
    /// the circuit breaker, which tracks trip-worthiness, not pacing.
    consecutive_errors: u32,
}

impl<C: Chain> Supervisor<C> {
    pub fn new(
        chain: C,
        config: AgentConfig,
        wallet: Address,
        reports: ReportSink,
        cancel: CancellationToken,
    ) -> Self {
        let stability = StabilityWindow::new(config.stability_threshold_ppm, config.stability_intervals);
        let breaker = CircuitBreaker::new(
            config.circuit_breaker_window(),
            config.circuit_breaker_threshold,
        );
        Self {
            chain,
            config,
            wallet,
            ledger: PositionLedger::new(),
            stability,
            breaker,
            reports,
            cancel,
            consecutive_errors: 0,
        }
    }

    fn emit(&self, phase: Phase, kind: ReportKind, message: impl Into<String>) {
        crate::metrics::record_phase_transition(phase);
        let report = Report::new(now_ms(), phase, kind, message);
        crate::metrics::observe_report(&report);
        self.reports.emit(report);
    }

    async fn sample_pool(&self) -> Result<PoolSample, CoreError> {
        let values = self
            .chain
            .call(self.config.contracts.pool, methods::SAFELY_GET_STATE_OF_AMM, &[])
            .await?;
        let sqrt_price_x96 = values
            .first()
            .ok_or_else(|| CoreError::Transient("empty pool state response".into()))?
            .as_uint()?;
        let tick = values
            .get(1)
            .ok_or_else(|| CoreError::Transient("pool state missing tick".into()))?
            .as_int()? as i32;
        let liquidity = values
            .get(4)
            .ok_or_else(|| CoreError::Transient("pool state missing active liquidity".into()))?
            .as_uint()?;
        Ok(PoolSample {
            sqrt_price_x96,
            tick,
            liquidity,
            fetched_at: now_ms(),
        })
    }

    async fn read_balance(&self, token: Address) -> Result<U256, CoreError> {
        let values = self
            .chain
            .call(token, methods::BALANCE_OF, &[Value::Address(self.wallet)])
            .await?;
        values
            .first()
            .ok_or_else(|| CoreError::Transient("empty balanceOf() response".into()))?
            .as_uint()
    }

    /// Checked immediately before every primitive invocation (spec's only
    /// safe checkpoint, since a submitted transaction cannot be aborted
    /// mid-flight).
    fn check_cancelled(&self) -> Result<(), CoreError> {
        if self.cancel.is_cancelled() {
            Err(CoreError::Cancelled)
        } else {
            Ok(())
        }
    }

    /// Reads the on-chain incentive nonce a freshly staked token was
    /// actually enrolled under, via `deposits(tokenId)`, and pairs it with
    /// the configured reward tokens and pool to build the `IncentiveKey`
    /// `Unstake` must later present back to the farming center. Never
    /// guesses the nonce (spec §9's open question on this field).
    async fn read_incentive(&self, token_id: U256) -> Result<IncentiveKey, CoreError> {
        let values = self
            .chain
            .call(self.config.contracts.farming_center, methods::DEPOSITS, &[Value::Uint(token_id)])
            .await?;
        let nonce = values
            .first()
            .ok_or_else(|| CoreError::Transient("empty deposits() response".into()))?
            .as_uint()?;
        Ok(IncentiveKey {
            reward_token: self.config.contracts.reward_token,
            bonus_reward_token: self.config.contracts.bonus_reward_token,
            pool: self.config.contracts.pool,
            nonce,
        })
    }

    /// Runs the shared `balances -> rebalance swap -> mint -> stake`
    /// subsequence used by both `Initializing` and `ExecutingRebalancing`.
    async fn run_establish_position(&mut self, phase: Phase) -> Result<(), CoreError> {
        let sample = self.sample_pool().await?;
        let price = Price::from_sqrt_price_x96(sample.sqrt_price_x96);

        let mut balance0 = self.read_balance(self.config.contracts.token0).await?;
        let mut balance1 = self.read_balance(self.config.contracts.token1).await?;

        if let Some(plan) = plan_rebalance(balance0, balance1, &price, self.config.dust_tolerance_wei)? {
            self.check_cancelled()?;
            let (token_in, token_out, expected_out) = match plan.direction {
                SwapDirection::Token1ToToken0 => (
                    self.config.contracts.token1,
                    self.config.contracts.token0,
                    price.invert_convert(plan.amount_in).unwrap_or(plan.amount_in),
                ),
                SwapDirection::Token0ToToken1 => (
                    self.config.contracts.token0,
                    self.config.contracts.token1,
                    price.convert(plan.amount_in).unwrap_or(plan.amount_in),
                ),
            };
            let outcome = swap::swap(
                &self.chain,
                self.config.contracts.router,
                self.wallet,
                token_in,
                token_out,
                plan.amount_in,
                self.config.slippage_bps,
                expected_out,
                &mut self.ledger.counters,
                &self.reports,
                phase,
                now_ms() / 1000,
            )
            .await?;
            match plan.direction {
                SwapDirection::Token1ToToken0 => {
                    balance1 -= plan.amount_in;
                    balance0 += outcome.domain_outputs.amount_out;
                }
                SwapDirection::Token0ToToken1 => {
                    balance0 -= plan.amount_in;
                    balance1 += outcome.domain_outputs.amount_out;
                }
            }
        }

        self.check_cancelled()?;
        let mint_outcome = mint::mint(
            &self.chain,
            &self.config.contracts,
            self.wallet,
            sample.tick,
            sample.sqrt_price_x96,
            self.config.tick_spacing,
            self.config.range_width,
            self.config.max_token0,
            self.config.max_token1,
            balance0,
            balance1,
            self.config.slippage_bps,
            &mut self.ledger.counters,
            &self.reports,
            phase,
            now_ms() / 1000,
        )
        .await?;

        self.check_cancelled()?;
        stake::stake(
            &self.chain,
            self.config.contracts.position_manager,
            self.config.contracts.gauge,
            self.wallet,
            mint_outcome.domain_outputs.token_id,
            &mut self.ledger.counters,
            &self.reports,
            phase,
            now_ms() / 1000,
        )
        .await?;

        self.ledger.set(Position {
            token_id: mint_outcome.domain_outputs.token_id,
            tick_lower: mint_outcome.domain_outputs.tick_lower,
            tick_upper: mint_outcome.domain_outputs.tick_upper,
            incentive: None,
        });

        let incentive = self.read_incentive(mint_outcome.domain_outputs.token_id).await?;
        self.ledger.set_incentive(Some(incentive));

        self.emit(
            phase,
            ReportKind::PositionCreated,
            format!("position {} established", mint_outcome.domain_outputs.token_id),
        );

        Ok(())
    }

    async fn run_rebalancing_required(&mut self, incentive: IncentiveKey) -> Result<(), CoreError> {
        let position = self
            .ledger
            .current()
            .cloned()
            .ok_or_else(|| CoreError::Validation("no active position to rebalance".into()))?;

        self.emit(
            Phase::RebalancingRequired,
            ReportKind::RebalanceStart,
            format!("rebalancing position {}", position.token_id),
        );

        self.check_cancelled()?;
        unstake::unstake(
            &self.chain,
            self.config.contracts.farming_center,
            position.token_id,
            &incentive,
            None,
            &mut self.ledger.counters,
            &self.reports,
            Phase::RebalancingRequired,
            now_ms() / 1000,
        )
        .await?;

        self.check_cancelled()?;
        withdraw::withdraw(
            &self.chain,
            self.config.contracts.position_manager,
            self.wallet,
            position.token_id,
            self.config.slippage_bps,
            &mut self.ledger.counters,
            &self.reports,
            Phase::RebalancingRequired,
            now_ms() / 1000,
        )
        .await?;

        self.ledger.clear();
        self.stability.reset();
        Ok(())
    }

    /// Records `err` against the breaker and reports it; returns whether
    /// the supervisor should transition to `Halted`.
    fn handle_error(&mut self, phase: Phase, err: &CoreError) -> bool {
        let halted = self.breaker.record(err, std::time::Instant::now());
        self.reports.emit(
            Report::new(now_ms(), phase, ReportKind::Error, err.to_string()).with_error(err),
        );
        halted
    }

    /// Runs the state machine until it halts or a cancellation signal is
    /// observed at a safe checkpoint.
    pub async fn run(mut self) {
        self.emit(Phase::Initializing, ReportKind::StrategyStart, "starting");

        let mut phase = if self.ledger.is_empty() {
            Phase::Initializing
        } else {
            Phase::ActiveMonitoring
        };

        loop {
            if self.cancel.is_cancelled() {
                self.emit_shutdown();
                return;
            }

            phase = match phase {
                Phase::Initializing => match self.run_establish_position(Phase::Initializing).await {
                    Ok(()) => {
                        self.consecutive_errors = 0;
                        Phase::ActiveMonitoring
                    }
                    Err(CoreError::Cancelled) => {
                        self.emit_shutdown();
                        return;
                    }
                    Err(err) => {
                        let halted = self.handle_error(Phase::Initializing, &err);
                        if halted {
                            Phase::Halted
                        } else {
                            tokio::time::sleep(retry_backoff(self.consecutive_errors)).await;
                            self.consecutive_errors += 1;
                            Phase::Initializing
                        }
                    }
                },
                Phase::ActiveMonitoring => {
                    tokio::time::sleep(self.config.monitoring_interval()).await;
                    if self.cancel.is_cancelled() {
                        continue;
                    }
                    match self.sample_pool().await {
                        Ok(sample) => {
                            self.consecutive_errors = 0;
                            self.emit(Phase::ActiveMonitoring, ReportKind::Monitoring, "tick sampled");
                            let position = self.ledger.current().cloned();
                            match position {
                                Some(p) if is_out_of_range(sample.tick, p.tick_lower, p.tick_upper) => {
                                    self.emit(
                                        Phase::ActiveMonitoring,
                                        ReportKind::OutOfRange,
                                        format!("tick {} left [{}, {}]", sample.tick, p.tick_lower, p.tick_upper),
                                    );
                                    Phase::RebalancingRequired
                                }
                                _ => Phase::ActiveMonitoring,
                            }
                        }
                        Err(err) => {
                            if self.handle_error(Phase::ActiveMonitoring, &err) {
                                Phase::Halted
                            } else {
                                Phase::ActiveMonitoring
                            }
                        }
                    }
                }
                Phase::RebalancingRequired => {
                    let incentive = self.ledger.current().and_then(|p| p.incentive.clone());
                    let incentive = match incentive {
                        Some(incentive) => incentive,
                        None => {
                            // `Stake` always records an incentive before the
                            // position becomes reachable from this phase; a
                            // missing one means the ledger was corrupted
                            // rather than something worth retrying.
                            self.handle_error(
                                Phase::RebalancingRequired,
                                &CoreError::Validation("active position has no recorded incentive".into()),
                            );
                            phase = Phase::Halted;
                            continue;
                        }
                    };
                    match self.run_rebalancing_required(incentive).await {
                        Ok(()) => {
                            self.consecutive_errors = 0;
                            Phase::WaitingForStability
                        }
                        Err(CoreError::Cancelled) => {
                            self.emit_shutdown();
                            return;
                        }
                        Err(err) => {
                            let halted = self.handle_error(Phase::RebalancingRequired, &err);
                            if halted {
                                Phase::Halted
                            } else {
                                tokio::time::sleep(retry_backoff(self.consecutive_errors)).await;
                                self.consecutive_errors += 1;
                                Phase::RebalancingRequired
                            }
                        }
                    }
                }
                Phase::WaitingForStability => {
                    tokio::time::sleep(self.config.monitoring_interval()).await;
                    if self.cancel.is_cancelled() {
                        continue;
                    }
                    match self.sample_pool().await {
                        Ok(sample) => {
                            self.consecutive_errors = 0;
                            let price = Price::from_sqrt_price_x96(sample.sqrt_price_x96);
                            let stable = self.stability.observe(price);
                            let (done, required) = self.stability.progress();
                            self.emit(
                                Phase::WaitingForStability,
                                ReportKind::StabilityCheck,
                                format!("stability {done}/{required}"),
                            );
                            if stable {
                                Phase::ExecutingRebalancing
                            } else {
                                Phase::WaitingForStability
                            }
                        }
                        Err(err) => {
                            if self.handle_error(Phase::WaitingForStability, &err) {
                                Phase::Halted
                            } else {
                                Phase::WaitingForStability
                            }
                        }
                    }
                }
                Phase::ExecutingRebalancing => {
                    match self.run_establish_position(Phase::ExecutingRebalancing).await {
                        Ok(()) => {
                            self.consecutive_errors = 0;
                            Phase::ActiveMonitoring
                        }
                        Err(CoreError::Cancelled) => {
                            self.emit_shutdown();
                            return;
                        }
                        Err(err) => {
                            let halted = self.handle_error(Phase::ExecutingRebalancing, &err);
                            if halted {
                                Phase::Halted
                            } else {
                                tokio::time::sleep(retry_backoff(self.consecutive_errors)).await;
                                self.consecutive_errors += 1;
                                Phase::ExecutingRebalancing
                            }
                        }
                    }
                }
                Phase::Halted => {
                    let net_pnl = self.ledger.counters.net_pnl();
                    let report = Report::new(now_ms(), Phase::Halted, ReportKind::Halt, "circuit breaker halted")
                        .with_net_pnl(net_pnl);
                    crate::metrics::record_phase_transition(Phase::Halted);
                    crate::metrics::observe_report(&report);
                    self.reports.emit(report);
                    return;
                }
            };
        }
    }

    fn emit_shutdown(&self) {
        let net_pnl = self.ledger.counters.net_pnl();
        let report = Report::new(now_ms(), Phase::Halted, ReportKind::Shutdown, "shutdown complete")
            .with_net_pnl(net_pnl);
        crate::metrics::observe_report(&report);
        self.reports.emit(report);
    }
}
