//! The crank control loop: reload config, check permission, resolve the net
//! amount, select a route, execute, fall back, sleep, repeat forever.

use std::sync::Arc;

use chrono::Utc;
use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::Keypair;
use solana_sdk::signer::Signer;
use tracing::{error, info, warn};

use crate::config::Config;
use crate::crank::executor::{SettlementExecutor, SettlementOutcome};
use crate::crank::resolver::AmountResolver;
use crate::crank::selector::RouteSelector;
use crate::ledger::LedgerGateway;
use crate::program::PoolProgram;
use crate::routing::RoutingGateway;
use crate::state::{OrderSide, PairAddresses, PairSnapshot, TokenPairConfig};

/// What one reconciliation cycle produced
#[derive(Debug)]
pub enum CycleOutcome {
    /// Cranking is not currently permitted for this caller; a normal
    /// waiting state, not an error
    Denied,
    /// Could not obtain a usable config this cycle
    Stalled { reason: String },
    /// `amount` is `None` when settlement succeeded through the fallback
    /// after amount resolution itself failed
    Settled { amount: Option<i64> },
    Skipped,
    Failed { reason: String },
}

pub struct CrankRunner {
    ledger: Arc<dyn LedgerGateway>,
    cfg: Config,
    addrs: PairAddresses,
    payer_pubkey: Pubkey,
    label: String,
    resolver: AmountResolver,
    selector: RouteSelector,
    executor: SettlementExecutor,
    /// Config from the previous cycle, reused only when this cycle's
    /// reload fails
    last_config: Option<TokenPairConfig>,
}

impl CrankRunner {
    pub fn new(
        ledger: Arc<dyn LedgerGateway>,
        routing: Arc<dyn RoutingGateway>,
        payer: Arc<Keypair>,
        cfg: Config,
        addrs: PairAddresses,
    ) -> Self {
        let program = PoolProgram::new(cfg.pool_program_id);
        let payer_pubkey = payer.pubkey();
        let resolver = AmountResolver::new(ledger.clone(), program, payer_pubkey, addrs);
        let selector = RouteSelector::new(
            routing,
            cfg.routing_program_id,
            addrs.transfer_authority,
            payer_pubkey,
            cfg.slippage_tolerance_bps,
        );
        let executor = SettlementExecutor::new(
            ledger.clone(),
            program,
            cfg.routing_program_id,
            payer,
            addrs,
        );
        Self {
            ledger,
            cfg,
            addrs,
            payer_pubkey,
            label: addrs.label(),
            resolver,
            selector,
            executor,
            last_config: None,
        }
    }

    /// Run cycles forever. Nothing that happens in a cycle ends the loop;
    /// only INIT failures (handled by the caller) restart the process logic.
    pub async fn run(&mut self) {
        info!(pair = %self.label, "🔄 crank loop started");
        loop {
            let started = Utc::now();
            let outcome = self.cycle().await;
            let elapsed = Utc::now() - started;

            let delay = match &outcome {
                CycleOutcome::Settled { amount: Some(amount) } => {
                    info!(pair = %self.label, amount = *amount, elapsed_ms = elapsed.num_milliseconds(), "✅ settled");
                    self.cfg.poll_delay
                }
                CycleOutcome::Settled { amount: None } => {
                    info!(pair = %self.label, elapsed_ms = elapsed.num_milliseconds(), "✅ settled, amount unknown");
                    self.cfg.poll_delay
                }
                CycleOutcome::Skipped => {
                    info!(pair = %self.label, "nothing to settle");
                    self.cfg.poll_delay
                }
                CycleOutcome::Denied => {
                    info!(pair = %self.label, "cranking not permitted, waiting");
                    self.cfg.poll_delay
                }
                CycleOutcome::Stalled { reason } => {
                    warn!(pair = %self.label, reason = %reason, "cycle stalled");
                    self.cfg.error_delay
                }
                CycleOutcome::Failed { reason } => {
                    error!(pair = %self.label, reason = %reason, "❌ crank failed");
                    self.cfg.error_delay
                }
            };
            tokio::time::sleep(delay).await;
        }
    }

    /// One reconciliation cycle
    pub(crate) async fn cycle(&mut self) -> CycleOutcome {
        let config = match self.reload_config().await {
            Some(config) => config,
            None => {
                return CycleOutcome::Stalled {
                    reason: "no usable pair config".to_string(),
                }
            }
        };

        if !config.crank_permitted(&self.payer_pubkey) {
            return CycleOutcome::Denied;
        }

        let snapshot = PairSnapshot::new(&self.cfg.pool_program_id, config);

        let amount = match self.resolver.resolve(&snapshot).await {
            Ok(amount) => amount,
            Err(err) => {
                // Resolution failure is a crank failure: go straight to the
                // swap-less fallback rather than give up the cycle. The
                // reconciled amount is unknown, so it is not reported.
                return match self.executor.commit(&snapshot, None, 0).await {
                    SettlementOutcome::Settled { .. } => {
                        warn!(pair = %self.label, error = %err, "amount resolution failed, settled blind");
                        CycleOutcome::Settled { amount: None }
                    }
                    other => {
                        warn!(pair = %self.label, error = %err, "amount resolution failed");
                        outcome_of(other)
                    }
                };
            }
        };

        if amount == 0 {
            return outcome_of(self.executor.commit(&snapshot, None, 0).await);
        }

        let route = self.select_route(&snapshot, amount).await;

        if let Some(route) = route {
            let outcome = self.executor.commit(&snapshot, Some(&route), amount).await;
            if outcome.is_ok() {
                return outcome_of(outcome);
            }
            if let SettlementOutcome::Failed { reason } = &outcome {
                warn!(pair = %self.label, reason = %reason, "swap-leg settlement failed, retrying without swap");
            }
        } else {
            info!(pair = %self.label, amount, "no viable route, settling without swap");
        }

        // Fallback: internal-only matching across buckets, no swap leg
        outcome_of(self.executor.commit(&snapshot, None, amount).await)
    }

    async fn reload_config(&mut self) -> Option<TokenPairConfig> {
        let fetched = self
            .ledger
            .fetch_account(&self.addrs.pair_config)
            .await
            .ok()
            .flatten()
            .and_then(|data| match TokenPairConfig::decode(&data) {
                Ok(config) => Some(config),
                Err(err) => {
                    warn!(pair = %self.label, error = %err, "pair config decode failed");
                    None
                }
            });

        match fetched {
            Some(config) => {
                self.last_config = Some(config.clone());
                Some(config)
            }
            None => {
                warn!(pair = %self.label, "pair config reload failed, reusing previous copy");
                self.last_config.clone()
            }
        }
    }

    async fn select_route(
        &self,
        snapshot: &PairSnapshot,
        amount: i64,
    ) -> Option<crate::routing::MaterializedRoute> {
        let (side, magnitude) = if amount > 0 {
            (OrderSide::Buy, amount as u64)
        } else {
            (OrderSide::Sell, amount.unsigned_abs())
        };

        // Below the input side's swap floor the imbalance settles internally
        let min_swap = match side {
            OrderSide::Buy => snapshot.config.side_b.min_swap_amount,
            OrderSide::Sell => snapshot.config.side_a.min_swap_amount,
        };
        if magnitude < min_swap {
            info!(pair = %self.label, amount, min_swap, "imbalance below swap floor");
            return None;
        }

        match self
            .selector
            .select(snapshot, &self.executor, side, magnitude)
            .await
        {
            Ok(route) => route,
            Err(err) => {
                warn!(pair = %self.label, error = %err, "route selection failed");
                None
            }
        }
    }
}

fn outcome_of(outcome: SettlementOutcome) -> CycleOutcome {
    match outcome {
        SettlementOutcome::Settled { amount, .. } => CycleOutcome::Settled {
            amount: Some(amount),
        },
        SettlementOutcome::Skipped => CycleOutcome::Skipped,
        SettlementOutcome::Failed { reason } => CycleOutcome::Failed { reason },
    }
}
