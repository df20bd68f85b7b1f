//! Turns a signed imbalance into a validated, single-transaction-sized swap
//! leg, or decides that no viable route exists.

use std::sync::Arc;

use solana_sdk::pubkey::Pubkey;
use tracing::debug;

use crate::crank::executor::SettlementExecutor;
use crate::error::{CrankError, CrankResult};
use crate::routing::{MaterializedRoute, RouteCandidate, RoutingGateway};
use crate::state::{OrderSide, PairSnapshot};

pub struct RouteSelector {
    routing: Arc<dyn RoutingGateway>,
    routing_program_id: Pubkey,
    transfer_authority: Pubkey,
    payer: Pubkey,
    slippage_tolerance_bps: u64,
}

impl RouteSelector {
    pub fn new(
        routing: Arc<dyn RoutingGateway>,
        routing_program_id: Pubkey,
        transfer_authority: Pubkey,
        payer: Pubkey,
        slippage_tolerance_bps: u64,
    ) -> Self {
        Self {
            routing,
            routing_program_id,
            transfer_authority,
            payer,
            slippage_tolerance_bps,
        }
    }

    /// Scan the ranked candidate list best-first and return the first route
    /// passing every gate, or `None` when no viable route exists.
    ///
    /// The slippage gate ends the whole search on its first failure: the
    /// list is ranked best-first, so nothing downstream can qualify. The
    /// shape, signer, identity and size gates only skip the one candidate.
    pub async fn select(
        &self,
        snapshot: &PairSnapshot,
        executor: &SettlementExecutor,
        side: OrderSide,
        amount: u64,
    ) -> CrankResult<Option<MaterializedRoute>> {
        let (input_mint, output_mint) = match side {
            // Net excess of B: sell B into A
            OrderSide::Buy => (snapshot.config.mint_b, snapshot.config.mint_a),
            OrderSide::Sell => (snapshot.config.mint_a, snapshot.config.mint_b),
        };

        let candidates = self
            .routing
            .compute_routes(&input_mint, &output_mint, amount, self.slippage_tolerance_bps)
            .await?;
        if candidates.is_empty() {
            return Ok(None);
        }
        let best_threshold = candidates[0].other_amount_threshold;

        for (rank, candidate) in candidates.iter().enumerate() {
            if exceeds_tolerance(best_threshold, candidate, self.slippage_tolerance_bps) {
                debug!(
                    rank,
                    threshold = candidate.other_amount_threshold,
                    best = best_threshold,
                    "candidate degrades past tolerance, ending search"
                );
                return Ok(None);
            }

            let route = self.routing.materialize(candidate, &self.payer).await?;

            if !route.setup.is_empty() || !route.cleanup.is_empty() {
                debug!(rank, "candidate needs setup/cleanup instructions, skipping");
                continue;
            }

            if route
                .swap
                .accounts
                .iter()
                .any(|meta| meta.is_signer && meta.pubkey != self.transfer_authority)
            {
                debug!(rank, "candidate requires a foreign signer, skipping");
                continue;
            }

            if route.swap.program_id != self.routing_program_id {
                debug!(
                    rank,
                    program = %route.swap.program_id,
                    "candidate targets an unexpected program, skipping"
                );
                continue;
            }

            match executor.simulate_size(snapshot, Some(&route)) {
                Ok(size) => {
                    debug!(rank, size, "selected candidate");
                    return Ok(Some(route));
                }
                Err(CrankError::SizeExceeded) => {
                    debug!(rank, "candidate does not fit in one transaction, skipping");
                    continue;
                }
                Err(other) => return Err(other),
            }
        }

        Ok(None)
    }
}

/// Relative degradation of a candidate's output threshold versus the best
/// candidate's, measured in basis points against `tolerance_bps`.
fn exceeds_tolerance(best_threshold: u64, candidate: &RouteCandidate, tolerance_bps: u64) -> bool {
    if best_threshold == 0 || candidate.other_amount_threshold >= best_threshold {
        return false;
    }
    let degradation = best_threshold - candidate.other_amount_threshold;
    (degradation as u128) * 10_000 > (best_threshold as u128) * (tolerance_bps as u128)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crank::testutil::{
        executor_with, route_with_swap, selector_with, snapshot_with_pools, MockLedger,
        MockRouting,
    };
    use solana_sdk::packet::PACKET_DATA_SIZE;

    fn candidate(threshold: u64) -> RouteCandidate {
        RouteCandidate {
            out_amount: threshold + 10,
            other_amount_threshold: threshold,
            route: serde_json::Value::Null,
        }
    }

    #[test]
    fn test_tolerance_boundary() {
        // 5% of 1000 is 50: 950 passes, 949 trips
        assert!(!exceeds_tolerance(1000, &candidate(950), 500));
        assert!(exceeds_tolerance(1000, &candidate(949), 500));
        assert!(!exceeds_tolerance(1000, &candidate(1000), 500));
        assert!(!exceeds_tolerance(0, &candidate(0), 500));
    }

    #[tokio::test]
    async fn test_first_passing_candidate_wins() {
        let ledger = Arc::new(MockLedger::default());
        let (executor, authority) = executor_with(ledger);
        let good = |tag: u8| {
            let mut route = route_with_swap(executor.routing_program_id(), vec![(authority, true)]);
            route.swap.data = vec![tag];
            route
        };
        let routing = Arc::new(MockRouting::new(
            vec![candidate(100), candidate(100), candidate(100)],
            vec![good(1), good(2), good(3)],
        ));
        let selector = selector_with(routing.clone(), &executor, authority);

        let snapshot = snapshot_with_pools(1);
        let route = selector
            .select(&snapshot, &executor, OrderSide::Buy, 1000)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(route.swap.data, vec![1]);
        assert_eq!(routing.materialize_calls(), 1);
    }

    #[tokio::test]
    async fn test_shape_and_signer_gates_skip_to_passing_candidate() {
        let ledger = Arc::new(MockLedger::default());
        let (executor, authority) = executor_with(ledger);
        let program = executor.routing_program_id();

        // Candidate 1: non-empty setup group
        let mut shape_fail = route_with_swap(program, vec![]);
        shape_fail.setup = vec![shape_fail.swap.clone()];
        // Candidate 2: required signer that is not the transfer authority
        let signer_fail = route_with_swap(program, vec![(Pubkey::new_unique(), true)]);
        // Candidate 3: clean
        let mut pass = route_with_swap(program, vec![(authority, true)]);
        pass.swap.data = vec![42];

        let routing = Arc::new(MockRouting::new(
            vec![candidate(100), candidate(100), candidate(100)],
            vec![shape_fail, signer_fail, pass],
        ));
        let selector = selector_with(routing.clone(), &executor, authority);

        let snapshot = snapshot_with_pools(1);
        let route = selector
            .select(&snapshot, &executor, OrderSide::Buy, 1000)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(route.swap.data, vec![42]);
        assert_eq!(routing.materialize_calls(), 3);
    }

    #[tokio::test]
    async fn test_slippage_gate_aborts_search() {
        let ledger = Arc::new(MockLedger::default());
        let (executor, authority) = executor_with(ledger);
        let program = executor.routing_program_id();

        // Best candidate fails the shape gate; the second degrades 10% > 5%
        // tolerance, so the search ends without materializing it.
        let mut shape_fail = route_with_swap(program, vec![]);
        shape_fail.cleanup = vec![shape_fail.swap.clone()];
        let never_reached = route_with_swap(program, vec![]);

        let routing = Arc::new(MockRouting::new(
            vec![candidate(100), candidate(90)],
            vec![shape_fail, never_reached],
        ));
        let selector = selector_with(routing.clone(), &executor, authority);

        let snapshot = snapshot_with_pools(1);
        let route = selector
            .select(&snapshot, &executor, OrderSide::Buy, 1000)
            .await
            .unwrap();
        assert!(route.is_none());
        assert_eq!(routing.materialize_calls(), 1);
    }

    #[tokio::test]
    async fn test_program_identity_gate_skips() {
        let ledger = Arc::new(MockLedger::default());
        let (executor, authority) = executor_with(ledger);

        let foreign = route_with_swap(Pubkey::new_unique(), vec![]);
        let mut pass = route_with_swap(executor.routing_program_id(), vec![]);
        pass.swap.data = vec![7];

        let routing = Arc::new(MockRouting::new(
            vec![candidate(100), candidate(100)],
            vec![foreign, pass],
        ));
        let selector = selector_with(routing.clone(), &executor, authority);

        let snapshot = snapshot_with_pools(1);
        let route = selector
            .select(&snapshot, &executor, OrderSide::Buy, 1000)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(route.swap.data, vec![7]);
    }

    #[tokio::test]
    async fn test_size_gate_skips_oversized_candidate() {
        let ledger = Arc::new(MockLedger::default());
        let (executor, authority) = executor_with(ledger);
        let program = executor.routing_program_id();

        let mut oversized = route_with_swap(program, vec![]);
        oversized.swap.data = vec![0u8; PACKET_DATA_SIZE];
        let mut pass = route_with_swap(program, vec![]);
        pass.swap.data = vec![5];

        let routing = Arc::new(MockRouting::new(
            vec![candidate(100), candidate(100)],
            vec![oversized, pass],
        ));
        let selector = selector_with(routing.clone(), &executor, authority);

        let snapshot = snapshot_with_pools(1);
        let route = selector
            .select(&snapshot, &executor, OrderSide::Buy, 1000)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(route.swap.data, vec![5]);
    }

    #[tokio::test]
    async fn test_empty_candidate_list_is_no_route() {
        let ledger = Arc::new(MockLedger::default());
        let (executor, authority) = executor_with(ledger);
        let routing = Arc::new(MockRouting::new(vec![], vec![]));
        let selector = selector_with(routing, &executor, authority);

        let snapshot = snapshot_with_pools(1);
        let route = selector
            .select(&snapshot, &executor, OrderSide::Sell, 500)
            .await
            .unwrap();
        assert!(route.is_none());
    }
}
