//! Mock gateways and fixture builders shared by the crank unit tests.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use solana_sdk::hash::Hash;
use solana_sdk::instruction::{AccountMeta, Instruction};
use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::{Keypair, Signature};
use solana_sdk::transaction::Transaction;

use crate::crank::executor::SettlementExecutor;
use crate::crank::resolver::AmountResolver;
use crate::crank::selector::RouteSelector;
use crate::error::LedgerError;
use crate::ledger::LedgerGateway;
use crate::program::PoolProgram;
use crate::routing::{MaterializedRoute, RouteCandidate, RoutingGateway};
use crate::state::{
    account_discriminator, PairAddresses, PairSnapshot, SideConfig, TokenPairConfig,
};

#[derive(Default)]
pub struct MockLedger {
    accounts: Mutex<HashMap<Pubkey, Vec<u8>>>,
    program_accounts: Mutex<Vec<Pubkey>>,
    view_queue: Mutex<VecDeque<Result<Vec<u8>, LedgerError>>>,
    submit_queue: Mutex<VecDeque<Result<(), LedgerError>>>,
    fetch_count: AtomicUsize,
    query_count: AtomicUsize,
    blockhash_count: AtomicUsize,
    submit_count: AtomicUsize,
    view_count: AtomicUsize,
}

impl MockLedger {
    pub fn set_account(&self, address: Pubkey, data: Vec<u8>) {
        self.accounts.lock().unwrap().insert(address, data);
    }

    pub fn clear_account(&self, address: &Pubkey) {
        self.accounts.lock().unwrap().remove(address);
    }

    /// Register `address` in the program-account query results
    pub fn add_program_account(&self, address: Pubkey) {
        self.program_accounts.lock().unwrap().push(address);
    }

    pub fn push_view_amount(&self, amount: i64) {
        self.push_view_bytes(amount.to_le_bytes().to_vec());
    }

    pub fn push_view_bytes(&self, bytes: Vec<u8>) {
        self.view_queue.lock().unwrap().push_back(Ok(bytes));
    }

    pub fn fail_next_view_with_program_error(&self, message: &str) {
        self.view_queue.lock().unwrap().push_back(Err(LedgerError::Program {
            message: message.to_string(),
        }));
    }

    pub fn fail_next_submit_with_program_error(&self, message: &str) {
        self.submit_queue.lock().unwrap().push_back(Err(LedgerError::Program {
            message: message.to_string(),
        }));
    }

    pub fn fail_next_submit_with_transport_error(&self) {
        self.submit_queue.lock().unwrap().push_back(Err(LedgerError::Malformed(
            "connection reset".to_string(),
        )));
    }

    pub fn view_calls(&self) -> usize {
        self.view_count.load(Ordering::SeqCst)
    }

    pub fn submit_calls(&self) -> usize {
        self.submit_count.load(Ordering::SeqCst)
    }

    pub fn network_calls(&self) -> usize {
        self.fetch_count.load(Ordering::SeqCst)
            + self.query_count.load(Ordering::SeqCst)
            + self.blockhash_count.load(Ordering::SeqCst)
            + self.submit_count.load(Ordering::SeqCst)
            + self.view_count.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LedgerGateway for MockLedger {
    async fn fetch_account(&self, address: &Pubkey) -> Result<Option<Vec<u8>>, LedgerError> {
        self.fetch_count.fetch_add(1, Ordering::SeqCst);
        Ok(self.accounts.lock().unwrap().get(address).cloned())
    }

    async fn query_program_accounts(
        &self,
        _program_id: &Pubkey,
        _discriminator: [u8; 8],
        _owner_filter: Option<(usize, Pubkey)>,
    ) -> Result<Vec<Pubkey>, LedgerError> {
        self.query_count.fetch_add(1, Ordering::SeqCst);
        Ok(self.program_accounts.lock().unwrap().clone())
    }

    async fn latest_blockhash(&self) -> Result<Hash, LedgerError> {
        self.blockhash_count.fetch_add(1, Ordering::SeqCst);
        Ok(Hash::default())
    }

    async fn submit_transaction(&self, _tx: &Transaction) -> Result<Signature, LedgerError> {
        self.submit_count.fetch_add(1, Ordering::SeqCst);
        match self.submit_queue.lock().unwrap().pop_front() {
            Some(Ok(())) | None => Ok(Signature::default()),
            Some(Err(err)) => Err(err),
        }
    }

    async fn invoke_view(&self, _tx: &Transaction) -> Result<Vec<u8>, LedgerError> {
        self.view_count.fetch_add(1, Ordering::SeqCst);
        match self.view_queue.lock().unwrap().pop_front() {
            Some(result) => result,
            None => Ok(0i64.to_le_bytes().to_vec()),
        }
    }
}

pub struct MockRouting {
    candidates: Vec<RouteCandidate>,
    routes: Vec<MaterializedRoute>,
    quote_count: AtomicUsize,
    materialize_count: AtomicUsize,
}

impl MockRouting {
    /// `routes[i]` is what candidate `i` materializes into
    pub fn new(candidates: Vec<RouteCandidate>, routes: Vec<MaterializedRoute>) -> Self {
        let candidates = candidates
            .into_iter()
            .enumerate()
            .map(|(i, mut candidate)| {
                candidate.route = serde_json::json!(i);
                candidate
            })
            .collect();
        Self {
            candidates,
            routes,
            quote_count: AtomicUsize::new(0),
            materialize_count: AtomicUsize::new(0),
        }
    }

    pub fn quote_calls(&self) -> usize {
        self.quote_count.load(Ordering::SeqCst)
    }

    pub fn materialize_calls(&self) -> usize {
        self.materialize_count.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RoutingGateway for MockRouting {
    async fn compute_routes(
        &self,
        _input_mint: &Pubkey,
        _output_mint: &Pubkey,
        _amount: u64,
        _slippage_bps: u64,
    ) -> Result<Vec<RouteCandidate>, crate::error::RoutingError> {
        self.quote_count.fetch_add(1, Ordering::SeqCst);
        Ok(self.candidates.clone())
    }

    async fn materialize(
        &self,
        candidate: &RouteCandidate,
        _user: &Pubkey,
    ) -> Result<MaterializedRoute, crate::error::RoutingError> {
        self.materialize_count.fetch_add(1, Ordering::SeqCst);
        let index = candidate.route.as_u64().unwrap() as usize;
        Ok(self.routes[index].clone())
    }
}

pub fn sample_pair_config(present: &[bool]) -> TokenPairConfig {
    let side = || SideConfig {
        oracle: Pubkey::new_unique(),
        decimals: 6,
        min_swap_amount: 100,
        max_oracle_age_secs: 60,
        max_oracle_error_bps: 50,
    };
    TokenPairConfig {
        mint_a: Pubkey::new_unique(),
        mint_b: Pubkey::new_unique(),
        custody_a: Pubkey::new_unique(),
        custody_b: Pubkey::new_unique(),
        side_a: side(),
        side_b: side(),
        allow_cranks: true,
        allow_deposits: true,
        allow_settlements: true,
        allow_withdrawals: true,
        crank_authority: Pubkey::default(),
        tifs: (0..present.len() as u32).map(|i| 300 * (i + 1)).collect(),
        pool_counters: (0..present.len() as u64).collect(),
        current_pool_present: present.to_vec(),
    }
}

pub fn encode_pair_config(config: &TokenPairConfig) -> Vec<u8> {
    let mut data = account_discriminator(TokenPairConfig::TYPE_NAME).to_vec();
    data.extend(borsh::to_vec(config).unwrap());
    data
}

/// A snapshot with `n` present buckets (pool addresses are arbitrary)
pub fn snapshot_with_pools(n: usize) -> PairSnapshot {
    PairSnapshot {
        config: sample_pair_config(&vec![true; n]),
        pools: (0..n).map(|_| Pubkey::new_unique()).collect(),
    }
}

/// Executor over the given ledger; returns the transfer authority it expects
pub fn executor_with(ledger: Arc<MockLedger>) -> (SettlementExecutor, Pubkey) {
    let program = PoolProgram::new(Pubkey::new_unique());
    let payer = Arc::new(Keypair::new());
    let addrs = PairAddresses {
        mint_a: Pubkey::new_unique(),
        mint_b: Pubkey::new_unique(),
        pair_config: Pubkey::new_unique(),
        transfer_authority: Pubkey::new_unique(),
    };
    let authority = addrs.transfer_authority;
    let executor = SettlementExecutor::new(
        ledger,
        program,
        Pubkey::new_unique(),
        payer,
        addrs,
    );
    (executor, authority)
}

pub fn resolver_with(ledger: Arc<MockLedger>) -> AmountResolver {
    let program = PoolProgram::new(Pubkey::new_unique());
    let addrs = PairAddresses {
        mint_a: Pubkey::new_unique(),
        mint_b: Pubkey::new_unique(),
        pair_config: Pubkey::new_unique(),
        transfer_authority: Pubkey::new_unique(),
    };
    AmountResolver::new(ledger, program, Pubkey::new_unique(), addrs)
}

pub fn selector_with(
    routing: Arc<MockRouting>,
    executor: &SettlementExecutor,
    transfer_authority: Pubkey,
) -> RouteSelector {
    RouteSelector::new(
        routing,
        executor.routing_program_id(),
        transfer_authority,
        executor.payer(),
        500,
    )
}

/// A materialized route whose swap instruction carries the given
/// (account, is_signer) pairs plus one plain writable account
pub fn route_with_swap(program_id: Pubkey, accounts: Vec<(Pubkey, bool)>) -> MaterializedRoute {
    let mut metas: Vec<AccountMeta> = accounts
        .into_iter()
        .map(|(pubkey, is_signer)| AccountMeta {
            pubkey,
            is_signer,
            is_writable: false,
        })
        .collect();
    metas.push(AccountMeta::new(Pubkey::new_unique(), false));
    MaterializedRoute {
        setup: Vec::new(),
        swap: Instruction {
            program_id,
            accounts: metas,
            data: vec![1, 2, 3, 4],
        },
        cleanup: Vec::new(),
    }
}
