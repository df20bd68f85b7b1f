//! Assembles and submits the atomic settlement transaction.

use std::sync::Arc;

use solana_sdk::hash::Hash;
use solana_sdk::instruction::{AccountMeta, Instruction};
use solana_sdk::message::Message;
use solana_sdk::packet::PACKET_DATA_SIZE;
use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::{Keypair, Signature};
use solana_sdk::signer::Signer;
use solana_sdk::transaction::Transaction;
use tracing::warn;

use crate::error::{CrankError, CrankResult, LedgerError};
use crate::ledger::LedgerGateway;
use crate::program::{PairAccounts, PoolProgram};
use crate::routing::MaterializedRoute;
use crate::state::{PairAddresses, PairSnapshot};

/// Result of one settlement attempt. The ledger transaction is all-or-nothing;
/// there is no partially-applied outcome.
#[derive(Debug, Clone)]
pub enum SettlementOutcome {
    Settled { signature: Signature, amount: i64 },
    /// Nothing to settle: no bucket is currently present
    Skipped,
    Failed { reason: String },
}

impl SettlementOutcome {
    /// Settled or benignly skipped; anything else triggers the fallback
    pub fn is_ok(&self) -> bool {
        !matches!(self, SettlementOutcome::Failed { .. })
    }
}

pub struct SettlementExecutor {
    ledger: Arc<dyn LedgerGateway>,
    program: PoolProgram,
    routing_program_id: Pubkey,
    payer: Arc<Keypair>,
    addrs: PairAddresses,
}

impl SettlementExecutor {
    pub fn new(
        ledger: Arc<dyn LedgerGateway>,
        program: PoolProgram,
        routing_program_id: Pubkey,
        payer: Arc<Keypair>,
        addrs: PairAddresses,
    ) -> Self {
        Self {
            ledger,
            program,
            routing_program_id,
            payer,
            addrs,
        }
    }

    pub fn routing_program_id(&self) -> Pubkey {
        self.routing_program_id
    }

    pub fn payer(&self) -> Pubkey {
        self.payer.pubkey()
    }

    fn pair_accounts(&self, snapshot: &PairSnapshot) -> PairAccounts {
        PairAccounts {
            pair_config: self.addrs.pair_config,
            transfer_authority: self.addrs.transfer_authority,
            custody_a: snapshot.config.custody_a,
            custody_b: snapshot.config.custody_b,
            oracle_a: snapshot.config.side_a.oracle,
            oracle_b: snapshot.config.side_b.oracle,
        }
    }

    /// Full instruction list for one settlement transaction. Pool buckets go
    /// in writable; with a swap leg, the routing program and the swap
    /// instruction's accounts follow so the program can relay the call. Any
    /// account the route marks as a required signer is the program-derived
    /// transfer authority (the selector guarantees this) and is always
    /// demoted to non-signer here, since no key exists to sign for it.
    pub(crate) fn assemble(
        &self,
        snapshot: &PairSnapshot,
        route: Option<&MaterializedRoute>,
    ) -> Vec<Instruction> {
        let mut remaining: Vec<AccountMeta> = snapshot
            .pools
            .iter()
            .map(|pool| AccountMeta::new(*pool, false))
            .collect();

        let router_data = match route {
            Some(route) => {
                remaining.push(AccountMeta::new_readonly(self.routing_program_id, false));
                remaining.extend(route.swap.accounts.iter().map(|meta| {
                    let mut meta = meta.clone();
                    if meta.is_signer && meta.pubkey == self.addrs.transfer_authority {
                        meta.is_signer = false;
                    }
                    meta
                }));
                route.swap.data.clone()
            }
            None => Vec::new(),
        };

        let crank_ix = self.program.crank(
            &self.pair_accounts(snapshot),
            &self.payer.pubkey(),
            remaining,
            router_data,
        );

        let mut instructions = Vec::new();
        if let Some(route) = route {
            instructions.extend(route.setup.iter().cloned());
        }
        instructions.push(crank_ix);
        if let Some(route) = route {
            instructions.extend(route.cleanup.iter().cloned());
        }
        instructions
    }

    /// Dry-run assembly: serialized size of the would-be transaction, with no
    /// network traffic. `SizeExceeded` when it cannot fit in one packet.
    pub fn simulate_size(
        &self,
        snapshot: &PairSnapshot,
        route: Option<&MaterializedRoute>,
    ) -> CrankResult<usize> {
        let instructions = self.assemble(snapshot, route);
        let message = Message::new_with_blockhash(
            &instructions,
            Some(&self.payer.pubkey()),
            &Hash::default(),
        );
        let tx = Transaction::new_unsigned(message);
        let size = bincode::serialize(&tx)
            .map_err(|e| CrankError::Serialization(e.to_string()))?
            .len();
        if size > PACKET_DATA_SIZE {
            return Err(CrankError::SizeExceeded);
        }
        Ok(size)
    }

    /// Submit one atomic settlement against all present buckets. With no
    /// bucket present this returns `Skipped` without touching the network.
    pub async fn commit(
        &self,
        snapshot: &PairSnapshot,
        route: Option<&MaterializedRoute>,
        amount: i64,
    ) -> SettlementOutcome {
        if snapshot.pools.is_empty() {
            return SettlementOutcome::Skipped;
        }

        let instructions = self.assemble(snapshot, route);
        let blockhash = match self.ledger.latest_blockhash().await {
            Ok(hash) => hash,
            Err(err) => return Self::classify_failure(err),
        };
        let tx = Transaction::new_signed_with_payer(
            &instructions,
            Some(&self.payer.pubkey()),
            &[&*self.payer],
            blockhash,
        );

        match self.ledger.submit_transaction(&tx).await {
            Ok(signature) => SettlementOutcome::Settled { signature, amount },
            Err(err) => Self::classify_failure(err),
        }
    }

    fn classify_failure(err: LedgerError) -> SettlementOutcome {
        match err {
            LedgerError::Program { message } => SettlementOutcome::Failed { reason: message },
            other => {
                warn!("settlement submission failed: {}", other);
                SettlementOutcome::Failed {
                    reason: "Unknown error".to_string(),
                }
            }
        }
    }
}
