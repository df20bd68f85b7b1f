//! Computes the signed net amount outstanding across all present buckets.

use std::sync::Arc;

use solana_sdk::hash::Hash;
use solana_sdk::message::Message;
use solana_sdk::pubkey::Pubkey;
use solana_sdk::transaction::Transaction;

use crate::error::{CrankError, CrankResult, LedgerError};
use crate::ledger::LedgerGateway;
use crate::program::{PairAccounts, PoolProgram};
use crate::state::{PairAddresses, PairSnapshot};

pub struct AmountResolver {
    ledger: Arc<dyn LedgerGateway>,
    program: PoolProgram,
    payer: Pubkey,
    addrs: PairAddresses,
}

impl AmountResolver {
    pub fn new(
        ledger: Arc<dyn LedgerGateway>,
        program: PoolProgram,
        payer: Pubkey,
        addrs: PairAddresses,
    ) -> Self {
        Self {
            ledger,
            program,
            payer,
            addrs,
        }
    }

    /// Signed net outstanding amount for the pair. Positive means a net
    /// excess of side B that must be swapped into side A; negative the
    /// opposite; zero means balanced. With no bucket present this
    /// short-circuits to zero without a view call.
    pub async fn resolve(&self, snapshot: &PairSnapshot) -> CrankResult<i64> {
        if snapshot.pools.is_empty() {
            return Ok(0);
        }

        let accounts = PairAccounts {
            pair_config: self.addrs.pair_config,
            transfer_authority: self.addrs.transfer_authority,
            custody_a: snapshot.config.custody_a,
            custody_b: snapshot.config.custody_b,
            oracle_a: snapshot.config.side_a.oracle,
            oracle_b: snapshot.config.side_b.oracle,
        };
        let ix = self.program.get_outstanding_amount(&accounts, &snapshot.pools);
        let message = Message::new_with_blockhash(&[ix], Some(&self.payer), &Hash::default());
        let tx = Transaction::new_unsigned(message);

        let data = self.ledger.invoke_view(&tx).await.map_err(|e| match e {
            LedgerError::Program { message } => CrankError::Program { message },
            other => CrankError::Ledger(other),
        })?;

        let bytes: [u8; 8] = data
            .get(..8)
            .and_then(|slice| slice.try_into().ok())
            .ok_or_else(|| {
                CrankError::InvalidAccountData(format!(
                    "outstanding-amount view returned {} bytes, expected 8",
                    data.len()
                ))
            })?;
        Ok(i64::from_le_bytes(bytes))
    }
}
