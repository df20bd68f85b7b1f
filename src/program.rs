//! Instruction builders for the pool program's fixed method surface:
//! `get_outstanding_amount` (view), `crank`, `place_order`, `cancel_order`.

use borsh::{BorshDeserialize, BorshSerialize};
use sha2::{Digest, Sha256};
use solana_sdk::instruction::{AccountMeta, Instruction};
use solana_sdk::pubkey::Pubkey;

use crate::state::OrderSide;

/// First 8 bytes of sha256("global:<method_name>"), the method selector the
/// program matches on.
pub fn method_discriminator(name: &str) -> [u8; 8] {
    let mut hasher = Sha256::new();
    hasher.update(format!("global:{}", name).as_bytes());
    let digest = hasher.finalize();
    let mut disc = [0u8; 8];
    disc.copy_from_slice(&digest[..8]);
    disc
}

fn encode_data<T: BorshSerialize>(method: &str, args: &T) -> Vec<u8> {
    let mut data = method_discriminator(method).to_vec();
    data.extend(borsh::to_vec(args).expect("borsh encoding of instruction args"));
    data
}

#[derive(BorshSerialize, BorshDeserialize)]
struct CrankArgs {
    router_instruction_data: Vec<u8>,
}

#[derive(BorshSerialize, BorshDeserialize)]
struct PlaceOrderArgs {
    side: OrderSide,
    tif: u32,
    amount: u64,
}

#[derive(BorshSerialize, BorshDeserialize)]
struct CancelOrderArgs {
    lp_amount: u64,
}

/// Fixed account set for `crank` and `get_outstanding_amount`
#[derive(Debug, Clone, Copy)]
pub struct PairAccounts {
    pub pair_config: Pubkey,
    pub transfer_authority: Pubkey,
    pub custody_a: Pubkey,
    pub custody_b: Pubkey,
    pub oracle_a: Pubkey,
    pub oracle_b: Pubkey,
}

#[derive(Debug, Clone, Copy)]
pub struct PoolProgram {
    pub program_id: Pubkey,
}

impl PoolProgram {
    pub fn new(program_id: Pubkey) -> Self {
        Self { program_id }
    }

    /// Read-only view over all present buckets; returns a borsh `i64` via
    /// transaction return data. Never mutates state.
    pub fn get_outstanding_amount(&self, accounts: &PairAccounts, pools: &[Pubkey]) -> Instruction {
        let mut metas = vec![
            AccountMeta::new_readonly(accounts.pair_config, false),
            AccountMeta::new_readonly(accounts.oracle_a, false),
            AccountMeta::new_readonly(accounts.oracle_b, false),
        ];
        metas.extend(pools.iter().map(|p| AccountMeta::new_readonly(*p, false)));
        Instruction {
            program_id: self.program_id,
            accounts: metas,
            data: encode_data("get_outstanding_amount", &()),
        }
    }

    /// Settle all present buckets atomically. `remaining` carries the
    /// writable pool accounts, optionally followed by the routing program and
    /// the swap instruction's accounts so the program can relay the call.
    /// `router_instruction_data` is the swap instruction's raw payload, or
    /// empty for an internal-only settlement.
    pub fn crank(
        &self,
        accounts: &PairAccounts,
        payer: &Pubkey,
        remaining: Vec<AccountMeta>,
        router_instruction_data: Vec<u8>,
    ) -> Instruction {
        let mut metas = vec![
            AccountMeta::new(accounts.pair_config, false),
            AccountMeta::new_readonly(accounts.transfer_authority, false),
            AccountMeta::new(accounts.custody_a, false),
            AccountMeta::new(accounts.custody_b, false),
            AccountMeta::new_readonly(accounts.oracle_a, false),
            AccountMeta::new_readonly(accounts.oracle_b, false),
            AccountMeta::new(*payer, true),
            AccountMeta::new_readonly(spl_token::id(), false),
        ];
        metas.extend(remaining);
        Instruction {
            program_id: self.program_id,
            accounts: metas,
            data: encode_data(
                "crank",
                &CrankArgs {
                    router_instruction_data,
                },
            ),
        }
    }

    pub fn place_order(
        &self,
        accounts: &PairAccounts,
        owner: &Pubkey,
        user_token_account: &Pubkey,
        side: OrderSide,
        tif: u32,
        amount: u64,
    ) -> Instruction {
        let order = crate::state::order_address(&self.program_id, &accounts.pair_config, owner, tif);
        Instruction {
            program_id: self.program_id,
            accounts: vec![
                AccountMeta::new(accounts.pair_config, false),
                AccountMeta::new(order, false),
                AccountMeta::new(*user_token_account, false),
                AccountMeta::new(accounts.custody_a, false),
                AccountMeta::new(accounts.custody_b, false),
                AccountMeta::new(*owner, true),
                AccountMeta::new_readonly(spl_token::id(), false),
                AccountMeta::new_readonly(solana_sdk::system_program::id(), false),
            ],
            data: encode_data("place_order", &PlaceOrderArgs { side, tif, amount }),
        }
    }

    pub fn cancel_order(
        &self,
        accounts: &PairAccounts,
        owner: &Pubkey,
        user_token_account: &Pubkey,
        tif: u32,
        lp_amount: u64,
    ) -> Instruction {
        let order = crate::state::order_address(&self.program_id, &accounts.pair_config, owner, tif);
        Instruction {
            program_id: self.program_id,
            accounts: vec![
                AccountMeta::new(accounts.pair_config, false),
                AccountMeta::new(order, false),
                AccountMeta::new(*user_token_account, false),
                AccountMeta::new(accounts.custody_a, false),
                AccountMeta::new(accounts.custody_b, false),
                AccountMeta::new_readonly(accounts.transfer_authority, false),
                AccountMeta::new(*owner, true),
                AccountMeta::new_readonly(spl_token::id(), false),
            ],
            data: encode_data("cancel_order", &CancelOrderArgs { lp_amount }),
        }
    }
}
