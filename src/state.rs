use borsh::{BorshDeserialize, BorshSerialize};
use sha2::{Digest, Sha256};
use solana_sdk::pubkey::Pubkey;

use crate::error::{CrankError, CrankResult};

pub const PAIR_CONFIG_SEED: &[u8] = b"token_pair";
pub const TRANSFER_AUTHORITY_SEED: &[u8] = b"transfer_authority";
pub const POOL_SEED: &[u8] = b"pool";
pub const ORDER_SEED: &[u8] = b"order";

/// Byte offset of the owner pubkey inside an `Order` account
/// (8-byte discriminator, then the owner field).
pub const ORDER_OWNER_OFFSET: usize = 8;

/// First 8 bytes of sha256("account:<TypeName>"), the account type tag the
/// program writes at the start of every account it owns.
pub fn account_discriminator(type_name: &str) -> [u8; 8] {
    let mut hasher = Sha256::new();
    hasher.update(format!("account:{}", type_name).as_bytes());
    let digest = hasher.finalize();
    let mut disc = [0u8; 8];
    disc.copy_from_slice(&digest[..8]);
    disc
}

/// Per-side configuration of a token pair
#[derive(Debug, Clone, BorshSerialize, BorshDeserialize)]
pub struct SideConfig {
    pub oracle: Pubkey,
    pub decimals: u8,
    pub min_swap_amount: u64,
    pub max_oracle_age_secs: u32,
    pub max_oracle_error_bps: u16,
}

/// On-chain configuration account for one token pair.
///
/// Owned and mutated by the pool program; the crank only ever holds a
/// per-cycle read copy. `tifs`, `pool_counters` and `current_pool_present`
/// are parallel arrays indexed by TIF position.
#[derive(Debug, Clone, BorshSerialize, BorshDeserialize)]
pub struct TokenPairConfig {
    pub mint_a: Pubkey,
    pub mint_b: Pubkey,
    pub custody_a: Pubkey,
    pub custody_b: Pubkey,
    pub side_a: SideConfig,
    pub side_b: SideConfig,
    pub allow_cranks: bool,
    pub allow_deposits: bool,
    pub allow_settlements: bool,
    pub allow_withdrawals: bool,
    /// `Pubkey::default()` means anyone may crank
    pub crank_authority: Pubkey,
    pub tifs: Vec<u32>,
    pub pool_counters: Vec<u64>,
    pub current_pool_present: Vec<bool>,
}

impl TokenPairConfig {
    pub const TYPE_NAME: &'static str = "TokenPairConfig";

    pub fn decode(data: &[u8]) -> CrankResult<Self> {
        let config: Self = decode_account(Self::TYPE_NAME, data)?;
        if config.pool_counters.len() != config.tifs.len()
            || config.current_pool_present.len() != config.tifs.len()
        {
            return Err(CrankError::InvalidAccountData(format!(
                "TokenPairConfig TIF arrays disagree: {} tifs, {} counters, {} present flags",
                config.tifs.len(),
                config.pool_counters.len(),
                config.current_pool_present.len()
            )));
        }
        Ok(config)
    }

    /// Whether `caller` may crank this pair right now
    pub fn crank_permitted(&self, caller: &Pubkey) -> bool {
        self.allow_cranks
            && (self.crank_authority == Pubkey::default() || self.crank_authority == *caller)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub enum PoolStatus {
    Inactive,
    Active,
    Expired,
}

/// One settlement bucket per (TIF, counter) pair
#[derive(Debug, Clone, BorshSerialize, BorshDeserialize)]
pub struct Pool {
    pub tif: u32,
    pub counter: u64,
    pub buy_volume: u64,
    pub sell_volume: u64,
    pub buy_debt: u64,
    pub sell_debt: u64,
    pub status: PoolStatus,
}

impl Pool {
    pub const TYPE_NAME: &'static str = "Pool";

    pub fn decode(data: &[u8]) -> CrankResult<Self> {
        decode_account(Self::TYPE_NAME, data)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub enum OrderSide {
    Buy,
    Sell,
}

/// A user's open position in one bucket
#[derive(Debug, Clone, BorshSerialize, BorshDeserialize)]
pub struct Order {
    pub owner: Pubkey,
    pub side: OrderSide,
    pub tif: u32,
    pub pool_counter: u64,
    pub amount: u64,
    pub lp_balance: u64,
}

impl Order {
    pub const TYPE_NAME: &'static str = "Order";

    pub fn decode(data: &[u8]) -> CrankResult<Self> {
        decode_account(Self::TYPE_NAME, data)
    }
}

fn decode_account<T: BorshDeserialize>(type_name: &str, data: &[u8]) -> CrankResult<T> {
    let disc = account_discriminator(type_name);
    if data.len() < 8 || data[..8] != disc {
        return Err(CrankError::InvalidAccountData(format!(
            "account is not a {}",
            type_name
        )));
    }
    T::try_from_slice(&data[8..])
        .map_err(|e| CrankError::InvalidAccountData(format!("{}: {}", type_name, e)))
}

pub fn pair_config_address(program_id: &Pubkey, mint_a: &Pubkey, mint_b: &Pubkey) -> Pubkey {
    Pubkey::find_program_address(
        &[PAIR_CONFIG_SEED, mint_a.as_ref(), mint_b.as_ref()],
        program_id,
    )
    .0
}

/// Program-derived custodian of pooled funds; no private key exists for it.
pub fn transfer_authority_address(program_id: &Pubkey) -> Pubkey {
    Pubkey::find_program_address(&[TRANSFER_AUTHORITY_SEED], program_id).0
}

pub fn pool_address(
    program_id: &Pubkey,
    custody_a: &Pubkey,
    custody_b: &Pubkey,
    tif: u32,
    counter: u64,
) -> Pubkey {
    Pubkey::find_program_address(
        &[
            POOL_SEED,
            custody_a.as_ref(),
            custody_b.as_ref(),
            &tif.to_le_bytes(),
            &counter.to_le_bytes(),
        ],
        program_id,
    )
    .0
}

pub fn order_address(
    program_id: &Pubkey,
    pair_config: &Pubkey,
    owner: &Pubkey,
    tif: u32,
) -> Pubkey {
    Pubkey::find_program_address(
        &[ORDER_SEED, pair_config.as_ref(), owner.as_ref(), &tif.to_le_bytes()],
        program_id,
    )
    .0
}

/// Static per-pair addresses derived once at INIT
#[derive(Debug, Clone, Copy)]
pub struct PairAddresses {
    pub mint_a: Pubkey,
    pub mint_b: Pubkey,
    pub pair_config: Pubkey,
    pub transfer_authority: Pubkey,
}

impl PairAddresses {
    pub fn derive(program_id: &Pubkey, mint_a: Pubkey, mint_b: Pubkey) -> Self {
        Self {
            mint_a,
            mint_b,
            pair_config: pair_config_address(program_id, &mint_a, &mint_b),
            transfer_authority: transfer_authority_address(program_id),
        }
    }

    /// Short pair tag used in log lines
    pub fn label(&self) -> String {
        let a = self.mint_a.to_string();
        let b = self.mint_b.to_string();
        format!("{}/{}", &a[..4], &b[..4])
    }
}

/// Immutable per-cycle view of the pair: the freshly fetched config plus the
/// derived addresses of every currently present bucket. Rebuilt every cycle;
/// never cached across a permission check and an action.
#[derive(Debug, Clone)]
pub struct PairSnapshot {
    pub config: TokenPairConfig,
    pub pools: Vec<Pubkey>,
}

impl PairSnapshot {
    pub fn new(program_id: &Pubkey, config: TokenPairConfig) -> Self {
        let pools = config
            .tifs
            .iter()
            .enumerate()
            .filter(|(i, _)| config.current_pool_present[*i])
            .map(|(i, tif)| {
                pool_address(
                    program_id,
                    &config.custody_a,
                    &config.custody_b,
                    *tif,
                    config.pool_counters[i],
                )
            })
            .collect();
        Self { config, pools }
    }
}
