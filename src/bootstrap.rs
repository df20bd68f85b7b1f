//! INIT phase: connectivity, token-account bootstrap, static address
//! derivation and pair metadata load. Any failure here is retried from the
//! top by the caller after a fixed delay.

use std::sync::Arc;

use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::{read_keypair_file, Keypair};
use solana_sdk::signer::Signer;
use solana_sdk::transaction::Transaction;
use spl_associated_token_account::get_associated_token_address;
use spl_associated_token_account::instruction::create_associated_token_account_idempotent;
use tracing::info;

use crate::config::Config;
use crate::error::{CrankError, CrankResult};
use crate::ledger::{LedgerGateway, SolanaLedger};
use crate::routing::{JupiterRouter, RoutingGateway};
use crate::state::{
    account_discriminator, Order, OrderSide, PairAddresses, Pool, PoolStatus, TokenPairConfig,
    ORDER_OWNER_OFFSET,
};

pub struct CrankContext {
    pub ledger: Arc<dyn LedgerGateway>,
    pub routing: Arc<dyn RoutingGateway>,
    pub payer: Arc<Keypair>,
    pub cfg: Config,
    pub addrs: PairAddresses,
}

pub async fn initialize(
    cfg: Config,
    rpc_url: &str,
    mint_a: Pubkey,
    mint_b: Pubkey,
) -> CrankResult<CrankContext> {
    let payer = read_keypair_file(&cfg.keypair_path).map_err(|e| {
        CrankError::Config(format!("cannot read keypair {}: {}", cfg.keypair_path, e))
    })?;
    let payer = Arc::new(payer);

    let ledger: Arc<dyn LedgerGateway> = Arc::new(SolanaLedger::new(rpc_url.to_string()));
    let routing: Arc<dyn RoutingGateway> =
        Arc::new(JupiterRouter::new(cfg.routing_api_url.clone()));

    // Connectivity check before anything else
    ledger.latest_blockhash().await?;
    info!("connected to {}", rpc_url);

    let addrs = PairAddresses::derive(&cfg.pool_program_id, mint_a, mint_b);
    info!(
        pair = %addrs.label(),
        config = %addrs.pair_config,
        authority = %addrs.transfer_authority,
        "derived static addresses"
    );

    ensure_token_accounts(&ledger, &payer, &[mint_a, mint_b]).await?;

    let config = load_pair_config(&ledger, &addrs).await?;
    info!(
        pair = %addrs.label(),
        tifs = ?config.tifs,
        cranks = config.allow_cranks,
        settlements = config.allow_settlements,
        "loaded pair metadata"
    );

    let positions = load_open_positions(&ledger, &cfg, &payer.pubkey()).await?;
    info!(pair = %addrs.label(), count = positions.len(), "wallet open positions");
    for order in &positions {
        info!(
            pair = %addrs.label(),
            tif = order.tif,
            counter = order.pool_counter,
            amount = order.amount,
            lp = order.lp_balance,
            buy = order.side == OrderSide::Buy,
            "open position"
        );
    }
    log_active_buckets(&ledger, &cfg, &config, &addrs).await?;

    Ok(CrankContext {
        ledger,
        routing,
        payer,
        cfg,
        addrs,
    })
}

/// Create the wallet's associated token accounts for both mints if missing.
/// The create instruction is idempotent, so a raced creation is harmless.
async fn ensure_token_accounts(
    ledger: &Arc<dyn LedgerGateway>,
    payer: &Arc<Keypair>,
    mints: &[Pubkey],
) -> CrankResult<()> {
    for mint in mints {
        let ata = get_associated_token_address(&payer.pubkey(), mint);
        if ledger.fetch_account(&ata).await?.is_some() {
            continue;
        }
        let ix = create_associated_token_account_idempotent(
            &payer.pubkey(),
            &payer.pubkey(),
            mint,
            &spl_token::id(),
        );
        let blockhash = ledger.latest_blockhash().await?;
        let tx = Transaction::new_signed_with_payer(
            &[ix],
            Some(&payer.pubkey()),
            &[&**payer],
            blockhash,
        );
        ledger.submit_transaction(&tx).await?;
        info!("created associated token account {} for mint {}", ata, mint);
    }
    Ok(())
}

async fn load_pair_config(
    ledger: &Arc<dyn LedgerGateway>,
    addrs: &PairAddresses,
) -> CrankResult<TokenPairConfig> {
    let data = ledger
        .fetch_account(&addrs.pair_config)
        .await?
        .ok_or(CrankError::AccountNotFound(addrs.pair_config))?;
    TokenPairConfig::decode(&data)
}

/// The wallet's decoded open positions across all buckets of the program
async fn load_open_positions(
    ledger: &Arc<dyn LedgerGateway>,
    cfg: &Config,
    owner: &Pubkey,
) -> CrankResult<Vec<Order>> {
    let addresses = ledger
        .query_program_accounts(
            &cfg.pool_program_id,
            account_discriminator(Order::TYPE_NAME),
            Some((ORDER_OWNER_OFFSET, *owner)),
        )
        .await?;

    let mut orders = Vec::with_capacity(addresses.len());
    for address in addresses {
        if let Some(data) = ledger.fetch_account(&address).await? {
            orders.push(Order::decode(&data)?);
        }
    }
    Ok(orders)
}

async fn log_active_buckets(
    ledger: &Arc<dyn LedgerGateway>,
    cfg: &Config,
    config: &TokenPairConfig,
    addrs: &PairAddresses,
) -> CrankResult<()> {
    let snapshot = crate::state::PairSnapshot::new(&cfg.pool_program_id, config.clone());
    for address in &snapshot.pools {
        if let Some(data) = ledger.fetch_account(address).await? {
            let pool = Pool::decode(&data)?;
            info!(
                pair = %addrs.label(),
                tif = pool.tif,
                counter = pool.counter,
                buy = pool.buy_volume,
                sell = pool.sell_volume,
                active = pool.status == PoolStatus::Active,
                "bucket {}", address
            );
        }
    }
    Ok(())
}
