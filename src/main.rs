mod bootstrap;
mod config;
mod crank;
mod error;
mod ledger;
mod program;
mod routing;
mod state;

use std::str::FromStr;

use anyhow::{bail, Context};
use solana_sdk::pubkey::Pubkey;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::Config;
use crate::crank::runner::CrankRunner;

// Initialize logging and tracing
fn init_tracing() {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info,crank=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    init_tracing();

    // Exactly three positional parameters define a pair process; anything
    // else is the one truly fatal startup condition.
    let args: Vec<String> = std::env::args().collect();
    if args.len() != 4 {
        bail!("usage: {} <rpc-endpoint> <mint-a> <mint-b>", args[0]);
    }
    let rpc_url = args[1].clone();
    let mint_a = Pubkey::from_str(&args[2]).context("invalid mint A")?;
    let mint_b = Pubkey::from_str(&args[3]).context("invalid mint B")?;

    let cfg = Config::from_env().context("configuration")?;

    info!("🚀 starting pool crank for {} / {}", mint_a, mint_b);

    // INIT retries forever with full back-to-start semantics; steady-state
    // failures never reach this level.
    let ctx = loop {
        match bootstrap::initialize(cfg.clone(), &rpc_url, mint_a, mint_b).await {
            Ok(ctx) => break ctx,
            Err(err) => {
                error!("init failed, retrying: {}", err);
                tokio::time::sleep(cfg.init_retry_delay).await;
            }
        }
    };

    let mut runner = CrankRunner::new(ctx.ledger, ctx.routing, ctx.payer, ctx.cfg, ctx.addrs);
    runner.run().await;

    Ok(())
}
