//! process wiring for the shielded-pool indexer and relay (SPEC_FULL.md
//! §9 "ambient singletons become fields of an explicit application
//! context"). Grounded on `zidecar::main`'s shape: a `clap::Parser` args
//! struct read once, `tracing_subscriber` initialized first, one fallible
//! startup self-check, then components built bottom-up and handed to
//! `axum::serve`.

use std::collections::HashSet;
use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use chain_client::{Address, EvmRpcClient};
use clap::Parser;
use indexer::{IndexerConfig, IndexerEngine, SyncCache};
use pool_state::PoolRegistry;
use relay_executor::{policy::FeePolicy, Executor, ExecutorConfig};
use tokio::time::Duration;
use tracing::{error, info, warn};

#[derive(Parser, Debug)]
#[command(name = "shielded-relay")]
#[command(about = "indexer + relay executor over a set of shielded pools", long_about = None)]
struct Args {
    /// EVM JSON-RPC HTTP endpoint (the indexer's log source and the
    /// relay's call/submit path; spec.md §6 "RPC HTTP ... endpoints").
    #[arg(long, env = "RPC_HTTP_URL")]
    rpc_http_url: String,

    /// pool contract addresses to index and relay for, `0x`-prefixed,
    /// comma-separated. Each gets its own writer-exclusive state and its
    /// own indexer task (spec.md §5 "Cross-pool operations are
    /// independent").
    #[arg(long, env = "POOL_ADDRESSES", value_delimiter = ',')]
    pool_addresses: Vec<String>,

    /// non-native ERC-20 tokens the pool contract recognizes, applied to
    /// every configured pool (spec.md §4.5 policy gate 7 "Token support").
    #[arg(long, env = "SUPPORTED_TOKENS", value_delimiter = ',')]
    supported_tokens: Vec<String>,

    /// relayer EOA private key, 32-byte hex (spec.md §6 "executor key
    /// material ... are read from environment").
    #[arg(long, env = "RELAYER_PRIVATE_KEY")]
    relayer_private_key: String,

    /// chain id used when signing submitted transactions.
    #[arg(long, env = "CHAIN_ID")]
    chain_id: u64,

    /// native-balance floor below which the relay reports itself
    /// unavailable (spec.md §4.5 policy gate 1), in wei.
    #[arg(long, env = "GAS_FLOOR_WEI", default_value_t = 10_000_000_000_000_000)]
    gas_floor_wei: u128,

    /// HTTP listen address for the read API and relay endpoints.
    #[arg(long, env = "LISTEN_ADDR", default_value = "0.0.0.0:8080")]
    listen: SocketAddr,

    /// sled database path for durable catch-up progress (SPEC_FULL.md's
    /// persistence cache; empty string opts out with an in-memory cache).
    #[arg(long, env = "SYNC_CACHE_PATH", default_value = "./shielded-relay.db")]
    sync_cache_path: String,

    /// confirmation depth the reorg guard journals and catch-up holds
    /// back from head (spec.md §4.4 mode 2, §9 "reorg depth ...
    /// configurable").
    #[arg(long, env = "REORG_DEPTH", default_value_t = 1)]
    reorg_depth: u64,

    /// live-poll interval in seconds.
    #[arg(long, env = "POLL_INTERVAL_SECS", default_value_t = 12)]
    poll_interval_secs: u64,

    /// blocks-behind-head threshold past which a pool's indexer task
    /// prefers catch-up over per-block live polling (spec.md §5
    /// "Backpressure").
    #[arg(long, env = "BACKLOG_THRESHOLD", default_value_t = 64)]
    backlog_threshold: u64,
}

fn parse_private_key(hex_str: &str) -> Result<[u8; 32]> {
    let bytes = hex::decode(hex_str.trim_start_matches("0x")).context("RELAYER_PRIVATE_KEY is not valid hex")?;
    bytes
        .try_into()
        .map_err(|_| anyhow::anyhow!("RELAYER_PRIVATE_KEY must decode to exactly 32 bytes"))
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "shielded_relay=info,tower_http=debug".into()),
        )
        .init();

    let args = Args::parse();

    // cryptographic self-check (spec.md §7 "the process refuses to
    // serve"). Must run before anything else touches field-hash.
    if let Err(e) = field_hash::verify_test_vectors() {
        error!(error = %e, "MiMC self-check failed, refusing to start");
        bail!("startup self-check failed: {e}");
    }
    info!("MiMC self-check passed");

    if args.pool_addresses.is_empty() {
        bail!("at least one --pool-addresses entry is required");
    }

    let supported_tokens: HashSet<Address> = args
        .supported_tokens
        .iter()
        .map(|s| Address::from_hex(s))
        .collect::<std::result::Result<_, _>>()
        .context("SUPPORTED_TOKENS contains an invalid address")?;

    let mut registry = PoolRegistry::new();
    let mut pool_addrs = Vec::with_capacity(args.pool_addresses.len());
    for raw in &args.pool_addresses {
        let addr = Address::from_hex(raw).context("POOL_ADDRESSES contains an invalid address")?;
        registry.register(addr, supported_tokens.clone());
        pool_addrs.push(addr);
        info!(pool = %addr.to_hex(), "registered pool");
    }
    let registry = Arc::new(registry);

    let chain = Arc::new(EvmRpcClient::new(args.rpc_http_url.clone()));
    info!(rpc = %args.rpc_http_url, "connected to chain RPC");

    let cache = if args.sync_cache_path.is_empty() {
        Arc::new(SyncCache::in_memory().context("opening in-memory sync cache")?)
    } else {
        info!(path = %args.sync_cache_path, "opening sync cache");
        Arc::new(SyncCache::open(&args.sync_cache_path).context("opening durable sync cache")?)
    };

    let indexer_config = IndexerConfig {
        reorg_depth: args.reorg_depth,
        poll_interval: Duration::from_secs(args.poll_interval_secs),
        backlog_threshold: args.backlog_threshold,
    };
    let engine = Arc::new(IndexerEngine::new(chain.clone(), registry.clone(), cache, indexer_config));

    for pool in &pool_addrs {
        info!(pool = %pool.to_hex(), "running initial catch-up");
        if let Err(e) = engine.catch_up(*pool).await {
            warn!(pool = %pool.to_hex(), error = %e, "initial catch-up failed, will retry in background loop");
        }
    }

    for pool in pool_addrs {
        let engine = engine.clone();
        tokio::spawn(async move {
            engine.run_pool(pool).await;
        });
    }

    let relayer_key = parse_private_key(&args.relayer_private_key)?;
    let executor_config = ExecutorConfig {
        relayer: relay_executor::signer::address_from_private_key(&relayer_key)
            .context("deriving relayer address from RELAYER_PRIVATE_KEY")?,
        private_key: relayer_key,
        chain_id: args.chain_id,
        gas_floor: args.gas_floor_wei,
        gas_limit: relay_executor::DEFAULT_GAS_LIMIT,
        fee_policy: FeePolicy::default(),
    };
    info!(relayer = %executor_config.relayer.to_hex(), "relay executor configured");

    let executor = Arc::new(
        Executor::new(chain, registry.clone(), executor_config)
            .await
            .context("initializing relay executor (nonce fetch)")?,
    );

    let ctx = Arc::new(api::AppContext::new(registry, executor));
    let router = api::build_router(ctx);

    info!(listen = %args.listen, "starting HTTP server");
    api::serve(router, args.listen).await.context("HTTP server exited")?;

    Ok(())
}
