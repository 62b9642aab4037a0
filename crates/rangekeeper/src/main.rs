use alloy_primitives::Address;
use alloy_provider::{Provider, ProviderBuilder};
use alloy_signer_local::PrivateKeySigner;
use clap::Parser;
use eyre::{Context, Result};
use rangekeeper::chain::RpcChain;
use rangekeeper::config::AgentConfig;
use rangekeeper::{logging, report, supervisor::Supervisor};
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Command-line flags, each falling back to an environment variable so
/// the agent can run unattended from a systemd unit or container with no
/// flags at all (mirrors `WalletService::from_env`/clap's `env` feature
/// elsewhere in this workspace).
#[derive(Parser, Debug)]
#[command(author, version, about = "Concentrated-liquidity position keeper")]
struct Args {
    /// Path to a JSON file matching `AgentConfig` (pool/token addresses,
    /// range width, thresholds, ...).
    #[arg(long, env = "RANGEKEEPER_CONFIG")]
    config: PathBuf,

    /// JSON-RPC endpoint for the chain the configured pool lives on.
    #[arg(long, env = "RANGEKEEPER_RPC_URL")]
    rpc_url: String,

    /// Hex-encoded private key for the wallet the agent trades from. No
    /// `0x` prefix required.
    #[arg(long, env = "RANGEKEEPER_PRIVATE_KEY")]
    private_key: String,

    /// Chain id used when signing transactions.
    #[arg(long, env = "RANGEKEEPER_CHAIN_ID")]
    chain_id: u64,
}

#[tokio::main]
async fn main() -> Result<()> {
    logging::init_logging();

    let args = Args::parse();

    let config_bytes = std::fs::read(&args.config)
        .wrap_err_with(|| format!("reading config file {}", args.config.display()))?;
    let config: AgentConfig = serde_json::from_slice(&config_bytes)
        .wrap_err("parsing config file as JSON")?;
    config.validate().wrap_err("config failed validation")?;

    let signer: PrivateKeySigner = args
        .private_key
        .trim_start_matches("0x")
        .parse()
        .wrap_err("parsing private key")?;
    let wallet: Address = signer.address();

    let url: url::Url = args.rpc_url.parse().wrap_err("parsing rpc url")?;
    let provider = ProviderBuilder::new().on_http(url);
    let chain_id_remote = provider.get_chain_id().await.wrap_err("fetching chain id")?;
    if chain_id_remote != args.chain_id {
        return Err(eyre::eyre!(
            "configured chain id {} does not match rpc endpoint's chain id {}",
            args.chain_id,
            chain_id_remote
        ));
    }

    let chain = RpcChain::new(provider, signer, args.chain_id);

    let (sink, mut stream) = report::channel();
    let cancel = CancellationToken::new();

    tokio::spawn(async move {
        while let Some(report) = stream.recv().await {
            match serde_json::to_string(&report) {
                Ok(json) => info!(target: "rangekeeper::report", "{json}"),
                Err(err) => tracing::warn!("failed to serialize report: {err}"),
            }
        }
    });

    let shutdown_cancel = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("received ctrl-c, shutting down at the next safe checkpoint");
            shutdown_cancel.cancel();
        }
    });

    info!(wallet = %wallet, chain_id = args.chain_id, "starting rangekeeper");
    let supervisor = Supervisor::new(chain, config, wallet, sink, cancel);
    supervisor.run().await;

    Ok(())
}
