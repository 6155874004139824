//! `swapperd` entry point, grounded on `drivers/swapper/http.go`'s
//! `main()`: parse flags, build the chain connections and store, start the
//! supervisor and HTTP server, and shut down cleanly on SIGINT.

mod chain;
mod config;
mod http;
mod rendezvous_http;
mod sled_store;
mod supervisor;

use clap::Parser;
use std::sync::Arc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init();
    let args = config::Args::parse();

    std::fs::create_dir_all(args.home_dir())?;
    let store = Arc::new(sled_store::SledStore::open(&args.store_dir())?);

    let mnemonic_path = args.home_dir().join("mnemonic.txt");
    let mnemonic = load_or_generate_mnemonic(&mnemonic_path)?;

    let network = args.network();

    // Connection parameters only: each swap derives its own keys and builds
    // its own wallet/client from its one-time password inside `ChainFactory`,
    // rather than this process holding one long-lived keypair.
    let chain_factory = Arc::new(supervisor::DefaultChainFactory {
        mnemonic,
        btc_rpc_url: std::env::var("SWAPPERD_BTC_RPC_URL").unwrap_or_else(|_| "http://127.0.0.1:18332".into()),
        btc_network: network.to_bitcoin_network(),
        eth_rpc_url: std::env::var("SWAPPERD_ETH_RPC_URL").unwrap_or_else(|_| "http://127.0.0.1:8545".into()),
        eth_contract_address: std::env::var("SWAPPERD_ETH_CONTRACT").unwrap_or_default(),
    });

    let rendezvous = Arc::new(rendezvous_http::HttpRendezvous::new(args.rendezvous_url.clone()));

    let sup = Arc::new(supervisor::Supervisor::new(store.clone(), rendezvous, chain_factory));

    let sup_for_server = sup.clone();
    let sup_for_run = sup.clone();
    let run_handle = tokio::spawn(async move { sup_for_run.run().await });

    let app_state = http::AppState {
        supervisor: sup_for_server,
        store: store.clone(),
        password: args.password.clone(),
    };
    let router = http::router(app_state);
    let listener = tokio::net::TcpListener::bind(("0.0.0.0", args.port)).await?;
    log::info!(target: "swapperd", "listening on 0.0.0.0:{}", args.port);

    let server = axum::serve(listener, router).with_graceful_shutdown(shutdown_signal());
    server.await?;

    sup.signal_shutdown();
    run_handle.await??;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        log::error!(target: "swapperd", "failed to install ctrl-c handler: {e}");
    }
    log::info!(target: "swapperd", "shutdown signal received");
}

fn load_or_generate_mnemonic(path: &std::path::Path) -> anyhow::Result<String> {
    if path.exists() {
        Ok(std::fs::read_to_string(path)?.trim().to_string())
    } else {
        let mnemonic = swapperd_core::keys::generate_mnemonic()?;
        std::fs::write(path, &mnemonic)?;
        Ok(mnemonic)
    }
}
