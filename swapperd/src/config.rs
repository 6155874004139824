//! Process configuration: CLI flags and the on-disk layout under
//! `$HOME/.swapperd`, grounded on
//! `drivers/swapper/http.go`'s flag set.

use clap::Parser;
use std::path::PathBuf;

fn default_home_dir() -> PathBuf {
    #[cfg(unix)]
    let home = std::env::var_os("HOME");
    #[cfg(windows)]
    let home = std::env::var_os("USERPROFILE");

    home.map(PathBuf::from).unwrap_or_else(|| PathBuf::from("."))
}

/// `swapperd` — cross-chain atomic swap daemon.
#[derive(Parser, Debug)]
#[command(name = "swapperd", version, about)]
pub struct Args {
    /// HTTP listen port.
    #[arg(long, default_value = "18516")]
    pub port: u16,

    /// Directory holding the daemon's key-value store and mnemonic.
    #[arg(long)]
    pub home: Option<PathBuf>,

    /// Bitcoin network: bitcoin, testnet, or regtest.
    #[arg(long, default_value = "testnet")]
    pub network: String,

    /// Rendezvous service base URL.
    #[arg(long, default_value = "http://localhost:8080")]
    pub rendezvous_url: String,

    /// HTTP Basic auth password required on authenticated routes.
    #[arg(long, env = "SWAPPERD_PASSWORD")]
    pub password: String,
}

impl Args {
    pub fn home_dir(&self) -> PathBuf {
        self.home.clone().unwrap_or_else(|| default_home_dir().join(".swapperd"))
    }

    pub fn store_dir(&self) -> PathBuf {
        self.home_dir().join("db")
    }

    pub fn network(&self) -> swapperd_core::Network {
        self.network.parse().unwrap_or(swapperd_core::Network::Testnet)
    }
}
