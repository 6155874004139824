//! Picks up pending swaps at startup, runs them concurrently, and
//! publishes status updates, grounded on the Go original's
//! `watch.Watch`/`guardian.Guardian` pair (`drivers/swapper/http.go`):
//! the watcher drives swap tasks forward, the guardian sweeps for expired
//! contracts and refunds them.

use crate::chain::{btc_adapter::RpcBtcWallet, eth_adapter::RpcEthClient};
use std::sync::Arc;
use std::time::Duration;
use swapperd_core::atom::{Atom, BtcAtom, EthAtom};
use swapperd_core::error::Result;
use swapperd_core::eth::OrderId;
use swapperd_core::rendezvous::RendezvousChannel;
use swapperd_core::state_machine::Swap;
use swapperd_core::store::SwapStore;
use swapperd_core::types::{now_unix, StatusUpdate, StepStatus, SwapID, Token};
use tokio::sync::broadcast;
use tokio::task::JoinSet;

/// A swap leg is one of the two chains this daemon understands, behind a
/// trait object so tests can substitute a fake without naming
/// `RpcBtcWallet`/`RpcEthClient` concretely.
pub type DaemonChain = Arc<dyn Atom>;
pub type DaemonSwap = Swap<DaemonChain, DaemonChain, dyn SwapStore, dyn RendezvousChannel>;

/// How often the refund sweep scans for expired, unresolved swaps. The
/// cadence itself is an implementation choice; a minute keeps the 24h
/// safety window comfortably precise.
const REFUND_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// Builds the per-swap `Chain` leg for whichever token the swap blob names
/// on that side. Every call derives its keys fresh from the swap's own
/// one-time `password`: nothing about a swap's keys is held across calls.
pub trait ChainFactory: Send + Sync {
    fn build(&self, token: Token, password: &str, order_seed: [u8; 32]) -> Result<DaemonChain>;

    /// The address this daemon would receive `token` funds at under
    /// `password`, posted via the rendezvous channel so the counterparty's
    /// `initiate` step can target it.
    fn own_address(&self, token: Token, password: &str) -> Result<String>;
}

pub struct Supervisor {
    store: Arc<dyn SwapStore>,
    rendezvous: Arc<dyn RendezvousChannel>,
    chain_factory: Arc<dyn ChainFactory>,
    status_tx: broadcast::Sender<StatusUpdate>,
    shutdown: tokio::sync::watch::Sender<bool>,
}

impl Supervisor {
    pub fn new(store: Arc<dyn SwapStore>, rendezvous: Arc<dyn RendezvousChannel>, chain_factory: Arc<dyn ChainFactory>) -> Self {
        let (status_tx, _) = broadcast::channel(256);
        let (shutdown, _) = tokio::sync::watch::channel(false);
        Self {
            store,
            rendezvous,
            chain_factory,
            status_tx,
            shutdown,
        }
    }

    pub fn subscribe_status(&self) -> broadcast::Receiver<StatusUpdate> {
        self.status_tx.subscribe()
    }

    pub fn signal_shutdown(&self) {
        let _ = self.shutdown.send(true);
    }

    /// Scan `pending_swaps` and launch one task per entry; new swaps
    /// arriving afterward go through [`Supervisor::start_swap`] directly.
    pub async fn run(self: Arc<Self>) -> Result<()> {
        let pending = self.store.list_pending_swaps().await?;
        let mut tasks = JoinSet::new();
        for blob in pending {
            let sup = self.clone();
            tasks.spawn(async move { sup.drive_swap(blob.id).await });
        }

        let mut refund_tick = tokio::time::interval(REFUND_SWEEP_INTERVAL);
        let mut shutdown_rx = self.shutdown.subscribe();
        loop {
            tokio::select! {
                _ = refund_tick.tick() => {
                    if let Err(e) = self.refund_sweep().await {
                        log::warn!(target: "supervisor", "refund sweep failed: {e}");
                    }
                }
                Some(result) = tasks.join_next(), if !tasks.is_empty() => {
                    if let Err(e) = result {
                        log::error!(target: "supervisor", "swap task panicked: {e}");
                    }
                }
                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        break;
                    }
                }
            }
        }
        Ok(())
    }

    /// Immediately start a newly-requested swap, bypassing the startup
    /// scan in [`Supervisor::run`].
    pub fn start_swap(self: &Arc<Self>, id: SwapID) {
        let sup = self.clone();
        tokio::spawn(async move {
            if let Err(e) = sup.drive_swap(id).await {
                log::error!(target: "supervisor", "swap {id} failed: {e}");
            }
        });
    }

    async fn drive_swap(&self, id: SwapID) -> Result<()> {
        let Some(blob) = self.store.get_pending_swap(id).await? else {
            return Ok(());
        };

        let personal = self.chain_factory.build(blob.send_token, &blob.password, id.0)?;
        let foreign = self.chain_factory.build(blob.receive_token, &blob.password, id.0)?;
        let own_address = self.chain_factory.own_address(blob.receive_token, &blob.password)?;
        let swap = Swap::new(personal, foreign, self.store.clone(), self.rendezvous.clone(), own_address);

        let status = swap.run(id).await?;
        let _ = self.status_tx.send(StatusUpdate { id, code: status });
        Ok(())
    }

    /// For any swap past its own expiry and not yet `Redeemed`, broadcast
    /// the stored refund tx (BTC) or call `refund(orderId)` (ETH), and
    /// transition to `Refunded`/`RefundFailed`. The Go original's
    /// `refund()` is a no-op; this sweep is the supervisor-level trigger
    /// in its place.
    async fn refund_sweep(&self) -> Result<()> {
        for blob in self.store.list_pending_swaps().await? {
            if blob.step.is_terminal() {
                continue;
            }
            let Some(expiry) = blob.expiry else { continue };
            if now_unix() < expiry {
                continue;
            }
            let Some(details) = blob.personal_contract.clone() else { continue };

            let personal = match self.chain_factory.build(blob.send_token, &blob.password, blob.id.0) {
                Ok(p) => p,
                Err(e) => {
                    log::error!(target: "supervisor", "failed to build chain leg for refund of swap {}: {e}", blob.id);
                    continue;
                }
            };
            let next_step = match personal.refund(&details).await {
                Ok(()) => StepStatus::Refunded,
                Err(e) => {
                    log::error!(target: "supervisor", "refund failed for swap {}: {e}", blob.id);
                    StepStatus::RefundFailed
                }
            };

            let mut blob = blob;
            blob.step = next_step;
            self.store.put_pending_swap(&blob).await?;
            if next_step.is_terminal() {
                self.store.delete_pending_swap(blob.id).await?;
            }
            let _ = self.status_tx.send(StatusUpdate { id: blob.id, code: next_step.status_code() });
        }
        Ok(())
    }
}

/// Default [`ChainFactory`]: holds only connection parameters, not key
/// material or a built wallet/client, so every swap gets keys and a fresh
/// RPC handle derived from its own password rather than one shared across
/// the daemon's lifetime.
pub struct DefaultChainFactory {
    pub mnemonic: String,
    pub btc_rpc_url: String,
    pub btc_network: bitcoin::Network,
    pub eth_rpc_url: String,
    pub eth_contract_address: String,
}

impl ChainFactory for DefaultChainFactory {
    fn build(&self, token: Token, password: &str, order_seed: [u8; 32]) -> Result<DaemonChain> {
        match token {
            Token::Btc => {
                let keypair = swapperd_core::keys::derive_btc_keypair(&self.mnemonic, password, self.btc_network)?;
                let wallet = Arc::new(RpcBtcWallet::new(keypair.secret_key, self.btc_rpc_url.clone(), self.btc_network));
                Ok(Arc::new(BtcAtom { wallet, network: self.btc_network }))
            }
            Token::Eth | Token::Wbtc => {
                let keypair = swapperd_core::keys::derive_eth_keypair(&self.mnemonic, password)?;
                let client = Arc::new(RpcEthClient::new(
                    self.eth_rpc_url.clone(),
                    self.eth_contract_address.clone(),
                    hex::encode(keypair.public_key.serialize()),
                ));
                Ok(Arc::new(EthAtom { client, order_id: OrderId(order_seed) }))
            }
        }
    }

    fn own_address(&self, token: Token, password: &str) -> Result<String> {
        match token {
            Token::Btc => {
                use bitcoin::hashes::Hash;
                let keypair = swapperd_core::keys::derive_btc_keypair(&self.mnemonic, password, self.btc_network)?;
                let secp = bitcoin::key::Secp256k1::new();
                let public_key = bitcoin::PublicKey::new(keypair.secret_key.public_key(&secp));
                Ok(hex::encode(public_key.pubkey_hash().to_byte_array()))
            }
            Token::Eth | Token::Wbtc => {
                let keypair = swapperd_core::keys::derive_eth_keypair(&self.mnemonic, password)?;
                Ok(hex::encode(keypair.public_key.serialize()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, Ordering};
    use swapperd_core::store::memory::MemoryStore;
    use swapperd_core::types::SwapBlob;

    /// An `Atom` whose `refund` flips a flag instead of touching a chain.
    struct RefundingAtom {
        refunded: Arc<AtomicBool>,
    }

    #[async_trait]
    impl Atom for RefundingAtom {
        async fn initiate(&self, _to: &str, _secret_hash: [u8; 32], _value: rust_decimal::Decimal, _expiry: i64) -> Result<swapperd_core::types::AtomContractDetails> {
            unreachable!("refund sweep never initiates")
        }

        async fn audit(&self, _details: &swapperd_core::types::AtomContractDetails, _expected_to: &str, _min_value: rust_decimal::Decimal) -> Result<(u64, [u8; 32])> {
            unreachable!("refund sweep never audits")
        }

        async fn redeem(&self, _details: &swapperd_core::types::AtomContractDetails, _secret: [u8; 32]) -> Result<()> {
            unreachable!("refund sweep never redeems")
        }

        async fn refund(&self, _details: &swapperd_core::types::AtomContractDetails) -> Result<()> {
            self.refunded.store(true, Ordering::SeqCst);
            Ok(())
        }

        async fn audit_secret(&self, _details: &swapperd_core::types::AtomContractDetails) -> Result<[u8; 32]> {
            unreachable!("refund sweep never waits on the secret")
        }

        fn priority_code(&self) -> u8 {
            0
        }
    }

    struct RefundingChainFactory {
        refunded: Arc<AtomicBool>,
    }

    impl ChainFactory for RefundingChainFactory {
        fn build(&self, _token: Token, _password: &str, _order_seed: [u8; 32]) -> Result<DaemonChain> {
            Ok(Arc::new(RefundingAtom { refunded: self.refunded.clone() }))
        }

        fn own_address(&self, _token: Token, _password: &str) -> Result<String> {
            unreachable!("refund sweep never needs an own address")
        }
    }

    struct NullRendezvous;

    #[async_trait]
    impl RendezvousChannel for NullRendezvous {
        async fn send_owner_address(&self, _id: SwapID, _from_requestor: bool, _addr: &str) -> Result<()> {
            unreachable!()
        }
        async fn receive_owner_address(&self, _id: SwapID, _from_requestor: bool, _deadline: i64) -> Result<String> {
            unreachable!()
        }
        async fn send_swap_details(&self, _id: SwapID, _from_requestor: bool, _bytes: &[u8]) -> Result<()> {
            unreachable!()
        }
        async fn receive_swap_details(&self, _id: SwapID, _from_requestor: bool, _deadline: i64) -> Result<Vec<u8>> {
            unreachable!()
        }
    }

    fn expired_blob(id: SwapID) -> SwapBlob {
        SwapBlob {
            id,
            send_token: Token::Btc,
            receive_token: Token::Eth,
            send_amount: "1000".into(),
            receive_amount: "1".into(),
            send_to: "alice_btc".into(),
            receive_from: "bob_eth".into(),
            secret_hash: None,
            time_lock: None,
            should_initiate_first: true,
            password: "test-password".into(),
            step: StepStatus::Audited,
            secret: None,
            personal_contract: Some(swapperd_core::types::AtomContractDetails::Btc {
                contract_script: vec![],
                contract_address: "bc1qexpired".into(),
                contract_tx: vec![],
                refund_tx: vec![],
                txid: "0".repeat(64),
            }),
            foreign_contract: None,
            expiry: Some(now_unix() - 3600),
        }
    }

    #[tokio::test]
    async fn refund_sweep_refunds_expired_non_terminal_swaps() {
        let store: Arc<dyn SwapStore> = Arc::new(MemoryStore::new());
        let id = SwapID::generate();
        store.put_pending_swap(&expired_blob(id)).await.unwrap();

        let refunded = Arc::new(AtomicBool::new(false));
        let factory = Arc::new(RefundingChainFactory { refunded: refunded.clone() });

        let sup = Supervisor::new(store, Arc::new(NullRendezvous), factory);

        sup.refund_sweep().await.unwrap();

        assert!(refunded.load(Ordering::SeqCst), "refund was never invoked on the expired swap");
    }
}
