//! ETH-side HTLC support: a five-operation interface. The on-chain
//! contract itself is out of scope here; the client only needs to satisfy
//! this trait. Grounded on the BTC adapter's shape
//! (`btc::contract::BtcWalletRpc`) carried over to the account-chain side.

use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// A handle identifying one HTLC order on the ETH-side contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct OrderId(pub [u8; 32]);

/// What `audit` reads back from the chain-side HTLC contract for a given
/// order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EthAuditResult {
    pub secret_hash: [u8; 32],
    pub to: String,
    pub value: rust_decimal::Decimal,
    pub expiry: i64,
}

/// The five operations the state machine needs from the ETH-side HTLC
/// contract. Production implementations drive this over a
/// JSON-RPC client against a deployed contract; tests use an in-memory
/// double.
#[async_trait]
pub trait EthHtlcClient: Send + Sync {
    /// Deploy/invoke the HTLC, locking `value` to `to`, redeemable with the
    /// preimage of `secret_hash` until `expiry`.
    async fn initiate(&self, order_id: OrderId, to: &str, secret_hash: [u8; 32], value: rust_decimal::Decimal, expiry: i64) -> Result<()>;

    /// Redeem the HTLC with `secret`, paying the configured recipient.
    async fn redeem(&self, order_id: OrderId, secret: [u8; 32]) -> Result<()>;

    /// Reclaim the locked value after `expiry` has passed.
    async fn refund(&self, order_id: OrderId) -> Result<()>;

    /// Read back the on-chain contract state for `order_id`.
    async fn audit(&self, order_id: OrderId) -> Result<EthAuditResult>;

    /// Recover the preimage once the HTLC has been redeemed.
    async fn audit_secret(&self, order_id: OrderId) -> Result<[u8; 32]>;
}
