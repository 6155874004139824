//! Chain-agnostic swap leg: a closed `Chain` variant plus the capability
//! trait the state machine drives (design note: "Role dispatch via
//! sum type, not inheritance").

use crate::btc::BtcWalletRpc;
use crate::error::Result;
use crate::eth::{EthHtlcClient, OrderId};
use crate::types::AtomContractDetails;
use async_trait::async_trait;
use std::sync::Arc;

/// Capability every chain leg of a swap provides to the state machine,
/// independent of which chain it runs on.
#[async_trait]
pub trait Atom: Send + Sync {
    /// Lock `send_value` to the counterparty, redeemable with the preimage
    /// of `secret_hash` until `expiry`.
    async fn initiate(&self, to: &str, secret_hash: [u8; 32], value: rust_decimal::Decimal, expiry: i64) -> Result<AtomContractDetails>;

    /// Inspect the already-published contract for this leg and verify it
    /// matches the expected counterparty, value, and expiry.
    async fn audit(&self, details: &AtomContractDetails, expected_to: &str, min_value: rust_decimal::Decimal) -> Result<(u64, [u8; 32])>;

    /// Redeem the contract with `secret`.
    async fn redeem(&self, details: &AtomContractDetails, secret: [u8; 32]) -> Result<()>;

    /// Reclaim funds after expiry.
    async fn refund(&self, details: &AtomContractDetails) -> Result<()>;

    /// Block until the contract has been spent, returning the revealed
    /// secret.
    async fn audit_secret(&self, details: &AtomContractDetails) -> Result<[u8; 32]>;

    /// A value used only to break the tie between two legs of the same
    /// swap and derive which side is the requestor ("Role
    /// disjointness"): the leg with the lower priority code acts first.
    fn priority_code(&self) -> u8;
}

/// Parse a base58 P2PKH address string and extract its pubkey hash,
/// rejecting anything that is not a plain P2PKH output (the only address
/// shape the contract script supports for either party).
fn pubkey_hash_of_address(addr: &str, network: bitcoin::Network) -> Result<bitcoin::PubkeyHash> {
    use crate::error::Error;
    use bitcoin::hashes::Hash;

    let unchecked: bitcoin::Address<bitcoin::address::NetworkUnchecked> = addr
        .parse()
        .map_err(|e| Error::Parse(format!("invalid btc address {addr}: {e}")))?;
    let address = unchecked
        .require_network(network)
        .map_err(|e| Error::Parse(format!("address network mismatch: {e}")))?;
    let script = address.script_pubkey();
    if !script.is_p2pkh() {
        return Err(Error::Parse("address must be P2PKH".into()));
    }
    let bytes = script.as_bytes();
    // OP_DUP OP_HASH160 <push 20> <20 bytes> OP_EQUALVERIFY OP_CHECKSIG
    let hash_bytes: [u8; 20] = bytes[3..23]
        .try_into()
        .map_err(|_| Error::Parse("malformed p2pkh script".into()))?;
    Ok(bitcoin::PubkeyHash::from_byte_array(hash_bytes))
}

/// BTC leg of a swap, backed by a wallet/RPC implementation.
pub struct BtcAtom<W> {
    pub wallet: Arc<W>,
    pub network: bitcoin::Network,
}

#[async_trait]
impl<W: BtcWalletRpc + 'static> Atom for BtcAtom<W> {
    async fn initiate(&self, to: &str, secret_hash: [u8; 32], value: rust_decimal::Decimal, expiry: i64) -> Result<AtomContractDetails> {
        use crate::error::Error;
        let counterparty_pkh = pubkey_hash_of_address(to, self.network)?;
        let amount = bitcoin::Amount::from_sat(
            value
                .to_string()
                .parse::<u64>()
                .map_err(|_| Error::Parse("value is not an integer satoshi amount".into()))?,
        );
        crate::btc::contract::initiate(self.wallet.as_ref(), counterparty_pkh, amount, secret_hash, expiry, self.network).await
    }

    async fn audit(&self, details: &AtomContractDetails, expected_to: &str, min_value: rust_decimal::Decimal) -> Result<(u64, [u8; 32])> {
        use crate::error::Error;
        let AtomContractDetails::Btc { contract_script, contract_tx, .. } = details else {
            return Err(Error::Parse("expected BTC contract details".into()));
        };
        let script = bitcoin::ScriptBuf::from_bytes(contract_script.clone());
        let tx: bitcoin::Transaction = bitcoin::consensus::deserialize(contract_tx)
            .map_err(|e| Error::Bitcoin(format!("failed to decode contract tx: {e}")))?;
        let (pushes, _address, amount) = crate::btc::contract::read(&script, &tx, self.network)?;

        use bitcoin::hashes::Hash;
        let expected_pkh = pubkey_hash_of_address(expected_to, self.network)?;
        if expected_pkh.to_byte_array() != pushes.recipient_hash160 {
            return Err(Error::AuditFailed(crate::complaint::Complaint::WrongResponderInitiation(
                "recipient hash160 mismatch".into(),
            )));
        }
        if amount.to_sat() < min_value.to_string().parse::<u64>().unwrap_or(u64::MAX) {
            return Err(Error::AuditFailed(crate::complaint::Complaint::WrongResponderInitiation(
                "value below agreed minimum".into(),
            )));
        }
        Ok((pushes.lock_time as u64, pushes.secret_hash))
    }

    async fn redeem(&self, details: &AtomContractDetails, secret: [u8; 32]) -> Result<()> {
        use crate::error::Error;
        let AtomContractDetails::Btc { contract_script, contract_tx, .. } = details else {
            return Err(Error::Parse("expected BTC contract details".into()));
        };
        let script = bitcoin::ScriptBuf::from_bytes(contract_script.clone());
        let tx: bitcoin::Transaction = bitcoin::consensus::deserialize(contract_tx)
            .map_err(|e| Error::Bitcoin(format!("failed to decode contract tx: {e}")))?;
        crate::btc::contract::redeem(self.wallet.as_ref(), &script, &tx, secret).await?;
        Ok(())
    }

    async fn refund(&self, details: &AtomContractDetails) -> Result<()> {
        use crate::error::Error;
        let AtomContractDetails::Btc { refund_tx, .. } = details else {
            return Err(Error::Parse("expected BTC contract details".into()));
        };
        let tx: bitcoin::Transaction = bitcoin::consensus::deserialize(refund_tx)
            .map_err(|e| Error::Bitcoin(format!("failed to decode refund tx: {e}")))?;
        crate::btc::contract::refund(self.wallet.as_ref(), &tx).await?;
        Ok(())
    }

    async fn audit_secret(&self, details: &AtomContractDetails) -> Result<[u8; 32]> {
        use crate::error::Error;
        let AtomContractDetails::Btc { contract_script, contract_tx, .. } = details else {
            return Err(Error::Parse("expected BTC contract details".into()));
        };
        let script = bitcoin::ScriptBuf::from_bytes(contract_script.clone());
        let pushes = crate::btc::script::extract_atomic_swap_data_pushes(&script)
            .ok_or_else(|| Error::Bitcoin("contract is not a recognized atomic swap script".into()))?;
        let tx: bitcoin::Transaction = bitcoin::consensus::deserialize(contract_tx)
            .map_err(|e| Error::Bitcoin(format!("failed to decode contract tx: {e}")))?;
        let txid = tx.compute_txid();
        let redeem_tx = self.wallet.fetch_transaction(&txid).await?;
        crate::btc::contract::extract_secret(&redeem_tx, 0, pushes.secret_hash)
    }

    fn priority_code(&self) -> u8 {
        0
    }
}

/// ETH leg of a swap, backed by an [`EthHtlcClient`] implementation.
pub struct EthAtom<C> {
    pub client: Arc<C>,
    pub order_id: OrderId,
}

#[async_trait]
impl<C: EthHtlcClient + 'static> Atom for EthAtom<C> {
    async fn initiate(&self, to: &str, secret_hash: [u8; 32], value: rust_decimal::Decimal, expiry: i64) -> Result<AtomContractDetails> {
        self.client.initiate(self.order_id, to, secret_hash, value, expiry).await?;
        Ok(AtomContractDetails::Eth {
            order_id: self.order_id.0,
            sender_address: to.to_string(),
        })
    }

    async fn audit(&self, _details: &AtomContractDetails, expected_to: &str, min_value: rust_decimal::Decimal) -> Result<(u64, [u8; 32])> {
        use crate::error::Error;
        let audit = self.client.audit(self.order_id).await?;
        if audit.to != expected_to {
            return Err(Error::AuditFailed(crate::complaint::Complaint::WrongResponderInitiation(
                "recipient address mismatch".into(),
            )));
        }
        if audit.value < min_value {
            return Err(Error::AuditFailed(crate::complaint::Complaint::WrongResponderInitiation(
                "value below agreed minimum".into(),
            )));
        }
        Ok((audit.expiry as u64, audit.secret_hash))
    }

    async fn redeem(&self, _details: &AtomContractDetails, secret: [u8; 32]) -> Result<()> {
        self.client.redeem(self.order_id, secret).await
    }

    async fn refund(&self, _details: &AtomContractDetails) -> Result<()> {
        self.client.refund(self.order_id).await
    }

    async fn audit_secret(&self, _details: &AtomContractDetails) -> Result<[u8; 32]> {
        self.client.audit_secret(self.order_id).await
    }

    fn priority_code(&self) -> u8 {
        1
    }
}

#[async_trait]
impl Atom for Arc<dyn Atom> {
    async fn initiate(&self, to: &str, secret_hash: [u8; 32], value: rust_decimal::Decimal, expiry: i64) -> Result<AtomContractDetails> {
        (**self).initiate(to, secret_hash, value, expiry).await
    }

    async fn audit(&self, details: &AtomContractDetails, expected_to: &str, min_value: rust_decimal::Decimal) -> Result<(u64, [u8; 32])> {
        (**self).audit(details, expected_to, min_value).await
    }

    async fn redeem(&self, details: &AtomContractDetails, secret: [u8; 32]) -> Result<()> {
        (**self).redeem(details, secret).await
    }

    async fn refund(&self, details: &AtomContractDetails) -> Result<()> {
        (**self).refund(details).await
    }

    async fn audit_secret(&self, details: &AtomContractDetails) -> Result<[u8; 32]> {
        (**self).audit_secret(details).await
    }

    fn priority_code(&self) -> u8 {
        (**self).priority_code()
    }
}

/// The closed variant of chains a swap leg can run on.
pub enum Chain<B, E> {
    Btc(BtcAtom<B>),
    Eth(EthAtom<E>),
}

#[async_trait]
impl<B: BtcWalletRpc + 'static, E: EthHtlcClient + 'static> Atom for Chain<B, E> {
    async fn initiate(&self, to: &str, secret_hash: [u8; 32], value: rust_decimal::Decimal, expiry: i64) -> Result<AtomContractDetails> {
        match self {
            Chain::Btc(a) => a.initiate(to, secret_hash, value, expiry).await,
            Chain::Eth(a) => a.initiate(to, secret_hash, value, expiry).await,
        }
    }

    async fn audit(&self, details: &AtomContractDetails, expected_to: &str, min_value: rust_decimal::Decimal) -> Result<(u64, [u8; 32])> {
        match self {
            Chain::Btc(a) => a.audit(details, expected_to, min_value).await,
            Chain::Eth(a) => a.audit(details, expected_to, min_value).await,
        }
    }

    async fn redeem(&self, details: &AtomContractDetails, secret: [u8; 32]) -> Result<()> {
        match self {
            Chain::Btc(a) => a.redeem(details, secret).await,
            Chain::Eth(a) => a.redeem(details, secret).await,
        }
    }

    async fn refund(&self, details: &AtomContractDetails) -> Result<()> {
        match self {
            Chain::Btc(a) => a.refund(details).await,
            Chain::Eth(a) => a.refund(details).await,
        }
    }

    async fn audit_secret(&self, details: &AtomContractDetails) -> Result<[u8; 32]> {
        match self {
            Chain::Btc(a) => a.audit_secret(details).await,
            Chain::Eth(a) => a.audit_secret(details).await,
        }
    }

    fn priority_code(&self) -> u8 {
        match self {
            Chain::Btc(a) => a.priority_code(),
            Chain::Eth(a) => a.priority_code(),
        }
    }
}
