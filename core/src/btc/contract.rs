//! BTC-side HTLC lifecycle: initiate, redeem, refund, read,
//! grounded on `adapters/btc/btc_bindings.go`'s `initiate`/`redeem`/
//! `refund`/`read`.
//!
//! The wallet/chain access needed to build and broadcast transactions is
//! abstracted behind [`BtcWalletRpc`] so this module stays testable without
//! a running node, the same separation the Go original draws between
//! `btc_bindings.go` and its `Connection` plumbing.

use crate::btc::script::{self, AtomicSwapDataPushes};
use crate::error::{Error, Result};
use crate::types::AtomContractDetails;
use async_trait::async_trait;
use bitcoin::hashes::Hash;
use bitcoin::{Address, Amount, OutPoint, PubkeyHash, ScriptBuf, Transaction, Txid};
use sha2::{Digest, Sha256};

/// Everything the BTC contract layer needs from a wallet/node, kept
/// intentionally narrow so production and test doubles both stay small.
#[async_trait]
pub trait BtcWalletRpc: Send + Sync {
    /// This wallet's signing pubkey hash, used as the refund/recipient
    /// identity in constructed contracts.
    fn pubkey_hash(&self) -> PubkeyHash;

    /// Build, sign and return a funding transaction paying `amount` to
    /// `contract_script`'s P2SH address, without broadcasting it.
    async fn build_contract_tx(&self, contract_script: &ScriptBuf, amount: Amount) -> Result<Transaction>;

    /// Sign an input spending `prevout_script` at `outpoint`, returning a
    /// DER-encoded signature and the corresponding serialized pubkey.
    async fn sign_input(
        &self,
        tx: &Transaction,
        input_index: usize,
        prevout_script: &ScriptBuf,
    ) -> Result<(Vec<u8>, Vec<u8>)>;

    /// Broadcast a fully-signed transaction and return its txid.
    async fn broadcast(&self, tx: &Transaction) -> Result<Txid>;

    /// Fetch a previously broadcast transaction by txid.
    async fn fetch_transaction(&self, txid: &Txid) -> Result<Transaction>;
}

/// Build the contract funding transaction and its matching pre-signed
/// refund transaction, locked to `locktime`, then broadcast the funding
/// transaction. Mirrors `initiate()`.
pub async fn initiate(
    wallet: &dyn BtcWalletRpc,
    counterparty_pkh: PubkeyHash,
    amount: Amount,
    secret_hash: [u8; 32],
    locktime: i64,
    network: bitcoin::Network,
) -> Result<AtomContractDetails> {
    let my_pkh = wallet.pubkey_hash();
    let contract_script = script::atomic_swap_contract(&my_pkh, &counterparty_pkh, locktime, &secret_hash);
    let contract_address = Address::p2sh(&contract_script, network)
        .map_err(|e| Error::Bitcoin(format!("failed to derive P2SH address: {e}")))?;

    let contract_tx = wallet.build_contract_tx(&contract_script, amount).await?;
    let txid = wallet.broadcast(&contract_tx).await?;

    let refund_tx = build_refund(wallet, &contract_script, &contract_tx, locktime).await?;

    Ok(AtomContractDetails::Btc {
        contract_script: contract_script.into_bytes(),
        contract_address: contract_address.to_string(),
        contract_tx: bitcoin::consensus::encode::serialize(&contract_tx),
        refund_tx: bitcoin::consensus::encode::serialize(&refund_tx),
        txid: txid.to_string(),
    })
}

fn find_contract_output(contract_script: &ScriptBuf, tx: &Transaction) -> Result<usize> {
    let contract_hash = bitcoin::hashes::hash160::Hash::hash(contract_script.as_bytes());
    let script_hash = bitcoin::ScriptHash::from_raw_hash(contract_hash);
    let expected_script_pubkey = ScriptBuf::new_p2sh(&script_hash);
    tx.output
        .iter()
        .position(|out| out.script_pubkey == expected_script_pubkey)
        .ok_or_else(|| Error::Bitcoin("transaction does not contain a contract output".into()))
}

/// Build (but do not broadcast) the refund transaction, locktime-gated to
/// `locktime`, spending the contract output back to this wallet.
async fn build_refund(
    wallet: &dyn BtcWalletRpc,
    contract_script: &ScriptBuf,
    contract_tx: &Transaction,
    locktime: i64,
) -> Result<Transaction> {
    let contract_out = find_contract_output(contract_script, contract_tx)?;
    let my_pkh = wallet.pubkey_hash();
    let refund_script = bitcoin::ScriptBuf::new_p2pkh(&my_pkh);

    let mut refund_tx = Transaction {
        version: bitcoin::transaction::Version(2),
        lock_time: bitcoin::absolute::LockTime::from_consensus(locktime.max(0) as u32),
        input: vec![bitcoin::TxIn {
            previous_output: OutPoint {
                txid: contract_tx.compute_txid(),
                vout: contract_out as u32,
            },
            script_sig: ScriptBuf::new(),
            sequence: bitcoin::Sequence::ENABLE_LOCKTIME_NO_RBF,
            witness: bitcoin::Witness::new(),
        }],
        output: vec![bitcoin::TxOut {
            value: contract_tx.output[contract_out].value,
            script_pubkey: refund_script,
        }],
    };

    let (sig, pubkey) = wallet.sign_input(&refund_tx, 0, contract_script).await?;
    let sig_script = script::refund_p2sh_contract(contract_script, &sig, &pubkey);
    refund_tx.input[0].script_sig = sig_script;

    script::verify_spend(&refund_tx, 0, &contract_tx.output[contract_out].script_pubkey, contract_tx.output[contract_out].value)?;

    Ok(refund_tx)
}

/// Spend the contract output with the secret, paying the recipient's
/// wallet. Mirrors `redeem()`.
pub async fn redeem(
    wallet: &dyn BtcWalletRpc,
    contract_script: &ScriptBuf,
    contract_tx: &Transaction,
    secret: [u8; 32],
) -> Result<Transaction> {
    let pushes = script::extract_atomic_swap_data_pushes(contract_script)
        .ok_or_else(|| Error::Bitcoin("contract is not a recognized atomic swap script".into()))?;
    let contract_out = find_contract_output(contract_script, contract_tx)?;

    let recipient_script = bitcoin::ScriptBuf::new_p2pkh(&PubkeyHash::from_byte_array(pushes.recipient_hash160));

    let mut redeem_tx = Transaction {
        version: bitcoin::transaction::Version(2),
        lock_time: bitcoin::absolute::LockTime::ZERO,
        input: vec![bitcoin::TxIn {
            previous_output: OutPoint {
                txid: contract_tx.compute_txid(),
                vout: contract_out as u32,
            },
            script_sig: ScriptBuf::new(),
            sequence: bitcoin::Sequence::MAX,
            witness: bitcoin::Witness::new(),
        }],
        output: vec![bitcoin::TxOut {
            value: contract_tx.output[contract_out].value,
            script_pubkey: recipient_script,
        }],
    };

    let (sig, pubkey) = wallet.sign_input(&redeem_tx, 0, contract_script).await?;
    let sig_script = script::redeem_p2sh_contract(contract_script, &sig, &pubkey, &secret);
    redeem_tx.input[0].script_sig = sig_script;

    script::verify_spend(&redeem_tx, 0, &contract_tx.output[contract_out].script_pubkey, contract_tx.output[contract_out].value)?;

    wallet.broadcast(&redeem_tx).await?;
    Ok(redeem_tx)
}

/// Broadcast the pre-signed refund transaction captured at initiate time.
/// Unlike the Go original, where `refund()` is a stub that never actually
/// broadcasts, the refund transaction here is always broadcast once its
/// locktime has passed.
pub async fn refund(wallet: &dyn BtcWalletRpc, refund_tx: &Transaction) -> Result<Txid> {
    wallet.broadcast(refund_tx).await
}

/// Recover the on-chain contract parameters from a funding transaction and
/// its redeem script, the data an auditor checks against the out-of-band
/// swap details. Mirrors `read()`.
pub fn read(contract_script: &ScriptBuf, contract_tx: &Transaction, network: bitcoin::Network) -> Result<(AtomicSwapDataPushes, Address, Amount)> {
    let pushes = script::extract_atomic_swap_data_pushes(contract_script)
        .ok_or_else(|| Error::Bitcoin("contract is not a recognized atomic swap script".into()))?;
    let contract_out = find_contract_output(contract_script, contract_tx)?;
    let contract_address = Address::p2sh(contract_script, network)
        .map_err(|e| Error::Bitcoin(format!("failed to derive P2SH address: {e}")))?;
    let value = contract_tx.output[contract_out].value;
    Ok((pushes, contract_address, value))
}

/// Extract the preimage from a redeeming transaction's scriptSig, the way
/// the responder learns the secret once the requestor redeems. Scans every
/// push rather than assuming a fixed scriptSig layout, and only accepts a
/// push whose hash matches `secret_hash` as the secret.
pub fn extract_secret(redeem_tx: &Transaction, input_index: usize, secret_hash: [u8; 32]) -> Result<[u8; 32]> {
    let script_sig = &redeem_tx.input.get(input_index)
        .ok_or_else(|| Error::Bitcoin("redeem tx has no such input".into()))?
        .script_sig;

    script_sig
        .instructions()
        .filter_map(|i| match i {
            Ok(bitcoin::blockdata::script::Instruction::PushBytes(b)) if b.len() == 32 => Some(b.as_bytes().to_vec()),
            _ => None,
        })
        .find(|push| Sha256::digest(push).as_slice() == secret_hash)
        .map(|s| {
            let mut out = [0u8; 32];
            out.copy_from_slice(&s);
            out
        })
        .ok_or_else(|| Error::Bitcoin("scriptSig contains no push matching the secret hash".into()))
}
