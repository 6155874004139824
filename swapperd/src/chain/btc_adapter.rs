//! Production `BtcWalletRpc`: signs with a locally-held key and talks to a
//! bitcoind-compatible JSON-RPC endpoint for broadcast/fetch, grounded on
//! the Go original's `Connection` (`adapters/btc/btc_bindings.go`) split
//! between script logic and node access.

use async_trait::async_trait;
use bitcoin::hashes::Hash;
use bitcoin::key::Secp256k1;
use bitcoin::secp256k1::{Message, SecretKey};
use bitcoin::sighash::{EcdsaSighashType, SighashCache};
use bitcoin::{Amount, PubkeyHash, PublicKey, Transaction, Txid};
use serde_json::json;
use swapperd_core::btc::BtcWalletRpc;
use swapperd_core::error::{Error, Result};

pub struct RpcBtcWallet {
    secret_key: SecretKey,
    public_key: PublicKey,
    rpc_url: String,
    network: bitcoin::Network,
    client: reqwest::Client,
}

impl RpcBtcWallet {
    pub fn new(secret_key: SecretKey, rpc_url: impl Into<String>, network: bitcoin::Network) -> Self {
        let secp = Secp256k1::new();
        let public_key = PublicKey::new(secret_key.public_key(&secp));
        Self {
            secret_key,
            public_key,
            rpc_url: rpc_url.into(),
            network,
            client: reqwest::Client::new(),
        }
    }

    async fn call(&self, method: &str, params: serde_json::Value) -> Result<serde_json::Value> {
        let body = json!({ "jsonrpc": "1.0", "id": "swapperd", "method": method, "params": params });
        let resp: serde_json::Value = self
            .client
            .post(&self.rpc_url)
            .json(&body)
            .send()
            .await
            .map_err(|e| Error::Rpc(e.to_string()))?
            .json()
            .await
            .map_err(|e| Error::Rpc(e.to_string()))?;
        if let Some(err) = resp.get("error").filter(|e| !e.is_null()) {
            return Err(Error::Rpc(err.to_string()));
        }
        Ok(resp["result"].clone())
    }
}

#[async_trait]
impl BtcWalletRpc for RpcBtcWallet {
    fn pubkey_hash(&self) -> PubkeyHash {
        self.public_key.pubkey_hash()
    }

    async fn build_contract_tx(&self, contract_script: &bitcoin::ScriptBuf, amount: Amount) -> Result<Transaction> {
        let contract_address = bitcoin::Address::p2sh(contract_script, self.network)
            .map_err(|e| Error::Bitcoin(format!("failed to derive P2SH address: {e}")))?;
        let mut outputs = serde_json::Map::new();
        outputs.insert(contract_address.to_string(), json!(amount.to_btc()));
        let raw_hex = self
            .call("createrawtransaction", json!([Vec::<serde_json::Value>::new(), outputs]))
            .await?;
        let funded = self
            .call("fundrawtransaction", json!([raw_hex]))
            .await?;
        let funded_hex = funded["hex"].as_str().ok_or_else(|| Error::Rpc("fundrawtransaction returned no hex".into()))?;
        let signed = self.call("signrawtransactionwithwallet", json!([funded_hex])).await?;
        let signed_hex = signed["hex"].as_str().ok_or_else(|| Error::Rpc("signrawtransactionwithwallet returned no hex".into()))?;
        let bytes = hex::decode(signed_hex).map_err(|e| Error::Rpc(e.to_string()))?;
        bitcoin::consensus::deserialize(&bytes).map_err(|e| Error::Bitcoin(e.to_string()))
    }

    async fn sign_input(&self, tx: &Transaction, input_index: usize, prevout_script: &bitcoin::ScriptBuf) -> Result<(Vec<u8>, Vec<u8>)> {
        let secp = Secp256k1::new();
        let mut cache = SighashCache::new(tx);
        let sighash = cache
            .legacy_signature_hash(input_index, prevout_script, EcdsaSighashType::All.to_u32())
            .map_err(|e| Error::Bitcoin(e.to_string()))?;
        let message = Message::from_digest(sighash.to_byte_array());
        let signature = secp.sign_ecdsa(&message, &self.secret_key);
        let mut sig_bytes = signature.serialize_der().to_vec();
        sig_bytes.push(EcdsaSighashType::All as u8);
        Ok((sig_bytes, self.public_key.to_bytes()))
    }

    async fn broadcast(&self, tx: &Transaction) -> Result<Txid> {
        let hex_tx = hex::encode(bitcoin::consensus::encode::serialize(tx));
        let result = self.call("sendrawtransaction", json!([hex_tx])).await?;
        result
            .as_str()
            .and_then(|s| s.parse().ok())
            .ok_or_else(|| Error::Rpc("sendrawtransaction returned no txid".into()))
    }

    async fn fetch_transaction(&self, txid: &Txid) -> Result<Transaction> {
        let result = self.call("getrawtransaction", json!([txid.to_string()])).await?;
        let hex_tx = result.as_str().ok_or_else(|| Error::Rpc("getrawtransaction returned no data".into()))?;
        let bytes = hex::decode(hex_tx).map_err(|e| Error::Rpc(e.to_string()))?;
        bitcoin::consensus::deserialize(&bytes).map_err(|e| Error::Bitcoin(e.to_string()))
    }
}
