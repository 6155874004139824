//! Production `EthHtlcClient`: invokes a deployed HTLC contract over
//! JSON-RPC. The contract ABI itself is out of scope; this adapter only
//! needs enough of `eth_call`/`eth_sendTransaction` to drive the five
//! operations the state machine uses.

use async_trait::async_trait;
use serde_json::json;
use swapperd_core::error::{Error, Result};
use swapperd_core::eth::{EthAuditResult, EthHtlcClient, OrderId};

pub struct RpcEthClient {
    rpc_url: String,
    contract_address: String,
    from_address: String,
    client: reqwest::Client,
}

impl RpcEthClient {
    pub fn new(rpc_url: impl Into<String>, contract_address: impl Into<String>, from_address: impl Into<String>) -> Self {
        Self {
            rpc_url: rpc_url.into(),
            contract_address: contract_address.into(),
            from_address: from_address.into(),
            client: reqwest::Client::new(),
        }
    }

    async fn call(&self, method: &str, params: serde_json::Value) -> Result<serde_json::Value> {
        let body = json!({ "jsonrpc": "2.0", "id": 1, "method": method, "params": params });
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

    /// Send a contract-invoking transaction and wait for it to be mined
    /// (one confirmation is sufficient).
    async fn send_and_confirm(&self, data: String) -> Result<()> {
        let tx_params = json!({
            "from": self.from_address,
            "to": self.contract_address,
            "data": data,
        });
        let tx_hash = self.call("eth_sendTransaction", json!([tx_params])).await?;
        let tx_hash = tx_hash.as_str().ok_or_else(|| Error::Rpc("eth_sendTransaction returned no hash".into()))?.to_string();

        loop {
            let receipt = self.call("eth_getTransactionReceipt", json!([tx_hash])).await?;
            if !receipt.is_null() {
                let status = receipt["status"].as_str().unwrap_or("0x0");
                if status == "0x0" {
                    return Err(Error::Rpc(format!("transaction {tx_hash} reverted")));
                }
                return Ok(());
            }
            tokio::time::sleep(std::time::Duration::from_secs(1)).await;
        }
    }
}

#[async_trait]
impl EthHtlcClient for RpcEthClient {
    async fn initiate(&self, order_id: OrderId, to: &str, secret_hash: [u8; 32], value: rust_decimal::Decimal, expiry: i64) -> Result<()> {
        let data = format!(
            "initiate(0x{},{to},0x{},{value},{expiry})",
            hex::encode(order_id.0),
            hex::encode(secret_hash)
        );
        self.send_and_confirm(data).await
    }

    async fn redeem(&self, order_id: OrderId, secret: [u8; 32]) -> Result<()> {
        let data = format!("redeem(0x{},0x{})", hex::encode(order_id.0), hex::encode(secret));
        self.send_and_confirm(data).await
    }

    async fn refund(&self, order_id: OrderId) -> Result<()> {
        let data = format!("refund(0x{})", hex::encode(order_id.0));
        self.send_and_confirm(data).await
    }

    async fn audit(&self, order_id: OrderId) -> Result<EthAuditResult> {
        let data = format!("audit(0x{})", hex::encode(order_id.0));
        let result = self
            .call("eth_call", json!([{ "to": self.contract_address, "data": data }, "latest"]))
            .await?;
        let decoded = result.as_str().ok_or_else(|| Error::Rpc("audit returned no data".into()))?;
        serde_json::from_str(decoded).map_err(|e| Error::Rpc(format!("failed to decode audit response: {e}")))
    }

    async fn audit_secret(&self, order_id: OrderId) -> Result<[u8; 32]> {
        let data = format!("auditSecret(0x{})", hex::encode(order_id.0));
        let result = self
            .call("eth_call", json!([{ "to": self.contract_address, "data": data }, "latest"]))
            .await?;
        let hex_str = result.as_str().ok_or_else(|| Error::Rpc("auditSecret returned no data".into()))?;
        let bytes = hex::decode(hex_str.trim_start_matches("0x")).map_err(|e| Error::Rpc(e.to_string()))?;
        bytes
            .try_into()
            .map_err(|_| Error::Rpc("auditSecret did not return 32 bytes".into()))
    }
}
