//! HTTP-backed rendezvous channel, polling a best-effort
//! delivery service keyed by swap id.

use async_trait::async_trait;
use std::time::Duration;
use swapperd_core::error::{Error, Result};
use swapperd_core::{RendezvousChannel, SwapID};

/// Interval between polls while waiting on `ReceiveSwapDetails` /
/// `ReceiveOwnerAddress` before the deadline is reached.
const POLL_INTERVAL: Duration = Duration::from_secs(2);

/// The requestor's and responder's posted details live at distinct paths
/// under the same swap id so one party's post never overwrites the
/// other's.
fn slot(from_requestor: bool) -> &'static str {
    if from_requestor {
        "requestor"
    } else {
        "responder"
    }
}

pub struct HttpRendezvous {
    base_url: String,
    client: reqwest::Client,
}

impl HttpRendezvous {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            client: reqwest::Client::new(),
        }
    }

    async fn poll_until<T, F>(&self, deadline: i64, mut attempt: F) -> Result<T>
    where
        F: FnMut() -> std::pin::Pin<Box<dyn std::future::Future<Output = Result<Option<T>>> + Send + '_>>,
    {
        loop {
            if let Some(value) = attempt().await? {
                return Ok(value);
            }
            if swapperd_core::types::now_unix() >= deadline {
                return Err(Error::RendezvousTimeout("deadline passed waiting for rendezvous data".into()));
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }
}

#[async_trait]
impl RendezvousChannel for HttpRendezvous {
    async fn send_owner_address(&self, id: SwapID, from_requestor: bool, addr: &str) -> Result<()> {
        let url = format!("{}/rendezvous/{}/owner/{}", self.base_url, id, slot(from_requestor));
        self.client
            .post(&url)
            .body(addr.to_string())
            .send()
            .await
            .map_err(|e| Error::RendezvousTimeout(e.to_string()))?
            .error_for_status()
            .map_err(|e| Error::RendezvousTimeout(e.to_string()))?;
        Ok(())
    }

    async fn receive_owner_address(&self, id: SwapID, from_requestor: bool, deadline: i64) -> Result<String> {
        let url = format!("{}/rendezvous/{}/owner/{}", self.base_url, id, slot(from_requestor));
        self.poll_until(deadline, || {
            let client = &self.client;
            let url = url.clone();
            Box::pin(async move {
                let resp = client.get(&url).send().await.map_err(|e| Error::RendezvousTimeout(e.to_string()))?;
                if resp.status() == reqwest::StatusCode::NOT_FOUND {
                    return Ok(None);
                }
                let text = resp.text().await.map_err(|e| Error::RendezvousTimeout(e.to_string()))?;
                Ok(Some(text))
            })
        })
        .await
    }

    async fn send_swap_details(&self, id: SwapID, from_requestor: bool, bytes: &[u8]) -> Result<()> {
        let url = format!("{}/rendezvous/{}/details/{}", self.base_url, id, slot(from_requestor));
        self.client
            .post(&url)
            .body(bytes.to_vec())
            .send()
            .await
            .map_err(|e| Error::RendezvousTimeout(e.to_string()))?
            .error_for_status()
            .map_err(|e| Error::RendezvousTimeout(e.to_string()))?;
        Ok(())
    }

    async fn receive_swap_details(&self, id: SwapID, from_requestor: bool, deadline: i64) -> Result<Vec<u8>> {
        let url = format!("{}/rendezvous/{}/details/{}", self.base_url, id, slot(from_requestor));
        self.poll_until(deadline, || {
            let client = &self.client;
            let url = url.clone();
            Box::pin(async move {
                let resp = client.get(&url).send().await.map_err(|e| Error::RendezvousTimeout(e.to_string()))?;
                if resp.status() == reqwest::StatusCode::NOT_FOUND {
                    return Ok(None);
                }
                let bytes = resp.bytes().await.map_err(|e| Error::RendezvousTimeout(e.to_string()))?;
                Ok(Some(bytes.to_vec()))
            })
        })
        .await
    }
}
