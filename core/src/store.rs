//! Durable key-value swap store abstraction, grounded on the
//! teacher's async trait-object storage pattern (`storage.rs`) but
//! expressed with `async-trait` instead of hand-rolled boxed futures,
//! since the production implementation (`sled`, in the `swapperd` binary)
//! has no wasm target to accommodate.

use crate::error::Result;
use crate::types::{SwapBlob, SwapID, SwapReceipt};
use async_trait::async_trait;

/// Two logical tables, `swaps` and `pending_swaps`, addressed by an 8-byte
/// big-endian tag prefixed to the 32-byte swap id when a concrete
/// implementation needs a single flat keyspace (e.g. `sled`).
pub const TAG_SWAPS: [u8; 8] = [0, 0, 0, 0, 0, 0, 0, 0];
pub const TAG_PENDING_SWAPS: [u8; 8] = [0, 0, 0, 0, 0, 0, 0, 1];

/// The durable store the supervisor and state machine share. All writes
/// are single-key and must be atomic; range scans over a table yield its
/// full key set.
#[async_trait]
pub trait SwapStore: Send + Sync {
    async fn put_pending_swap(&self, blob: &SwapBlob) -> Result<()>;
    async fn get_pending_swap(&self, id: SwapID) -> Result<Option<SwapBlob>>;
    async fn delete_pending_swap(&self, id: SwapID) -> Result<()>;
    async fn list_pending_swaps(&self) -> Result<Vec<SwapBlob>>;

    async fn put_swap_receipt(&self, receipt: &SwapReceipt) -> Result<()>;
    async fn get_swap_receipt(&self, id: SwapID) -> Result<Option<SwapReceipt>>;
    async fn list_swap_receipts(&self) -> Result<Vec<SwapReceipt>>;
}

/// In-memory `SwapStore`, used by unit and scenario tests.
pub mod memory {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    #[derive(Default)]
    pub struct MemoryStore {
        pending: Mutex<HashMap<SwapID, SwapBlob>>,
        swaps: Mutex<HashMap<SwapID, SwapReceipt>>,
    }

    impl MemoryStore {
        pub fn new() -> Self {
            Self::default()
        }
    }

    #[async_trait]
    impl SwapStore for MemoryStore {
        async fn put_pending_swap(&self, blob: &SwapBlob) -> Result<()> {
            self.pending.lock().expect("store mutex poisoned").insert(blob.id, blob.clone());
            Ok(())
        }

        async fn get_pending_swap(&self, id: SwapID) -> Result<Option<SwapBlob>> {
            Ok(self.pending.lock().expect("store mutex poisoned").get(&id).cloned())
        }

        async fn delete_pending_swap(&self, id: SwapID) -> Result<()> {
            self.pending.lock().expect("store mutex poisoned").remove(&id);
            Ok(())
        }

        async fn list_pending_swaps(&self) -> Result<Vec<SwapBlob>> {
            Ok(self.pending.lock().expect("store mutex poisoned").values().cloned().collect())
        }

        async fn put_swap_receipt(&self, receipt: &SwapReceipt) -> Result<()> {
            self.swaps.lock().expect("store mutex poisoned").insert(receipt.id, receipt.clone());
            Ok(())
        }

        async fn get_swap_receipt(&self, id: SwapID) -> Result<Option<SwapReceipt>> {
            Ok(self.swaps.lock().expect("store mutex poisoned").get(&id).cloned())
        }

        async fn list_swap_receipts(&self) -> Result<Vec<SwapReceipt>> {
            Ok(self.swaps.lock().expect("store mutex poisoned").values().cloned().collect())
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;
        use crate::types::Token;

        fn blob(id: SwapID) -> SwapBlob {
            SwapBlob {
                id,
                send_token: Token::Btc,
                receive_token: Token::Eth,
                send_amount: "100000".into(),
                receive_amount: "1000000000000000".into(),
                send_to: "addr".into(),
                receive_from: "addr2".into(),
                secret_hash: None,
                time_lock: None,
                should_initiate_first: true,
                password: "hunter2".into(),
                step: crate::types::StepStatus::Inactive,
                secret: None,
                personal_contract: None,
                foreign_contract: None,
                expiry: None,
            }
        }

        #[tokio::test]
        async fn round_trips_pending_swap() {
            let store = MemoryStore::new();
            let id = SwapID::generate();
            store.put_pending_swap(&blob(id)).await.unwrap();
            assert!(store.get_pending_swap(id).await.unwrap().is_some());
            store.delete_pending_swap(id).await.unwrap();
            assert!(store.get_pending_swap(id).await.unwrap().is_none());
        }

        #[tokio::test]
        async fn lists_all_receipts() {
            let store = MemoryStore::new();
            let id1 = SwapID::generate();
            let id2 = SwapID::generate();
            let now = crate::types::now_unix();
            store.put_swap_receipt(&SwapReceipt::new(&blob(id1), now)).await.unwrap();
            store.put_swap_receipt(&SwapReceipt::new(&blob(id2), now)).await.unwrap();
            assert_eq!(store.list_swap_receipts().await.unwrap().len(), 2);
        }
    }
}
