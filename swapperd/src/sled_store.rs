//! `sled`-backed `SwapStore`, the pure-Rust analogue of the Go original's
//! LevelDB driver (`adapter/db/db.go`): keys are `table_tag(8 bytes) ||
//! raw_swap_id(32 bytes)`, and a table's full key set is read back with a
//! prefix scan over its tag.

use async_trait::async_trait;
use swapperd_core::error::{Error, Result};
use swapperd_core::store::{SwapStore, TAG_PENDING_SWAPS, TAG_SWAPS};
use swapperd_core::{SwapBlob, SwapID, SwapReceipt};

pub struct SledStore {
    db: sled::Db,
}

impl SledStore {
    pub fn open(path: &std::path::Path) -> Result<Self> {
        let db = sled::open(path).map_err(|e| Error::Store(format!("failed to open store at {}: {e}", path.display())))?;
        Ok(Self { db })
    }

    fn key(tag: [u8; 8], id: SwapID) -> [u8; 40] {
        let mut key = [0u8; 40];
        key[..8].copy_from_slice(&tag);
        key[8..].copy_from_slice(&id.0);
        key
    }

    fn scan_table<T: serde::de::DeserializeOwned>(&self, tag: [u8; 8]) -> Result<Vec<T>> {
        self.db
            .scan_prefix(tag)
            .values()
            .map(|v| {
                let bytes = v.map_err(|e| Error::Store(e.to_string()))?;
                serde_json::from_slice(&bytes).map_err(Error::from)
            })
            .collect()
    }
}

#[async_trait]
impl SwapStore for SledStore {
    async fn put_pending_swap(&self, blob: &SwapBlob) -> Result<()> {
        let key = Self::key(TAG_PENDING_SWAPS, blob.id);
        let bytes = serde_json::to_vec(blob)?;
        self.db.insert(key, bytes).map_err(|e| Error::Store(e.to_string()))?;
        self.db.flush_async().await.map_err(|e| Error::Store(e.to_string()))?;
        Ok(())
    }

    async fn get_pending_swap(&self, id: SwapID) -> Result<Option<SwapBlob>> {
        let key = Self::key(TAG_PENDING_SWAPS, id);
        match self.db.get(key).map_err(|e| Error::Store(e.to_string()))? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    async fn delete_pending_swap(&self, id: SwapID) -> Result<()> {
        let key = Self::key(TAG_PENDING_SWAPS, id);
        self.db.remove(key).map_err(|e| Error::Store(e.to_string()))?;
        self.db.flush_async().await.map_err(|e| Error::Store(e.to_string()))?;
        Ok(())
    }

    async fn list_pending_swaps(&self) -> Result<Vec<SwapBlob>> {
        self.scan_table(TAG_PENDING_SWAPS)
    }

    async fn put_swap_receipt(&self, receipt: &SwapReceipt) -> Result<()> {
        let key = Self::key(TAG_SWAPS, receipt.id);
        let bytes = serde_json::to_vec(receipt)?;
        self.db.insert(key, bytes).map_err(|e| Error::Store(e.to_string()))?;
        self.db.flush_async().await.map_err(|e| Error::Store(e.to_string()))?;
        Ok(())
    }

    async fn get_swap_receipt(&self, id: SwapID) -> Result<Option<SwapReceipt>> {
        let key = Self::key(TAG_SWAPS, id);
        match self.db.get(key).map_err(|e| Error::Store(e.to_string()))? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    async fn list_swap_receipts(&self) -> Result<Vec<SwapReceipt>> {
        self.scan_table(TAG_SWAPS)
    }
}
