use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use hustle_core::ids::Cid;

use crate::{PinMetadata, PinningService, UploadError};

/// Keeps pinned content in process memory. Used when no Pinata credentials
/// are configured.
#[derive(Default)]
pub struct MemoryPinning {
    pins: Mutex<HashMap<Cid, Vec<u8>>>,
    counter: AtomicU64,
}

impl MemoryPinning {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, cid: &Cid) -> Option<Vec<u8>> {
        self.pins
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(cid)
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.pins
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl PinningService for MemoryPinning {
    async fn pin_file(
        &self,
        file_name: &str,
        _content_type: &str,
        bytes: Vec<u8>,
        _metadata: &PinMetadata,
    ) -> Result<Cid, UploadError> {
        let n = self.counter.fetch_add(1, Ordering::SeqCst) + 1;
        let cid = Cid(format!("bafymem{n:08}"));
        tracing::debug!(file = file_name, %cid, "pinned in memory");
        self.pins
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(cid.clone(), bytes);
        Ok(cid)
    }

    async fn unpin(&self, cid: &Cid) -> Result<(), UploadError> {
        self.pins
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .remove(cid);
        Ok(())
    }

    fn gateway_url(&self, cid: &Cid) -> String {
        format!("memory://{cid}")
    }
}
