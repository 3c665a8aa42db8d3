//! Proof storage on IPFS.
//!
//! Every proof file is pinned on its own, then a JSON manifest listing them
//! is pinned last. The manifest's CID is what goes on-chain as the task's
//! `proofReference`.

pub mod memory;
pub mod pinata;

use async_trait::async_trait;
use hustle_core::ids::Cid;
use hustle_core::time::unix_millis;
use hustle_core::HustleError;
use serde::{Deserialize, Serialize};

pub use memory::MemoryPinning;
pub use pinata::{PinataClient, PinataConfig};

pub const DEFAULT_MAX_FILES: usize = 10;
pub const DEFAULT_MAX_FILE_SIZE: u64 = 10 * 1024 * 1024;
/// Pinata keyvalues are capped, only a prefix of the description is attached.
const METADATA_DESCRIPTION_CHARS: usize = 100;

#[derive(Debug, thiserror::Error)]
pub enum UploadError {
    #[error("no files selected")]
    NoFiles,

    #[error("too many files: {count} (max {max})")]
    TooManyFiles { count: usize, max: usize },

    #[error("file {name} is {size} bytes (max {max})")]
    FileTooLarge { name: String, size: u64, max: u64 },

    #[error("description is empty")]
    EmptyDescription,

    #[error("pinning request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("pinning service rejected {name}: {reason}")]
    Rejected { name: String, reason: String },

    #[error("failed to encode manifest: {0}")]
    Manifest(#[from] serde_json::Error),
}

impl UploadError {
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            UploadError::NoFiles
                | UploadError::TooManyFiles { .. }
                | UploadError::FileTooLarge { .. }
                | UploadError::EmptyDescription
        )
    }
}

impl From<UploadError> for HustleError {
    fn from(e: UploadError) -> Self {
        if e.is_validation() {
            HustleError::InvalidInput(e.to_string())
        } else {
            HustleError::UploadFailed(e.to_string())
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UploadLimits {
    pub max_files: usize,
    pub max_file_size: u64,
}

impl Default for UploadLimits {
    fn default() -> Self {
        Self {
            max_files: DEFAULT_MAX_FILES,
            max_file_size: DEFAULT_MAX_FILE_SIZE,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProofFile {
    pub name: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

impl ProofFile {
    pub fn new(name: impl Into<String>, content_type: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            content_type: content_type.into(),
            bytes,
        }
    }

    pub fn size(&self) -> u64 {
        self.bytes.len() as u64
    }
}

/// Labels attached to a pin so it can be found in the pinning dashboard.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PinMetadata {
    pub name: String,
    pub description: String,
    pub timestamp: u64,
    pub index: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestEntry {
    pub name: String,
    pub size: u64,
    #[serde(rename = "type")]
    pub content_type: String,
    pub cid: Cid,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    pub description: String,
    /// Milliseconds since epoch.
    pub timestamp: u64,
    pub files: Vec<ManifestEntry>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProofUpload {
    pub manifest_cid: Cid,
    pub file_cids: Vec<Cid>,
    pub url: String,
}

#[async_trait]
pub trait PinningService: Send + Sync {
    async fn pin_file(
        &self,
        file_name: &str,
        content_type: &str,
        bytes: Vec<u8>,
        metadata: &PinMetadata,
    ) -> Result<Cid, UploadError>;

    async fn unpin(&self, cid: &Cid) -> Result<(), UploadError>;

    fn gateway_url(&self, cid: &Cid) -> String;
}

#[async_trait]
impl<T: PinningService + ?Sized> PinningService for std::sync::Arc<T> {
    async fn pin_file(
        &self,
        file_name: &str,
        content_type: &str,
        bytes: Vec<u8>,
        metadata: &PinMetadata,
    ) -> Result<Cid, UploadError> {
        (**self).pin_file(file_name, content_type, bytes, metadata).await
    }

    async fn unpin(&self, cid: &Cid) -> Result<(), UploadError> {
        (**self).unpin(cid).await
    }

    fn gateway_url(&self, cid: &Cid) -> String {
        (**self).gateway_url(cid)
    }
}

pub struct UploadAdapter<P> {
    service: P,
    limits: UploadLimits,
}

impl<P: PinningService> UploadAdapter<P> {
    pub fn new(service: P, limits: UploadLimits) -> Self {
        Self { service, limits }
    }

    pub fn limits(&self) -> UploadLimits {
        self.limits
    }

    pub fn service(&self) -> &P {
        &self.service
    }

    pub fn validate(&self, files: &[ProofFile], description: &str) -> Result<(), UploadError> {
        if files.is_empty() {
            return Err(UploadError::NoFiles);
        }
        if files.len() > self.limits.max_files {
            return Err(UploadError::TooManyFiles {
                count: files.len(),
                max: self.limits.max_files,
            });
        }
        if let Some(file) = files.iter().find(|f| f.size() > self.limits.max_file_size) {
            return Err(UploadError::FileTooLarge {
                name: file.name.clone(),
                size: file.size(),
                max: self.limits.max_file_size,
            });
        }
        if description.trim().is_empty() {
            return Err(UploadError::EmptyDescription);
        }
        Ok(())
    }

    /// Pins all files and their manifest. Either everything is pinned and
    /// the manifest CID returned, or nothing is returned and whatever was
    /// already pinned is released.
    pub async fn upload_proof(
        &self,
        files: Vec<ProofFile>,
        description: &str,
    ) -> Result<ProofUpload, UploadError> {
        self.validate(&files, description)?;

        let started = unix_millis();
        let short: String = description.chars().take(METADATA_DESCRIPTION_CHARS).collect();
        let mut pinned: Vec<Cid> = Vec::with_capacity(files.len() + 1);
        let mut entries = Vec::with_capacity(files.len());

        for (index, file) in files.into_iter().enumerate() {
            let metadata = PinMetadata {
                name: format!("ProofOfHustle_{started}_{}", file.name),
                description: short.clone(),
                timestamp: started,
                index: Some(index),
            };
            let size = file.size();
            let cid = match self
                .service
                .pin_file(&file.name, &file.content_type, file.bytes, &metadata)
                .await
            {
                Ok(cid) => cid,
                Err(e) => {
                    tracing::warn!(file = %file.name, index, error = %e, "proof file upload failed");
                    self.release(&pinned).await;
                    return Err(e);
                }
            };
            tracing::debug!(file = %file.name, %cid, size, "proof file pinned");

            pinned.push(cid.clone());
            entries.push(ManifestEntry {
                name: file.name,
                size,
                content_type: file.content_type,
                cid,
            });
        }

        let manifest = Manifest {
            description: description.to_string(),
            timestamp: started,
            files: entries,
        };
        let body = match serde_json::to_vec_pretty(&manifest) {
            Ok(body) => body,
            Err(e) => {
                self.release(&pinned).await;
                return Err(e.into());
            }
        };
        let metadata = PinMetadata {
            name: format!("ProofOfHustle_Metadata_{started}"),
            description: short,
            timestamp: started,
            index: None,
        };
        let manifest_cid = match self
            .service
            .pin_file("metadata.json", "application/json", body, &metadata)
            .await
        {
            Ok(cid) => cid,
            Err(e) => {
                tracing::warn!(error = %e, "manifest upload failed");
                self.release(&pinned).await;
                return Err(e);
            }
        };

        tracing::info!(%manifest_cid, files = pinned.len(), "proof uploaded");
        Ok(ProofUpload {
            url: self.service.gateway_url(&manifest_cid),
            manifest_cid,
            file_cids: pinned,
        })
    }

    async fn release(&self, pinned: &[Cid]) {
        for cid in pinned {
            if let Err(e) = self.service.unpin(cid).await {
                tracing::warn!(%cid, error = %e, "failed to unpin orphaned file");
            }
        }
    }
}
