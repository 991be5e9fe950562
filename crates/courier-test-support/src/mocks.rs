//! In-memory collaborators for pipeline tests.

use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};

use anyhow::{Result, anyhow, bail};
use async_trait::async_trait;
use courier_core::{
    CodeDecoder, Destination, DestinationLookup, UploadReceipt, UploadRequest, Uploader,
};

/// Decoder that treats UTF-8 content as text and yields the value of every
/// `code:<value>` line, in order. Non-UTF-8 content is a decode failure.
#[derive(Debug, Default, Clone, Copy)]
pub struct TextCodeDecoder;

impl CodeDecoder for TextCodeDecoder {
    fn decode(&self, bytes: &[u8]) -> Result<Vec<String>> {
        let text = std::str::from_utf8(bytes).map_err(|err| anyhow!("unreadable image: {err}"))?;
        Ok(text
            .lines()
            .filter_map(|line| line.trim().strip_prefix("code:"))
            .map(|code| code.trim().to_string())
            .filter(|code| !code.is_empty())
            .collect())
    }
}

/// Lookup answering from a fixed table.
#[derive(Debug, Default, Clone)]
pub struct StaticLookup {
    table: Arc<Mutex<HashMap<String, Vec<Destination>>>>,
    failing: Arc<Mutex<HashSet<String>>>,
    calls: Arc<Mutex<Vec<String>>>,
}

impl StaticLookup {
    /// Empty table; every code resolves to zero rows.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the rows returned for `code`.
    #[must_use]
    pub fn with(self, code: &str, destinations: Vec<Destination>) -> Self {
        self.table
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(code.to_string(), destinations);
        self
    }

    /// Make lookups of `code` fail.
    #[must_use]
    pub fn failing_on(self, code: &str) -> Self {
        self.failing
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(code.to_string());
        self
    }

    /// Codes looked up so far, in call order.
    #[must_use]
    pub fn calls(&self) -> Vec<String> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl DestinationLookup for StaticLookup {
    async fn lookup(&self, code: &str) -> Result<Vec<Destination>> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(code.to_string());
        if self
            .failing
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(code)
        {
            bail!("lookup store unavailable");
        }
        Ok(self
            .table
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(code)
            .cloned()
            .unwrap_or_default())
    }
}

/// One upload observed by [`RecordingUploader`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedUpload {
    /// Path the file was read from.
    pub path: PathBuf,
    /// Destination folder identity.
    pub destination_id: String,
    /// File content at upload time.
    pub bytes: Vec<u8>,
}

/// Uploader that keeps every transfer in memory.
#[derive(Debug, Default, Clone)]
pub struct RecordingUploader {
    uploads: Arc<Mutex<Vec<RecordedUpload>>>,
    failing: Arc<Mutex<HashSet<String>>>,
}

impl RecordingUploader {
    /// Uploader that accepts everything.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject uploads to `destination_id`.
    #[must_use]
    pub fn failing_for(self, destination_id: &str) -> Self {
        self.failing
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(destination_id.to_string());
        self
    }

    /// Uploads accepted so far.
    #[must_use]
    pub fn uploads(&self) -> Vec<RecordedUpload> {
        self.uploads
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl Uploader for RecordingUploader {
    async fn upload(&self, request: UploadRequest<'_>) -> Result<UploadReceipt> {
        let destination_id = request.destination.destination_id().to_string();
        if self
            .failing
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(&destination_id)
        {
            bail!("destination {destination_id} rejected the upload");
        }
        let bytes = fs::read(request.path)?;
        let size = u64::try_from(bytes.len())?;
        self.uploads
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(RecordedUpload {
                path: request.path.to_path_buf(),
                destination_id: destination_id.clone(),
                bytes,
            });
        Ok(UploadReceipt {
            location: destination_id,
            bytes: size,
        })
    }
}
