//! Collaborator traits implemented by decoding, lookup, and upload adapters.

use std::path::Path;

use anyhow::Result;
use async_trait::async_trait;

use crate::model::{Destination, UploadReceipt};

/// Extracts machine-readable codes embedded in image content.
pub trait CodeDecoder: Send + Sync {
    /// Decode every code found in `bytes`, in detection order.
    ///
    /// An image without codes yields an empty vector; unreadable content is an
    /// error.
    fn decode(&self, bytes: &[u8]) -> Result<Vec<String>>;
}

/// External store mapping decoded codes to routing destinations.
#[async_trait]
pub trait DestinationLookup: Send + Sync {
    /// Fetch every destination registered for `code`; may be empty.
    async fn lookup(&self, code: &str) -> Result<Vec<Destination>>;

    /// Verify the store is reachable; called once before the watch loop starts.
    async fn check(&self) -> Result<()> {
        Ok(())
    }
}

/// Inputs for forwarding one file to one destination.
#[derive(Debug, Clone, Copy)]
pub struct UploadRequest<'a> {
    /// File currently sitting in the watched tree.
    pub path: &'a Path,
    /// Target the file is forwarded to.
    pub destination: &'a Destination,
}

/// Backend that stores a copy of a file at a destination.
///
/// A crash between a successful upload and the archive step makes the next
/// batch pass upload the same file again, so implementations must be
/// idempotent or tolerate duplicates.
#[async_trait]
pub trait Uploader: Send + Sync {
    /// Forward the file to the destination.
    async fn upload(&self, request: UploadRequest<'_>) -> Result<UploadReceipt>;

    /// Verify the backend is reachable; called once before the watch loop starts.
    async fn check(&self) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    struct Fixed;

    #[async_trait]
    impl DestinationLookup for Fixed {
        async fn lookup(&self, code: &str) -> Result<Vec<Destination>> {
            Ok(vec![Destination::new(code, "1", "s")])
        }
    }

    #[async_trait]
    impl Uploader for Fixed {
        async fn upload(&self, request: UploadRequest<'_>) -> Result<UploadReceipt> {
            Ok(UploadReceipt {
                location: request.destination.destination_id().to_string(),
                bytes: 0,
            })
        }
    }

    #[tokio::test]
    async fn default_checks_succeed() -> Result<()> {
        DestinationLookup::check(&Fixed).await?;
        Uploader::check(&Fixed).await?;

        let found = Fixed.lookup("abc").await?;
        assert_eq!(found[0].destination_id(), "abc");

        let path = PathBuf::from("file.jpg");
        let receipt = Fixed
            .upload(UploadRequest {
                path: &path,
                destination: &found[0],
            })
            .await?;
        assert_eq!(receipt.location, "abc");
        Ok(())
    }
}
