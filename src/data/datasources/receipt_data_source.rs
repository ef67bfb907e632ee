use std::path::PathBuf;

use async_trait::async_trait;

use crate::errors::ReceiptError;

/// Access to the app receipt stored on the device.
#[async_trait]
pub trait ReceiptDataSource: Send + Sync {
    /// Asks the platform to refresh the local receipt (StoreKit's
    /// `SKReceiptRefreshRequest`).
    async fn refresh_receipt(&self) -> Result<(), ReceiptError>;

    /// Reads the local receipt blob.
    async fn load_receipt_data(&self) -> Result<Vec<u8>, ReceiptError>;
}

/// Reads the receipt from a file, such as the bundle's `appStoreReceiptURL`.
///
/// The file is the source of truth, so refreshing is a no-op.
pub struct FileReceiptDataSourceImpl {
    path: PathBuf,
}

#[async_trait]
impl ReceiptDataSource for FileReceiptDataSourceImpl {
    async fn refresh_receipt(&self) -> Result<(), ReceiptError> {
        Ok(())
    }

    async fn load_receipt_data(&self) -> Result<Vec<u8>, ReceiptError> {
        tracing::debug!(path = %self.path.display(), "Will load App Store receipt data");
        tokio::fs::read(&self.path).await.map_err(|e| {
            tracing::error!(path = %self.path.display(), "Could not load App Store receipt data: {e}");
            ReceiptError::NoReceiptData
        })
    }
}

impl FileReceiptDataSourceImpl {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_file_is_no_receipt_data() {
        let source = FileReceiptDataSourceImpl::new("/nonexistent/receipt");
        assert_eq!(
            source.load_receipt_data().await,
            Err(ReceiptError::NoReceiptData)
        );
    }

    #[tokio::test]
    async fn reads_file_contents() {
        let path = std::env::temp_dir().join(format!("receipt-{}", std::process::id()));
        tokio::fs::write(&path, b"receipt-bytes").await.unwrap();

        let source = FileReceiptDataSourceImpl::new(&path);
        assert_eq!(source.load_receipt_data().await.unwrap(), b"receipt-bytes");

        tokio::fs::remove_file(&path).await.unwrap();
    }
}
