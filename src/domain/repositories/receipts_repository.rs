use async_trait::async_trait;

use crate::{
    domain::entities::validated_receipt::AppStoreValidatedReceipt, errors::ReceiptError,
};

#[async_trait]
pub trait ReceiptsRepository: Send + Sync {
    /// Reloads the local receipt. Without `force_reload`, already loaded data
    /// is kept.
    async fn refresh_receipt(&self, force_reload: bool) -> Result<(), ReceiptError>;

    async fn validate_receipt(
        &self,
        shared_secret: &str,
    ) -> Result<AppStoreValidatedReceipt, ReceiptError>;

    /// The last successfully validated receipt.
    fn validated_receipt(&self) -> Option<AppStoreValidatedReceipt>;
}
