use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;

use crate::{
    data::datasources::{receipt_data_source::ReceiptDataSource, receipt_fetcher::ReceiptFetcher},
    domain::{
        entities::{
            payments_environment::PaymentsEnvironment, validated_receipt::AppStoreValidatedReceipt,
        },
        repositories::receipts_repository::ReceiptsRepository,
    },
    errors::ReceiptError,
};

use super::receipt_validator::ReceiptValidator;

/// Loads the local app receipt and validates it remotely.
pub struct ReceiptsManager<S: ReceiptDataSource, F: ReceiptFetcher> {
    data_source: S,
    fetcher: Arc<F>,
    environment: Mutex<PaymentsEnvironment>,
    receipt_data: Mutex<Option<Vec<u8>>>,
    validated_receipt: Mutex<Option<AppStoreValidatedReceipt>>,
}

#[async_trait]
impl<S: ReceiptDataSource, F: ReceiptFetcher> ReceiptsRepository for ReceiptsManager<S, F> {
    async fn refresh_receipt(&self, force_reload: bool) -> Result<(), ReceiptError> {
        if !force_reload && self.receipt_data().is_some() {
            tracing::debug!("Receipt data already loaded");
            return Ok(());
        }
        tracing::debug!(force_reload, "Will refresh receipt");
        self.data_source.refresh_receipt().await?;
        let data = self.data_source.load_receipt_data().await?;
        *self.receipt_data.lock().unwrap_or_else(PoisonError::into_inner) = Some(data);
        Ok(())
    }

    async fn validate_receipt(
        &self,
        shared_secret: &str,
    ) -> Result<AppStoreValidatedReceipt, ReceiptError> {
        if shared_secret.is_empty() {
            tracing::error!("Validating receipt with an empty shared secret");
        }

        let receipt_data = match self.receipt_data() {
            Some(data) => data,
            None => {
                self.refresh_receipt(false).await.map_err(|e| {
                    tracing::error!("Failed to refresh receipt before validation: {e}");
                    ReceiptError::NoReceiptData
                })?;
                self.receipt_data().ok_or(ReceiptError::NoReceiptData)?
            }
        };

        let validator = ReceiptValidator::new(shared_secret, self.fetcher.clone())
            .with_environment(self.environment());
        let result = validator.validate(&receipt_data).await;
        *self.environment.lock().unwrap_or_else(PoisonError::into_inner) = validator.environment();

        let receipt = result?;
        *self
            .validated_receipt
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(receipt.clone());
        Ok(receipt)
    }

    fn validated_receipt(&self) -> Option<AppStoreValidatedReceipt> {
        self.validated_receipt
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl<S: ReceiptDataSource, F: ReceiptFetcher> ReceiptsManager<S, F> {
    pub fn new(data_source: S, fetcher: F, environment: PaymentsEnvironment) -> Self {
        Self {
            data_source,
            fetcher: Arc::new(fetcher),
            environment: Mutex::new(environment),
            receipt_data: Mutex::new(None),
            validated_receipt: Mutex::new(None),
        }
    }

    /// The environment the next validation starts with. Follows the last
    /// wrong-environment switch.
    pub fn environment(&self) -> PaymentsEnvironment {
        *self.environment.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn receipt_data(&self) -> Option<Vec<u8>> {
        self.receipt_data
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}
