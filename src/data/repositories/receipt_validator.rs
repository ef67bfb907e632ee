use std::sync::{Mutex, PoisonError};

use crate::{
    data::{
        datasources::receipt_fetcher::ReceiptFetcher,
        models::app_store_receipts::verify_receipt_status_model::VerifyReceiptStatusModel,
    },
    domain::entities::{
        payments_environment::PaymentsEnvironment, receipt_status::ReceiptStatus,
        validated_receipt::AppStoreValidatedReceipt,
    },
    errors::ReceiptError,
};

/// Validates the app receipt against the `verifyReceipt` endpoint.
///
/// A receipt sent to the wrong environment is retried once against the other
/// one, and the validator keeps using that environment afterwards.
pub struct ReceiptValidator<F: ReceiptFetcher> {
    shared_secret: String,
    fetcher: F,
    environment: Mutex<PaymentsEnvironment>,
}

enum DecodedResponse {
    Receipt(AppStoreValidatedReceipt),
    StatusOnly(ReceiptStatus),
    Undecodable,
}

impl<F: ReceiptFetcher> ReceiptValidator<F> {
    pub fn new(shared_secret: impl Into<String>, fetcher: F) -> Self {
        Self {
            shared_secret: shared_secret.into(),
            fetcher,
            environment: Mutex::new(PaymentsEnvironment::default()),
        }
    }

    pub fn with_environment(self, environment: PaymentsEnvironment) -> Self {
        *self.environment.lock().unwrap_or_else(PoisonError::into_inner) = environment;
        self
    }

    pub fn environment(&self) -> PaymentsEnvironment {
        *self.environment.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn switch_environment(&self, environment: PaymentsEnvironment) {
        tracing::info!("Will switch receipt validation environment to {environment}");
        *self.environment.lock().unwrap_or_else(PoisonError::into_inner) = environment;
    }

    pub async fn validate(
        &self,
        receipt_data: &[u8],
    ) -> Result<AppStoreValidatedReceipt, ReceiptError> {
        let mut retried = false;
        loop {
            let environment = self.environment();
            tracing::debug!(%environment, "Will validate receipt");
            let data = self
                .fetcher
                .fetch_receipt(receipt_data, &self.shared_secret, environment)
                .await?;

            let (status, failure) = match decode(&data) {
                DecodedResponse::Receipt(receipt) => {
                    let status = receipt.receipt_status();
                    if status.is_valid() {
                        tracing::debug!(environment = %receipt.environment, "Receipt is valid");
                        return Ok(receipt);
                    }
                    (status, ReceiptError::ReceiptInvalid { status })
                }
                DecodedResponse::StatusOnly(status) => (
                    status,
                    ReceiptError::JsonDecode {
                        body: Some(body_string(&data)),
                    },
                ),
                DecodedResponse::Undecodable => {
                    tracing::error!("Failed to decode validate receipt response");
                    return Err(ReceiptError::JsonDecode {
                        body: Some(body_string(&data)),
                    });
                }
            };

            match target_environment(status) {
                Some(target) if !retried && target != environment => {
                    tracing::warn!(%status, "Receipt was sent to the wrong environment");
                    self.switch_environment(target);
                    retried = true;
                }
                _ => {
                    tracing::error!(%status, "Receipt validation failed: {failure}");
                    return Err(failure);
                }
            }
        }
    }
}

fn decode(data: &[u8]) -> DecodedResponse {
    if let Ok(receipt) = serde_json::from_slice::<AppStoreValidatedReceipt>(data) {
        return DecodedResponse::Receipt(receipt);
    }
    match serde_json::from_slice::<VerifyReceiptStatusModel>(data) {
        Ok(model) => DecodedResponse::StatusOnly(ReceiptStatus::from_code(model.status)),
        Err(_) => DecodedResponse::Undecodable,
    }
}

/// The environment a receipt belongs to, for statuses reporting that it was
/// sent to the other one.
fn target_environment(status: ReceiptStatus) -> Option<PaymentsEnvironment> {
    match status {
        ReceiptStatus::TestReceipt => Some(PaymentsEnvironment::Sandbox),
        ReceiptStatus::ProductionEnvironment => Some(PaymentsEnvironment::Production),
        _ => None,
    }
}

fn body_string(data: &[u8]) -> String {
    String::from_utf8_lossy(data).into_owned()
}
