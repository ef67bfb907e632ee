use std::sync::Arc;

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use reqwest::header::CONTENT_TYPE;

use crate::{
    data::models::app_store_receipts::verify_receipt_request_model::VerifyReceiptRequestModel,
    domain::entities::payments_environment::PaymentsEnvironment, errors::ReceiptError,
};

/// Posts the local receipt to the App Store `verifyReceipt` endpoint.
#[async_trait]
pub trait ReceiptFetcher: Send + Sync {
    /// Returns the raw response body; decoding is left to the caller so that
    /// status-only bodies can be inspected.
    ///
    /// receipt_data:
    ///   The raw (not base64-encoded) app receipt.
    /// shared_secret:
    ///   The app-specific shared secret from App Store Connect.
    /// environment:
    ///   Which endpoint to call.
    async fn fetch_receipt(
        &self,
        receipt_data: &[u8],
        shared_secret: &str,
        environment: PaymentsEnvironment,
    ) -> Result<Vec<u8>, ReceiptError>;
}

#[async_trait]
impl<F: ReceiptFetcher + ?Sized> ReceiptFetcher for Arc<F> {
    async fn fetch_receipt(
        &self,
        receipt_data: &[u8],
        shared_secret: &str,
        environment: PaymentsEnvironment,
    ) -> Result<Vec<u8>, ReceiptError> {
        (**self)
            .fetch_receipt(receipt_data, shared_secret, environment)
            .await
    }
}

pub struct AppStoreReceiptFetcherImpl {
    client: reqwest::Client,
}

#[async_trait]
impl ReceiptFetcher for AppStoreReceiptFetcherImpl {
    #[tracing::instrument(skip_all, fields(%environment))]
    async fn fetch_receipt(
        &self,
        receipt_data: &[u8],
        shared_secret: &str,
        environment: PaymentsEnvironment,
    ) -> Result<Vec<u8>, ReceiptError> {
        let body = serde_json::to_vec(&VerifyReceiptRequestModel {
            receipt_data: STANDARD.encode(receipt_data),
            password: shared_secret,
        })
        .map_err(|e| {
            tracing::error!("Failed to create validate receipt request body: {e}");
            ReceiptError::RequestBodyEncode {
                message: e.to_string(),
            }
        })?;
        self.callout(environment.verify_receipt_url(), body).await
    }
}

impl AppStoreReceiptFetcherImpl {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }

    async fn callout(&self, url: &str, body: Vec<u8>) -> Result<Vec<u8>, ReceiptError> {
        let response = self
            .client
            .post(url)
            .header(CONTENT_TYPE, "application/json")
            .body(body)
            .send()
            .await
            .map_err(|e| {
                tracing::error!("Validate receipt callout failed to send: {e:?}");
                ReceiptError::Network {
                    message: e.to_string(),
                }
            })?;

        // The endpoint reports failures through the `status` field of a 200
        // response, so only the body matters here.
        let data = response.bytes().await.map_err(|e| {
            tracing::error!("Validate receipt callout failed to read body: {e:?}");
            ReceiptError::Network {
                message: e.to_string(),
            }
        })?;
        if data.is_empty() {
            tracing::error!("Validate receipt callout returned without data");
            return Err(ReceiptError::NoRemoteData);
        }
        Ok(data.to_vec())
    }
}

impl Default for AppStoreReceiptFetcherImpl {
    fn default() -> Self {
        Self::new()
    }
}
