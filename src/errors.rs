use thiserror::Error;

use crate::domain::entities::receipt_status::ReceiptStatus;

/// Failure of a purchase request, as delivered to the waiters of the request.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransactionError {
    /// The user dismissed the platform purchase UI.
    #[error("cancelled")]
    Cancelled,
    /// No uncompleted transaction exists with the given identifier.
    #[error("notFound")]
    NotFound,
    #[error("Other: {message}")]
    Other { message: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProductsError {
    #[error("Failed to fetch products: {message}")]
    Fetch { message: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReceiptError {
    #[error("There's no receipt data.")]
    NoReceiptData,
    #[error("Couldn't load data. Check your internet connection")]
    NoRemoteData,
    #[error("Failed to encode request body: {message}")]
    RequestBodyEncode { message: String },
    #[error("Network failed to load receipt with error {message}. Check your internet connection")]
    Network { message: String },
    #[error("Failed to decode receipt: {}", body.as_deref().unwrap_or_default())]
    JsonDecode { body: Option<String> },
    #[error("Invalid receipt with code: {}", status.code())]
    ReceiptInvalid { status: ReceiptStatus },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SecretsError {
    #[error("Missing secret value '{key}'.")]
    Missing { key: &'static str },
    #[error("Invalid value '{value}' for secret '{key}'.")]
    Invalid { key: &'static str, value: String },
}
