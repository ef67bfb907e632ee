use std::fmt;

use serde::{Deserialize, Serialize};
use serde_repr::{Deserialize_repr, Serialize_repr};
use thiserror::Error;

use super::{product::ProductId, purchase_request::PurchaseOffer};

/// Error code the platform reports when the user dismissed the purchase UI.
///
/// https://developer.apple.com/documentation/storekit/skerror/code/paymentcancelled
pub const PAYMENT_CANCELLED_ERROR_CODE: i64 = 2;

/// A payment submitted to the platform payment queue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payment {
    pub product_id: ProductId,
    pub quantity: u32,
    pub simulates_ask_to_buy_in_sandbox: bool,
    pub offer: Option<PurchaseOffer>,
}

/// State of a transaction in the platform payment queue.
///
/// https://developer.apple.com/documentation/storekit/skpaymenttransactionstate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize_repr, Deserialize_repr)]
#[repr(u8)]
pub enum TransactionState {
    /// Being processed by the App Store. Transient.
    Purchasing = 0,
    /// Charged; content should be delivered and the transaction finished.
    Purchased = 1,
    Failed = 2,
    /// Restored from the user's purchase history.
    Restored = 3,
    /// Waiting for an external action, such as Ask to Buy approval.
    Deferred = 4,
}

impl fmt::Display for TransactionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            TransactionState::Purchasing => "Purchasing",
            TransactionState::Purchased => "Purchased",
            TransactionState::Failed => "Failed",
            TransactionState::Restored => "Restored",
            TransactionState::Deferred => "Deferred",
        })
    }
}

/// Error reported by the platform for a failed transaction or restore.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Error)]
#[error("{message} (code {code})")]
pub struct PaymentError {
    pub code: i64,
    pub message: String,
}

impl PaymentError {
    pub fn new(code: i64, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn is_cancellation(&self) -> bool {
        self.code == PAYMENT_CANCELLED_ERROR_CODE
    }
}

/// A transaction as reported by the platform payment queue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentTransaction {
    /// Assigned by the platform once the transaction leaves the purchasing
    /// state.
    pub transaction_id: Option<String>,
    pub payment: Payment,
    pub state: TransactionState,
    /// Only set for failed transactions.
    pub error: Option<PaymentError>,
}

impl PaymentTransaction {
    pub fn product_id(&self) -> &str {
        &self.payment.product_id
    }

    /// Whether both values describe the same platform transaction.
    pub(crate) fn is_same_transaction(&self, other: &PaymentTransaction) -> bool {
        match (&self.transaction_id, &other.transaction_id) {
            (Some(a), Some(b)) => a == b,
            _ => self == other,
        }
    }
}

impl fmt::Display for PaymentTransaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Transaction {} for product {}, quantity: {}, status {}",
            self.transaction_id.as_deref().unwrap_or_default(),
            self.payment.product_id,
            self.payment.quantity,
            self.state
        )
    }
}
