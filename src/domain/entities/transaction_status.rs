use std::{fmt, sync::Arc};

use crate::errors::TransactionError;

use super::payment_transaction::PaymentError;

pub type TransactionResult = Result<TransactionStatus, TransactionError>;
pub type TransactionResultCallback = Box<dyn Fn(TransactionResult) + Send + Sync>;

pub type RestoreResult = Result<(), PaymentError>;
pub type RestoreResultCallback = Box<dyn FnOnce(RestoreResult) + Send>;

#[derive(Debug, Clone)]
pub enum TransactionStatus {
    /// The product was purchased. If the request was not auto-completed, the
    /// content must be delivered and then `completion` invoked.
    Purchased { completion: TransactionCompletion },
    /// Waiting for approval (Ask to Buy). A later update delivers the final
    /// outcome to the same waiters.
    Deferred,
}

impl TransactionStatus {
    pub fn is_purchased(&self) -> bool {
        matches!(self, TransactionStatus::Purchased { .. })
    }
}

/// Finishes a purchased transaction on the platform queue.
///
/// Completing is idempotent: once the transaction has been finished, further
/// calls do nothing.
#[derive(Clone)]
pub struct TransactionCompletion {
    action: Arc<dyn Fn() + Send + Sync>,
}

impl TransactionCompletion {
    pub(crate) fn new(action: impl Fn() + Send + Sync + 'static) -> Self {
        Self {
            action: Arc::new(action),
        }
    }

    pub fn complete(&self) {
        (self.action)()
    }
}

impl fmt::Debug for TransactionCompletion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransactionCompletion").finish_non_exhaustive()
    }
}
