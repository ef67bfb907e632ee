use std::sync::Weak;

use crate::{
    domain::entities::{
        payment_transaction::{Payment, PaymentTransaction},
        product::{Product, ProductIds},
        purchase_request::PurchaseRequest,
        transaction_status::{
            RestoreResultCallback, TransactionResult, TransactionResultCallback,
        },
    },
    errors::TransactionError,
};

/// Host-side hooks of the transactions manager.
pub trait TransactionsManagerDelegate: Send + Sync {
    /// Whether a promotional purchase started outside the app may proceed.
    fn should_add_store_payment(&self, payment: &Payment, product: &Product) -> bool;

    /// A purchased transaction arrived that no request was waiting for, for
    /// example a purchase left pending when the app was last terminated. It is
    /// kept uncompleted until `complete_transaction_with_id` is called.
    fn did_update_unexpected_transaction(
        &self,
        _transaction: &PaymentTransaction,
        _result: &TransactionResult,
    ) {
    }
}

pub trait TransactionsRepository: Send + Sync {
    fn can_make_payments(&self) -> bool;

    /// Starts a purchase, or joins the one already in flight for the same
    /// product. `completion` may be called more than once: first with
    /// `Deferred`, later with the final outcome.
    fn perform_transaction(&self, request: PurchaseRequest, completion: TransactionResultCallback);

    fn restore_purchases(&self, completion: RestoreResultCallback);

    fn can_complete_transaction_with_id(&self, transaction_id: &str) -> bool;

    fn complete_transaction_with_id(&self, transaction_id: &str) -> Result<(), TransactionError>;

    /// Products seen as restored during the last restore.
    fn restored_products(&self) -> ProductIds;

    fn set_delegate(&self, delegate: Weak<dyn TransactionsManagerDelegate>);
}
