use std::sync::Weak;

use crate::domain::entities::{
    payment_transaction::{Payment, PaymentError, PaymentTransaction},
    product::Product,
};

/// The platform payment queue (StoreKit's `SKPaymentQueue` or an equivalent).
///
/// Implementations deliver their callbacks to every registered observer, on
/// whatever thread the platform uses.
pub trait PaymentQueue: Send + Sync {
    /// Whether the user is allowed to make payments on this device.
    fn can_make_payments(&self) -> bool;

    /// Registers an observer. The queue must not keep it alive.
    fn add_observer(&self, observer: Weak<dyn PaymentTransactionObserver>);

    /// Submits a payment. The outcome arrives later through
    /// [`PaymentTransactionObserver::updated_transactions`].
    fn add_payment(&self, payment: Payment);

    /// Replays previously completed transactions as `Restored`.
    fn restore_completed_transactions(&self);

    /// Acknowledges the transaction; the platform stops reporting it.
    fn finish_transaction(&self, transaction: &PaymentTransaction);
}

/// Callbacks produced by the platform payment queue.
pub trait PaymentTransactionObserver: Send + Sync {
    /// A batch of transactions changed state.
    fn updated_transactions(&self, transactions: Vec<PaymentTransaction>);

    fn restore_completed_transactions_finished(&self);

    fn restore_completed_transactions_failed(&self, error: PaymentError);

    /// The user started a promotional purchase outside the app. Returning
    /// `true` lets the platform continue with the payment right away.
    fn should_add_store_payment(&self, payment: &Payment, product: &Product) -> bool;
}
