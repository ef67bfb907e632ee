use std::{
    mem,
    sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock, Weak},
};

use crate::{
    data::datasources::payment_queue::{PaymentQueue, PaymentTransactionObserver},
    domain::{
        entities::{
            payment_transaction::{Payment, PaymentError, PaymentTransaction, TransactionState},
            product::{Product, ProductIds},
            purchase_request::PurchaseRequest,
            transaction_status::{
                RestoreResultCallback, TransactionCompletion, TransactionResult,
                TransactionResultCallback, TransactionStatus,
            },
        },
        repositories::transactions_repository::{
            TransactionsManagerDelegate, TransactionsRepository,
        },
    },
    errors::TransactionError,
    foundation::processes_manager::{Handler, ProcessCallbacksHolder, ProcessesManager},
};

/// Message of the failure reported for a failed transaction that carries no
/// platform error.
const MISSING_ERROR_MESSAGE: &str = "unexpected";

struct TransactionsState {
    active_transactions: ProcessesManager<PurchaseRequest, TransactionResult>,
    uncompleted_transactions: Vec<PaymentTransaction>,
    restored_products: ProductIds,
    restore_completions: Vec<RestoreResultCallback>,
}

impl TransactionsState {
    fn add_uncompleted(&mut self, transaction: &PaymentTransaction) {
        if !self
            .uncompleted_transactions
            .iter()
            .any(|t| t.is_same_transaction(transaction))
        {
            self.uncompleted_transactions.push(transaction.clone());
        }
    }

    fn take_uncompleted(&mut self, transaction: &PaymentTransaction) -> Option<PaymentTransaction> {
        let index = self
            .uncompleted_transactions
            .iter()
            .position(|t| t.is_same_transaction(transaction))?;
        Some(self.uncompleted_transactions.remove(index))
    }
}

/// What to do once the state lock is released.
enum Reconciliation {
    NotifyWaiters {
        finish: bool,
        waiters: Option<ProcessCallbacksHolder<PurchaseRequest, TransactionResult>>,
    },
    FinishUnexpected,
    ReportUnexpected,
}

/// Submits purchases to the platform payment queue and reconciles the
/// transaction updates the queue reports with the requests waiting for them.
///
/// Requests for a product that already has a purchase in flight join that
/// purchase instead of being submitted again. Purchased transactions of
/// requests without `auto_complete`, and purchased transactions nobody asked
/// for, are held uncompleted until the host confirms delivery.
///
/// State changes are serialized by one lock. Waiters, the delegate and the
/// payment queue are called after it is released, so they may call back into
/// the manager.
pub struct TransactionsManager {
    payment_queue: Arc<dyn PaymentQueue>,
    state: Mutex<TransactionsState>,
    delegate: RwLock<Option<Weak<dyn TransactionsManagerDelegate>>>,
    this: Weak<TransactionsManager>,
}

impl TransactionsManager {
    /// Creates the manager and registers it as an observer of `payment_queue`.
    pub fn new(payment_queue: Arc<dyn PaymentQueue>) -> Arc<Self> {
        let manager = Arc::new_cyclic(|this| Self {
            payment_queue: payment_queue.clone(),
            state: Mutex::new(TransactionsState {
                active_transactions: ProcessesManager::new(),
                uncompleted_transactions: Vec::new(),
                restored_products: ProductIds::new(),
                restore_completions: Vec::new(),
            }),
            delegate: RwLock::new(None),
            this: this.clone(),
        });
        let observer: Weak<dyn PaymentTransactionObserver> =
            Arc::<TransactionsManager>::downgrade(&manager);
        payment_queue.add_observer(observer);
        manager
    }

    /// Snapshot of the transactions waiting for delivery confirmation.
    pub fn uncompleted_transactions(&self) -> Vec<PaymentTransaction> {
        self.lock_state().uncompleted_transactions.clone()
    }

    fn lock_state(&self) -> MutexGuard<'_, TransactionsState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn delegate(&self) -> Option<Arc<dyn TransactionsManagerDelegate>> {
        self.delegate
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .and_then(Weak::upgrade)
    }

    fn handle_transaction_purchased(&self, transaction: PaymentTransaction) {
        tracing::debug!("Will handle Purchased {transaction}");
        let completion = {
            let manager = self.this.clone();
            let transaction = transaction.clone();
            TransactionCompletion::new(move || {
                if let Some(manager) = manager.upgrade() {
                    manager.finish_uncompleted_transaction(&transaction);
                }
            })
        };
        self.handle(transaction, Ok(TransactionStatus::Purchased { completion }));
    }

    fn handle_transaction_failed(&self, transaction: PaymentTransaction) {
        let result = match &transaction.error {
            Some(error) if error.is_cancellation() => {
                tracing::debug!("Cancelled {transaction}");
                Err(TransactionError::Cancelled)
            }
            Some(error) => {
                tracing::debug!("Error {error} for {transaction}");
                Err(TransactionError::Other {
                    message: error.message.clone(),
                })
            }
            None => {
                tracing::warn!("Failed without an error description: {transaction}");
                Err(TransactionError::Other {
                    message: MISSING_ERROR_MESSAGE.to_string(),
                })
            }
        };
        self.handle(transaction, result);
    }

    fn handle_transaction_restored(&self, transaction: PaymentTransaction) {
        tracing::debug!("Will handle Restored {transaction}");
        {
            let mut state = self.lock_state();
            state
                .restored_products
                .insert(transaction.payment.product_id.clone());
            state.take_uncompleted(&transaction);
        }
        self.payment_queue.finish_transaction(&transaction);
    }

    /// Deferred transactions only reach waiters that are already registered;
    /// the process stays in flight until a final state arrives.
    fn handle_transaction_deferred(&self, transaction: PaymentTransaction) {
        let handlers = self
            .lock_state()
            .active_transactions
            .process_where(|r| r.product_id() == transaction.product_id())
            .map(|p| p.handlers());
        if let Some(handlers) = handlers {
            tracing::info!("Will notify about deferred {transaction}. Ask to buy flow starts here.");
            notify(&handlers, Ok(TransactionStatus::Deferred));
        }
    }

    fn handle(&self, transaction: PaymentTransaction, result: TransactionResult) {
        let is_failure = result.is_err();
        let reconciliation = {
            let mut state = self.lock_state();
            let auto_complete = state
                .active_transactions
                .object_where(|r| r.product_id() == transaction.product_id())
                .map(|r| r.auto_complete);
            match auto_complete {
                Some(auto_complete) => {
                    let finish = auto_complete || is_failure;
                    if finish {
                        state.take_uncompleted(&transaction);
                    } else {
                        state.add_uncompleted(&transaction);
                    }
                    Reconciliation::NotifyWaiters {
                        finish,
                        waiters: state
                            .active_transactions
                            .take_where(|r| r.product_id() == transaction.product_id()),
                    }
                }
                None if is_failure => Reconciliation::FinishUnexpected,
                None => {
                    state.add_uncompleted(&transaction);
                    tracing::info!(
                        uncompleted = state.uncompleted_transactions.len(),
                        "No waiters for {transaction}. Added to uncompleted transactions."
                    );
                    Reconciliation::ReportUnexpected
                }
            }
        };

        match reconciliation {
            Reconciliation::NotifyWaiters { finish, waiters } => {
                if finish {
                    tracing::debug!("Will complete {transaction}");
                    self.payment_queue.finish_transaction(&transaction);
                }
                if let Some(waiters) = waiters {
                    tracing::debug!(
                        waiters = waiters.waiters_count(),
                        "Will notify waiters for {transaction} with result {result:?}"
                    );
                    waiters.notify_waiters(result);
                }
            }
            Reconciliation::FinishUnexpected => {
                tracing::debug!("Will complete unexpected {transaction}");
                self.payment_queue.finish_transaction(&transaction);
            }
            Reconciliation::ReportUnexpected => {
                if let Some(delegate) = self.delegate() {
                    delegate.did_update_unexpected_transaction(&transaction, &result);
                }
            }
        }
    }

    fn finish_uncompleted_transaction(&self, transaction: &PaymentTransaction) {
        let uncompleted = self.lock_state().take_uncompleted(transaction);
        match uncompleted {
            Some(transaction) => {
                tracing::debug!("Will finish Purchased {transaction}");
                self.payment_queue.finish_transaction(&transaction);
            }
            None => tracing::debug!("Already finished {transaction}"),
        }
    }

    fn complete_restore(&self, result: Result<(), PaymentError>) {
        let completions = mem::take(&mut self.lock_state().restore_completions);
        for completion in completions {
            completion(result.clone());
        }
    }
}

impl TransactionsRepository for TransactionsManager {
    fn can_make_payments(&self) -> bool {
        self.payment_queue.can_make_payments()
    }

    fn perform_transaction(&self, request: PurchaseRequest, completion: TransactionResultCallback) {
        let completion: Handler<TransactionResult> = Arc::from(completion);
        let is_new = {
            let mut state = self.lock_state();
            match state.active_transactions.process_where_mut(|r| r == &request) {
                Some(active) => {
                    tracing::debug!("Will add completion handler for ongoing {request}");
                    active.add_handler(completion);
                    false
                }
                None => {
                    tracing::debug!("Will start {request}");
                    state
                        .active_transactions
                        .add_process(ProcessCallbacksHolder::new(request.clone(), vec![completion]));
                    true
                }
            }
        };
        // Registered before submitting, so an immediate update finds its
        // waiter.
        if is_new {
            self.payment_queue.add_payment(request.to_payment());
        }
    }

    fn restore_purchases(&self, completion: RestoreResultCallback) {
        let should_start = {
            let mut state = self.lock_state();
            state.restore_completions.push(completion);
            if state.restore_completions.len() > 1 {
                tracing::debug!("Restore already in progress, will notify when it ends");
                false
            } else {
                state.restored_products.clear();
                true
            }
        };
        if should_start {
            tracing::info!("Will restore purchases");
            self.payment_queue.restore_completed_transactions();
        }
    }

    fn can_complete_transaction_with_id(&self, transaction_id: &str) -> bool {
        self.lock_state()
            .uncompleted_transactions
            .iter()
            .any(|t| t.transaction_id.as_deref() == Some(transaction_id))
    }

    fn complete_transaction_with_id(&self, transaction_id: &str) -> Result<(), TransactionError> {
        let transaction = {
            let mut state = self.lock_state();
            state
                .uncompleted_transactions
                .iter()
                .position(|t| t.transaction_id.as_deref() == Some(transaction_id))
                .map(|index| state.uncompleted_transactions.remove(index))
        };
        match transaction {
            Some(transaction) => {
                tracing::info!("Will finish uncompleted {transaction}");
                self.payment_queue.finish_transaction(&transaction);
                Ok(())
            }
            None => {
                tracing::debug!("Did not find uncompleted transaction with id {transaction_id}");
                Err(TransactionError::NotFound)
            }
        }
    }

    fn restored_products(&self) -> ProductIds {
        self.lock_state().restored_products.clone()
    }

    fn set_delegate(&self, delegate: Weak<dyn TransactionsManagerDelegate>) {
        *self.delegate.write().unwrap_or_else(PoisonError::into_inner) = Some(delegate);
    }
}

impl PaymentTransactionObserver for TransactionsManager {
    fn updated_transactions(&self, transactions: Vec<PaymentTransaction>) {
        tracing::debug!("Did update {} transactions", transactions.len());
        for transaction in transactions {
            tracing::debug!("{transaction}");
            match transaction.state {
                TransactionState::Purchased => self.handle_transaction_purchased(transaction),
                TransactionState::Failed => self.handle_transaction_failed(transaction),
                TransactionState::Restored => self.handle_transaction_restored(transaction),
                TransactionState::Deferred => self.handle_transaction_deferred(transaction),
                TransactionState::Purchasing => {}
            }
        }
    }

    fn restore_completed_transactions_finished(&self) {
        tracing::info!("Did finish restoring purchases");
        self.complete_restore(Ok(()));
    }

    fn restore_completed_transactions_failed(&self, error: PaymentError) {
        tracing::error!("Failed to restore purchases: {error}");
        self.complete_restore(Err(error));
    }

    fn should_add_store_payment(&self, payment: &Payment, product: &Product) -> bool {
        self.delegate()
            .map(|delegate| delegate.should_add_store_payment(payment, product))
            .unwrap_or(false)
    }
}

fn notify(handlers: &[Handler<TransactionResult>], result: TransactionResult) {
    for handler in handlers {
        handler(result.clone());
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::domain::entities::payment_transaction::PAYMENT_CANCELLED_ERROR_CODE;

    #[derive(Default)]
    struct MockPaymentQueue {
        observer: Mutex<Option<Weak<dyn PaymentTransactionObserver>>>,
        payments: Mutex<Vec<Payment>>,
        finished: Mutex<Vec<PaymentTransaction>>,
        restore_calls: AtomicUsize,
    }

    impl PaymentQueue for MockPaymentQueue {
        fn can_make_payments(&self) -> bool {
            true
        }

        fn add_observer(&self, observer: Weak<dyn PaymentTransactionObserver>) {
            *self.observer.lock().unwrap() = Some(observer);
        }

        fn add_payment(&self, payment: Payment) {
            self.payments.lock().unwrap().push(payment);
        }

        fn restore_completed_transactions(&self) {
            self.restore_calls.fetch_add(1, Ordering::SeqCst);
        }

        fn finish_transaction(&self, transaction: &PaymentTransaction) {
            self.finished.lock().unwrap().push(transaction.clone());
        }
    }

    impl MockPaymentQueue {
        fn observer(&self) -> Arc<dyn PaymentTransactionObserver> {
            let observer = self.observer.lock().unwrap().clone();
            observer.and_then(|o| o.upgrade()).expect("observer is set")
        }

        fn update(&self, transactions: Vec<PaymentTransaction>) {
            self.observer().updated_transactions(transactions);
        }

        fn payments(&self) -> Vec<Payment> {
            self.payments.lock().unwrap().clone()
        }

        fn finished(&self) -> Vec<PaymentTransaction> {
            self.finished.lock().unwrap().clone()
        }
    }

    #[derive(Default)]
    struct MockDelegate {
        unexpected: Mutex<Vec<PaymentTransaction>>,
        allow_store_payments: bool,
    }

    impl TransactionsManagerDelegate for MockDelegate {
        fn should_add_store_payment(&self, _payment: &Payment, _product: &Product) -> bool {
            self.allow_store_payments
        }

        fn did_update_unexpected_transaction(
            &self,
            transaction: &PaymentTransaction,
            _result: &TransactionResult,
        ) {
            self.unexpected.lock().unwrap().push(transaction.clone());
        }
    }

    struct Fixture {
        queue: Arc<MockPaymentQueue>,
        delegate: Arc<MockDelegate>,
        manager: Arc<TransactionsManager>,
    }

    fn fixture() -> Fixture {
        let queue = Arc::new(MockPaymentQueue::default());
        let manager = TransactionsManager::new(queue.clone());
        let delegate = Arc::new(MockDelegate::default());
        let weak_delegate: Weak<dyn TransactionsManagerDelegate> =
            Arc::<MockDelegate>::downgrade(&delegate);
        manager.set_delegate(weak_delegate);
        Fixture {
            queue,
            delegate,
            manager,
        }
    }

    fn product(id: &str) -> Product {
        Product {
            id: id.to_string(),
            localized_title: String::new(),
            localized_description: String::new(),
            price_micros: 1_990_000,
            currency_code: "EUR".to_string(),
        }
    }

    fn request(product_id: &str, auto_complete: bool) -> PurchaseRequest {
        PurchaseRequest::new(product(product_id)).with_auto_complete(auto_complete)
    }

    fn transaction(product_id: &str, state: TransactionState) -> PaymentTransaction {
        PaymentTransaction {
            transaction_id: Some(format!("tx-{product_id}")),
            payment: PurchaseRequest::new(product(product_id)).to_payment(),
            state,
            error: None,
        }
    }

    fn failed(product_id: &str, error: Option<PaymentError>) -> PaymentTransaction {
        PaymentTransaction {
            error,
            ..transaction(product_id, TransactionState::Failed)
        }
    }

    type Results = Arc<Mutex<Vec<TransactionResult>>>;

    fn recorder() -> (Results, TransactionResultCallback) {
        let results: Results = Arc::new(Mutex::new(Vec::new()));
        let sink = results.clone();
        (
            results,
            Box::new(move |result| sink.lock().unwrap().push(result)),
        )
    }

    #[test]
    fn registers_as_queue_observer() {
        let f = fixture();
        assert!(f.queue.observer.lock().unwrap().is_some());
    }

    #[test]
    fn purchasing_state_never_notifies() {
        let f = fixture();
        let (results, completion) = recorder();
        f.manager.perform_transaction(request("1", true), completion);

        f.queue.update(vec![transaction("1", TransactionState::Purchasing)]);

        assert!(results.lock().unwrap().is_empty());
        assert!(f.queue.finished().is_empty());
    }

    #[test]
    fn auto_completed_purchase_is_finished_immediately() {
        let f = fixture();
        let (results, completion) = recorder();
        f.manager.perform_transaction(request("1", true), completion);
        let purchased = transaction("1", TransactionState::Purchased);

        f.queue.update(vec![purchased.clone()]);

        let results = results.lock().unwrap();
        assert!(matches!(
            results.as_slice(),
            [Ok(TransactionStatus::Purchased { .. })]
        ));
        assert_eq!(f.queue.finished(), vec![purchased]);
        assert!(!f.manager.can_complete_transaction_with_id("tx-1"));

        // Completing an auto-completed transaction again does nothing.
        if let Ok(TransactionStatus::Purchased { completion }) = &results[0] {
            completion.complete();
        }
        assert_eq!(f.queue.finished().len(), 1);
    }

    #[test]
    fn manual_purchase_waits_for_completion() {
        let f = fixture();
        let queue = f.queue.clone();
        let manager = f.manager.clone();
        let purchased = transaction("1", TransactionState::Purchased);
        let expected = purchased.clone();
        let checked = Arc::new(AtomicUsize::new(0));
        let checks = checked.clone();

        f.manager.perform_transaction(
            request("1", false),
            Box::new(move |result| {
                let Ok(TransactionStatus::Purchased { completion }) = result else {
                    panic!("transaction should be purchased");
                };
                assert!(queue.finished().is_empty());
                assert!(manager.can_complete_transaction_with_id("tx-1"));
                completion.complete();
                assert!(!manager.can_complete_transaction_with_id("tx-1"));
                assert_eq!(queue.finished(), vec![expected.clone()]);
                completion.complete();
                assert_eq!(queue.finished().len(), 1);
                checks.fetch_add(1, Ordering::SeqCst);
            }),
        );

        f.queue.update(vec![purchased]);

        assert_eq!(checked.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn manual_purchase_is_finished_by_transaction_id() {
        let f = fixture();
        let (results, completion) = recorder();
        f.manager.perform_transaction(request("1", false), completion);
        let purchased = transaction("1", TransactionState::Purchased);

        f.queue.update(vec![purchased.clone()]);

        assert!(matches!(
            results.lock().unwrap().as_slice(),
            [Ok(TransactionStatus::Purchased { .. })]
        ));
        assert!(f.queue.finished().is_empty());
        assert!(f.delegate.unexpected.lock().unwrap().is_empty());
        assert!(f.manager.can_complete_transaction_with_id("tx-1"));

        assert_eq!(f.manager.complete_transaction_with_id("tx-1"), Ok(()));
        assert_eq!(f.queue.finished(), vec![purchased]);
        assert!(f.manager.uncompleted_transactions().is_empty());

        if let Ok(TransactionStatus::Purchased { completion }) = &results.lock().unwrap()[0] {
            completion.complete();
        }
        assert_eq!(f.queue.finished().len(), 1);
    }

    #[test]
    fn unexpected_purchase_is_held_and_reported() {
        let f = fixture();
        let purchased = transaction("1", TransactionState::Purchased);

        f.queue.update(vec![purchased.clone()]);

        assert!(f.queue.finished().is_empty());
        assert_eq!(*f.delegate.unexpected.lock().unwrap(), vec![purchased.clone()]);
        assert!(f.manager.can_complete_transaction_with_id("tx-1"));

        assert_eq!(f.manager.complete_transaction_with_id("tx-1"), Ok(()));
        assert_eq!(f.queue.finished(), vec![purchased]);
        assert!(!f.manager.can_complete_transaction_with_id("tx-1"));
        assert_eq!(
            f.manager.complete_transaction_with_id("tx-1"),
            Err(TransactionError::NotFound)
        );
    }

    #[test]
    fn reported_again_transaction_is_held_once() {
        let f = fixture();
        let purchased = transaction("1", TransactionState::Purchased);

        f.queue.update(vec![purchased.clone()]);
        f.queue.update(vec![purchased]);

        assert_eq!(f.manager.uncompleted_transactions().len(), 1);
    }

    #[test]
    fn uncompleted_transaction_is_finished_when_auto_complete_request_arrives() {
        let f = fixture();
        let purchased = transaction("1", TransactionState::Purchased);
        f.queue.update(vec![purchased.clone()]);
        assert!(f.manager.can_complete_transaction_with_id("tx-1"));

        let (results, completion) = recorder();
        f.manager.perform_transaction(request("1", true), completion);
        f.queue.update(vec![purchased.clone()]);

        assert_eq!(results.lock().unwrap().len(), 1);
        assert_eq!(f.queue.finished(), vec![purchased]);
        assert!(!f.manager.can_complete_transaction_with_id("tx-1"));
    }

    #[test]
    fn failed_purchase_is_finished_and_reported() {
        let f = fixture();
        let (results, completion) = recorder();
        f.manager.perform_transaction(request("1", false), completion);
        let failed = failed("1", Some(PaymentError::new(0, "Cannot connect")));

        f.queue.update(vec![failed.clone()]);

        assert_eq!(f.queue.finished(), vec![failed]);
        assert!(matches!(
            results.lock().unwrap().as_slice(),
            [Err(TransactionError::Other { message })] if message == "Cannot connect"
        ));
        assert!(f.manager.uncompleted_transactions().is_empty());
    }

    #[test]
    fn cancelled_purchase_maps_to_cancelled() {
        let f = fixture();
        let (results, completion) = recorder();
        f.manager.perform_transaction(request("1", true), completion);

        f.queue.update(vec![failed(
            "1",
            Some(PaymentError::new(PAYMENT_CANCELLED_ERROR_CODE, "cancelled")),
        )]);

        assert!(matches!(
            results.lock().unwrap().as_slice(),
            [Err(TransactionError::Cancelled)]
        ));
    }

    #[test]
    fn failure_without_error_maps_to_other() {
        let f = fixture();
        let (results, completion) = recorder();
        f.manager.perform_transaction(request("1", true), completion);

        f.queue.update(vec![failed("1", None)]);

        assert!(matches!(
            results.lock().unwrap().as_slice(),
            [Err(TransactionError::Other { message })] if message == MISSING_ERROR_MESSAGE
        ));
    }

    #[test]
    fn unexpected_failure_is_finished_silently() {
        let f = fixture();
        let failed = failed("1", Some(PaymentError::new(0, "Declined")));

        f.queue.update(vec![failed.clone()]);

        assert_eq!(f.queue.finished(), vec![failed]);
        assert!(f.delegate.unexpected.lock().unwrap().is_empty());
        assert!(!f.manager.can_complete_transaction_with_id("tx-1"));
    }

    #[test]
    fn restored_transaction_is_always_finished() {
        let f = fixture();
        let (results, completion) = recorder();
        f.manager.perform_transaction(request("2", false), completion);
        let restored_1 = transaction("1", TransactionState::Restored);
        let restored_2 = transaction("2", TransactionState::Restored);

        f.queue.update(vec![restored_1.clone(), restored_2.clone()]);

        assert_eq!(f.queue.finished(), vec![restored_1, restored_2]);
        assert_eq!(
            f.manager.restored_products(),
            ["1", "2"].iter().map(|s| s.to_string()).collect::<ProductIds>()
        );
        assert!(f.delegate.unexpected.lock().unwrap().is_empty());
        assert!(!f.manager.can_complete_transaction_with_id("tx-1"));
        assert!(results.lock().unwrap().is_empty());
    }

    #[test]
    fn deferred_notifies_waiters_and_keeps_process() {
        let f = fixture();
        let (results, completion) = recorder();
        f.manager.perform_transaction(request("1", true), completion);

        f.queue.update(vec![transaction("1", TransactionState::Deferred)]);
        assert!(matches!(
            results.lock().unwrap().as_slice(),
            [Ok(TransactionStatus::Deferred)]
        ));
        assert!(f.queue.finished().is_empty());

        let (late_results, late_completion) = recorder();
        f.manager.perform_transaction(request("1", true), late_completion);
        assert_eq!(f.queue.payments().len(), 1);

        f.queue.update(vec![transaction("1", TransactionState::Purchased)]);
        assert!(matches!(
            results.lock().unwrap().as_slice(),
            [Ok(TransactionStatus::Deferred), Ok(TransactionStatus::Purchased { .. })]
        ));
        assert!(matches!(
            late_results.lock().unwrap().as_slice(),
            [Ok(TransactionStatus::Purchased { .. })]
        ));
    }

    #[test]
    fn unexpected_deferred_is_ignored() {
        let f = fixture();

        f.queue.update(vec![transaction("1", TransactionState::Deferred)]);

        assert!(f.queue.finished().is_empty());
        assert!(f.delegate.unexpected.lock().unwrap().is_empty());
        assert!(!f.manager.can_complete_transaction_with_id("tx-1"));
    }

    #[test]
    fn same_product_requests_are_submitted_once() {
        let f = fixture();
        let (first, first_completion) = recorder();
        let (second, second_completion) = recorder();

        f.manager.perform_transaction(request("1", true), first_completion);
        f.manager.perform_transaction(request("1", false).with_quantity(2), second_completion);
        f.manager.perform_transaction(request("2", true), Box::new(|_| {}));

        let payments = f.queue.payments();
        assert_eq!(payments.len(), 2);
        assert_eq!(payments[0].product_id, "1");
        assert_eq!(payments[0].quantity, 1);

        f.queue.update(vec![transaction("1", TransactionState::Purchased)]);
        assert_eq!(first.lock().unwrap().len(), 1);
        assert_eq!(second.lock().unwrap().len(), 1);
        // The first request's auto-complete flag governs the merged process.
        assert_eq!(f.queue.finished().len(), 1);
    }

    #[test]
    fn concurrent_same_product_requests_are_submitted_once() {
        let f = fixture();
        let notified = Arc::new(AtomicUsize::new(0));

        std::thread::scope(|scope| {
            for _ in 0..8 {
                let manager = f.manager.clone();
                let notified = notified.clone();
                scope.spawn(move || {
                    manager.perform_transaction(
                        request("1", true),
                        Box::new(move |_| {
                            notified.fetch_add(1, Ordering::SeqCst);
                        }),
                    );
                });
            }
        });
        assert_eq!(f.queue.payments().len(), 1);

        f.queue.update(vec![transaction("1", TransactionState::Purchased)]);
        assert_eq!(notified.load(Ordering::SeqCst), 8);
    }

    #[test]
    fn restore_success_and_failure_reach_callback() {
        let f = fixture();
        let outcome = Arc::new(Mutex::new(Vec::new()));

        let sink = outcome.clone();
        f.manager
            .restore_purchases(Box::new(move |result| sink.lock().unwrap().push(result)));
        f.queue.observer().restore_completed_transactions_finished();

        let sink = outcome.clone();
        f.manager
            .restore_purchases(Box::new(move |result| sink.lock().unwrap().push(result)));
        let error = PaymentError::new(0, "offline");
        f.queue
            .observer()
            .restore_completed_transactions_failed(error.clone());

        assert_eq!(*outcome.lock().unwrap(), vec![Ok(()), Err(error)]);
        assert_eq!(f.queue.restore_calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn concurrent_restores_are_coalesced() {
        let f = fixture();
        let outcome = Arc::new(Mutex::new(Vec::new()));

        f.queue.update(vec![transaction("old", TransactionState::Restored)]);
        for name in ["first", "second"] {
            let sink = outcome.clone();
            f.manager
                .restore_purchases(Box::new(move |result| sink.lock().unwrap().push((name, result))));
        }
        assert_eq!(f.queue.restore_calls.load(Ordering::SeqCst), 1);
        assert!(f.manager.restored_products().is_empty());

        f.queue.update(vec![transaction("1", TransactionState::Restored)]);
        f.queue.observer().restore_completed_transactions_finished();

        assert_eq!(
            *outcome.lock().unwrap(),
            vec![("first", Ok(())), ("second", Ok(()))]
        );
        assert_eq!(
            f.manager.restored_products(),
            std::iter::once("1".to_string()).collect::<ProductIds>()
        );
    }

    #[test]
    fn store_payment_authorization_asks_delegate() {
        let queue = Arc::new(MockPaymentQueue::default());
        let manager = TransactionsManager::new(queue.clone());
        let payment = PurchaseRequest::new(product("promo")).to_payment();
        assert!(!manager.should_add_store_payment(&payment, &product("promo")));

        let delegate = Arc::new(MockDelegate {
            allow_store_payments: true,
            ..Default::default()
        });
        let weak_delegate: Weak<dyn TransactionsManagerDelegate> =
            Arc::<MockDelegate>::downgrade(&delegate);
        manager.set_delegate(weak_delegate);
        assert!(manager.should_add_store_payment(&payment, &product("promo")));

        drop(delegate);
        assert!(!manager.should_add_store_payment(&payment, &product("promo")));
    }
}
