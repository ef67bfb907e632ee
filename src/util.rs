use std::sync::{Arc, Mutex, PoisonError, Weak};

use tokio::sync::oneshot;

use crate::{
    data::{
        datasources::{
            payment_queue::PaymentQueue,
            products_fetcher::ProductsFetcher,
            receipt_data_source::ReceiptDataSource,
            receipt_fetcher::{AppStoreReceiptFetcherImpl, ReceiptFetcher},
        },
        repositories::{
            products_repository_impl::ProductsManager,
            receipts_repository_impl::ReceiptsManager,
            transactions_repository_impl::TransactionsManager,
        },
    },
    domain::{
        entities::{
            payment_transaction::PaymentTransaction,
            product::{Product, ProductIds, ProductsResponse},
            purchase_request::PurchaseRequest,
            transaction_status::{
                RestoreResultCallback, TransactionResult, TransactionResultCallback,
            },
            validated_receipt::{AppStoreReceiptInApp, AppStoreValidatedReceipt},
        },
        repositories::{
            products_repository::ProductsRepository,
            receipts_repository::ReceiptsRepository,
            transactions_repository::{TransactionsManagerDelegate, TransactionsRepository},
        },
    },
    errors::{ProductsError, ReceiptError, TransactionError},
    secrets::PaymentKitSecrets,
};

/// Entry point for the host application: products, purchases, restores and
/// receipt validation behind one object.
pub struct PaymentKit<P: ProductsRepository, R: ReceiptsRepository> {
    transactions_manager: Arc<TransactionsManager>,
    products_repository: P,
    receipts_repository: R,
    shared_secret: String,
    simulates_ask_to_buy_in_sandbox: bool,
    auto_complete: bool,
}

impl<P: ProductsRepository, R: ReceiptsRepository> PaymentKit<P, R> {
    /// Applied to purchases started with [`PaymentKit::purchase_product`].
    /// Off by default.
    pub fn simulating_ask_to_buy(mut self, simulate: bool) -> Self {
        self.simulates_ask_to_buy_in_sandbox = simulate;
        self
    }

    /// Applied to purchases started with [`PaymentKit::purchase_product`]. On
    /// by default.
    pub fn with_auto_complete(mut self, auto_complete: bool) -> Self {
        self.auto_complete = auto_complete;
        self
    }

    pub fn can_make_payments(&self) -> bool {
        self.transactions_manager.can_make_payments()
    }

    pub async fn fetch_products(&self, ids: &ProductIds) -> Result<ProductsResponse, ProductsError> {
        self.products_repository.fetch_products_with(ids).await
    }

    pub fn cached_products_with(&self, ids: &ProductIds) -> Option<ProductsResponse> {
        self.products_repository.cached_products_with(ids)
    }

    pub fn cached_product(&self, id: &str) -> Option<Product> {
        self.products_repository.cached_product(id)
    }

    pub fn perform_transaction(&self, request: PurchaseRequest, completion: TransactionResultCallback) {
        self.transactions_manager.perform_transaction(request, completion)
    }

    /// Buys one unit of `product` with the kit's defaults and resolves with
    /// the first outcome: the purchase, a failure, or `Deferred` while the
    /// purchase waits for approval.
    pub async fn purchase_product(&self, product: Product) -> TransactionResult {
        let request = PurchaseRequest::new(product)
            .simulating_ask_to_buy(self.simulates_ask_to_buy_in_sandbox)
            .with_auto_complete(self.auto_complete);
        let (sender, receiver) = oneshot::channel();
        let sender = Mutex::new(Some(sender));
        self.perform_transaction(
            request,
            Box::new(move |result| {
                let sender = sender.lock().unwrap_or_else(PoisonError::into_inner).take();
                if let Some(sender) = sender {
                    let _ = sender.send(result);
                }
            }),
        );
        receiver.await.unwrap_or_else(|_| {
            Err(TransactionError::Other {
                message: "purchase request was dropped".to_string(),
            })
        })
    }

    pub fn restore_purchases(&self, completion: RestoreResultCallback) {
        self.transactions_manager.restore_purchases(completion)
    }

    pub fn restored_products(&self) -> ProductIds {
        self.transactions_manager.restored_products()
    }

    pub fn can_complete_transaction_with_id(&self, transaction_id: &str) -> bool {
        self.transactions_manager
            .can_complete_transaction_with_id(transaction_id)
    }

    pub fn complete_transaction_with_id(&self, transaction_id: &str) -> Result<(), TransactionError> {
        self.transactions_manager
            .complete_transaction_with_id(transaction_id)
    }

    pub fn uncompleted_transactions(&self) -> Vec<PaymentTransaction> {
        self.transactions_manager.uncompleted_transactions()
    }

    pub fn set_delegate(&self, delegate: Weak<dyn TransactionsManagerDelegate>) {
        self.transactions_manager.set_delegate(delegate)
    }

    pub async fn refresh_receipt(&self, force_reload: bool) -> Result<(), ReceiptError> {
        self.receipts_repository.refresh_receipt(force_reload).await
    }

    /// Validates the local receipt with the configured shared secret.
    pub async fn validate_receipt(&self) -> Result<AppStoreValidatedReceipt, ReceiptError> {
        self.receipts_repository
            .validate_receipt(&self.shared_secret)
            .await
    }

    pub fn validated_receipt(&self) -> Option<AppStoreValidatedReceipt> {
        self.receipts_repository.validated_receipt()
    }

    /// Validates the receipt and returns the first unexpired subscription
    /// transaction.
    pub async fn active_subscription_receipt(
        &self,
    ) -> Result<Option<AppStoreReceiptInApp>, ReceiptError> {
        let receipt = self.validate_receipt().await?;
        Ok(receipt.active_subscription_receipt().cloned())
    }

    /// Validates the receipt and returns the first non-subscription purchase.
    pub async fn last_purchase_receipt(&self) -> Result<Option<AppStoreReceiptInApp>, ReceiptError> {
        let receipt = self.validate_receipt().await?;
        Ok(receipt.last_purchase_receipt().cloned())
    }

    pub async fn has_active_subscription(&self) -> Result<bool, ReceiptError> {
        let receipt = self.validate_receipt().await?;
        Ok(receipt
            .subscriptions_statuses()
            .iter()
            .any(|status| status.is_active()))
    }

    pub fn transactions_manager(&self) -> &Arc<TransactionsManager> {
        &self.transactions_manager
    }
}

impl<PF, S, RF> PaymentKit<ProductsManager<PF>, ReceiptsManager<S, RF>>
where
    PF: ProductsFetcher,
    S: ReceiptDataSource,
    RF: ReceiptFetcher,
{
    pub fn with_receipt_fetcher(
        secrets: PaymentKitSecrets,
        payment_queue: Arc<dyn PaymentQueue>,
        products_fetcher: PF,
        receipt_data_source: S,
        receipt_fetcher: RF,
    ) -> Self {
        tracing::debug!(environment = %secrets.environment, "Will set up payment kit");
        Self {
            transactions_manager: TransactionsManager::new(payment_queue),
            products_repository: ProductsManager::new(products_fetcher),
            receipts_repository: ReceiptsManager::new(
                receipt_data_source,
                receipt_fetcher,
                secrets.environment,
            ),
            shared_secret: secrets.shared_secret,
            simulates_ask_to_buy_in_sandbox: false,
            auto_complete: true,
        }
    }
}

impl<PF, S> PaymentKit<ProductsManager<PF>, ReceiptsManager<S, AppStoreReceiptFetcherImpl>>
where
    PF: ProductsFetcher,
    S: ReceiptDataSource,
{
    /// Validates receipts against the App Store endpoints.
    pub fn new(
        secrets: PaymentKitSecrets,
        payment_queue: Arc<dyn PaymentQueue>,
        products_fetcher: PF,
        receipt_data_source: S,
    ) -> Self {
        Self::with_receipt_fetcher(
            secrets,
            payment_queue,
            products_fetcher,
            receipt_data_source,
            AppStoreReceiptFetcherImpl::new(),
        )
    }
}
