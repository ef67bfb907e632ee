use std::{
    collections::HashMap,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use async_trait::async_trait;
use tokio::sync::oneshot;

use crate::{
    data::datasources::products_fetcher::ProductsFetcher,
    domain::{
        entities::product::{Product, ProductId, ProductIds, ProductsResponse},
        repositories::products_repository::ProductsRepository,
    },
    errors::ProductsError,
    foundation::processes_manager::{Handler, ProcessCallbacksHolder, ProcessesManager},
};

type ProductsResult = Result<ProductsResponse, ProductsError>;

struct ProductsState {
    active_requests: ProcessesManager<ProductIds, ProductsResult>,
    products: HashMap<ProductId, Product>,
}

/// Fetches products through the injected fetcher and memoizes them by id.
///
/// A request is answered from cache only when every requested id is cached;
/// otherwise the whole set is fetched again. Concurrent requests for the same
/// id set share a single fetch.
pub struct ProductsManager<F: ProductsFetcher> {
    fetcher: F,
    state: Mutex<ProductsState>,
}

#[async_trait]
impl<F: ProductsFetcher> ProductsRepository for ProductsManager<F> {
    async fn fetch_products_with(&self, ids: &ProductIds) -> ProductsResult {
        loop {
            let (sender, receiver) = oneshot::channel();
            let should_start = {
                let mut state = self.lock_state();
                if let Some(products) = state.cached_products_with(ids) {
                    tracing::debug!(?ids, "Will return products from cache");
                    return Ok(ProductsResponse {
                        products,
                        invalid_product_identifiers: Vec::new(),
                    });
                }
                let waiter = oneshot_handler(sender);
                match state.active_requests.process_where_mut(|o| o == ids) {
                    Some(active) => {
                        tracing::debug!(?ids, "Will add completion handler to ongoing products request");
                        active.add_handler(waiter);
                        false
                    }
                    None => {
                        tracing::debug!(?ids, "Will start fetching products");
                        state
                            .active_requests
                            .add_process(ProcessCallbacksHolder::new(ids.clone(), vec![waiter]));
                        true
                    }
                }
            };

            if should_start {
                let mut in_flight = InFlightRequest {
                    manager: self,
                    ids,
                    finished: false,
                };
                let result = self.fetcher.fetch(ids).await;
                in_flight.finished = true;
                self.handle_products_request_result(result, ids);
            }

            match receiver.await {
                Ok(result) => return result,
                // The caller that started the fetch stopped waiting; take over.
                Err(_) => tracing::debug!(?ids, "Products request was dropped, will fetch again"),
            }
        }
    }

    fn cached_products_with(&self, ids: &ProductIds) -> Option<ProductsResponse> {
        let products = self.lock_state().cached_products_with(ids)?;
        Some(ProductsResponse {
            products,
            invalid_product_identifiers: Vec::new(),
        })
    }

    fn cached_product(&self, id: &str) -> Option<Product> {
        self.lock_state().products.get(id).cloned()
    }
}

impl<F: ProductsFetcher> ProductsManager<F> {
    pub fn new(fetcher: F) -> Self {
        Self {
            fetcher,
            state: Mutex::new(ProductsState {
                active_requests: ProcessesManager::new(),
                products: HashMap::new(),
            }),
        }
    }

    fn lock_state(&self) -> MutexGuard<'_, ProductsState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Waiters are oneshot senders, so they are completed under the lock.
    fn handle_products_request_result(&self, result: ProductsResult, ids: &ProductIds) {
        let mut state = self.lock_state();
        match &result {
            Ok(response) => {
                tracing::debug!(
                    products = ?response.products.iter().map(|p| &p.id).collect::<Vec<_>>(),
                    invalid = ?response.invalid_product_identifiers,
                    "Did receive products response"
                );
                for product in &response.products {
                    state.products.insert(product.id.clone(), product.clone());
                }
            }
            Err(e) => tracing::error!(?ids, "Products request failed: {e}"),
        }
        state.active_requests.complete_process_of_object(ids, result);
    }
}

impl ProductsState {
    fn cached_products_with(&self, ids: &ProductIds) -> Option<Vec<Product>> {
        let mut cached = ids
            .iter()
            .map(|id| self.products.get(id).cloned())
            .collect::<Option<Vec<_>>>()?;
        cached.sort_by(|a, b| a.id.cmp(&b.id));
        Some(cached)
    }
}

/// Drops the registration of a fetch whose future was dropped before the
/// fetcher answered. The waiters see their sender closed and start over.
struct InFlightRequest<'a, F: ProductsFetcher> {
    manager: &'a ProductsManager<F>,
    ids: &'a ProductIds,
    finished: bool,
}

impl<F: ProductsFetcher> Drop for InFlightRequest<'_, F> {
    fn drop(&mut self) {
        if !self.finished {
            self.manager
                .lock_state()
                .active_requests
                .remove_process(self.ids);
        }
    }
}

fn oneshot_handler(sender: oneshot::Sender<ProductsResult>) -> Handler<ProductsResult> {
    let sender = Mutex::new(Some(sender));
    Arc::new(move |result| {
        let sender = sender.lock().unwrap_or_else(PoisonError::into_inner).take();
        if let Some(sender) = sender {
            // The receiver is gone when its caller stopped waiting.
            let _ = sender.send(result);
        }
    })
}
