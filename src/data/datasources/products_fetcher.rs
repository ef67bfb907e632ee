use async_trait::async_trait;

use crate::{
    domain::entities::product::{ProductIds, ProductsResponse},
    errors::ProductsError,
};

/// Fetches product metadata from the store (StoreKit's `SKProductsRequest` or
/// an equivalent).
#[async_trait]
pub trait ProductsFetcher: Send + Sync {
    /// productIds:
    ///   Every identifier to resolve. Identifiers the store does not know are
    ///   returned in `invalid_product_identifiers`.
    async fn fetch(&self, product_ids: &ProductIds) -> Result<ProductsResponse, ProductsError>;
}
