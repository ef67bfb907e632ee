use async_trait::async_trait;

use crate::{
    domain::entities::product::{Product, ProductIds, ProductsResponse},
    errors::ProductsError,
};

#[async_trait]
pub trait ProductsRepository: Send + Sync {
    /// Resolves the given products, from cache when every one of them is
    /// already known.
    async fn fetch_products_with(&self, ids: &ProductIds)
        -> Result<ProductsResponse, ProductsError>;

    /// The cached products, only when every one of `ids` is cached.
    fn cached_products_with(&self, ids: &ProductIds) -> Option<ProductsResponse>;

    fn cached_product(&self, id: &str) -> Option<Product>;
}
