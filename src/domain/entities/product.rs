use std::collections::HashSet;

use serde::{Deserialize, Serialize};

/// Store identifier of a product, as configured in App Store Connect.
pub type ProductId = String;
pub type ProductIds = HashSet<ProductId>;

/// Store metadata of a purchasable product.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Product {
    pub id: ProductId,
    pub localized_title: String,
    pub localized_description: String,
    /// Price multiplied by 1,000,000, in `currency_code`.
    pub price_micros: i64,
    /// ISO 4217 currency code.
    pub currency_code: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProductsResponse {
    pub products: Vec<Product>,
    /// Requested identifiers the store did not recognize.
    pub invalid_product_identifiers: Vec<ProductId>,
}
