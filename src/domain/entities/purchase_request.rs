use std::{
    fmt,
    hash::{Hash, Hasher},
};

use serde::{Deserialize, Serialize};

use super::{payment_transaction::Payment, product::Product};

/// A signed promotional offer to apply to a subscription purchase.
///
/// https://developer.apple.com/documentation/storekit/skpaymentdiscount
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PurchaseOffer {
    /// The offer identifier configured in App Store Connect.
    pub identifier: String,
    /// The identifier of the subscription key used to sign the offer.
    pub key_identifier: String,
    /// A one-time UUID used when generating the signature.
    pub nonce: String,
    /// The base64-encoded signature of the offer.
    pub signature: String,
    /// The UNIX time, in milliseconds, the signature was generated.
    pub timestamp: u64,
}

/// A purchase the host application wants to make.
///
/// Two requests are considered the same in-flight purchase when they reference
/// the same product identifier, regardless of the other attributes.
#[derive(Debug, Clone)]
pub struct PurchaseRequest {
    pub product: Product,
    pub offer: Option<PurchaseOffer>,
    /// 0 means the platform default (1).
    pub quantity: u32,
    pub simulates_ask_to_buy_in_sandbox: bool,
    /// Consumable purchases stay in the receipt until they are finished, so
    /// content must be delivered before completing them. When `false`, a
    /// purchased transaction is kept uncompleted until the host confirms
    /// delivery.
    pub auto_complete: bool,
}

impl PurchaseRequest {
    pub fn new(product: Product) -> Self {
        Self {
            product,
            offer: None,
            quantity: 1,
            simulates_ask_to_buy_in_sandbox: false,
            auto_complete: true,
        }
    }

    pub fn with_offer(mut self, offer: PurchaseOffer) -> Self {
        self.offer = Some(offer);
        self
    }

    pub fn with_quantity(mut self, quantity: u32) -> Self {
        self.quantity = quantity;
        self
    }

    pub fn simulating_ask_to_buy(mut self, simulate: bool) -> Self {
        self.simulates_ask_to_buy_in_sandbox = simulate;
        self
    }

    pub fn with_auto_complete(mut self, auto_complete: bool) -> Self {
        self.auto_complete = auto_complete;
        self
    }

    pub fn product_id(&self) -> &str {
        &self.product.id
    }

    pub(crate) fn to_payment(&self) -> Payment {
        Payment {
            product_id: self.product.id.clone(),
            quantity: if self.quantity > 0 { self.quantity } else { 1 },
            simulates_ask_to_buy_in_sandbox: self.simulates_ask_to_buy_in_sandbox,
            offer: self.offer.clone(),
        }
    }
}

impl PartialEq for PurchaseRequest {
    fn eq(&self, other: &Self) -> bool {
        self.product.id == other.product.id
    }
}

impl Eq for PurchaseRequest {}

impl Hash for PurchaseRequest {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.product.id.hash(state);
    }
}

impl fmt::Display for PurchaseRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "PurchaseRequest for product {}, quantity: {}, simulateAskToBuy: {}, autoComplete: {}",
            self.product.id, self.quantity, self.simulates_ask_to_buy_in_sandbox, self.auto_complete
        )
    }
}
