use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_with::{formats::Flexible, serde_as, DisplayFromStr, TimestampMilliSeconds};

use super::receipt_status::ReceiptStatus;

type Timestamp = TimestampMilliSeconds<String, Flexible>;

/// Response body of the `verifyReceipt` endpoint for a decodable receipt.
///
/// https://developer.apple.com/documentation/appstorereceipts/responsebody
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppStoreValidatedReceipt {
    pub status: i64,
    /// The environment for which the receipt was generated, either `Sandbox` or
    /// `Production`.
    pub environment: String,
    pub receipt: AppStoreReceipt,
    /// The latest base64-encoded app receipt. Only returned for receipts that
    /// contain auto-renewable subscriptions.
    pub latest_receipt: Option<String>,
    pub pending_renewal_info: Option<Vec<AppStorePendingRenewalInfo>>,
    /// All in-app purchase transactions, including renewals.
    pub latest_receipt_info: Option<Vec<AppStoreReceiptInApp>>,
}

#[serde_as]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppStoreReceipt {
    pub receipt_type: String,
    pub app_item_id: i64,
    #[serde(rename = "receipt_creation_date_ms")]
    #[serde_as(as = "Timestamp")]
    pub receipt_creation_date: DateTime<Utc>,
    pub in_app: Option<Vec<AppStoreReceiptInApp>>,
}

/// A single in-app purchase transaction in the receipt.
///
/// https://developer.apple.com/documentation/appstorereceipts/responsebody/latest_receipt_info
#[serde_as]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppStoreReceiptInApp {
    pub product_id: String,
    #[serde_as(as = "DisplayFromStr")]
    pub quantity: u32,
    pub transaction_id: String,
    pub original_transaction_id: String,
    #[serde(rename = "purchase_date_ms")]
    #[serde_as(as = "Timestamp")]
    pub purchase_date: DateTime<Utc>,
    #[serde(rename = "original_purchase_date_ms")]
    #[serde_as(as = "Option<Timestamp>")]
    pub original_purchase_date: Option<DateTime<Utc>>,
    #[serde_as(as = "DisplayFromStr")]
    pub is_trial_period: bool,
    /// Only present for auto-renewable subscriptions.
    #[serde(rename = "expires_date_ms")]
    #[serde_as(as = "Option<Timestamp>")]
    pub expires_date: Option<DateTime<Utc>>,
    #[serde_as(as = "Option<DisplayFromStr>")]
    pub is_in_intro_offer_period: Option<bool>,
    pub web_order_line_item_id: Option<String>,
    /// Only present for upgrade transactions, in which case it is `true`.
    #[serde_as(as = "Option<DisplayFromStr>")]
    pub is_upgraded: Option<bool>,
    pub cancellation_reason: Option<AppStoreCancellationReason>,
    #[serde(rename = "cancellation_date_ms")]
    #[serde_as(as = "Option<Timestamp>")]
    pub cancellation_date: Option<DateTime<Utc>>,
}

impl AppStoreReceiptInApp {
    pub fn is_subscription(&self) -> bool {
        self.expires_date.is_some() && self.cancellation_date.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppStorePendingRenewalInfo {
    pub product_id: String,
    pub auto_renew_product_id: String,
    pub original_transaction_id: String,
    pub auto_renew_status: AppStorePendingRenewalInfoStatus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AppStorePendingRenewalInfoStatus {
    #[serde(rename = "1")]
    RenewOn,
    #[serde(rename = "0")]
    RenewOff,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AppStoreCancellationReason {
    /// The customer cancelled because of an actual or perceived issue within
    /// the app.
    #[serde(rename = "1")]
    IssueInApp,
    #[serde(rename = "0")]
    OtherReason,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubscriptionStatus {
    Active(SubscriptionStatusInfo),
    Expired(SubscriptionStatusInfo),
}

impl SubscriptionStatus {
    pub fn is_active(&self) -> bool {
        matches!(self, SubscriptionStatus::Active(_))
    }

    pub fn info(&self) -> &SubscriptionStatusInfo {
        match self {
            SubscriptionStatus::Active(info) | SubscriptionStatus::Expired(info) => info,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriptionStatusInfo {
    pub expiration_date: DateTime<Utc>,
    pub product_id: String,
    pub app_store_receipt: AppStoreReceiptInApp,
}

impl AppStoreValidatedReceipt {
    pub fn receipt_status(&self) -> ReceiptStatus {
        ReceiptStatus::from_code(self.status)
    }

    pub fn is_product_purchased(&self, product_id: &str) -> bool {
        self.latest_receipt_info
            .as_ref()
            .map(|info| info.iter().any(|r| r.product_id == product_id))
            .unwrap_or(false)
    }

    pub fn non_subscription_receipts(&self) -> Vec<&AppStoreReceiptInApp> {
        self.latest_receipt_info
            .iter()
            .flatten()
            .filter(|r| !r.is_subscription())
            .collect()
    }

    pub fn last_purchase_receipt(&self) -> Option<&AppStoreReceiptInApp> {
        self.non_subscription_receipts().into_iter().next()
    }

    pub fn active_subscription_receipt(&self) -> Option<&AppStoreReceiptInApp> {
        self.active_subscription_receipt_at(Utc::now())
    }

    pub fn active_subscription_receipt_at(
        &self,
        now: DateTime<Utc>,
    ) -> Option<&AppStoreReceiptInApp> {
        self.latest_receipt_info
            .iter()
            .flatten()
            .find(|r| r.expires_date.map(|e| e > now).unwrap_or(false))
    }

    pub fn subscriptions_statuses(&self) -> Vec<SubscriptionStatus> {
        self.subscriptions_statuses_at(Utc::now())
    }

    /// Status of every subscription product in the receipt, derived from its
    /// latest-expiring transaction. Sorted by product id.
    pub fn subscriptions_statuses_at(&self, now: DateTime<Utc>) -> Vec<SubscriptionStatus> {
        let mut by_product: BTreeMap<&str, Vec<&AppStoreReceiptInApp>> = BTreeMap::new();
        for receipt in self.latest_receipt_info.iter().flatten() {
            by_product
                .entry(receipt.product_id.as_str())
                .or_default()
                .push(receipt);
        }

        by_product
            .into_iter()
            .filter_map(|(product_id, receipts)| {
                let (expiration_date, latest) = receipts
                    .into_iter()
                    .filter(|r| r.is_subscription())
                    .filter_map(|r| r.expires_date.map(|e| (e, r)))
                    .max_by_key(|(e, _)| *e)?;
                let info = SubscriptionStatusInfo {
                    expiration_date,
                    product_id: product_id.to_string(),
                    app_store_receipt: latest.clone(),
                };
                Some(if expiration_date > now {
                    SubscriptionStatus::Active(info)
                } else {
                    SubscriptionStatus::Expired(info)
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    const RECEIPT_JSON: &str = r#"{
        "status": 0,
        "environment": "Sandbox",
        "receipt": {
            "receipt_type": "ProductionSandbox",
            "app_item_id": 0,
            "receipt_creation_date_ms": "1700000000000",
            "in_app": []
        },
        "latest_receipt": "bGF0ZXN0",
        "pending_renewal_info": [{
            "product_id": "monthly",
            "auto_renew_product_id": "monthly",
            "original_transaction_id": "100",
            "auto_renew_status": "1"
        }],
        "latest_receipt_info": [
            {
                "product_id": "monthly",
                "quantity": "1",
                "transaction_id": "101",
                "original_transaction_id": "100",
                "purchase_date_ms": "1700000000000",
                "original_purchase_date_ms": "1700000000000",
                "is_trial_period": "false",
                "expires_date_ms": "1702592000000",
                "is_in_intro_offer_period": "false",
                "web_order_line_item_id": "9000"
            },
            {
                "product_id": "monthly",
                "quantity": "1",
                "transaction_id": "100",
                "original_transaction_id": "100",
                "purchase_date_ms": "1697408000000",
                "is_trial_period": "true",
                "expires_date_ms": "1700000000000"
            },
            {
                "product_id": "yearly",
                "quantity": "1",
                "transaction_id": "200",
                "original_transaction_id": "200",
                "purchase_date_ms": "1600000000000",
                "is_trial_period": "false",
                "expires_date_ms": "1631536000000"
            },
            {
                "product_id": "lifetime",
                "quantity": "1",
                "transaction_id": "300",
                "original_transaction_id": "300",
                "purchase_date_ms": "1690000000000",
                "is_trial_period": "false"
            }
        ]
    }"#;

    fn receipt() -> AppStoreValidatedReceipt {
        serde_json::from_str(RECEIPT_JSON).unwrap()
    }

    #[test]
    fn decodes_string_encoded_fields() {
        let receipt = receipt();
        assert!(receipt.receipt_status().is_valid());
        assert_eq!(
            receipt.receipt.receipt_creation_date,
            Utc.timestamp_millis_opt(1_700_000_000_000).unwrap()
        );
        let info = receipt.latest_receipt_info.as_ref().unwrap();
        assert_eq!(info[0].quantity, 1);
        assert!(info[1].is_trial_period);
        assert_eq!(info[0].is_in_intro_offer_period, Some(false));
        assert_eq!(info[1].original_purchase_date, None);
        assert_eq!(
            receipt.pending_renewal_info.as_ref().unwrap()[0].auto_renew_status,
            AppStorePendingRenewalInfoStatus::RenewOn
        );
    }

    #[test]
    fn splits_subscriptions_by_latest_expiry() {
        let receipt = receipt();
        let now = Utc.timestamp_millis_opt(1_701_000_000_000).unwrap();
        let statuses = receipt.subscriptions_statuses_at(now);

        assert_eq!(statuses.len(), 2);
        assert!(statuses[0].is_active());
        assert_eq!(statuses[0].info().product_id, "monthly");
        assert_eq!(statuses[0].info().app_store_receipt.transaction_id, "101");
        assert!(!statuses[1].is_active());
        assert_eq!(statuses[1].info().product_id, "yearly");
    }

    #[test]
    fn non_subscription_queries() {
        let receipt = receipt();
        assert!(receipt.is_product_purchased("lifetime"));
        assert!(!receipt.is_product_purchased("unknown"));
        assert_eq!(
            receipt.last_purchase_receipt().map(|r| r.product_id.as_str()),
            Some("lifetime")
        );

        let now = Utc.timestamp_millis_opt(1_701_000_000_000).unwrap();
        assert_eq!(
            receipt
                .active_subscription_receipt_at(now)
                .map(|r| r.transaction_id.as_str()),
            Some("101")
        );
    }
}
