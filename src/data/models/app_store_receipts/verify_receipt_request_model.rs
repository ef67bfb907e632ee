use serde::Serialize;

/// Request body of the `verifyReceipt` endpoint.
///
/// https://developer.apple.com/documentation/appstorereceipts/requestbody
#[derive(Debug, Serialize)]
pub(crate) struct VerifyReceiptRequestModel<'a> {
    /// The base64-encoded receipt data.
    #[serde(rename = "receipt-data")]
    pub(crate) receipt_data: String,
    /// The app's shared secret, required for receipts that contain
    /// auto-renewable subscriptions.
    pub(crate) password: &'a str,
}
