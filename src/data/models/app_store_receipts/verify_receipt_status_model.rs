use serde::Deserialize;

/// Minimal response body of the `verifyReceipt` endpoint, returned when the
/// receipt could not be decoded (for example, sent to the wrong environment).
#[derive(Debug, Deserialize)]
pub(crate) struct VerifyReceiptStatusModel {
    pub(crate) status: i64,
}
