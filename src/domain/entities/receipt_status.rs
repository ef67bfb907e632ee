use std::fmt;

/// Status code returned by the `verifyReceipt` endpoint.
///
/// https://developer.apple.com/documentation/appstorereceipts/status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReceiptStatus {
    /// No status returned.
    None,
    Valid,
    /// The request to the App Store was not made using the HTTP POST request
    /// method.
    JsonNotReadable,
    /// The data in the receipt-data property was malformed or the service
    /// experienced a temporary issue. Try again.
    MalformedOrMissingData,
    /// The receipt could not be authenticated.
    ReceiptCouldNotBeAuthenticated,
    /// The shared secret you provided does not match the shared secret on file
    /// for your account.
    SecretNotMatching,
    /// The receipt server was temporarily unable to provide the receipt. Try
    /// again.
    ReceiptServerUnavailable,
    /// This receipt is valid but the subscription has expired. Only returned
    /// for iOS 6-style transaction receipts for auto-renewable subscriptions.
    SubscriptionExpired,
    /// This receipt is from the test environment, but it was sent to the
    /// production environment for verification.
    TestReceipt,
    /// This receipt is from the production environment, but it was sent to the
    /// test environment for verification.
    ProductionEnvironment,
    /// Internal data access error. Try again later.
    InternalError,
    /// The user account cannot be found or has been deleted.
    UserAccountCanNotBeFound,

    /// Any code not listed above.
    Unknown(i64),
}

impl ReceiptStatus {
    pub fn from_code(code: i64) -> Self {
        match code {
            -1 => ReceiptStatus::None,
            0 => ReceiptStatus::Valid,
            21000 => ReceiptStatus::JsonNotReadable,
            21002 => ReceiptStatus::MalformedOrMissingData,
            21003 => ReceiptStatus::ReceiptCouldNotBeAuthenticated,
            21004 => ReceiptStatus::SecretNotMatching,
            21005 => ReceiptStatus::ReceiptServerUnavailable,
            21006 => ReceiptStatus::SubscriptionExpired,
            21007 => ReceiptStatus::TestReceipt,
            21008 => ReceiptStatus::ProductionEnvironment,
            21009 => ReceiptStatus::InternalError,
            21010 => ReceiptStatus::UserAccountCanNotBeFound,
            other => ReceiptStatus::Unknown(other),
        }
    }

    pub fn code(&self) -> i64 {
        match self {
            ReceiptStatus::None => -1,
            ReceiptStatus::Valid => 0,
            ReceiptStatus::JsonNotReadable => 21000,
            ReceiptStatus::MalformedOrMissingData => 21002,
            ReceiptStatus::ReceiptCouldNotBeAuthenticated => 21003,
            ReceiptStatus::SecretNotMatching => 21004,
            ReceiptStatus::ReceiptServerUnavailable => 21005,
            ReceiptStatus::SubscriptionExpired => 21006,
            ReceiptStatus::TestReceipt => 21007,
            ReceiptStatus::ProductionEnvironment => 21008,
            ReceiptStatus::InternalError => 21009,
            ReceiptStatus::UserAccountCanNotBeFound => 21010,
            ReceiptStatus::Unknown(code) => *code,
        }
    }

    pub fn is_valid(&self) -> bool {
        *self == ReceiptStatus::Valid
    }
}

impl fmt::Display for ReceiptStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReceiptStatus::Unknown(code) => write!(f, "Unknown({code})"),
            known => write!(f, "{known:?}"),
        }
    }
}
