use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::errors::SecretsError;

const PRODUCTION_VERIFY_RECEIPT_URL: &str = "https://buy.itunes.apple.com/verifyReceipt";
const SANDBOX_VERIFY_RECEIPT_URL: &str = "https://sandbox.itunes.apple.com/verifyReceipt";

/// Which App Store receipt validation endpoint to talk to.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentsEnvironment {
    #[default]
    Production,
    Sandbox,
}

impl PaymentsEnvironment {
    pub fn verify_receipt_url(&self) -> &'static str {
        match self {
            PaymentsEnvironment::Production => PRODUCTION_VERIFY_RECEIPT_URL,
            PaymentsEnvironment::Sandbox => SANDBOX_VERIFY_RECEIPT_URL,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentsEnvironment::Production => "production",
            PaymentsEnvironment::Sandbox => "sandbox",
        }
    }
}

impl fmt::Display for PaymentsEnvironment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PaymentsEnvironment {
    type Err = SecretsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "production" => Ok(PaymentsEnvironment::Production),
            "sandbox" => Ok(PaymentsEnvironment::Sandbox),
            _ => Err(SecretsError::Invalid {
                key: crate::secrets::APP_STORE_ENVIRONMENT,
                value: s.to_string(),
            }),
        }
    }
}
