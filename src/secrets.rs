use std::env;

use crate::{domain::entities::payments_environment::PaymentsEnvironment, errors::SecretsError};

pub const APP_STORE_SHARED_SECRET: &str = "APP_STORE_SHARED_SECRET";
pub const APP_STORE_ENVIRONMENT: &str = "APP_STORE_ENVIRONMENT";

/// Credentials and endpoint selection for receipt validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentKitSecrets {
    pub shared_secret: String,
    pub environment: PaymentsEnvironment,
}

impl PaymentKitSecrets {
    pub fn new(shared_secret: impl Into<String>, environment: PaymentsEnvironment) -> Self {
        Self {
            shared_secret: shared_secret.into(),
            environment,
        }
    }

    /// Reads `APP_STORE_SHARED_SECRET` (required) and `APP_STORE_ENVIRONMENT`
    /// (`production` or `sandbox`, defaults to production).
    pub fn from_env() -> Result<Self, SecretsError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, SecretsError> {
        let shared_secret = lookup(APP_STORE_SHARED_SECRET)
            .filter(|s| !s.is_empty())
            .ok_or(SecretsError::Missing {
                key: APP_STORE_SHARED_SECRET,
            })?;
        let environment = match lookup(APP_STORE_ENVIRONMENT) {
            Some(value) => value.parse()?,
            None => PaymentsEnvironment::default(),
        };
        Ok(Self {
            shared_secret,
            environment,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(values: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let values: HashMap<String, String> = values
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| values.get(key).cloned()
    }

    #[test]
    fn reads_secret_and_environment() {
        let secrets = PaymentKitSecrets::from_lookup(lookup(&[
            (APP_STORE_SHARED_SECRET, "abc"),
            (APP_STORE_ENVIRONMENT, "Sandbox"),
        ]))
        .unwrap();
        assert_eq!(
            secrets,
            PaymentKitSecrets::new("abc", PaymentsEnvironment::Sandbox)
        );
    }

    #[test]
    fn environment_defaults_to_production() {
        let secrets =
            PaymentKitSecrets::from_lookup(lookup(&[(APP_STORE_SHARED_SECRET, "abc")])).unwrap();
        assert_eq!(secrets.environment, PaymentsEnvironment::Production);
    }

    #[test]
    fn missing_or_invalid_values_are_errors() {
        assert_eq!(
            PaymentKitSecrets::from_lookup(lookup(&[])),
            Err(SecretsError::Missing {
                key: APP_STORE_SHARED_SECRET
            })
        );
        assert_eq!(
            PaymentKitSecrets::from_lookup(lookup(&[
                (APP_STORE_SHARED_SECRET, "abc"),
                (APP_STORE_ENVIRONMENT, "staging"),
            ])),
            Err(SecretsError::Invalid {
                key: APP_STORE_ENVIRONMENT,
                value: "staging".to_string()
            })
        );
    }
}
