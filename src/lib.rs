pub mod data {
    pub mod datasources {
        pub mod payment_queue;
        pub mod products_fetcher;
        pub mod receipt_data_source;
        pub mod receipt_fetcher;
    }
    pub(crate) mod models {
        pub(crate) mod app_store_receipts {
            pub(crate) mod verify_receipt_request_model;
            pub(crate) mod verify_receipt_status_model;
        }
    }
    pub mod repositories {
        pub mod products_repository_impl;
        pub mod receipt_validator;
        pub mod receipts_repository_impl;
        pub mod transactions_repository_impl;
    }
}

pub mod domain {
    pub mod entities {
        pub mod payment_transaction;
        pub mod payments_environment;
        pub mod product;
        pub mod purchase_request;
        pub mod receipt_status;
        pub mod transaction_status;
        pub mod validated_receipt;
    }
    pub mod repositories {
        pub mod products_repository;
        pub mod receipts_repository;
        pub mod transactions_repository;
    }
}

pub(crate) mod foundation {
    pub(crate) mod processes_manager;
}

pub mod errors;
pub mod secrets;
pub mod util;
