//! The junction gateway.
//!
//! Accepts a query against a composite schema, dispatches one sub-query per backend and
//! stitches the backend responses into a single document. Schema modelling and query splitting
//! live in `junction-federation`.

#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::panic))]

macro_rules! failfast_debug {
    ($($tokens:tt)+) => {{
        tracing::debug!($($tokens)+);
        #[cfg(feature = "failfast")]
        panic!(
            "failfast triggered. \
            Please remove the feature failfast if you don't want to see these panics"
        );
    }};
}

pub mod configuration;
pub mod dispatch;
pub mod error;
mod gateway;
pub mod graphql;
mod json_writer;
mod merge;

pub use configuration::Configuration;
pub use dispatch::BackendFetcher;
pub use dispatch::Dispatcher;
pub use dispatch::HttpBackendFetcher;
pub use error::FetchError;
pub use error::GatewayError;
pub use error::MergeError;
pub use gateway::Gateway;
pub use gateway::ResponseStream;
pub use junction_federation::OperationKind;
pub use junction_federation::Query;
pub use junction_federation::Selection;
