//! Client-side cache and refresh layer for a subscription billing backend.
//!
//! [`BillingClient`](billing::BillingClient) keeps the best known products and
//! the access token in a local store and hands every purchase it sees to a
//! [`RefreshScheduler`](scheduler::RefreshScheduler), which re-fetches
//! purchases shortly before and after each subscription expires.
//!
//! ```ignore
//! let config = Config::load(None)?;
//! let client = BillingClient::from_config(&config)?;
//!
//! let products = client.get_products().await?;
//! let session = client.create_checkout(&order).await?;
//! // ... user completes checkout at session.url ...
//! let purchases = client.get_purchases(None).await?;
//! ```

pub mod billing;
pub mod cache;
pub mod config;
pub mod error;
pub mod scheduler;

#[cfg(test)]
mod testing;

pub use billing::BillingClient;
pub use config::Config;
pub use error::{BillingError, Result};
