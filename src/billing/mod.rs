pub mod api_types;
pub mod backend;
pub mod cached_client;
pub mod client;
pub mod types;

pub use backend::BillingBackend;
pub use cached_client::{BillingClient, CachedProducts, PRODUCT_REFRESH_DEBOUNCE_MS};
pub use client::HttpBackend;
pub use types::{
  ChangePlanRequest, CheckoutOrder, CheckoutSession, PlanChange, Price, Product, Purchase,
  PurchaseList, PurchaseStatus,
};
