use async_trait::async_trait;

use super::types::{
  ChangePlanRequest, CheckoutOrder, CheckoutSession, PlanChange, Product, PurchaseList,
};
use crate::error::Result;

/// The remote billing API as seen by the client.
///
/// Implementations surface any non-success status or `ok: false` payload as an
/// error; they never retry.
#[async_trait]
pub trait BillingBackend: Send + Sync {
  async fn fetch_products(&self) -> Result<Vec<Product>>;

  async fn fetch_purchases(&self, access_token: &str) -> Result<PurchaseList>;

  async fn create_checkout(&self, order: &CheckoutOrder) -> Result<CheckoutSession>;

  async fn change_plan(&self, access_token: &str, request: &ChangePlanRequest)
    -> Result<PlanChange>;
}
