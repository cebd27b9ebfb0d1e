//! Serde-deserializable envelopes matching billing backend responses.
//!
//! Every response carries an `ok` flag; these types are unwrapped into the
//! domain types in `types.rs` once the flag has been checked.

use serde::Deserialize;

use super::types::{CheckoutSession, PlanChange, Product, Purchase, PurchaseList};
use crate::error::{BillingError, Result};

#[derive(Debug, Deserialize)]
pub struct ApiErrorBody {
  #[serde(default)]
  pub error: Option<String>,
  #[serde(default)]
  pub message: Option<String>,
}

impl ApiErrorBody {
  pub fn into_message(self, fallback: &str) -> String {
    self
      .error
      .or(self.message)
      .unwrap_or_else(|| fallback.to_string())
  }
}

/// Check the `ok` flag and turn a rejection into an error.
fn check_ok(ok: bool, error: Option<String>) -> Result<()> {
  if ok {
    Ok(())
  } else {
    Err(BillingError::Rejected(
      error.unwrap_or_else(|| "request was not accepted".to_string()),
    ))
  }
}

#[derive(Debug, Deserialize)]
pub struct ApiProductsResponse {
  pub ok: bool,
  #[serde(default)]
  pub error: Option<String>,
  #[serde(default)]
  pub products: Vec<Product>,
}

impl ApiProductsResponse {
  pub fn into_products(self) -> Result<Vec<Product>> {
    check_ok(self.ok, self.error)?;
    Ok(self.products)
  }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiPurchasesResponse {
  pub ok: bool,
  #[serde(default)]
  pub error: Option<String>,
  #[serde(default)]
  pub purchases: Vec<Purchase>,
  #[serde(default)]
  pub new_access_token: Option<String>,
}

impl ApiPurchasesResponse {
  pub fn into_list(self) -> Result<PurchaseList> {
    check_ok(self.ok, self.error)?;
    Ok(PurchaseList {
      purchases: self.purchases,
      new_access_token: self.new_access_token,
    })
  }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiCheckoutResponse {
  pub ok: bool,
  #[serde(default)]
  pub error: Option<String>,
  #[serde(default)]
  pub url: Option<String>,
  #[serde(default)]
  pub access_token: Option<String>,
}

impl ApiCheckoutResponse {
  pub fn into_session(self) -> Result<CheckoutSession> {
    check_ok(self.ok, self.error)?;
    match (self.url, self.access_token) {
      (Some(url), Some(access_token)) => Ok(CheckoutSession { url, access_token }),
      _ => Err(BillingError::Rejected(
        "checkout response is missing url or accessToken".to_string(),
      )),
    }
  }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiChangePlanResponse {
  pub ok: bool,
  #[serde(default)]
  pub error: Option<String>,
  #[serde(default)]
  pub purchase: Option<Purchase>,
  #[serde(default)]
  pub new_access_token: Option<String>,
}

impl ApiChangePlanResponse {
  pub fn into_plan_change(self) -> Result<PlanChange> {
    check_ok(self.ok, self.error)?;
    let purchase = self.purchase.ok_or_else(|| {
      BillingError::Rejected("change-plan response is missing purchase".to_string())
    })?;
    Ok(PlanChange {
      purchase,
      new_access_token: self.new_access_token,
    })
  }
}
