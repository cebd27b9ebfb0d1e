use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A product offered by the billing backend
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Product {
  pub id: String,
  pub name: String,
  #[serde(default)]
  pub description: Option<String>,
  #[serde(default)]
  pub prices: Vec<Price>,
  #[serde(default)]
  pub metadata: BTreeMap<String, String>,
}

/// A price point of a product
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Price {
  pub id: String,
  /// Amount in the currency's minor unit
  pub amount: i64,
  pub currency: String,
  /// Billing interval ("month", "year"); absent for one-off prices
  #[serde(default)]
  pub interval: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PurchaseStatus {
  Active,
  Trialing,
  PastDue,
  Canceled,
  Expired,
  #[serde(other)]
  Unknown,
}

/// A purchase (one-off or subscription) owned by the signed-in customer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Purchase {
  pub id: String,
  pub product_id: String,
  #[serde(default)]
  pub price_id: Option<String>,
  pub status: PurchaseStatus,
  /// End of the current period; `None` for purchases that never expire
  #[serde(default)]
  pub expiration_date: Option<DateTime<Utc>>,
  #[serde(default)]
  pub cancel_at_period_end: bool,
}

impl Purchase {
  /// Whether the purchase grants access at the given instant.
  pub fn is_active_at(&self, now: DateTime<Utc>) -> bool {
    let status_ok = matches!(
      self.status,
      PurchaseStatus::Active | PurchaseStatus::Trialing
    );
    let not_expired = self.expiration_date.map(|exp| exp > now).unwrap_or(true);
    status_ok && not_expired
  }
}

/// Order sent to the backend to open a checkout session
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutOrder {
  pub product_id: String,
  pub price_id: String,
  pub success_url: String,
  pub cancel_url: String,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub customer_email: Option<String>,
}

/// Checkout session: where to send the user, and the credential for the session
#[derive(Debug, Clone)]
pub struct CheckoutSession {
  pub url: String,
  pub access_token: String,
}

/// Request to move an existing subscription to another price
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangePlanRequest {
  pub purchase_id: String,
  pub price_id: String,
}

/// Purchase list plus an optional rotated credential
#[derive(Debug, Clone)]
pub struct PurchaseList {
  pub purchases: Vec<Purchase>,
  pub new_access_token: Option<String>,
}

/// Result of a plan change
#[derive(Debug, Clone)]
pub struct PlanChange {
  pub purchase: Purchase,
  pub new_access_token: Option<String>,
}
