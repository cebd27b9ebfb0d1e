//! Deterministic fakes shared by unit tests.

use async_trait::async_trait;
use futures::future::BoxFuture;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;

use crate::billing::{
  BillingBackend, ChangePlanRequest, CheckoutOrder, CheckoutSession, PlanChange, Product,
  Purchase, PurchaseList,
};
use crate::error::{BillingError, Result};
use crate::scheduler::{Clock, PurchaseRefresher, Timer};

/// 2023-11-14T22:13:20Z
pub const T0: i64 = 1_700_000_000_000;

pub struct FakeClock {
  now: AtomicI64,
}

impl FakeClock {
  pub fn new(now: i64) -> Self {
    Self {
      now: AtomicI64::new(now),
    }
  }

  pub fn set(&self, now: i64) {
    self.now.store(now, Ordering::SeqCst);
  }

  pub fn advance(&self, millis: i64) {
    self.now.fetch_add(millis, Ordering::SeqCst);
  }
}

impl Clock for FakeClock {
  fn now_millis(&self) -> i64 {
    self.now.load(Ordering::SeqCst)
  }
}

/// Timer that only records armed tasks; tests decide when they run.
#[derive(Default)]
pub struct FakeTimer {
  armed: Mutex<Vec<(Duration, BoxFuture<'static, ()>)>>,
}

impl FakeTimer {
  pub fn new() -> Self {
    Self::default()
  }

  /// Tasks armed and not yet taken.
  pub fn armed_count(&self) -> usize {
    self.armed.lock().len()
  }

  pub fn armed_delays(&self) -> Vec<Duration> {
    self.armed.lock().iter().map(|(d, _)| *d).collect()
  }

  /// Remove pending tasks in arming order.
  pub fn take(&self) -> Vec<BoxFuture<'static, ()>> {
    std::mem::take(&mut *self.armed.lock())
      .into_iter()
      .map(|(_, task)| task)
      .collect()
  }

  /// Run every pending task to completion, in arming order. Tasks armed while
  /// running stay pending.
  pub async fn fire_all(&self) {
    for task in self.take() {
      task.await;
    }
  }
}

impl Timer for FakeTimer {
  fn arm(&self, delay: Duration, task: BoxFuture<'static, ()>) {
    self.armed.lock().push((delay, task));
  }
}

/// Refresher that counts calls, fails on demand and can be held open.
#[derive(Default)]
pub struct FakeRefresher {
  calls: AtomicUsize,
  failures_left: AtomicUsize,
  gate: Mutex<Option<Arc<Semaphore>>>,
}

impl FakeRefresher {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn calls(&self) -> usize {
    self.calls.load(Ordering::SeqCst)
  }

  pub fn fail_next(&self, n: usize) {
    self.failures_left.store(n, Ordering::SeqCst);
  }

  /// Make every following call wait for a permit on the returned semaphore.
  pub fn gate(&self) -> Arc<Semaphore> {
    let gate = Arc::new(Semaphore::new(0));
    *self.gate.lock() = Some(gate.clone());
    gate
  }
}

#[async_trait]
impl PurchaseRefresher for FakeRefresher {
  async fn refresh_purchases(&self) -> Result<()> {
    self.calls.fetch_add(1, Ordering::SeqCst);

    let gate = self.gate.lock().clone();
    if let Some(gate) = gate {
      if let Ok(permit) = gate.acquire().await {
        permit.forget();
      }
    }

    let failed = self
      .failures_left
      .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
      .is_ok();
    if failed {
      Err(BillingError::Rejected("refresh failed".to_string()))
    } else {
      Ok(())
    }
  }
}

/// In-memory billing backend with call counters.
#[derive(Default)]
pub struct FakeBackend {
  pub products: Mutex<Vec<Product>>,
  pub purchases: Mutex<Vec<Purchase>>,
  /// Token returned as `newAccessToken` by purchase fetches and plan changes
  pub rotated_token: Mutex<Option<String>>,
  pub fail_products: Mutex<bool>,
  pub fail_purchases: Mutex<bool>,
  pub product_calls: AtomicUsize,
  pub purchase_calls: AtomicUsize,
  /// Tokens seen by purchase fetches and plan changes, in order
  pub seen_tokens: Mutex<Vec<String>>,
}

impl FakeBackend {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn product_calls(&self) -> usize {
    self.product_calls.load(Ordering::SeqCst)
  }

  pub fn purchase_calls(&self) -> usize {
    self.purchase_calls.load(Ordering::SeqCst)
  }
}

#[async_trait]
impl BillingBackend for FakeBackend {
  async fn fetch_products(&self) -> Result<Vec<Product>> {
    self.product_calls.fetch_add(1, Ordering::SeqCst);
    if *self.fail_products.lock() {
      return Err(BillingError::Status {
        status: 503,
        message: "unavailable".to_string(),
      });
    }
    Ok(self.products.lock().clone())
  }

  async fn fetch_purchases(&self, access_token: &str) -> Result<PurchaseList> {
    self.purchase_calls.fetch_add(1, Ordering::SeqCst);
    self.seen_tokens.lock().push(access_token.to_string());
    if *self.fail_purchases.lock() {
      return Err(BillingError::Rejected("invalid token".to_string()));
    }
    Ok(PurchaseList {
      purchases: self.purchases.lock().clone(),
      new_access_token: self.rotated_token.lock().clone(),
    })
  }

  async fn create_checkout(&self, order: &CheckoutOrder) -> Result<CheckoutSession> {
    Ok(CheckoutSession {
      url: format!("https://pay.example.com/checkout/{}", order.price_id),
      access_token: "tok_checkout".to_string(),
    })
  }

  async fn change_plan(
    &self,
    access_token: &str,
    request: &ChangePlanRequest,
  ) -> Result<PlanChange> {
    self.seen_tokens.lock().push(access_token.to_string());
    let mut purchase = self
      .purchases
      .lock()
      .iter()
      .find(|p| p.id == request.purchase_id)
      .cloned()
      .ok_or_else(|| BillingError::Rejected("unknown purchase".to_string()))?;
    purchase.price_id = Some(request.price_id.clone());
    Ok(PlanChange {
      purchase,
      new_access_token: self.rotated_token.lock().clone(),
    })
  }
}
