//! Billing client with a persisted product cache, credential rotation and
//! expiry-driven purchase refreshes.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Weak};
use tracing::{debug, info, warn};

use super::backend::BillingBackend;
use super::client::HttpBackend;
use super::types::{ChangePlanRequest, CheckoutOrder, CheckoutSession, Product, Purchase};
use crate::cache::{keys, KeyValueStore, MemoryStore, NoopStore, ScopedStore, SqliteStore};
use crate::config::Config;
use crate::error::{BillingError, Result};
use crate::scheduler::{
  Clock, PurchaseRefresher, RefreshScheduler, SystemClock, Timer, TokioTimer,
};

/// Minimum age of the product cache before an explicit refresh hits the backend.
pub const PRODUCT_REFRESH_DEBOUNCE_MS: i64 = 60_000;

/// Products as last fetched from the backend.
///
/// Absence from the store means "unknown", never "no products".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CachedProducts {
  pub products: Vec<Product>,
  /// Epoch milliseconds of the fetch
  pub fetched_at: i64,
}

/// Billing client with transparent caching.
///
/// Wraps a [`BillingBackend`] and keeps the best known products and the access
/// token in a [`ScopedStore`]. Every purchase it sees is handed to the
/// [`RefreshScheduler`], whose timers call back into [`get_purchases`].
///
/// Storage failures never fail an operation: reads degrade to a cache miss and
/// writes are logged and skipped.
///
/// [`get_purchases`]: BillingClient::get_purchases
pub struct BillingClient<B: BillingBackend> {
  backend: B,
  store: ScopedStore,
  scheduler: Arc<RefreshScheduler>,
  clock: Arc<dyn Clock>,
}

impl BillingClient<HttpBackend> {
  /// Create an HTTP-backed client with SQLite persistence from configuration.
  pub fn from_config(config: &Config) -> Result<Arc<Self>> {
    let backend = HttpBackend::new(&config.backend)?;
    let kv = open_store(config);
    let store = ScopedStore::for_app(kv, backend.base_url().as_str(), backend.app_id());

    Ok(Self::new(
      backend,
      store,
      Arc::new(SystemClock),
      Arc::new(TokioTimer),
    ))
  }
}

/// Pick the persistence backend; an unopenable database degrades to memory.
fn open_store(config: &Config) -> Arc<dyn KeyValueStore> {
  if !config.storage.enabled {
    return Arc::new(NoopStore);
  }

  let opened = match &config.storage.path {
    Some(path) => SqliteStore::open(path),
    None => SqliteStore::default_path().and_then(|path| SqliteStore::open(&path)),
  };

  match opened {
    Ok(store) => Arc::new(store),
    Err(e) => {
      warn!(error = %e, "persistent store unavailable, using in-memory store");
      Arc::new(MemoryStore::new())
    }
  }
}

impl<B: BillingBackend + 'static> BillingClient<B> {
  pub fn new(
    backend: B,
    store: ScopedStore,
    clock: Arc<dyn Clock>,
    timer: Arc<dyn Timer>,
  ) -> Arc<Self> {
    Arc::new_cyclic(|client: &Weak<Self>| {
      let refresher: Weak<dyn PurchaseRefresher> = client.clone();
      Self {
        backend,
        store,
        scheduler: Arc::new(RefreshScheduler::new(refresher, clock.clone(), timer)),
        clock,
      }
    })
  }

  pub fn backend(&self) -> &B {
    &self.backend
  }

  pub fn scheduler(&self) -> &Arc<RefreshScheduler> {
    &self.scheduler
  }

  /// Get products, from cache if any were ever fetched.
  pub async fn get_products(&self) -> Result<Vec<Product>> {
    if let Some(cached) = self.cached_products() {
      debug!(count = cached.products.len(), "products served from cache");
      return Ok(cached.products);
    }
    self.refresh_products().await
  }

  /// Fetch products from the backend unless the cache is younger than
  /// [`PRODUCT_REFRESH_DEBOUNCE_MS`]. On failure the old cache is kept.
  pub async fn refresh_products(&self) -> Result<Vec<Product>> {
    let now = self.clock.now_millis();
    if let Some(cached) = self.cached_products() {
      let age = now - cached.fetched_at;
      if age < PRODUCT_REFRESH_DEBOUNCE_MS {
        debug!(age_ms = age, "product cache is fresh, skipping backend call");
        return Ok(cached.products);
      }
    }

    let products = self.backend.fetch_products().await?;

    let entry = CachedProducts {
      products,
      fetched_at: self.clock.now_millis(),
    };
    if let Err(e) = self.store.set_json(keys::PRODUCTS, &entry) {
      warn!(error = %e, "failed to persist product cache");
    }

    Ok(entry.products)
  }

  /// Stored access token, if any.
  pub fn get_access_token(&self) -> Option<String> {
    match self.store.get_string(keys::ACCESS_TOKEN) {
      Ok(token) => token,
      Err(e) => {
        warn!(error = %e, "failed to read access token, treating as absent");
        None
      }
    }
  }

  /// Get purchases for `access_token`, or for the stored token.
  ///
  /// Without any token this is an anonymous session and returns an empty list
  /// without calling the backend. Every returned purchase is passed to the
  /// refresh scheduler before returning.
  pub async fn get_purchases(&self, access_token: Option<&str>) -> Result<Vec<Purchase>> {
    let token = match access_token {
      Some(token) => token.to_string(),
      None => match self.get_access_token() {
        Some(token) => token,
        None => {
          debug!("no access token, no purchases");
          return Ok(Vec::new());
        }
      },
    };

    let list = self.backend.fetch_purchases(&token).await?;
    if let Some(new_token) = &list.new_access_token {
      self.store_access_token(new_token);
    }

    for purchase in &list.purchases {
      self.scheduler.schedule_purchase_refreshes(purchase);
    }

    Ok(list.purchases)
  }

  /// Purchases that grant access right now.
  pub async fn active_purchases(&self) -> Result<Vec<Purchase>> {
    let now = DateTime::from_timestamp_millis(self.clock.now_millis()).unwrap_or_else(Utc::now);
    let purchases = self.get_purchases(None).await?;
    Ok(
      purchases
        .into_iter()
        .filter(|p| p.is_active_at(now))
        .collect(),
    )
  }

  /// Open a checkout session and store the credential it carries.
  pub async fn create_checkout(&self, order: &CheckoutOrder) -> Result<CheckoutSession> {
    let session = self.backend.create_checkout(order).await?;
    self.store_access_token(&session.access_token);
    Ok(session)
  }

  /// Move a subscription to another price using the stored credential.
  pub async fn change_plan(&self, request: &ChangePlanRequest) -> Result<Purchase> {
    let token = self.get_access_token().ok_or(BillingError::NotSignedIn)?;

    let change = self.backend.change_plan(&token, request).await?;
    if let Some(new_token) = &change.new_access_token {
      self.store_access_token(new_token);
    }

    self.scheduler.schedule_purchase_refreshes(&change.purchase);
    Ok(change.purchase)
  }

  /// Forget the credential and product cache, and drop all refresh schedules.
  pub fn clear_stored_data(&self) {
    for key in [keys::ACCESS_TOKEN, keys::PRODUCTS] {
      if let Err(e) = self.store.remove(key) {
        warn!(key, error = %e, "failed to remove stored value");
      }
    }
    self.scheduler.clear_schedules();
    info!("cleared stored billing data");
  }

  fn cached_products(&self) -> Option<CachedProducts> {
    match self.store.get_json::<CachedProducts>(keys::PRODUCTS) {
      Ok(cached) => cached,
      Err(e) => {
        warn!(error = %e, "failed to read product cache, treating as miss");
        None
      }
    }
  }

  /// Last write wins; the backend is the only judge of token validity.
  fn store_access_token(&self, token: &str) {
    match self.store.set_string(keys::ACCESS_TOKEN, token) {
      Ok(()) => info!("access token updated"),
      Err(e) => warn!(error = %e, "failed to persist access token"),
    }
  }
}

#[async_trait]
impl<B: BillingBackend + 'static> PurchaseRefresher for BillingClient<B> {
  async fn refresh_purchases(&self) -> Result<()> {
    self.get_purchases(None).await.map(|_| ())
  }
}

impl<B: BillingBackend> std::fmt::Debug for BillingClient<B> {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("BillingClient")
      .field("store", &self.store)
      .field("scheduler", &self.scheduler)
      .finish_non_exhaustive()
  }
}
