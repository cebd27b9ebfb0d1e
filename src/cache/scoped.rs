//! Scoped view over a [`KeyValueStore`] with JSON helpers.

use serde::{de::DeserializeOwned, Serialize};
use sha2::{Digest, Sha256};
use std::sync::Arc;

use super::storage::KeyValueStore;
use crate::error::Result;

/// Logical key names inside a scope.
pub mod keys {
  pub const ACCESS_TOKEN: &str = "access_token";
  pub const PRODUCTS: &str = "products";
}

/// A store whose keys are prefixed with a scope derived from the app identity,
/// so that two apps (or two backends) sharing one database never see each
/// other's credential or product cache.
#[derive(Clone)]
pub struct ScopedStore {
  inner: Arc<dyn KeyValueStore>,
  scope: String,
}

impl ScopedStore {
  pub fn new(inner: Arc<dyn KeyValueStore>, scope: impl Into<String>) -> Self {
    Self {
      inner,
      scope: scope.into(),
    }
  }

  /// Build the scope from the backend URL and app id.
  pub fn for_app(inner: Arc<dyn KeyValueStore>, base_url: &str, app_id: &str) -> Self {
    Self::new(inner, scope_hash(base_url, app_id))
  }

  pub fn scope(&self) -> &str {
    &self.scope
  }

  fn key(&self, name: &str) -> String {
    format!("billing:{}:{}", self.scope, name)
  }

  pub fn get_string(&self, name: &str) -> Result<Option<String>> {
    self.inner.get(&self.key(name))
  }

  pub fn set_string(&self, name: &str, value: &str) -> Result<()> {
    self.inner.set(&self.key(name), value)
  }

  pub fn remove(&self, name: &str) -> Result<()> {
    self.inner.remove(&self.key(name))
  }

  /// Read and decode a JSON value. Undecodable data is reported as an error.
  pub fn get_json<T: DeserializeOwned>(&self, name: &str) -> Result<Option<T>> {
    match self.get_string(name)? {
      Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
      None => Ok(None),
    }
  }

  pub fn set_json<T: Serialize>(&self, name: &str, value: &T) -> Result<()> {
    let raw = serde_json::to_string(value)?;
    self.set_string(name, &raw)
  }
}

impl std::fmt::Debug for ScopedStore {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("ScopedStore")
      .field("scope", &self.scope)
      .finish_non_exhaustive()
  }
}

/// Stable, fixed-length scope for an app identity.
fn scope_hash(base_url: &str, app_id: &str) -> String {
  let input = format!("{}|{}", base_url.trim_end_matches('/').to_lowercase(), app_id);

  let mut hasher = Sha256::new();
  hasher.update(input.as_bytes());
  let digest = hex::encode(hasher.finalize());
  digest[..16].to_string()
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::cache::MemoryStore;
  use serde::Deserialize;

  #[derive(Debug, PartialEq, Serialize, Deserialize)]
  struct Sample {
    name: String,
    count: u32,
  }

  #[test]
  fn test_scope_is_stable_and_normalized() {
    assert_eq!(
      scope_hash("https://api.example.com/", "app"),
      scope_hash("HTTPS://api.example.com", "app")
    );
    assert_ne!(
      scope_hash("https://api.example.com", "app"),
      scope_hash("https://api.example.com", "other")
    );
    assert_eq!(scope_hash("https://api.example.com", "app").len(), 16);
  }

  #[test]
  fn test_scopes_do_not_collide() {
    let shared = Arc::new(MemoryStore::new());
    let a = ScopedStore::new(shared.clone(), "a");
    let b = ScopedStore::new(shared.clone(), "b");

    a.set_string(keys::ACCESS_TOKEN, "token-a").unwrap();
    assert_eq!(b.get_string(keys::ACCESS_TOKEN).unwrap(), None);
    assert_eq!(
      a.get_string(keys::ACCESS_TOKEN).unwrap().as_deref(),
      Some("token-a")
    );
  }

  #[test]
  fn test_json_helpers() {
    let store = ScopedStore::new(Arc::new(MemoryStore::new()), "s");
    let value = Sample {
      name: "pro".to_string(),
      count: 3,
    };

    store.set_json("sample", &value).unwrap();
    assert_eq!(store.get_json::<Sample>("sample").unwrap(), Some(value));

    store.set_string("sample", "not json").unwrap();
    assert!(store.get_json::<Sample>("sample").is_err());
  }
}
