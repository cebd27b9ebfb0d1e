use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use reqwest::{Client as HttpClient, RequestBuilder};
use serde::de::DeserializeOwned;
use tracing::debug;
use url::Url;

use super::api_types::{
  ApiChangePlanResponse, ApiCheckoutResponse, ApiErrorBody, ApiProductsResponse,
  ApiPurchasesResponse,
};
use super::backend::BillingBackend;
use super::types::{
  ChangePlanRequest, CheckoutOrder, CheckoutSession, PlanChange, Product, PurchaseList,
};
use crate::config::{BackendConfig, API_KEY_ENV};
use crate::error::{BillingError, Result};

const ACCESS_TOKEN_HEADER: &str = "x-access-token";
const APP_ID_HEADER: &str = "x-app-id";

/// HTTP implementation of [`BillingBackend`]
#[derive(Clone)]
pub struct HttpBackend {
  http: HttpClient,
  base_url: Url,
  app_id: String,
}

impl HttpBackend {
  /// Build the backend from configuration.
  ///
  /// Fails with [`BillingError::Config`] when the URL, app id or API key is
  /// missing or malformed.
  pub fn new(config: &BackendConfig) -> Result<Self> {
    if config.url.trim().is_empty() {
      return Err(BillingError::Config("backend.url is required".to_string()));
    }
    if config.app_id.trim().is_empty() {
      return Err(BillingError::Config("backend.app_id is required".to_string()));
    }
    let api_key = config.resolve_api_key().ok_or_else(|| {
      BillingError::Config(
        format!("API key not found. Set backend.api_key or {}.", API_KEY_ENV),
      )
    })?;

    // Trailing slash so that `join` appends instead of replacing the last segment
    let mut url = config.url.trim().to_string();
    if !url.ends_with('/') {
      url.push('/');
    }
    let base_url = Url::parse(&url)
      .map_err(|e| BillingError::Config(format!("invalid backend.url {}: {}", config.url, e)))?;

    let mut headers = HeaderMap::new();
    let mut auth = HeaderValue::from_str(&format!("Bearer {}", api_key))
      .map_err(|_| BillingError::Config("API key contains invalid characters".to_string()))?;
    auth.set_sensitive(true);
    headers.insert(AUTHORIZATION, auth);
    headers.insert(
      APP_ID_HEADER,
      HeaderValue::from_str(&config.app_id)
        .map_err(|_| BillingError::Config("app_id contains invalid characters".to_string()))?,
    );

    let http = HttpClient::builder()
      .user_agent(concat!("billing-sync/", env!("CARGO_PKG_VERSION")))
      .default_headers(headers)
      .build()?;

    Ok(Self {
      http,
      base_url,
      app_id: config.app_id.clone(),
    })
  }

  pub fn base_url(&self) -> &Url {
    &self.base_url
  }

  pub fn app_id(&self) -> &str {
    &self.app_id
  }

  fn endpoint(&self, path: &str) -> Result<Url> {
    self
      .base_url
      .join(path)
      .map_err(|e| BillingError::Config(format!("invalid endpoint {}: {}", path, e)))
  }

  /// Send a request and decode the envelope, mapping HTTP failures to errors.
  async fn send<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T> {
    let response = request.send().await?;
    let status = response.status();
    debug!(%status, url = %response.url(), "billing backend response");

    let body = response.text().await?;
    if !status.is_success() {
      let fallback = format!("HTTP {}", status.as_u16());
      let message = serde_json::from_str::<ApiErrorBody>(&body)
        .map(|b| b.into_message(&fallback))
        .unwrap_or(fallback);
      return Err(BillingError::Status {
        status: status.as_u16(),
        message,
      });
    }

    Ok(serde_json::from_str(&body)?)
  }
}

#[async_trait]
impl BillingBackend for HttpBackend {
  async fn fetch_products(&self) -> Result<Vec<Product>> {
    let url = self.endpoint("v1/products")?;
    let response: ApiProductsResponse = self.send(self.http.get(url)).await?;
    response.into_products()
  }

  async fn fetch_purchases(&self, access_token: &str) -> Result<PurchaseList> {
    let url = self.endpoint("v1/purchases")?;
    let request = self.http.get(url).header(ACCESS_TOKEN_HEADER, access_token);
    let response: ApiPurchasesResponse = self.send(request).await?;
    response.into_list()
  }

  async fn create_checkout(&self, order: &CheckoutOrder) -> Result<CheckoutSession> {
    let url = self.endpoint("v1/checkout")?;
    let response: ApiCheckoutResponse = self.send(self.http.post(url).json(order)).await?;
    response.into_session()
  }

  async fn change_plan(
    &self,
    access_token: &str,
    request: &ChangePlanRequest,
  ) -> Result<PlanChange> {
    let url = self.endpoint("v1/subscriptions/change-plan")?;
    let request = self
      .http
      .post(url)
      .header(ACCESS_TOKEN_HEADER, access_token)
      .json(request);
    let response: ApiChangePlanResponse = self.send(request).await?;
    response.into_plan_change()
  }
}
