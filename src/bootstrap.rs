//! One-time loading of the provider's client resources.
//!
//! Before any Gmail call we need two documents: the Gmail REST discovery document (which gives
//! the API base URL) and Google's OpenID configuration (which gives the revocation endpoint).
//! Each is fetched at most once per process. Concurrent first callers share one load through a
//! [`OnceCell`]; a failed load leaves the cell empty so the next attempt starts over.

use async_trait::async_trait;
use lazy_static::lazy_static;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OnceCell};
use tracing::{debug, info};

use crate::config::ProviderConfig;
use crate::error::{GmailError, Result};

pub const DISCOVERY_DOC: &str = "https://www.googleapis.com/discovery/v1/apis/gmail/v1/rest";
pub const OPENID_CONFIGURATION: &str =
    "https://accounts.google.com/.well-known/openid-configuration";

lazy_static! {
    static ref GLOBAL: Bootstrap = Bootstrap::new();
}

/// Fetches one resource document.
#[async_trait]
pub trait ResourceLoader: Send + Sync {
    async fn load(&self, url: &str) -> Result<Value>;
}

pub struct HttpLoader {
    client: reqwest::Client,
}

impl HttpLoader {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ResourceLoader for HttpLoader {
    async fn load(&self, url: &str) -> Result<Value> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| GmailError::bootstrap(url, e))?;

        if !response.status().is_success() {
            return Err(GmailError::bootstrap(
                url,
                format!("unexpected status {}", response.status()),
            ));
        }

        response
            .json::<Value>()
            .await
            .map_err(|e| GmailError::bootstrap(url, e))
    }
}

/// Endpoints resolved from the loaded resources.
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderEndpoints {
    /// e.g. `https://gmail.googleapis.com/gmail/v1`
    pub api_base: String,
    pub revoke_url: String,
    pub token_info_url: String,
    pub api_key: Option<String>,
}

type Latch = Arc<OnceCell<Arc<Value>>>;

pub struct Bootstrap {
    resources: Mutex<HashMap<String, Latch>>,
}

impl Bootstrap {
    pub fn new() -> Self {
        Self {
            resources: Mutex::new(HashMap::new()),
        }
    }

    /// Registry shared by the whole process.
    pub fn global() -> &'static Bootstrap {
        &*GLOBAL
    }

    async fn latch(&self, url: &str) -> Latch {
        let mut resources = self.resources.lock().await;
        resources
            .entry(url.to_string())
            .or_insert_with(|| Arc::new(OnceCell::new()))
            .clone()
    }

    async fn ensure_resource(&self, url: &str, loader: &dyn ResourceLoader) -> Result<Arc<Value>> {
        let latch = self.latch(url).await;
        let value = latch
            .get_or_try_init(|| async {
                debug!(resource = %url, "loading provider resource");
                loader.load(url).await.map(Arc::new)
            })
            .await?;
        Ok(value.clone())
    }

    pub async fn is_loaded(&self, url: &str) -> bool {
        let resources = self.resources.lock().await;
        resources
            .get(url)
            .map(|latch| latch.initialized())
            .unwrap_or(false)
    }

    /// Load every provider resource (once) and resolve the endpoints the client needs.
    pub async fn ensure_ready(
        &self,
        config: &ProviderConfig,
        loader: &dyn ResourceLoader,
    ) -> Result<ProviderEndpoints> {
        let (discovery, openid) = tokio::try_join!(
            self.ensure_resource(&config.discovery_url, loader),
            self.ensure_resource(&config.openid_configuration_url, loader),
        )?;

        let api_base = api_base_from_discovery(&config.discovery_url, &discovery)?;
        let revoke_url = openid
            .get("revocation_endpoint")
            .and_then(Value::as_str)
            .ok_or_else(|| {
                GmailError::bootstrap(
                    &config.openid_configuration_url,
                    "missing revocation_endpoint",
                )
            })?
            .to_string();

        let endpoints = ProviderEndpoints {
            api_base,
            revoke_url,
            token_info_url: config.token_info_url.clone(),
            api_key: config.api_key.clone().filter(|k| !k.is_empty()),
        };
        info!(api_base = %endpoints.api_base, "provider client ready");
        Ok(endpoints)
    }
}

impl Default for Bootstrap {
    fn default() -> Self {
        Self::new()
    }
}

fn api_base_from_discovery(url: &str, doc: &Value) -> Result<String> {
    let field = |name: &str| {
        doc.get(name)
            .and_then(Value::as_str)
            .ok_or_else(|| GmailError::bootstrap(url, format!("discovery document missing {name}")))
    };
    let root = field("rootUrl")?;
    let name = field("name")?;
    let version = field("version")?;
    Ok(format!("{}/{}/{}", root.trim_end_matches('/'), name, version))
}
