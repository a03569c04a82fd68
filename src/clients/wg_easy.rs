//! Client for the wg-easy WireGuard control-plane.
//!
//! wg-easy manages peers on its own host; we only create/delete clients and
//! fetch their generated configs. The primary path authenticates through the
//! session endpoint (cookie-based, like the web UI). Because several wg-easy
//! deployments sit behind proxies that break cookie auth, `create_client`
//! falls back to raw HTTP calls with an `Authorization` header on any
//! primary-path failure.

use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, warn};

#[derive(Debug, Clone)]
pub struct WgEasyConfig {
    pub base_url: String,

    pub password: String,

    /// Sent as the raw `Authorization` value on the fallback path; the
    /// session password is sent instead when unset. No scheme prefix,
    /// wg-easy expects the bare value.
    pub api_key: Option<String>,
}

impl From<&crate::config::WgEasySettings> for WgEasyConfig {
    fn from(settings: &crate::config::WgEasySettings) -> Self {
        Self {
            base_url: settings.url.trim_end_matches('/').to_string(),
            password: settings.password.clone(),
            api_key: settings.api_key.clone(),
        }
    }
}

/// A client as created on the control-plane.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreatedClient {
    pub id: String,

    pub public_key: Option<String>,
}

/// Wire shape of wg-easy's client list.
#[derive(Debug, Deserialize)]
struct ClientInfo {
    #[serde(alias = "uid")]
    id: serde_json::Value,

    name: String,

    #[serde(rename = "publicKey", alias = "public_key")]
    public_key: Option<String>,
}

impl ClientInfo {
    fn id_string(&self) -> String {
        match &self.id {
            serde_json::Value::String(s) => s.clone(),
            other => other.to_string(),
        }
    }
}

#[async_trait]
pub trait ControlPlane: Send + Sync {
    async fn create_client(&self, name: &str) -> Result<CreatedClient>;

    async fn delete_client(&self, client_id: &str) -> Result<()>;

    async fn get_client_config(&self, client_id: &str) -> Result<Vec<u8>>;

    /// Best-effort end-of-operation cleanup. Never fails.
    async fn release(&self) {}
}

#[derive(Debug, Clone)]
pub struct WgEasyClient {
    client: Client,
    config: WgEasyConfig,
    owns_session: bool,
}

impl WgEasyClient {
    /// Build a client owning its own HTTP session (cookie store for the
    /// session login). Fails fast when the control-plane is not configured.
    pub fn new(config: WgEasyConfig) -> Result<Self> {
        if config.base_url.is_empty() {
            bail!("wg-easy base URL is not configured");
        }

        let client = Client::builder()
            .cookie_store(true)
            .user_agent("Burrow/1.0")
            .build()
            .context("Failed to build wg-easy HTTP client")?;

        Ok(Self {
            client,
            config,
            owns_session: true,
        })
    }

    /// Build a client over an externally-owned HTTP session. The adapter
    /// will not log the session out on release.
    #[must_use]
    pub fn with_shared_client(client: Client, config: WgEasyConfig) -> Self {
        Self {
            client,
            config,
            owns_session: false,
        }
    }

    async fn login(&self) -> Result<()> {
        let url = format!("{}/api/session", self.config.base_url);

        let response = self
            .client
            .post(&url)
            .json(&json!({ "password": self.config.password }))
            .send()
            .await
            .context("Failed to connect to wg-easy")?;

        let status = response.status();
        if status.is_success() {
            debug!("Authenticated with wg-easy");
            Ok(())
        } else {
            let body = response.text().await.unwrap_or_default();
            bail!("wg-easy authentication failed: status={status}, body={body}")
        }
    }

    async fn ensure_session(&self) -> Result<()> {
        let url = format!("{}/api/session", self.config.base_url);
        let response = self.client.get(&url).send().await?;

        if response.status() == StatusCode::UNAUTHORIZED {
            debug!(reason = "session_expired", "Logging in...");
            self.login().await?;
        }

        Ok(())
    }

    /// Raw header value for the fallback path.
    fn auth_header(&self) -> &str {
        self.config
            .api_key
            .as_deref()
            .unwrap_or(&self.config.password)
    }

    async fn list_clients(&self) -> Result<Vec<ClientInfo>> {
        let url = format!("{}/api/wireguard/client", self.config.base_url);
        let response = self.client.get(&url).send().await?;
        let status = response.status();
        let text = response.text().await?;

        if !status.is_success() {
            bail!("wg-easy client list failed: status={status}, body={text}");
        }

        serde_json::from_str(&text)
            .with_context(|| format!("Failed to parse wg-easy client list: {text}"))
    }

    /// Primary path: session login, create, then list-and-match-by-name.
    /// wg-easy's create response body is unreliable across versions, so the
    /// created client is always recovered from the list.
    async fn create_via_session(&self, name: &str) -> Result<CreatedClient> {
        self.ensure_session().await?;

        let url = format!("{}/api/wireguard/client", self.config.base_url);
        let response = self
            .client
            .post(&url)
            .json(&json!({ "name": name }))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            bail!("wg-easy client creation failed: status={status}, body={body}");
        }

        let clients = self.list_clients().await?;
        find_by_name(&clients, name)
            .ok_or_else(|| anyhow::anyhow!("created client '{name}' not found in wg-easy list"))
    }

    /// Fallback path: raw HTTP with an `Authorization` header instead of the
    /// session cookie.
    async fn create_via_http(&self, name: &str) -> Result<CreatedClient> {
        let create_url = format!("{}/api/wireguard/client", self.config.base_url);
        let response = self
            .client
            .post(&create_url)
            .header("Authorization", self.auth_header())
            .json(&json!({ "name": name }))
            .send()
            .await
            .context("wg-easy HTTP fallback: create request failed")?;

        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        if !status.is_success() {
            bail!("wg-easy HTTP fallback create failed: status={status}, body={body}");
        }

        let list_url = format!("{}/api/wireguard/client", self.config.base_url);
        let response = self
            .client
            .get(&list_url)
            .header("Authorization", self.auth_header())
            .send()
            .await
            .context("wg-easy HTTP fallback: list request failed")?;

        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        if !status.is_success() {
            bail!("wg-easy HTTP fallback list failed: status={status}, body={body}");
        }

        let clients: Vec<ClientInfo> = serde_json::from_str(&body)
            .with_context(|| format!("Failed to parse wg-easy client list: {body}"))?;
        find_by_name(&clients, name)
            .ok_or_else(|| anyhow::anyhow!("created client '{name}' not found in wg-easy list"))
    }
}

fn find_by_name(clients: &[ClientInfo], name: &str) -> Option<CreatedClient> {
    clients.iter().find(|c| c.name == name).map(|c| CreatedClient {
        id: c.id_string(),
        public_key: c.public_key.clone(),
    })
}

#[async_trait]
impl ControlPlane for WgEasyClient {
    async fn create_client(&self, name: &str) -> Result<CreatedClient> {
        match self.create_via_session(name).await {
            Ok(created) => Ok(created),
            Err(primary) => {
                warn!(error = %primary, "wg-easy primary path failed; trying HTTP fallback");
                self.create_via_http(name)
                    .await
                    .with_context(|| format!("primary path error: {primary}"))
            }
        }
    }

    async fn delete_client(&self, client_id: &str) -> Result<()> {
        self.ensure_session().await?;

        let url = format!(
            "{}/api/wireguard/client/{client_id}",
            self.config.base_url
        );
        let response = self.client.delete(&url).send().await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            bail!("wg-easy client deletion failed: status={status}, body={body}");
        }
        Ok(())
    }

    async fn get_client_config(&self, client_id: &str) -> Result<Vec<u8>> {
        self.ensure_session().await?;

        let url = format!(
            "{}/api/wireguard/client/{client_id}/configuration",
            self.config.base_url
        );
        let response = self.client.get(&url).send().await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            bail!("wg-easy config fetch failed: status={status}, body={body}");
        }

        Ok(response.bytes().await?.to_vec())
    }

    /// Log the session out when this adapter owns it. A shared session is
    /// left untouched for its owner.
    async fn release(&self) {
        if !self.owns_session {
            return;
        }

        let url = format!("{}/api/session", self.config.base_url);
        if let Err(e) = self.client.delete(&url).send().await {
            debug!(error = %e, "wg-easy logout failed");
        }
    }
}
