//! SmartThings REST API client
//!
//! Thin typed wrapper over the v1 REST surface. Every call fetches a
//! bearer token from the [`AuthManager`] (refreshing just-in-time when the
//! token is near expiry) and retries transient failures per the configured
//! policy. Paged listings follow `_links.next` until exhausted.

use crate::auth::AuthManager;
use crate::error::{Result, UnihomeError};
use crate::retry::{retry_async, RetryPolicy};
use crate::types::TimeWindow;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, trace};
use url::Url;

pub const DEFAULT_BASE_URL: &str = "https://api.smartthings.com/v1/";

/// Upper bound on followed result pages per listing call
const MAX_PAGES: usize = 20;

#[derive(Debug, Clone, Deserialize)]
pub struct StPage<T> {
    #[serde(default = "Vec::new")]
    pub items: Vec<T>,

    #[serde(rename = "_links", default)]
    pub links: Option<StLinks>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct StLinks {
    #[serde(default)]
    pub next: Option<StHref>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StHref {
    pub href: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StDevice {
    pub device_id: String,
    pub name: String,

    #[serde(default)]
    pub label: Option<String>,

    #[serde(default)]
    pub manufacturer_name: Option<String>,

    #[serde(default)]
    pub device_type_name: Option<String>,

    #[serde(default)]
    pub location_id: Option<String>,

    #[serde(default)]
    pub room_id: Option<String>,

    #[serde(default)]
    pub components: Vec<StComponent>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StComponent {
    pub id: String,

    #[serde(default)]
    pub capabilities: Vec<StCapabilityRef>,

    #[serde(default)]
    pub categories: Vec<StCategory>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StCapabilityRef {
    pub id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StCategory {
    pub name: String,
}

/// `components.{component}.{capability}.{attribute}` attribute cell
#[derive(Debug, Clone, Deserialize)]
pub struct StAttributeValue {
    #[serde(default)]
    pub value: Value,

    #[serde(default)]
    pub unit: Option<String>,

    #[serde(default)]
    pub timestamp: Option<String>,
}

pub type StComponentStatus = HashMap<String, HashMap<String, StAttributeValue>>;

#[derive(Debug, Clone, Deserialize)]
pub struct StDeviceStatus {
    #[serde(default)]
    pub components: HashMap<String, StComponentStatus>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StDeviceHealth {
    pub state: String,
}

impl StDeviceHealth {
    pub fn online(&self) -> bool {
        self.state.eq_ignore_ascii_case("online")
    }
}

#[derive(Debug, Serialize)]
pub struct StCommandEntry {
    pub component: String,
    pub capability: String,
    pub command: String,

    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub arguments: Vec<Value>,
}

#[derive(Debug, Serialize)]
struct StCommandsRequest<'a> {
    commands: &'a [StCommandEntry],
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StLocation {
    pub location_id: String,
    pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StRoom {
    pub room_id: String,

    #[serde(default)]
    pub name: Option<String>,

    pub location_id: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StScene {
    pub scene_id: String,
    pub scene_name: String,

    #[serde(default)]
    pub location_id: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StHistoryEvent {
    pub device_id: String,
    pub location_id: String,

    /// Event time in epoch milliseconds
    pub epoch: i64,

    #[serde(default = "default_component")]
    pub component: String,

    pub capability: String,
    pub attribute: String,

    #[serde(default)]
    pub value: Value,

    #[serde(default)]
    pub unit: Option<String>,
}

fn default_component() -> String {
    "main".to_string()
}

/// Authenticated, retrying client for the SmartThings REST API
pub struct SmartThingsApi {
    http: reqwest::Client,
    base_url: Url,
    auth: Arc<AuthManager>,
    user_id: String,
    retry: RetryPolicy,
}

impl SmartThingsApi {
    pub fn new(
        http: reqwest::Client,
        base_url: &str,
        auth: Arc<AuthManager>,
        user_id: impl Into<String>,
        retry: RetryPolicy,
    ) -> Result<Self> {
        let base_url = Url::parse(base_url).map_err(|e| {
            UnihomeError::configuration(format!("invalid SmartThings base url '{base_url}': {e}"))
        })?;
        Ok(Self {
            http,
            base_url,
            auth,
            user_id: user_id.into(),
            retry,
        })
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    /// List devices, optionally narrowed server-side
    pub async fn devices(
        &self,
        location_id: Option<&str>,
        capability: Option<&str>,
    ) -> Result<Vec<StDevice>> {
        let mut query: Vec<(&str, String)> = Vec::new();
        if let Some(location_id) = location_id {
            query.push(("locationId", location_id.to_string()));
        }
        if let Some(capability) = capability {
            query.push(("capability", capability.to_string()));
        }
        self.get_paged("devices", &query).await
    }

    pub async fn device(&self, device_id: &str) -> Result<StDevice> {
        self.get_json(&format!("devices/{device_id}"), &[]).await
    }

    pub async fn device_status(&self, device_id: &str) -> Result<StDeviceStatus> {
        self.get_json(&format!("devices/{device_id}/status"), &[])
            .await
    }

    pub async fn device_health(&self, device_id: &str) -> Result<StDeviceHealth> {
        self.get_json(&format!("devices/{device_id}/health"), &[])
            .await
    }

    /// Send commands to a device; SmartThings acknowledges with 200/202
    ///
    /// Commands go out exactly once, never retried: a timed-out attempt
    /// may already have been applied by the device.
    pub async fn execute_commands(
        &self,
        device_id: &str,
        commands: &[StCommandEntry],
    ) -> Result<()> {
        let path = format!("devices/{device_id}/commands");
        let url = self.endpoint(&path)?;
        let body = serde_json::to_value(StCommandsRequest { commands })?;

        retry_async(&RetryPolicy::none(), &path, || {
            let url = url.clone();
            let body = body.clone();
            async move {
                let token = self.auth.access_token(&self.user_id).await?;
                let response = self
                    .http
                    .post(url)
                    .bearer_auth(token)
                    .json(&body)
                    .send()
                    .await?;
                let status = response.status();
                if !status.is_success() {
                    let text = response.text().await.unwrap_or_default();
                    return Err(UnihomeError::from_status(status.as_u16(), text));
                }
                Ok(())
            }
        })
        .await
    }

    pub async fn locations(&self) -> Result<Vec<StLocation>> {
        self.get_paged("locations", &[]).await
    }

    pub async fn rooms(&self, location_id: &str) -> Result<Vec<StRoom>> {
        self.get_paged(&format!("locations/{location_id}/rooms"), &[])
            .await
    }

    pub async fn scenes(&self, location_id: Option<&str>) -> Result<Vec<StScene>> {
        let mut query: Vec<(&str, String)> = Vec::new();
        if let Some(location_id) = location_id {
            query.push(("locationId", location_id.to_string()));
        }
        self.get_paged("scenes", &query).await
    }

    pub async fn execute_scene(&self, scene_id: &str) -> Result<()> {
        let path = format!("scenes/{scene_id}/execute");
        let url = self.endpoint(&path)?;

        retry_async(&self.retry, &path, || {
            let url = url.clone();
            async move {
                let token = self.auth.access_token(&self.user_id).await?;
                let response = self
                    .http
                    .post(url)
                    .bearer_auth(token)
                    .json(&serde_json::json!({}))
                    .send()
                    .await?;
                let status = response.status();
                if !status.is_success() {
                    let text = response.text().await.unwrap_or_default();
                    return Err(UnihomeError::from_status(status.as_u16(), text));
                }
                Ok(())
            }
        })
        .await
    }

    /// Device events within a window, newest first, capped at `limit`
    pub async fn device_history(
        &self,
        device_id: &str,
        location_id: &str,
        window: &TimeWindow,
        limit: usize,
    ) -> Result<Vec<StHistoryEvent>> {
        let query = [
            ("locationId", location_id.to_string()),
            ("deviceId", device_id.to_string()),
            ("after", window.start.timestamp_millis().to_string()),
            ("before", window.end.timestamp_millis().to_string()),
            ("limit", limit.to_string()),
            ("oldestFirst", "false".to_string()),
        ];
        let mut events: Vec<StHistoryEvent> = self.get_paged("history/devices", &query).await?;
        events.truncate(limit);
        Ok(events)
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        self.base_url
            .join(path)
            .map_err(|e| UnihomeError::configuration(format!("invalid API path '{path}': {e}")))
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str, query: &[(&str, String)]) -> Result<T> {
        let url = self.endpoint(path)?;
        retry_async(&self.retry, path, || {
            let url = url.clone();
            async move {
                let token = self.auth.access_token(&self.user_id).await?;
                let request = self.http.get(url).bearer_auth(token).query(query);
                let response = request.send().await?;
                let status = response.status();
                if !status.is_success() {
                    let text = response.text().await.unwrap_or_default();
                    return Err(UnihomeError::from_status(status.as_u16(), text));
                }
                trace!(path, status = status.as_u16(), "SmartThings GET ok");
                Ok(response.json::<T>().await?)
            }
        })
        .await
    }

    /// GET a paged listing, following `_links.next` until done
    async fn get_paged<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<Vec<T>> {
        let mut page: StPage<T> = self.get_json(path, query).await?;
        let mut items = std::mem::take(&mut page.items);

        let mut pages = 1;
        let mut next = page.links.and_then(|l| l.next);
        while let Some(href) = next {
            if pages >= MAX_PAGES {
                debug!(path, pages, "stopping page walk at page cap");
                break;
            }
            let mut follow: StPage<T> = self.get_absolute(&href.href).await?;
            items.append(&mut follow.items);
            next = follow.links.and_then(|l| l.next);
            pages += 1;
        }
        Ok(items)
    }

    async fn get_absolute<T: DeserializeOwned>(&self, href: &str) -> Result<T> {
        let url = Url::parse(href).map_err(|e| {
            UnihomeError::command_execution(format!("invalid next-page link '{href}': {e}"))
        })?;
        retry_async(&self.retry, "next-page", || {
            let url = url.clone();
            async move {
                let token = self.auth.access_token(&self.user_id).await?;
                let response = self.http.get(url).bearer_auth(token).send().await?;
                let status = response.status();
                if !status.is_success() {
                    let text = response.text().await.unwrap_or_default();
                    return Err(UnihomeError::from_status(status.as_u16(), text));
                }
                Ok(response.json::<T>().await?)
            }
        })
        .await
    }
}
