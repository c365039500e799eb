use super::{error::*, types::*};
use reqwest::{ClientBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::time::Duration;
use tracing::debug;

/// Syncthing REST API client
pub struct SyncthingClient {
    http_client: reqwest::Client,
    base_url: String,
    api_key: String,
}

#[derive(Serialize)]
struct FolderQuery<'a> {
    folder: &'a str,
}

#[derive(Serialize)]
struct BrowseQuery<'a> {
    folder: &'a str,
    #[serde(skip_serializing_if = "str::is_empty")]
    prefix: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    levels: Option<u32>,
}

impl SyncthingClient {
    /// Create a new client with the default five second request timeout
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Result<Self> {
        SyncthingClientBuilder::new(base_url, api_key).build()
    }

    pub fn with_client(base_url: impl Into<String>, api_key: impl Into<String>, http_client: reqwest::Client) -> Self {
        Self {
            http_client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// `GET /rest/system/ping`
    pub async fn ping(&self) -> Result<()> {
        debug!("Pinging Syncthing at {}", self.base_url);
        let _: serde_json::Value = self.get("/rest/system/ping", None::<&()>).await?;
        Ok(())
    }

    /// `GET /rest/config/folders`
    pub async fn folders(&self) -> Result<Vec<SyncthingFolder>> {
        self.get("/rest/config/folders", None::<&()>).await
    }

    /// `GET /rest/db/status?folder=`
    pub async fn folder_status(&self, folder_id: &str) -> Result<FolderStatus> {
        self.get("/rest/db/status", Some(&FolderQuery { folder: folder_id }))
            .await
    }

    /// `GET /rest/db/need?folder=`
    pub async fn need(&self, folder_id: &str) -> Result<NeedResponse> {
        self.get("/rest/db/need", Some(&FolderQuery { folder: folder_id }))
            .await
    }

    /// `GET /rest/db/browse?folder=&prefix=&levels=`
    ///
    /// `levels: None` returns the full tree below `prefix`.
    pub async fn browse(&self, folder_id: &str, prefix: &str, levels: Option<u32>) -> Result<Vec<BrowseEntry>> {
        self.get(
            "/rest/db/browse",
            Some(&BrowseQuery {
                folder: folder_id,
                prefix,
                levels,
            }),
        )
        .await
    }

    async fn get<Q: Serialize, T: DeserializeOwned>(&self, path: &str, query: Option<&Q>) -> Result<T> {
        let mut url = format!("{}{}", self.base_url, path);
        if let Some(query) = query {
            url.push('?');
            url.push_str(&serde_urlencoded::to_string(query)?);
        }

        let response = self
            .http_client
            .get(&url)
            .header("X-API-Key", &self.api_key)
            .send()
            .await?;

        self.handle_response(path, response).await
    }

    async fn handle_response<T: DeserializeOwned>(&self, path: &str, response: reqwest::Response) -> Result<T> {
        let status = response.status();

        match status {
            s if s.is_success() => {
                let body = response.text().await?;
                Ok(serde_json::from_str(&body)?)
            }
            StatusCode::NOT_FOUND => {
                let message = response.text().await.unwrap_or_default();
                Err(ApiError::NotFound(format!("{}: {}", path, message.trim())))
            }
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                Err(ApiError::Authentication(format!("Syncthing rejected the API key ({})", status)))
            }
            _ => {
                let message = response.text().await.unwrap_or_default();
                Err(ApiError::Server {
                    status: status.as_u16(),
                    message,
                })
            }
        }
    }
}

pub struct SyncthingClientBuilder {
    base_url: String,
    api_key: String,
    timeout: Duration,
    user_agent: Option<String>,
}

impl SyncthingClientBuilder {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            api_key: api_key.into(),
            timeout: Duration::from_secs(5),
            user_agent: None,
        }
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = Some(user_agent.into());
        self
    }

    pub fn build(self) -> Result<SyncthingClient> {
        url::Url::parse(&self.base_url)?;

        let http_client = ClientBuilder::new()
            .timeout(self.timeout)
            .connect_timeout(self.timeout)
            .user_agent(self.user_agent.unwrap_or_else(|| "mediasort/0.1.0".to_string()))
            .build()
            .map_err(ApiError::Network)?;

        Ok(SyncthingClient::with_client(self.base_url, self.api_key, http_client))
    }
}
