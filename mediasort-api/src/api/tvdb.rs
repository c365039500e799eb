use super::error::*;
use reqwest::{ClientBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{debug, warn};

pub const TVDB_API_BASE: &str = "https://api4.thetvdb.com/v4";

/// Tokens are issued for a month; refresh a day early.
const TOKEN_LIFETIME: Duration = Duration::from_secs(29 * 24 * 60 * 60);

/// Broadcast status of a series as reported by TheTVDB
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeriesStatus {
    #[serde(default)]
    pub id: Option<u64>,
    #[serde(default)]
    pub name: String,
}

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    data: T,
}

#[derive(Debug, Deserialize)]
struct LoginData {
    token: String,
}

#[derive(Debug, Deserialize)]
struct SearchHit {
    #[serde(default)]
    tvdb_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SeriesExtended {
    #[serde(default)]
    status: Option<SeriesStatus>,
}

struct Token {
    value: String,
    expires_at: Instant,
}

/// Client for TheTVDB v4 API, used to tell running shows from finished ones
pub struct TvdbClient {
    http_client: reqwest::Client,
    base_url: String,
    api_key: String,
    token: Mutex<Option<Token>>,
}

impl TvdbClient {
    pub fn new(api_key: impl Into<String>, timeout: Duration) -> Result<Self> {
        Self::with_base_url(TVDB_API_BASE, api_key, timeout)
    }

    pub fn with_base_url(base_url: impl Into<String>, api_key: impl Into<String>, timeout: Duration) -> Result<Self> {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        url::Url::parse(&base_url)?;

        let http_client = ClientBuilder::new()
            .timeout(timeout)
            .connect_timeout(timeout)
            .user_agent("mediasort/0.1.0")
            .build()
            .map_err(ApiError::Network)?;

        Ok(Self {
            http_client,
            base_url,
            api_key: api_key.into(),
            token: Mutex::new(None),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Exchange the API key for a bearer token, reusing a cached one while valid.
    pub async fn login(&self) -> Result<String> {
        let mut token = self.token.lock().await;
        if let Some(current) = token.as_ref() {
            if current.expires_at > Instant::now() {
                return Ok(current.value.clone());
            }
        }

        let url = format!("{}/login", self.base_url);
        let response = self
            .http_client
            .post(&url)
            .json(&serde_json::json!({ "apikey": self.api_key }))
            .send()
            .await?;
        let login: Envelope<LoginData> = self.handle_response(&url, response).await?;

        debug!("Authenticated with TheTVDB");
        *token = Some(Token {
            value: login.data.token.clone(),
            expires_at: Instant::now() + TOKEN_LIFETIME,
        });
        Ok(login.data.token)
    }

    /// First series id matching the title, narrowed by year when given.
    pub async fn search_series(&self, title: &str, year: Option<u32>) -> Result<Option<u64>> {
        let mut query = vec![("query", title.to_string()), ("type", "series".to_string())];
        if let Some(year) = year {
            query.push(("year", year.to_string()));
        }

        let hits: Envelope<Vec<SearchHit>> = self.get("/search", &query).await?;
        let Some(first) = hits.data.into_iter().next() else {
            return Ok(None);
        };

        match first.tvdb_id.as_deref().map(str::parse::<u64>) {
            Some(Ok(id)) => Ok(Some(id)),
            Some(Err(_)) | None => Err(ApiError::malformed(format!("search hit for '{}' has no usable tvdb_id", title))),
        }
    }

    pub async fn series_status(&self, series_id: u64) -> Result<Option<SeriesStatus>> {
        let path = format!("/series/{}/extended", series_id);
        let series: Envelope<SeriesExtended> = self.get(&path, &[("short", "true".to_string())]).await?;
        Ok(series.data.status)
    }

    /// Look a show up by title and return its status, `None` when nothing matches.
    pub async fn show_status(&self, title: &str, year: Option<u32>) -> Result<Option<SeriesStatus>> {
        match self.search_series(title, year).await? {
            Some(id) => {
                debug!("TheTVDB matched '{}' to series {}", title, id);
                self.series_status(id).await
            }
            None => Ok(None),
        }
    }

    async fn get<T: DeserializeOwned>(&self, path: &str, query: &[(&str, String)]) -> Result<T> {
        let url = format!("{}{}", self.base_url, path);

        for attempt in 0..2 {
            let token = self.login().await?;
            let response = self.http_client.get(&url).bearer_auth(&token).query(query).send().await?;

            if response.status() == StatusCode::UNAUTHORIZED && attempt == 0 {
                debug!("TheTVDB token rejected, logging in again");
                *self.token.lock().await = None;
                continue;
            }
            return self.handle_response(&url, response).await;
        }

        Err(ApiError::Authentication("TheTVDB rejected a fresh token".to_string()))
    }

    async fn handle_response<T: DeserializeOwned>(&self, url: &str, response: reqwest::Response) -> Result<T> {
        let status = response.status();
        if status.is_success() {
            let body = response.text().await?;
            return Ok(serde_json::from_str(&body)?);
        }

        let message = response.text().await.unwrap_or_default();
        match status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                warn!("TheTVDB rejected the API key");
                Err(ApiError::Authentication(format!("{}: {}", status, message.trim())))
            }
            StatusCode::NOT_FOUND => Err(ApiError::NotFound(url.to_string())),
            _ => Err(ApiError::Server {
                status: status.as_u16(),
                message,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn mount_login(server: &MockServer, token: &str, expected_calls: u64) {
        Mock::given(method("POST"))
            .and(path("/login"))
            .and(body_json(json!({ "apikey": "key" })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "status": "success", "data": { "token": token } })))
            .expect(expected_calls)
            .mount(server)
            .await;
    }

    fn client(server: &MockServer) -> TvdbClient {
        TvdbClient::with_base_url(server.uri(), "key", Duration::from_secs(5)).unwrap()
    }

    #[tokio::test]
    async fn test_show_status_searches_then_reads_series() {
        let server = MockServer::start().await;
        mount_login(&server, "tok", 1).await;
        Mock::given(method("GET"))
            .and(path("/search"))
            .and(query_param("query", "Old Show"))
            .and(query_param("type", "series"))
            .and(query_param("year", "2008"))
            .and(header("authorization", "Bearer tok"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": [{ "tvdb_id": "81189", "name": "Old Show" }, { "tvdb_id": "1" }]
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/series/81189/extended"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": { "id": 81189, "status": { "id": 2, "name": "Ended", "recordType": "series" } }
            })))
            .mount(&server)
            .await;

        let tvdb = client(&server);
        let status = tvdb.show_status("Old Show", Some(2008)).await.unwrap().unwrap();
        assert_eq!(status.id, Some(2));
        assert_eq!(status.name, "Ended");

        // Token is reused for the second lookup.
        tvdb.show_status("Old Show", Some(2008)).await.unwrap();
    }

    #[tokio::test]
    async fn test_no_search_hits_is_none() {
        let server = MockServer::start().await;
        mount_login(&server, "tok", 1).await;
        Mock::given(method("GET"))
            .and(path("/search"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "data": [] })))
            .mount(&server)
            .await;

        assert_eq!(client(&server).show_status("Nothing", None).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_rejected_token_logs_in_again() {
        let server = MockServer::start().await;
        mount_login(&server, "tok", 2).await;
        Mock::given(method("GET"))
            .and(path("/series/7/extended"))
            .respond_with(ResponseTemplate::new(401))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/series/7/extended"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": { "status": { "id": 1, "name": "Continuing" } }
            })))
            .mount(&server)
            .await;

        let status = client(&server).series_status(7).await.unwrap().unwrap();
        assert_eq!(status.name, "Continuing");
    }

    #[tokio::test]
    async fn test_bad_api_key_is_authentication_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/login"))
            .respond_with(ResponseTemplate::new(401).set_body_string("invalid apikey"))
            .mount(&server)
            .await;

        let err = client(&server).login().await.unwrap_err();
        assert!(matches!(err, ApiError::Authentication(_)));
    }
}
