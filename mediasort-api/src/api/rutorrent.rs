use super::auth::{client_nonce, AuthScheme, Credentials, DigestChallenge};
use super::{error::*, types::RemoteJobRecord};
use reqwest::header::{AUTHORIZATION, WWW_AUTHENTICATE};
use reqwest::{ClientBuilder, StatusCode};
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, warn};

const HTTPRPC_PATH: &str = "/plugins/httprpc/action.php";

/// Client for ruTorrent's httprpc plugin
pub struct RuTorrentClient {
    http_client: reqwest::Client,
    base_url: String,
    credentials: Credentials,
    scheme: AuthScheme,
}

impl RuTorrentClient {
    pub fn new(
        base_url: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
        scheme: AuthScheme,
        timeout: Duration,
    ) -> Result<Self> {
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
            credentials: Credentials {
                username: username.into(),
                password: password.into(),
            },
            scheme,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Fetch every job known to the client, in response order.
    ///
    /// Records that fail to parse are skipped; an empty job list may come
    /// back as `"t": []` instead of an object.
    pub async fn list_jobs(&self) -> Result<Vec<RemoteJobRecord>> {
        let body = self.post_action("list").await?;
        let data: Value = serde_json::from_str(&body)?;

        let jobs = match data.get("t") {
            Some(Value::Object(map)) => map,
            Some(Value::Array(items)) if items.is_empty() => return Ok(Vec::new()),
            Some(Value::Bool(false)) | None => return Ok(Vec::new()),
            Some(other) => {
                return Err(ApiError::malformed(format!(
                    "job list has unexpected type: {}",
                    type_name(other)
                )))
            }
        };

        let mut records = Vec::with_capacity(jobs.len());
        for (hash, fields) in jobs {
            let Some(fields) = fields.as_array() else {
                debug!("Skipping job {}: record is not an array", hash);
                continue;
            };
            match RemoteJobRecord::from_fields(hash, fields) {
                Ok(record) => records.push(record),
                Err(e) => debug!("Skipping job {}: {}", hash, e),
            }
        }

        debug!("ruTorrent returned {} job(s)", records.len());
        Ok(records)
    }

    async fn post_action(&self, mode: &str) -> Result<String> {
        let url = format!("{}{}", self.base_url, HTTPRPC_PATH);
        let form = [("mode", mode)];

        let request = self.http_client.post(&url).form(&form);
        let request = match self.scheme {
            AuthScheme::Basic => request.basic_auth(&self.credentials.username, Some(&self.credentials.password)),
            AuthScheme::Digest => request,
        };

        let response = request.send().await?;

        let response = if response.status() == StatusCode::UNAUTHORIZED && self.scheme == AuthScheme::Digest {
            let challenge = response
                .headers()
                .get(WWW_AUTHENTICATE)
                .and_then(|v| v.to_str().ok())
                .map(DigestChallenge::parse)
                .transpose()?
                .ok_or_else(|| ApiError::Authentication("401 without a digest challenge".to_string()))?;

            let uri = url::Url::parse(&url)?;
            let header = challenge.authorization(&self.credentials, "POST", uri.path(), &client_nonce());

            self.http_client
                .post(&url)
                .header(AUTHORIZATION, header)
                .form(&form)
                .send()
                .await?
        } else {
            response
        };

        let status = response.status();
        if status.is_success() {
            return Ok(response.text().await?);
        }

        let message = response.text().await.unwrap_or_default();
        match status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                warn!("ruTorrent rejected credentials for user '{}'", self.credentials.username);
                Err(ApiError::Authentication(format!("{}: {}", status, message.trim())))
            }
            StatusCode::NOT_FOUND => Err(ApiError::NotFound(url)),
            _ => Err(ApiError::Server {
                status: status.as_u16(),
                message,
            }),
        }
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
