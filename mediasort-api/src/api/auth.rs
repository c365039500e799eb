//! HTTP authentication for the ruTorrent endpoint.
//!
//! Seedbox front-ends put ruTorrent behind either Basic or Digest auth.
//! reqwest only speaks Basic, so Digest (RFC 2617, MD5, `qop=auth`) is
//! answered here from the server's `WWW-Authenticate` challenge.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::debug;

use super::error::{ApiError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthScheme {
    Basic,
    #[default]
    Digest,
}

#[derive(Debug, Clone)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

/// Parsed `WWW-Authenticate: Digest ...` challenge
#[derive(Debug, Clone, PartialEq)]
pub struct DigestChallenge {
    pub realm: String,
    pub nonce: String,
    pub opaque: Option<String>,
    pub qop: Option<String>,
    pub algorithm: Option<String>,
}

impl DigestChallenge {
    pub fn parse(header: &str) -> Result<Self> {
        let rest = header
            .trim()
            .strip_prefix("Digest")
            .ok_or_else(|| ApiError::Authentication(format!("not a digest challenge: {}", header)))?;

        let params = parse_auth_params(rest);
        let realm = params
            .get("realm")
            .cloned()
            .ok_or_else(|| ApiError::Authentication("digest challenge without realm".to_string()))?;
        let nonce = params
            .get("nonce")
            .cloned()
            .ok_or_else(|| ApiError::Authentication("digest challenge without nonce".to_string()))?;

        if let Some(algorithm) = params.get("algorithm") {
            if !algorithm.eq_ignore_ascii_case("md5") {
                return Err(ApiError::Authentication(format!(
                    "unsupported digest algorithm: {}",
                    algorithm
                )));
            }
        }

        Ok(Self {
            realm,
            nonce,
            opaque: params.get("opaque").cloned(),
            qop: params.get("qop").cloned(),
            algorithm: params.get("algorithm").cloned(),
        })
    }

    fn supports_auth_qop(&self) -> bool {
        self.qop
            .as_deref()
            .map(|qop| qop.split(',').any(|q| q.trim() == "auth"))
            .unwrap_or(false)
    }

    /// Build the `Authorization` header value for one request.
    pub fn authorization(&self, credentials: &Credentials, method: &str, uri: &str, cnonce: &str) -> String {
        let ha1 = md5_hex(&format!(
            "{}:{}:{}",
            credentials.username, self.realm, credentials.password
        ));
        let ha2 = md5_hex(&format!("{}:{}", method, uri));

        let mut header = format!(
            "Digest username=\"{}\", realm=\"{}\", nonce=\"{}\", uri=\"{}\"",
            credentials.username, self.realm, self.nonce, uri
        );

        if self.supports_auth_qop() {
            let nc = "00000001";
            let response = md5_hex(&format!("{}:{}:{}:{}:auth:{}", ha1, self.nonce, nc, cnonce, ha2));
            header.push_str(&format!(
                ", qop=auth, nc={}, cnonce=\"{}\", response=\"{}\"",
                nc, cnonce, response
            ));
        } else {
            let response = md5_hex(&format!("{}:{}:{}", ha1, self.nonce, ha2));
            header.push_str(&format!(", response=\"{}\"", response));
        }

        if let Some(opaque) = &self.opaque {
            header.push_str(&format!(", opaque=\"{}\"", opaque));
        }
        header.push_str(", algorithm=MD5");

        debug!("Built digest authorization for realm '{}'", self.realm);
        header
    }
}

/// Fresh client nonce
pub fn client_nonce() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}

fn md5_hex(input: &str) -> String {
    format!("{:x}", md5::compute(input.as_bytes()))
}

/// Split `key=value, key="quoted, value"` pairs
fn parse_auth_params(input: &str) -> HashMap<String, String> {
    let mut params = HashMap::new();
    let mut chars = input.chars().peekable();

    loop {
        while matches!(chars.peek(), Some(c) if c.is_whitespace() || *c == ',') {
            chars.next();
        }

        let mut key = String::new();
        while let Some(&c) = chars.peek() {
            if c == '=' {
                break;
            }
            key.push(c);
            chars.next();
        }
        if chars.next().is_none() {
            break;
        }

        let mut value = String::new();
        if chars.peek() == Some(&'"') {
            chars.next();
            while let Some(c) = chars.next() {
                match c {
                    '\\' => {
                        if let Some(escaped) = chars.next() {
                            value.push(escaped);
                        }
                    }
                    '"' => break,
                    _ => value.push(c),
                }
            }
        } else {
            while let Some(&c) = chars.peek() {
                if c == ',' {
                    break;
                }
                value.push(c);
                chars.next();
            }
        }

        let key = key.trim().to_ascii_lowercase();
        if !key.is_empty() {
            params.insert(key, value.trim().to_string());
        }
    }

    params
}
