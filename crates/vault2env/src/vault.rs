//! Vault HTTP client
//!
//! Only the few endpoints vault2env needs: AppRole login, token self
//! revocation and logical reads. KV version 2 responses are unwrapped so both
//! KV engines yield a flat field map.

use serde::Deserialize;
use serde_json::{json, Map, Value};
use thiserror::Error;
use tracing::debug;

/// Vault client errors
#[derive(Error, Debug)]
pub enum VaultError {
    #[error("Invalid Vault address: {0}")]
    InvalidAddress(String),

    #[error("Request to Vault failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Vault returned {status} for {path}: {message}")]
    Status {
        status: u16,
        path: String,
        message: String,
    },

    #[error("Unexpected response from Vault for {path}: {reason}")]
    Malformed { path: String, reason: String },

    #[error("Vault login response for {0} contained no token")]
    MissingAuth(String),
}

/// Fields of a secret read from Vault
#[derive(Debug, Clone, PartialEq)]
pub struct Secret {
    /// `None` when Vault answered without a data section
    pub data: Option<Map<String, Value>>,
}

#[derive(Deserialize)]
struct ReadResponse {
    #[serde(default)]
    data: Option<Map<String, Value>>,
}

#[derive(Deserialize)]
struct LoginResponse {
    #[serde(default)]
    auth: Option<LoginAuth>,
}

#[derive(Deserialize)]
struct LoginAuth {
    client_token: String,
}

#[derive(Deserialize, Default)]
struct ErrorResponse {
    #[serde(default)]
    errors: Vec<String>,
}

impl Secret {
    /// Parse the body of a logical read
    pub fn from_response(path: &str, body: &str) -> Result<Self, VaultError> {
        let response: ReadResponse =
            serde_json::from_str(body).map_err(|e| VaultError::Malformed {
                path: path.to_string(),
                reason: e.to_string(),
            })?;

        Ok(Self {
            data: response.data.map(unwrap_kv2),
        })
    }
}

/// KV v2 nests the fields under `data.data` next to `data.metadata`
fn unwrap_kv2(mut data: Map<String, Value>) -> Map<String, Value> {
    let is_kv2 = data.len() == 2
        && matches!(data.get("data"), Some(Value::Object(_)))
        && matches!(data.get("metadata"), Some(Value::Object(_)));

    if is_kv2 {
        if let Some(Value::Object(inner)) = data.remove("data") {
            return inner;
        }
    }

    data
}

fn error_message(body: &str) -> String {
    let parsed: ErrorResponse = serde_json::from_str(body).unwrap_or_default();
    if parsed.errors.is_empty() {
        body.trim().to_string()
    } else {
        parsed.errors.join("; ")
    }
}

/// Minimal Vault API client
pub struct VaultClient {
    http: reqwest::Client,
    address: String,
    token: Option<String>,
}

impl VaultClient {
    pub fn new(address: &str) -> Result<Self, VaultError> {
        let address = address.trim().trim_end_matches('/');
        if !(address.starts_with("http://") || address.starts_with("https://")) {
            return Err(VaultError::InvalidAddress(address.to_string()));
        }

        Ok(Self {
            http: reqwest::Client::new(),
            address: address.to_string(),
            token: None,
        })
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn set_token(&mut self, token: &str) {
        self.token = Some(token.trim().to_string());
    }

    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    fn url(&self, path: &str) -> String {
        format!("{}/v1/{}", self.address, path.trim_start_matches('/'))
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        let builder = self.http.request(method, self.url(path));
        match &self.token {
            Some(token) => builder.header("X-Vault-Token", token),
            None => builder,
        }
    }

    /// Log in through the AppRole auth method and use the issued token
    pub async fn login_approle(
        &mut self,
        role_id: &str,
        secret_id: Option<&str>,
    ) -> Result<(), VaultError> {
        let path = "auth/approle/login";

        let mut body = json!({ "role_id": role_id });
        if let Some(secret_id) = secret_id.filter(|s| !s.is_empty()) {
            body["secret_id"] = Value::String(secret_id.to_string());
        }

        let response = self
            .request(reqwest::Method::POST, path)
            .json(&body)
            .send()
            .await?;
        let status = response.status();
        let text = response.text().await?;

        if !status.is_success() {
            return Err(VaultError::Status {
                status: status.as_u16(),
                path: path.to_string(),
                message: error_message(&text),
            });
        }

        let login: LoginResponse =
            serde_json::from_str(&text).map_err(|e| VaultError::Malformed {
                path: path.to_string(),
                reason: e.to_string(),
            })?;

        let auth = login
            .auth
            .ok_or_else(|| VaultError::MissingAuth(path.to_string()))?;

        debug!("logged in through approle");
        self.set_token(&auth.client_token);
        Ok(())
    }

    /// Revoke the token this client is using
    pub async fn revoke_self(&self) -> Result<(), VaultError> {
        let path = "auth/token/revoke-self";

        let response = self.request(reqwest::Method::POST, path).send().await?;
        let status = response.status();

        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(VaultError::Status {
                status: status.as_u16(),
                path: path.to_string(),
                message: error_message(&text),
            });
        }

        debug!("revoked vault token");
        Ok(())
    }

    /// Read a secret; `Ok(None)` when the path does not exist
    pub async fn read(&self, path: &str) -> Result<Option<Secret>, VaultError> {
        let response = self.request(reqwest::Method::GET, path).send().await?;
        let status = response.status();
        let text = response.text().await?;

        if status == reqwest::StatusCode::NOT_FOUND {
            let parsed: ErrorResponse = serde_json::from_str(&text).unwrap_or_default();
            if parsed.errors.is_empty() {
                return Ok(None);
            }
        }

        if !status.is_success() {
            return Err(VaultError::Status {
                status: status.as_u16(),
                path: path.to_string(),
                message: error_message(&text),
            });
        }

        if status == reqwest::StatusCode::NO_CONTENT || text.trim().is_empty() {
            return Ok(Some(Secret { data: None }));
        }

        Secret::from_response(path, &text).map(Some)
    }
}
