//! Profile lookup against the hosted row-gated table endpoint.
//! Speaks the backend's generic select surface (table, filter predicate,
//! selected column, first row); row-level-security rejections come back as
//! Auth errors, which the resolver treats like a missing profile.

use async_trait::async_trait;
use parking_lot::RwLock;
use reqwest::{StatusCode, Url};

use crate::error::{AppError, AppResult};

use super::provider::ProfileProvider;

#[derive(Debug)]
pub struct RestProfileProvider {
    base: Url,
    anon_key: String,
    /// Access token attached for RLS evaluation; absent falls back to the
    /// anonymous key alone.
    bearer: RwLock<Option<String>>,
    client: reqwest::Client,
}

impl RestProfileProvider {
    pub fn new(base: &str, anon_key: &str) -> AppResult<Self> {
        let base = Url::parse(base)
            .map_err(|e| AppError::config("bad_base_url".to_string(), e.to_string()))?;
        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| AppError::config("http_client".to_string(), e.to_string()))?;
        Ok(Self { base, anon_key: anon_key.to_string(), bearer: RwLock::new(None), client })
    }

    pub fn set_bearer(&self, token: Option<String>) {
        *self.bearer.write() = token;
    }

    fn profiles_url(&self, user_id: &str) -> AppResult<Url> {
        let mut url = self
            .base
            .join("rest/v1/profiles")
            .map_err(|e| AppError::config("bad_base_url".to_string(), e.to_string()))?;
        url.set_query(Some(&format!("id=eq.{}&select=role", urlencoding::encode(user_id))));
        Ok(url)
    }
}

#[async_trait]
impl ProfileProvider for RestProfileProvider {
    async fn fetch_role(&self, user_id: &str) -> AppResult<Option<String>> {
        let url = self.profiles_url(user_id)?;
        let bearer = self.bearer.read().clone();
        let mut req = self.client.get(url).header("apikey", &self.anon_key);
        if let Some(token) = bearer.as_deref() {
            req = req.bearer_auth(token);
        }
        let resp = req
            .send()
            .await
            .map_err(|e| AppError::transient("profile_fetch".to_string(), e.to_string()))?;
        let status = resp.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(AppError::auth(
                "rls_denied".to_string(),
                format!("profile select rejected: HTTP {}", status),
            ));
        }
        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if status.is_server_error() {
            return Err(AppError::transient("profile_fetch".to_string(), format!("HTTP {}", status)));
        }
        if !status.is_success() {
            return Err(AppError::provider("profile_fetch".to_string(), format!("HTTP {}", status)));
        }
        let rows: serde_json::Value = resp
            .json()
            .await
            .map_err(|e| AppError::provider("profile_shape".to_string(), e.to_string()))?;
        // Result set is an array of rows; the id filter makes at most one
        Ok(rows
            .get(0)
            .and_then(|row| row.get("role"))
            .and_then(|v| v.as_str())
            .map(|s| s.to_string()))
    }
}
