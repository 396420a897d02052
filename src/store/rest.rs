//! Hosted table (PostgREST) and storage bucket over HTTP.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderValue};
use secrecy::{ExposeSecret, SecretString};
use url::Url;

use crate::config::StoreConfig;
use crate::error::{DatabaseError, StorageError};
use crate::leads::record::{Lead, LeadPatch, NewLead};
use crate::store::{LeadStore, ObjectStorage};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

pub struct SupabaseRest {
    http: reqwest::Client,
    base: Url,
    table: String,
    bucket: String,
}

impl std::fmt::Debug for SupabaseRest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SupabaseRest")
            .field("base", &self.base.as_str())
            .field("table", &self.table)
            .field("bucket", &self.bucket)
            .finish_non_exhaustive()
    }
}

fn auth_headers(key: &SecretString) -> Result<HeaderMap, DatabaseError> {
    let invalid = |_| DatabaseError::NotConfigured("access key is not a valid header value".into());
    let mut headers = HeaderMap::new();
    let mut apikey = HeaderValue::from_str(key.expose_secret()).map_err(invalid)?;
    apikey.set_sensitive(true);
    let mut bearer =
        HeaderValue::from_str(&format!("Bearer {}", key.expose_secret())).map_err(invalid)?;
    bearer.set_sensitive(true);
    headers.insert("apikey", apikey);
    headers.insert(AUTHORIZATION, bearer);
    Ok(headers)
}

/// Percent-encode each segment of an object path, keeping the separators.
fn encode_object_path(path: &str) -> String {
    path.split('/')
        .map(|segment| urlencoding::encode(segment).into_owned())
        .collect::<Vec<_>>()
        .join("/")
}

async fn rejection(response: reqwest::Response) -> (u16, String) {
    let status = response.status().as_u16();
    let body = response.text().await.unwrap_or_default();
    (status, body)
}

impl SupabaseRest {
    pub fn new(config: &StoreConfig) -> Result<Self, DatabaseError> {
        let base = config
            .url
            .clone()
            .ok_or_else(|| DatabaseError::NotConfigured("SUPABASE_URL is not set".to_string()))?;
        let key = config.anon_key.as_ref().ok_or_else(|| {
            DatabaseError::NotConfigured("SUPABASE_ANON_KEY is not set".to_string())
        })?;

        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .default_headers(auth_headers(key)?)
            .build()
            .map_err(|e| DatabaseError::Transport(e.to_string()))?;

        Ok(Self {
            http,
            base,
            table: config.table.clone(),
            bucket: config.transcript_bucket.clone(),
        })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.base.as_str().trim_end_matches('/'), path)
    }

    fn table_url(&self) -> String {
        self.endpoint(&format!("rest/v1/{}", self.table))
    }

    fn object_url(&self, path: &str) -> String {
        self.endpoint(&format!(
            "storage/v1/object/{}/{}",
            self.bucket,
            encode_object_path(path)
        ))
    }

    async fn rows(&self, request: reqwest::RequestBuilder) -> Result<Vec<Lead>, DatabaseError> {
        let response = request
            .send()
            .await
            .map_err(|e| DatabaseError::Transport(e.to_string()))?;
        if !response.status().is_success() {
            let (status, message) = rejection(response).await;
            tracing::error!(status, "Store request rejected: {}", message);
            return Err(DatabaseError::Rejected { status, message });
        }
        response
            .json::<Vec<Lead>>()
            .await
            .map_err(|e| DatabaseError::Serialization(e.to_string()))
    }
}

#[async_trait]
impl LeadStore for SupabaseRest {
    async fn fetch_recent(&self, limit: usize) -> Result<Vec<Lead>, DatabaseError> {
        let request = self.http.get(self.table_url()).query(&[
            ("select", "*".to_string()),
            ("order", "updated_at.desc".to_string()),
            ("limit", limit.to_string()),
        ]);
        self.rows(request).await
    }

    async fn get_lead(&self, lead_id: &str) -> Result<Option<Lead>, DatabaseError> {
        let request = self.http.get(self.table_url()).query(&[
            ("select", "*".to_string()),
            ("lead_id", format!("eq.{lead_id}")),
        ]);
        Ok(self.rows(request).await?.into_iter().next())
    }

    async fn insert_lead(&self, lead: &NewLead) -> Result<Lead, DatabaseError> {
        let request = self
            .http
            .post(self.table_url())
            .header("Prefer", "return=representation")
            .json(&[lead]);
        self.rows(request)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| DatabaseError::Serialization("insert returned no row".to_string()))
    }

    async fn update_lead(
        &self,
        lead_id: &str,
        patch: &LeadPatch,
    ) -> Result<Option<Lead>, DatabaseError> {
        if patch.is_empty() {
            return self.get_lead(lead_id).await;
        }
        let request = self
            .http
            .patch(self.table_url())
            .query(&[("lead_id", format!("eq.{lead_id}"))])
            .header("Prefer", "return=representation")
            .json(patch);
        Ok(self.rows(request).await?.into_iter().next())
    }
}

#[async_trait]
impl ObjectStorage for SupabaseRest {
    async fn upload(
        &self,
        path: &str,
        bytes: Bytes,
        content_type: &str,
        upsert: bool,
    ) -> Result<(), StorageError> {
        let response = self
            .http
            .post(self.object_url(path))
            .header(CONTENT_TYPE, content_type)
            .header("x-upsert", if upsert { "true" } else { "false" })
            .body(bytes)
            .send()
            .await
            .map_err(|e| StorageError::Transport(e.to_string()))?;
        if response.status().is_success() {
            return Ok(());
        }

        let (status, message) = rejection(response).await;
        // Storage reports duplicates as 409, or as 400 with the real code in the body.
        if status == 409 || message.contains("Duplicate") || message.contains("already exists") {
            return Err(StorageError::AlreadyExists {
                path: path.to_string(),
            });
        }
        Err(StorageError::Rejected { status, message })
    }

    async fn remove(&self, path: &str) -> Result<(), StorageError> {
        let response = self
            .http
            .delete(self.endpoint(&format!("storage/v1/object/{}", self.bucket)))
            .json(&serde_json::json!({ "prefixes": [path] }))
            .send()
            .await
            .map_err(|e| StorageError::Transport(e.to_string()))?;
        if !response.status().is_success() {
            let (status, message) = rejection(response).await;
            return Err(StorageError::Rejected { status, message });
        }
        Ok(())
    }

    fn public_url(&self, path: &str) -> String {
        self.endpoint(&format!(
            "storage/v1/object/public/{}/{}",
            self.bucket,
            encode_object_path(path)
        ))
    }
}
