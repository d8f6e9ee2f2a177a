//! Object store access for the format prompt template.
//!
//! A template is addressed by bucket and key. A missing object is reported as
//! [`RelcheckError::NotFound`]; every other failure is passed through as a
//! transport error. There are no retries.

use crate::error::{RelcheckError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::{Component, Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};
use url::Url;

/// Default bucket holding the format prompt
pub const DEFAULT_BUCKET: &str = "data-science-research";

/// Default key of the format prompt
pub const DEFAULT_KEY: &str = "jen-wei/similarity_check/format_prompt.txt";

/// Bucket + key pair identifying one object
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageLocation {
    pub bucket: String,
    pub key: String,
}

impl StorageLocation {
    pub fn new(bucket: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            key: key.into(),
        }
    }
}

impl Default for StorageLocation {
    fn default() -> Self {
        Self::new(DEFAULT_BUCKET, DEFAULT_KEY)
    }
}

impl std::fmt::Display for StorageLocation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.bucket, self.key)
    }
}

/// Read-only object store.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Fetch the raw bytes of one object.
    async fn get(&self, location: &StorageLocation) -> Result<Vec<u8>>;
}

/// Fetch a text template from `store`.
pub async fn load_template(store: &dyn ObjectStore, location: &StorageLocation) -> Result<String> {
    let bytes = store.get(location).await?;
    let text = String::from_utf8(bytes).map_err(|e| RelcheckError::Encoding {
        bucket: location.bucket.clone(),
        key: location.key.clone(),
        message: e.to_string(),
    })?;

    info!(location = %location, chars = text.len(), "Loaded template");
    Ok(text)
}

/// Object store reached over plain HTTP(S) with path-style addressing:
/// `GET {endpoint}/{bucket}/{key}`.
pub struct HttpObjectStore {
    client: reqwest::Client,
    endpoint: Url,
    bearer_token: Option<String>,
}

impl HttpObjectStore {
    /// Create a new store rooted at `endpoint`
    pub fn new(endpoint: &str, bearer_token: Option<String>) -> Result<Self> {
        let endpoint = Url::parse(endpoint)
            .map_err(|e| RelcheckError::Config(format!("Invalid store endpoint {:?}: {}", endpoint, e)))?;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| RelcheckError::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            endpoint,
            bearer_token,
        })
    }

    /// Append bucket and key as percent-encoded path segments.
    fn object_url(&self, location: &StorageLocation) -> Result<Url> {
        let mut url = self.endpoint.clone();
        url.path_segments_mut()
            .map_err(|_| RelcheckError::Config(format!("Store endpoint {} cannot take a path", self.endpoint)))?
            .pop_if_empty()
            .push(&location.bucket)
            .extend(location.key.split('/').filter(|s| !s.is_empty()));
        Ok(url)
    }
}

#[async_trait]
impl ObjectStore for HttpObjectStore {
    async fn get(&self, location: &StorageLocation) -> Result<Vec<u8>> {
        let url = self.object_url(location)?;
        debug!(url = %url, "Fetching object");

        let mut request = self.client.get(url);
        if let Some(ref token) = self.bearer_token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await?;
        let status = response.status();

        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(RelcheckError::NotFound {
                bucket: location.bucket.clone(),
                key: location.key.clone(),
            });
        }

        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(RelcheckError::Storage {
                bucket: location.bucket.clone(),
                key: location.key.clone(),
                status: status.as_u16(),
                message,
            });
        }

        Ok(response.bytes().await?.to_vec())
    }
}

/// Object store backed by a local directory: `{root}/{bucket}/{key}`.
pub struct LocalObjectStore {
    root: PathBuf,
}

impl LocalObjectStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

#[async_trait]
impl ObjectStore for LocalObjectStore {
    async fn get(&self, location: &StorageLocation) -> Result<Vec<u8>> {
        let path = self
            .root
            .join(relative_part("bucket", &location.bucket)?)
            .join(relative_part("key", &location.key)?);
        debug!(path = ?path, "Reading object");

        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(RelcheckError::NotFound {
                bucket: location.bucket.clone(),
                key: location.key.clone(),
            }),
            Err(e) => Err(RelcheckError::Io(e)),
        }
    }
}

/// Bucket and key must stay below the store root: only plain, non-empty
/// relative components are accepted.
fn relative_part<'a>(what: &str, part: &'a str) -> Result<&'a Path> {
    let path = Path::new(part);
    let plain = !part.is_empty() && path.components().all(|c| matches!(c, Component::Normal(_)));
    if !plain {
        return Err(RelcheckError::Validation(format!(
            "{} {:?} must be a relative path without '..'",
            what, part
        )));
    }
    Ok(path)
}
