use std::future::Future;
use std::path::PathBuf;
use tracing::info;

use crate::error::{DetectorError, Result};

/// `{case_path}/{filename}` with stray slashes removed.
pub fn object_key(case_path: &str, filename: &str) -> String {
    let case_path = case_path.trim_matches('/');
    let filename = filename.trim_start_matches('/');
    if case_path.is_empty() {
        filename.to_string()
    } else {
        format!("{}/{}", case_path, filename)
    }
}

/// A single bucket of objects addressed by key.
pub trait ObjectStore {
    fn get(&self, key: &str) -> impl Future<Output = Result<Vec<u8>>> + Send;

    /// Errors are reported as `anyhow` so the caller can attach the report
    /// it failed to deliver.
    fn put(&self, key: &str, bytes: Vec<u8>) -> impl Future<Output = anyhow::Result<()>> + Send;
}

/// Bucket backed by a local directory.
#[derive(Clone, Debug)]
pub struct LocalStore {
    root: PathBuf,
}

impl LocalStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.root.join(key)
    }
}

impl ObjectStore for LocalStore {
    async fn get(&self, key: &str) -> Result<Vec<u8>> {
        let path = self.path_for(key);
        let bytes = tokio::fs::read(&path)
            .await
            .map_err(|e| DetectorError::input_unavailable(format!("object {}", path.display()), e))?;
        info!(key, bytes = bytes.len(), "fetched object");
        Ok(bytes)
    }

    async fn put(&self, key: &str, bytes: Vec<u8>) -> anyhow::Result<()> {
        let path = self.path_for(key);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&path, &bytes).await?;
        info!(key, bytes = bytes.len(), "stored object");
        Ok(())
    }
}

/// Bucket reachable over plain HTTP GET/PUT at `{endpoint}/{bucket}/{key}`.
#[derive(Clone)]
pub struct HttpStore {
    client: reqwest::Client,
    endpoint: String,
    bucket: String,
    token: Option<String>,
}

impl HttpStore {
    pub fn new(endpoint: impl Into<String>, bucket: impl Into<String>, token: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: endpoint.into(),
            bucket: bucket.into(),
            token,
        }
    }

    pub fn url_for(&self, key: &str) -> String {
        format!(
            "{}/{}/{}",
            self.endpoint.trim_end_matches('/'),
            self.bucket.trim_matches('/'),
            key.trim_start_matches('/')
        )
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn fetch(&self, url: &str) -> anyhow::Result<Vec<u8>> {
        let response = self
            .authorize(self.client.get(url))
            .send()
            .await?
            .error_for_status()?;
        Ok(response.bytes().await?.to_vec())
    }
}

impl ObjectStore for HttpStore {
    #[tracing::instrument(name = "http_get", skip(self))]
    async fn get(&self, key: &str) -> Result<Vec<u8>> {
        let url = self.url_for(key);
        let bytes = self
            .fetch(&url)
            .await
            .map_err(|e| DetectorError::input_unavailable(format!("object {}", url), e))?;
        info!(bytes = bytes.len(), "fetched object");
        Ok(bytes)
    }

    #[tracing::instrument(name = "http_put", skip(self, bytes))]
    async fn put(&self, key: &str, bytes: Vec<u8>) -> anyhow::Result<()> {
        let url = self.url_for(key);
        let size = bytes.len();
        self.authorize(self.client.put(&url))
            .body(bytes)
            .send()
            .await?
            .error_for_status()?;
        info!(bytes = size, "stored object");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_join_case_path_and_filename() {
        assert_eq!(object_key("cases/aapl/", "input.csv"), "cases/aapl/input.csv");
        assert_eq!(object_key("/cases", "/report.yaml"), "cases/report.yaml");
        assert_eq!(object_key("", "input.csv"), "input.csv");
    }

    #[test]
    fn http_urls_include_bucket() {
        let store = HttpStore::new("https://storage.example.com/", "bucket", None);
        assert_eq!(
            store.url_for("cases/input.csv"),
            "https://storage.example.com/bucket/cases/input.csv"
        );
    }

    #[tokio::test]
    async fn local_store_round_trips_objects() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalStore::new(dir.path());
        let key = object_key("case-1", "report.yaml");
        store.put(&key, b"ticker: X\n".to_vec()).await.unwrap();
        assert_eq!(store.get(&key).await.unwrap(), b"ticker: X\n".to_vec());
        assert!(dir.path().join("case-1/report.yaml").exists());
    }

    #[tokio::test]
    async fn missing_object_is_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalStore::new(dir.path());
        assert!(matches!(
            store.get("nope.csv").await,
            Err(DetectorError::InputUnavailable { .. })
        ));
    }
}
