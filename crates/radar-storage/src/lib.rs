//! HTTP fetch utilities and local key-value persistence for Contest Radar.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::{Mutex, Semaphore};
use tracing::{debug, info_span, Instrument};
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct HttpClientConfig {
    pub timeout: Duration,
    pub user_agent: Option<String>,
    pub global_concurrency: usize,
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(20),
            user_agent: None,
            global_concurrency: 8,
        }
    }
}

#[derive(Debug, Clone)]
pub struct FetchedResponse {
    pub status: StatusCode,
    pub final_url: String,
    pub content_type: Option<String>,
    pub body: Vec<u8>,
}

impl FetchedResponse {
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    pub fn json<T: DeserializeOwned>(&self) -> serde_json::Result<T> {
        serde_json::from_slice(&self.body)
    }
}

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("http status {status} for {url}")]
    HttpStatus { status: u16, url: String },
    #[error("fetch limiter closed")]
    LimiterClosed,
}

impl FetchError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, FetchError::Request(err) if err.is_timeout())
    }
}

/// Shared HTTP client. Every request is issued at most once; retry policy is
/// left to whoever schedules refetches.
#[derive(Debug)]
pub struct HttpFetcher {
    client: reqwest::Client,
    global_limit: Arc<Semaphore>,
}

impl HttpFetcher {
    pub fn new(config: HttpClientConfig) -> anyhow::Result<Self> {
        let mut builder = reqwest::Client::builder()
            .gzip(true)
            .brotli(true)
            .timeout(config.timeout);

        if let Some(user_agent) = &config.user_agent {
            builder = builder.user_agent(user_agent.clone());
        }

        let client = builder.build().context("building reqwest client")?;
        Ok(Self {
            client,
            global_limit: Arc::new(Semaphore::new(config.global_concurrency.max(1))),
        })
    }

    pub async fn get(&self, source: &str, url: &str) -> Result<FetchedResponse, FetchError> {
        self.get_with_query(source, url, &[]).await
    }

    pub async fn get_with_query(
        &self,
        source: &str,
        url: &str,
        query: &[(&str, &str)],
    ) -> Result<FetchedResponse, FetchError> {
        let request = self.client.get(url).query(query);
        self.send(source, url, request).await
    }

    pub async fn post_json<B: Serialize + ?Sized>(
        &self,
        source: &str,
        url: &str,
        body: &B,
    ) -> Result<FetchedResponse, FetchError> {
        let request = self.client.post(url).json(body);
        self.send(source, url, request).await
    }

    async fn send(
        &self,
        source: &str,
        url: &str,
        request: reqwest::RequestBuilder,
    ) -> Result<FetchedResponse, FetchError> {
        let _permit = self
            .global_limit
            .acquire()
            .await
            .map_err(|_| FetchError::LimiterClosed)?;

        let span = info_span!("http_fetch", source, url);
        async move {
            let resp = request.send().await?;
            let status = resp.status();
            let final_url = resp.url().to_string();
            if !status.is_success() {
                return Err(FetchError::HttpStatus {
                    status: status.as_u16(),
                    url: final_url,
                });
            }
            let content_type = resp
                .headers()
                .get(reqwest::header::CONTENT_TYPE)
                .and_then(|v| v.to_str().ok())
                .map(ToString::to_string);
            let body = resp.bytes().await?.to_vec();
            debug!(bytes = body.len(), "fetched");
            Ok(FetchedResponse {
                status,
                final_url,
                content_type,
                body,
            })
        }
        .instrument(span)
        .await
    }
}

/// Minimal key-value persistence surface: every key maps to a list of strings.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn get(&self, key: &str) -> anyhow::Result<Vec<String>>;
    async fn set(&self, key: &str, values: Vec<String>) -> anyhow::Result<()>;

    /// Read-modify-write of one key. No other write to the store lands
    /// between the read and the write.
    async fn update(&self, key: &str, apply: &mut (dyn for<'v> FnMut(&'v mut Vec<String>) + Send)) -> anyhow::Result<()>;
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, Vec<String>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn get(&self, key: &str) -> anyhow::Result<Vec<String>> {
        Ok(self.entries.lock().await.get(key).cloned().unwrap_or_default())
    }

    async fn set(&self, key: &str, values: Vec<String>) -> anyhow::Result<()> {
        self.entries.lock().await.insert(key.to_string(), values);
        Ok(())
    }

    async fn update(&self, key: &str, apply: &mut (dyn for<'v> FnMut(&'v mut Vec<String>) + Send)) -> anyhow::Result<()> {
        apply(self.entries.lock().await.entry(key.to_string()).or_default());
        Ok(())
    }
}

/// Keeps all keys in one JSON document. Writes go through a temp file and an
/// atomic rename so a crash never leaves a half-written store behind.
#[derive(Debug)]
pub struct JsonFileStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn read_document(&self) -> anyhow::Result<BTreeMap<String, Vec<String>>> {
        if !fs::try_exists(&self.path)
            .await
            .with_context(|| format!("checking store path {}", self.path.display()))?
        {
            return Ok(BTreeMap::new());
        }
        let text = fs::read_to_string(&self.path)
            .await
            .with_context(|| format!("reading {}", self.path.display()))?;
        if text.trim().is_empty() {
            return Ok(BTreeMap::new());
        }
        serde_json::from_str(&text).with_context(|| format!("parsing {}", self.path.display()))
    }

    async fn write_document(&self, doc: &BTreeMap<String, Vec<String>>) -> anyhow::Result<()> {
        let bytes = serde_json::to_vec_pretty(doc).context("serializing key-value store")?;
        let parent = self
            .path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        fs::create_dir_all(parent)
            .await
            .with_context(|| format!("creating store directory {}", parent.display()))?;

        let temp_path = parent.join(format!(".{}.{}.tmp", Uuid::new_v4(), bytes.len()));
        let mut file = fs::OpenOptions::new()
            .create_new(true)
            .write(true)
            .open(&temp_path)
            .await
            .with_context(|| format!("opening temp store file {}", temp_path.display()))?;
        file.write_all(&bytes)
            .await
            .with_context(|| format!("writing temp store file {}", temp_path.display()))?;
        file.flush()
            .await
            .with_context(|| format!("flushing temp store file {}", temp_path.display()))?;
        drop(file);

        if let Err(err) = fs::rename(&temp_path, &self.path).await {
            let _ = fs::remove_file(&temp_path).await;
            return Err(err).with_context(|| {
                format!(
                    "atomically renaming {} -> {}",
                    temp_path.display(),
                    self.path.display()
                )
            });
        }
        Ok(())
    }
}

#[async_trait]
impl KeyValueStore for JsonFileStore {
    async fn get(&self, key: &str) -> anyhow::Result<Vec<String>> {
        let mut doc = self.read_document().await?;
        Ok(doc.remove(key).unwrap_or_default())
    }

    async fn set(&self, key: &str, values: Vec<String>) -> anyhow::Result<()> {
        let _guard = self.write_lock.lock().await;
        let mut doc = self.read_document().await?;
        doc.insert(key.to_string(), values);
        self.write_document(&doc).await
    }

    async fn update(&self, key: &str, apply: &mut (dyn for<'v> FnMut(&'v mut Vec<String>) + Send)) -> anyhow::Result<()> {
        let _guard = self.write_lock.lock().await;
        let mut doc = self.read_document().await?;
        apply(doc.entry(key.to_string()).or_default());
        self.write_document(&doc).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn memory_store_returns_empty_for_missing_keys() {
        let store = MemoryStore::new();
        assert!(store.get("bookmarks").await.unwrap().is_empty());
        store.set("bookmarks", vec!["cf-1".into()]).await.unwrap();
        assert_eq!(store.get("bookmarks").await.unwrap(), vec!["cf-1".to_string()]);
    }

    #[tokio::test]
    async fn file_store_persists_across_instances() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("nested").join("store.json");

        let store = JsonFileStore::new(&path);
        assert!(store.get("bookmarks").await.unwrap().is_empty());
        store
            .set("bookmarks", vec!["cf-1".into(), "lc-weekly-1".into()])
            .await
            .unwrap();
        store.set("solution_urls", vec!["cf-1 https://y/1".into()]).await.unwrap();

        let reopened = JsonFileStore::new(&path);
        assert_eq!(
            reopened.get("bookmarks").await.unwrap(),
            vec!["cf-1".to_string(), "lc-weekly-1".to_string()]
        );
        assert_eq!(reopened.get("solution_urls").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn file_store_overwrites_and_leaves_no_temp_files() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("store.json");
        let store = JsonFileStore::new(&path);
        store.set("bookmarks", vec!["a".into()]).await.unwrap();
        store.set("bookmarks", vec![]).await.unwrap();
        assert!(store.get("bookmarks").await.unwrap().is_empty());

        let leftovers = std::fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().ends_with(".tmp"))
            .count();
        assert_eq!(leftovers, 0);
    }

    #[tokio::test]
    async fn concurrent_updates_are_not_lost() {
        let dir = tempdir().expect("tempdir");
        let store = Arc::new(JsonFileStore::new(dir.path().join("store.json")));
        let writers = (0..12)
            .map(|i| {
                let store = store.clone();
                tokio::spawn(async move {
                    store
                        .update("bookmarks", &mut |ids| ids.push(format!("cf-{i}")))
                        .await
                })
            })
            .collect::<Vec<_>>();
        for writer in writers {
            writer.await.unwrap().unwrap();
        }
        let mut ids = store.get("bookmarks").await.unwrap();
        ids.sort();
        assert_eq!(ids.len(), 12);
        assert!(ids.contains(&"cf-0".to_string()) && ids.contains(&"cf-11".to_string()));

        let memory = MemoryStore::new();
        memory.update("solution_urls", &mut |v| v.push("cf-1 https://youtu.be/a".into())).await.unwrap();
        memory.update("solution_urls", &mut |v| v.retain(|e| !e.starts_with("cf-1 "))).await.unwrap();
        assert!(memory.get("solution_urls").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn file_store_rejects_corrupt_documents() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("store.json");
        std::fs::write(&path, "{not json").unwrap();
        let store = JsonFileStore::new(&path);
        assert!(store.get("bookmarks").await.is_err());
    }

    #[test]
    fn fetcher_builds_with_defaults() {
        let fetcher = HttpFetcher::new(HttpClientConfig {
            user_agent: Some("contest-radar-test".into()),
            ..Default::default()
        });
        assert!(fetcher.is_ok());
    }
}
