//! Test server harness for restfs integration tests.
//!
//! Provides a `TestServer` that runs the WebDAV server over an in-memory
//! (recording) backend, along with HTTP convenience methods.

use crate::common::RecordingApi;
use bytes::Bytes;
use restfs::{
    LocalDirApi, MemoryApi, RestApi, RestFileSystem, ServerConfig, StagingStore, TempDirStaging,
    WebDavServer,
};
use reqwest::{Client, Method, Response, StatusCode};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

const LOCK_BODY: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<D:lockinfo xmlns:D="DAV:">
  <D:lockscope><D:exclusive/></D:lockscope>
  <D:locktype><D:write/></D:locktype>
  <D:owner><D:href>restfs-tests</D:href></D:owner>
</D:lockinfo>"#;

/// Percent-encode a path for use in Destination headers.
fn url_encode_path(path: &str) -> String {
    let mut result = String::with_capacity(path.len() * 3);
    for byte in path.bytes() {
        if byte.is_ascii_alphanumeric() || b"-_.~/".contains(&byte) {
            result.push(byte as char);
        } else {
            result.push_str(&format!("%{byte:02X}"));
        }
    }
    result
}

/// Test server with HTTP client and automatic cleanup.
pub struct TestServer {
    /// The running WebDAV server.
    server: WebDavServer,
    /// HTTP client for making requests.
    client: Client,
    /// Base URL for the served filesystem (includes the prefix).
    pub base_url: String,
    /// Backend call log (None for local directory servers).
    api: Option<Arc<RecordingApi>>,
    /// Staging directory (cleaned up on drop).
    staging_dir: TempDir,
    /// Served directory for local backends.
    _data_dir: Option<TempDir>,
}

impl TestServer {
    /// Start a server over an empty in-memory backend.
    pub async fn with_memory() -> Self {
        Self::with_api(MemoryApi::new()).await
    }

    /// Start a server over an in-memory backend seeded with files.
    pub async fn with_files<N, C>(files: impl IntoIterator<Item = (N, C)>) -> Self
    where
        N: AsRef<str>,
        C: AsRef<[u8]>,
    {
        Self::with_api(MemoryApi::with_files(files)).await
    }

    async fn with_api(inner: MemoryApi) -> Self {
        let api = Arc::new(RecordingApi::new(inner));
        let mut server = Self::start(api.clone(), None).await;
        server.api = Some(api);
        server
    }

    /// Start a server over a temporary local directory.
    pub async fn with_local_dir() -> Self {
        let data_dir = TempDir::new().expect("Failed to create data dir");
        let api = Arc::new(LocalDirApi::new(data_dir.path()));
        Self::start(api, Some(data_dir)).await
    }

    async fn start(api: Arc<dyn RestApi>, data_dir: Option<TempDir>) -> Self {
        let staging_dir = TempDir::new().expect("Failed to create staging dir");
        let staging: Arc<dyn StagingStore> = Arc::new(TempDirStaging::new(staging_dir.path()));
        let fs = RestFileSystem::new(api, staging);

        // Start server on random port
        let server = WebDavServer::start(fs, ServerConfig::default())
            .await
            .expect("Failed to start WebDAV server");
        let base_url = server.url();

        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .expect("Failed to create HTTP client");

        let test_server = Self {
            server,
            client,
            base_url,
            api: None,
            staging_dir,
            _data_dir: data_dir,
        };
        test_server.wait_ready().await;
        test_server
    }

    /// Wait for the server to be ready to accept connections.
    async fn wait_ready(&self) {
        for _ in 0..50 {
            if let Ok(resp) = self
                .client
                .request(Method::from_bytes(b"PROPFIND").unwrap(), self.url("/"))
                .header("Depth", "0")
                .send()
                .await
                && (resp.status().is_success() || resp.status() == StatusCode::MULTI_STATUS)
            {
                return;
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
        panic!("Server did not become ready in time");
    }

    /// The recording backend (memory servers only).
    pub fn api(&self) -> &RecordingApi {
        self.api.as_deref().expect("server has no recording backend")
    }

    /// Number of staging files currently allocated.
    pub fn staged_files(&self) -> usize {
        std::fs::read_dir(self.staging_dir.path())
            .map(|entries| entries.count())
            .unwrap_or(0)
    }

    /// Wait until every staging file has been released.
    ///
    /// Read handles are dropped when the response body finishes streaming,
    /// which can trail the client seeing the last byte.
    pub async fn staging_released(&self) -> bool {
        for _ in 0..50 {
            if self.staged_files() == 0 {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        false
    }

    /// Wait until the backend holds an object at `name`.
    ///
    /// A handle the engine drops without flushing creates its object from a
    /// background task.
    pub async fn object_exists(&self, name: &str) -> bool {
        for _ in 0..50 {
            if self.api().inner().content(name).is_some() {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        false
    }

    /// Build a full URL from a path.
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Build a URL-encoded URL for use in Destination headers.
    fn url_encoded(&self, path: &str) -> String {
        format!("{}{}", self.base_url, url_encode_path(path))
    }

    // ========== HTTP Convenience Methods ==========

    /// GET a file's contents.
    pub async fn get(&self, path: &str) -> Response {
        self.client
            .get(self.url(path))
            .send()
            .await
            .expect("GET request failed")
    }

    /// GET a byte range.
    pub async fn get_range(&self, path: &str, range: &str) -> Response {
        self.client
            .get(self.url(path))
            .header("Range", range)
            .send()
            .await
            .expect("GET request failed")
    }

    /// GET a byte range and return the body of a 206 response.
    pub async fn get_range_bytes(
        &self,
        path: &str,
        range: &str,
    ) -> Result<Bytes, (StatusCode, String)> {
        let resp = self.get_range(path, range).await;
        let status = resp.status();
        if status == StatusCode::PARTIAL_CONTENT {
            Ok(resp.bytes().await.expect("Failed to read response bytes"))
        } else {
            let body = resp.text().await.unwrap_or_default();
            Err((status, body))
        }
    }

    /// GET a file's contents as bytes.
    pub async fn get_bytes(&self, path: &str) -> Result<Bytes, (StatusCode, String)> {
        let resp = self.get(path).await;
        let status = resp.status();
        if status.is_success() {
            Ok(resp.bytes().await.expect("Failed to read response bytes"))
        } else {
            let body = resp.text().await.unwrap_or_default();
            Err((status, body))
        }
    }

    /// PUT file contents.
    pub async fn put(&self, path: &str, body: impl Into<reqwest::Body>) -> Response {
        self.client
            .put(self.url(path))
            .body(body)
            .send()
            .await
            .expect("PUT request failed")
    }

    /// PUT file contents and assert success.
    pub async fn put_ok(&self, path: &str, body: impl Into<reqwest::Body>) {
        let resp = self.put(path, body).await;
        let status = resp.status();
        assert!(
            status.is_success(),
            "PUT {path} failed with status {status}: {}",
            resp.text().await.unwrap_or_default()
        );
    }

    /// DELETE a file or directory.
    pub async fn delete(&self, path: &str) -> Response {
        self.client
            .delete(self.url(path))
            .send()
            .await
            .expect("DELETE request failed")
    }

    /// DELETE and assert success.
    pub async fn delete_ok(&self, path: &str) {
        let resp = self.delete(path).await;
        let status = resp.status();
        assert!(
            status.is_success(),
            "DELETE {path} failed with status {status}: {}",
            resp.text().await.unwrap_or_default()
        );
    }

    /// MKCOL (create directory).
    pub async fn mkcol(&self, path: &str) -> Response {
        self.client
            .request(Method::from_bytes(b"MKCOL").unwrap(), self.url(path))
            .send()
            .await
            .expect("MKCOL request failed")
    }

    /// MKCOL and assert success.
    pub async fn mkcol_ok(&self, path: &str) {
        let resp = self.mkcol(path).await;
        let status = resp.status();
        assert!(
            status.is_success(),
            "MKCOL {path} failed with status {status}: {}",
            resp.text().await.unwrap_or_default()
        );
    }

    /// PROPFIND (list directory or get properties).
    pub async fn propfind(&self, path: &str, depth: &str) -> Response {
        self.client
            .request(Method::from_bytes(b"PROPFIND").unwrap(), self.url(path))
            .header("Depth", depth)
            .send()
            .await
            .expect("PROPFIND request failed")
    }

    /// PROPFIND and return body as string.
    pub async fn propfind_body(&self, path: &str, depth: &str) -> (StatusCode, String) {
        let resp = self.propfind(path, depth).await;
        let status = resp.status();
        let body = resp.text().await.unwrap_or_default();
        (status, body)
    }

    /// COPY a file or directory.
    pub async fn copy(&self, from: &str, to: &str, overwrite: bool) -> Response {
        self.client
            .request(Method::from_bytes(b"COPY").unwrap(), self.url(from))
            .header("Destination", self.url_encoded(to))
            .header("Overwrite", if overwrite { "T" } else { "F" })
            .send()
            .await
            .expect("COPY request failed")
    }

    /// COPY and assert success.
    pub async fn copy_ok(&self, from: &str, to: &str) {
        let resp = self.copy(from, to, true).await;
        let status = resp.status();
        assert!(
            status.is_success(),
            "COPY {from} -> {to} failed with status {status}: {}",
            resp.text().await.unwrap_or_default()
        );
    }

    /// MOVE a file or directory.
    pub async fn move_(&self, from: &str, to: &str, overwrite: bool) -> Response {
        self.client
            .request(Method::from_bytes(b"MOVE").unwrap(), self.url(from))
            .header("Destination", self.url_encoded(to))
            .header("Overwrite", if overwrite { "T" } else { "F" })
            .send()
            .await
            .expect("MOVE request failed")
    }

    /// MOVE and assert success.
    pub async fn move_ok(&self, from: &str, to: &str) {
        let resp = self.move_(from, to, true).await;
        let status = resp.status();
        assert!(
            status.is_success(),
            "MOVE {from} -> {to} failed with status {status}: {}",
            resp.text().await.unwrap_or_default()
        );
    }

    /// LOCK a resource exclusively with the given depth.
    pub async fn lock(&self, path: &str, depth: &str) -> Response {
        self.request("LOCK", path)
            .header("Depth", depth)
            .header("Timeout", "Second-60")
            .header("Content-Type", "application/xml")
            .body(LOCK_BODY)
            .send()
            .await
            .expect("LOCK request failed")
    }

    /// LOCK and return the lock token (including angle brackets).
    pub async fn lock_token(&self, path: &str) -> String {
        let resp = self.lock(path, "0").await;
        let status = resp.status();
        assert!(status.is_success(), "LOCK {path} failed with status {status}");
        resp.headers()
            .get("lock-token")
            .expect("LOCK response without Lock-Token header")
            .to_str()
            .expect("non-ASCII lock token")
            .to_string()
    }

    /// UNLOCK a resource.
    pub async fn unlock(&self, path: &str, token: &str) -> Response {
        self.request("UNLOCK", path)
            .header("Lock-Token", token)
            .send()
            .await
            .expect("UNLOCK request failed")
    }

    /// PUT while submitting a lock token.
    pub async fn put_locked(
        &self,
        path: &str,
        body: impl Into<reqwest::Body>,
        token: &str,
    ) -> Response {
        self.client
            .put(self.url(path))
            .header("If", format!("({token})"))
            .body(body)
            .send()
            .await
            .expect("PUT request failed")
    }

    /// Send a request with an arbitrary method.
    pub fn request(&self, method: &str, path: &str) -> reqwest::RequestBuilder {
        self.client
            .request(Method::from_bytes(method.as_bytes()).unwrap(), self.url(path))
    }

    /// Stop the server explicitly (otherwise happens on drop).
    pub async fn stop(self) {
        self.server.stop().await;
    }
}
