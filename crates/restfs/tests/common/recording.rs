//! A backend wrapper that records every call, for asserting on traffic.

use async_trait::async_trait;
use parking_lot::Mutex;
use restfs::{ApiError, ApiResult, ContentSource, ContentStream, EntryInfo, MemoryApi, RestApi};
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::io::AsyncReadExt;

/// One backend call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    GetContent(String),
    Stat(String),
    GetChildren(String),
    Mkdir(String),
    Update(String, Vec<u8>),
    NewFile(String, Vec<u8>),
    RemoveAll(String),
    Rename(String, String),
}

/// [`MemoryApi`] plus a call log and write-failure injection.
#[derive(Debug, Default)]
pub struct RecordingApi {
    inner: MemoryApi,
    calls: Mutex<Vec<Call>>,
    fail_writes: AtomicBool,
}

impl RecordingApi {
    pub fn new(inner: MemoryApi) -> Self {
        Self {
            inner,
            calls: Mutex::new(Vec::new()),
            fail_writes: AtomicBool::new(false),
        }
    }

    pub fn inner(&self) -> &MemoryApi {
        &self.inner
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().clone()
    }

    pub fn clear(&self) {
        self.calls.lock().clear();
    }

    /// Make `update` and `new_file` fail from now on.
    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub fn fetches(&self) -> usize {
        self.count(|c| matches!(c, Call::GetContent(_)))
    }

    pub fn stats(&self) -> usize {
        self.count(|c| matches!(c, Call::Stat(_)))
    }

    /// Every `new_file` call with the content it carried.
    pub fn creates(&self) -> Vec<(String, Vec<u8>)> {
        self.calls
            .lock()
            .iter()
            .filter_map(|c| match c {
                Call::NewFile(name, data) => Some((name.clone(), data.clone())),
                _ => None,
            })
            .collect()
    }

    /// Every `update` call with the content it carried.
    pub fn updates(&self) -> Vec<(String, Vec<u8>)> {
        self.calls
            .lock()
            .iter()
            .filter_map(|c| match c {
                Call::Update(name, data) => Some((name.clone(), data.clone())),
                _ => None,
            })
            .collect()
    }

    fn count(&self, pred: impl Fn(&Call) -> bool) -> usize {
        self.calls.lock().iter().filter(|c| pred(c)).count()
    }

    fn record(&self, call: Call) {
        self.calls.lock().push(call);
    }

    fn check_writable(&self, name: &str) -> ApiResult<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            Err(ApiError::Remote(format!("injected write failure for {name}")))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl RestApi for RecordingApi {
    async fn get_content(&self, name: &str) -> ApiResult<ContentStream> {
        self.record(Call::GetContent(name.to_string()));
        self.inner.get_content(name).await
    }

    async fn stat(&self, name: &str) -> ApiResult<EntryInfo> {
        self.record(Call::Stat(name.to_string()));
        self.inner.stat(name).await
    }

    async fn get_children(&self, name: &str) -> ApiResult<Vec<EntryInfo>> {
        self.record(Call::GetChildren(name.to_string()));
        self.inner.get_children(name).await
    }

    async fn mkdir(&self, name: &str, perm: u32) -> ApiResult<()> {
        self.record(Call::Mkdir(name.to_string()));
        self.inner.mkdir(name, perm).await
    }

    async fn update(&self, name: &str, content: ContentSource<'_>) -> ApiResult<()> {
        let mut data = Vec::new();
        content.read_to_end(&mut data).await?;
        self.record(Call::Update(name.to_string(), data.clone()));
        self.check_writable(name)?;
        self.inner.update(name, &mut data.as_slice()).await
    }

    async fn new_file(&self, name: &str, content: ContentSource<'_>) -> ApiResult<()> {
        let mut data = Vec::new();
        content.read_to_end(&mut data).await?;
        self.record(Call::NewFile(name.to_string(), data.clone()));
        self.check_writable(name)?;
        self.inner.new_file(name, &mut data.as_slice()).await
    }

    async fn remove_all(&self, name: &str) -> ApiResult<()> {
        self.record(Call::RemoveAll(name.to_string()));
        self.inner.remove_all(name).await
    }

    async fn rename(&self, old_name: &str, new_name: &str) -> ApiResult<()> {
        self.record(Call::Rename(old_name.to_string(), new_name.to_string()));
        self.inner.rename(old_name, new_name).await
    }
}
