use async_trait::async_trait;
use cvemate::prelude::*;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

/// Mock RawDownloader serving fixed payloads per URL
///
/// Unknown URLs fail like an unreachable host.
pub struct MockDownloader {
    payloads: Mutex<HashMap<String, Vec<u8>>>,
    downloads: AtomicUsize,
}

impl MockDownloader {
    pub fn new() -> Self {
        Self {
            payloads: Mutex::new(HashMap::new()),
            downloads: AtomicUsize::new(0),
        }
    }

    pub fn with_payload(self, url: &str, payload: impl Into<Vec<u8>>) -> Self {
        self.set_payload(url, payload);
        self
    }

    /// Replaces the payload served for `url`
    pub fn set_payload(&self, url: &str, payload: impl Into<Vec<u8>>) {
        self.payloads
            .lock()
            .unwrap()
            .insert(url.to_string(), payload.into());
    }

    pub fn downloads(&self) -> usize {
        self.downloads.load(Ordering::SeqCst)
    }
}

impl Default for MockDownloader {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RawDownloader for MockDownloader {
    async fn download(&self, url: &str) -> Result<Vec<u8>> {
        self.downloads.fetch_add(1, Ordering::SeqCst);
        match self.payloads.lock().unwrap().get(url) {
            Some(payload) => Ok(payload.clone()),
            None => anyhow::bail!("Mock download failure: {}", url),
        }
    }
}
