use async_trait::async_trait;
use cvemate::prelude::*;
use cvemate::ports::outbound::HttpResponse;
use serde_json::{json, Value};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use tokio::time::Instant;

/// One NVD API record for `id`
pub fn nvd_record(id: &str) -> Value {
    json!({"cve": {"id": id, "sourceIdentifier": "cve@mitre.org", "vulnStatus": "Analyzed"}})
}

/// Mock PageClient serving an NVD-shaped listing of `total` records
///
/// Record `i` is `CVE-2024-<i>`. Statuses scripted for a start index are
/// returned, in order, before that page is served.
pub struct MockPageClient {
    total: u64,
    page_size: u64,
    ids: Option<Vec<String>>,
    scripted: Mutex<HashMap<u64, VecDeque<u16>>>,
    calls: Mutex<Vec<PageRequest>>,
    call_times: Mutex<Vec<Instant>>,
    latency: Option<Duration>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl MockPageClient {
    pub fn new(total: u64, page_size: u64) -> Self {
        Self {
            total,
            page_size,
            ids: None,
            scripted: Mutex::new(HashMap::new()),
            calls: Mutex::new(Vec::new()),
            call_times: Mutex::new(Vec::new()),
            latency: None,
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    /// Every response takes `latency` to arrive
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Listing made of exactly these identifiers
    pub fn with_ids(ids: &[&str], page_size: u64) -> Self {
        let mut client = Self::new(ids.len() as u64, page_size);
        client.ids = Some(ids.iter().map(|id| id.to_string()).collect());
        client
    }

    pub fn with_statuses(self, start_index: u64, statuses: &[u16]) -> Self {
        self.scripted
            .lock()
            .unwrap()
            .insert(start_index, statuses.iter().copied().collect());
        self
    }

    pub fn calls(&self) -> Vec<PageRequest> {
        self.calls.lock().unwrap().clone()
    }

    /// Instant of every request, in arrival order
    pub fn call_times(&self) -> Vec<Instant> {
        self.call_times.lock().unwrap().clone()
    }

    /// Highest number of requests that were in flight at once
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    /// Start indexes of every request, sorted
    pub fn start_indexes(&self) -> Vec<u64> {
        let mut indexes: Vec<u64> = self.calls().iter().map(start_index).collect();
        indexes.sort_unstable();
        indexes
    }

    fn record_id(&self, index: u64) -> String {
        match &self.ids {
            Some(ids) => ids[index as usize].clone(),
            None => format!("CVE-2024-{:05}", index),
        }
    }

    fn page_body(&self, start: u64) -> Vec<u8> {
        let end = (start + self.page_size).min(self.total);
        let records: Vec<Value> = (start..end)
            .map(|i| nvd_record(&self.record_id(i)))
            .collect();
        let body = json!({
            "resultsPerPage": records.len(),
            "startIndex": start,
            "totalResults": self.total,
            "format": "NVD_CVE",
            "version": "2.0",
            "vulnerabilities": records,
        });
        serde_json::to_vec(&body).unwrap()
    }
}

fn start_index(request: &PageRequest) -> u64 {
    request
        .params
        .iter()
        .find(|(key, _)| key == "startIndex")
        .and_then(|(_, value)| value.parse().ok())
        .unwrap_or(0)
}

#[async_trait]
impl PageClient for MockPageClient {
    async fn get(&self, request: &PageRequest) -> std::result::Result<HttpResponse, FetchError> {
        self.calls.lock().unwrap().push(request.clone());
        self.call_times.lock().unwrap().push(Instant::now());
        let start = start_index(request);

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        let scripted = self
            .scripted
            .lock()
            .unwrap()
            .get_mut(&start)
            .and_then(VecDeque::pop_front);
        if let Some(status) = scripted {
            return Ok(HttpResponse {
                status,
                body: b"Service Unavailable".to_vec(),
            });
        }

        Ok(HttpResponse {
            status: 200,
            body: self.page_body(start),
        })
    }
}
