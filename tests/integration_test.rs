//! Integration tests for the application layer

mod test_utilities;

use cvemate::adapters::outbound::sources::{CISA_SOURCE, NVD_SOURCE};
use cvemate::prelude::*;
use serde_json::json;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use test_utilities::mocks::*;
use tokio::time::Instant;

const KEV_URL: &str = "https://kev.test/known_exploited_vulnerabilities.json";
const EPSS_URL: &str = "https://epss.test/epss_scores-current.csv";
const NVD_URL: &str = "https://nvd.test/rest/json/cves/2.0";

fn fetcher(client: Arc<MockPageClient>, retry_limit: u32) -> PaginatedFetcher {
    PaginatedFetcher::new(
        client,
        Arc::new(RateLimiter::new(50, Duration::from_secs(30))),
        RetryPolicy::new(retry_limit, Duration::from_secs(30)),
        10,
    )
}

fn kev_catalog(released: &str, ids: &[&str]) -> Vec<u8> {
    let vulnerabilities: Vec<_> = ids
        .iter()
        .map(|id| json!({"cveID": id, "vendorProject": "Acme", "knownRansomwareCampaignUse": "Unknown"}))
        .collect();
    serde_json::to_vec(&json!({
        "title": "CISA Catalog of Known Exploited Vulnerabilities",
        "catalogVersion": "2024.07.23",
        "dateReleased": released,
        "count": ids.len(),
        "vulnerabilities": vulnerabilities,
    }))
    .unwrap()
}

struct Harness {
    store: Arc<RecordingDocumentStore>,
    queue: UpsertQueue,
    tracker: Arc<SourceStatusTracker>,
}

impl Harness {
    fn new() -> Self {
        let store = Arc::new(RecordingDocumentStore::new());
        let dyn_store: Arc<dyn DocumentStore> = store.clone();
        Self {
            queue: UpsertQueue::new(dyn_store.clone()).unwrap(),
            tracker: Arc::new(SourceStatusTracker::new(dyn_store)),
            store,
        }
    }

    fn nvd(&self, client: Arc<MockPageClient>) -> NvdSource {
        NvdSource::new(
            NvdSettings {
                url: NVD_URL.to_string(),
                api_key: None,
                results_per_page: 2000,
            },
            fetcher(client, 0),
            self.store.clone(),
            self.queue.clone(),
            self.tracker.clone(),
        )
    }

    fn cisa(&self, downloader: Arc<MockDownloader>) -> CisaSource {
        CisaSource::new(
            KEV_URL,
            downloader,
            self.queue.clone(),
            self.tracker.clone(),
        )
    }
}

#[tokio::test]
async fn test_fetch_all_requests_every_page() {
    let client = Arc::new(MockPageClient::new(4500, 2000));
    let pages = Mutex::new(Vec::new());

    let summary = fetcher(client.clone(), 0)
        .fetch_all(&FetchRequest::new(NVD_URL, 2000), |records| {
            pages.lock().unwrap().push(records.len());
            Ok(())
        })
        .await
        .unwrap();

    assert_eq!(client.start_indexes(), vec![0, 2000, 4000]);
    assert_eq!(summary.pages, 3);
    assert_eq!(summary.records, 4500);
    assert_eq!(summary.total_results, 4500);

    let mut sizes = pages.into_inner().unwrap();
    sizes.sort_unstable();
    assert_eq!(sizes, vec![500, 2000, 2000]);
}

#[tokio::test]
async fn test_fetch_all_empty_listing_makes_one_request() {
    let client = Arc::new(MockPageClient::new(0, 2000));

    let summary = fetcher(client.clone(), 0)
        .fetch_all(&FetchRequest::new(NVD_URL, 2000), |_| Ok(()))
        .await
        .unwrap();

    assert_eq!(client.calls().len(), 1);
    assert_eq!(summary.records, 0);
}

#[tokio::test]
async fn test_fetch_all_sends_paging_and_caller_params() {
    let client = Arc::new(MockPageClient::new(10, 2000));
    let request = FetchRequest::new(NVD_URL, 2000)
        .with_param("lastModStartDate", "2024-07-22T00:00:00Z")
        .with_header("apiKey", "secret");

    fetcher(client.clone(), 0)
        .fetch_all(&request, |_| Ok(()))
        .await
        .unwrap();

    let call = &client.calls()[0];
    assert_eq!(call.url, NVD_URL);
    assert!(call
        .params
        .contains(&("lastModStartDate".to_string(), "2024-07-22T00:00:00Z".to_string())));
    assert!(call
        .params
        .contains(&("resultsPerPage".to_string(), "2000".to_string())));
    assert!(call
        .headers
        .contains(&("apiKey".to_string(), "secret".to_string())));
}

#[tokio::test(start_paused = true)]
async fn test_transient_status_is_retried_after_delay() {
    let client = Arc::new(MockPageClient::new(3000, 2000).with_statuses(2000, &[503, 503]));
    let started = Instant::now();

    let summary = fetcher(client.clone(), 3)
        .fetch_all(&FetchRequest::new(NVD_URL, 2000), |_| Ok(()))
        .await
        .unwrap();

    assert_eq!(summary.records, 3000);
    assert_eq!(client.calls().len(), 4);
    assert!(started.elapsed() >= Duration::from_secs(60));
}

#[tokio::test(start_paused = true)]
async fn test_exhausted_retries_fail_the_fetch() {
    let client = Arc::new(MockPageClient::new(100, 2000).with_statuses(0, &[503, 503, 503, 503]));

    let err = fetcher(client.clone(), 3)
        .fetch_all(&FetchRequest::new(NVD_URL, 2000), |_| Ok(()))
        .await
        .unwrap_err();

    assert_eq!(client.calls().len(), 4);
    assert!(matches!(
        err.downcast_ref::<FetchError>(),
        Some(FetchError::RetriesExhausted { attempts: 4, .. })
    ));
}

#[tokio::test]
async fn test_fatal_status_is_not_retried() {
    let client = Arc::new(MockPageClient::new(100, 2000).with_statuses(0, &[404]));

    let err = fetcher(client.clone(), 3)
        .fetch_all(&FetchRequest::new(NVD_URL, 2000), |_| Ok(()))
        .await
        .unwrap_err();

    assert_eq!(client.calls().len(), 1);
    assert!(matches!(
        err.downcast_ref::<FetchError>(),
        Some(FetchError::Status { status: 404, .. })
    ));
}

#[tokio::test]
async fn test_failed_later_page_fails_the_fetch() {
    let client = Arc::new(MockPageClient::new(5000, 2000).with_statuses(2000, &[500]));

    let result = fetcher(client.clone(), 3)
        .fetch_all(&FetchRequest::new(NVD_URL, 2000), |_| Ok(()))
        .await;

    assert!(result.is_err());
    // Remaining pages are still drained
    assert_eq!(client.start_indexes(), vec![0, 2000, 4000]);
}

#[tokio::test(start_paused = true)]
async fn test_rate_limit_caps_requests_across_workers() {
    let window = Duration::from_secs(30);
    let client = Arc::new(MockPageClient::new(700, 100));
    let fetcher = PaginatedFetcher::new(
        client.clone(),
        Arc::new(RateLimiter::new(2, window)),
        RetryPolicy::new(0, Duration::from_secs(30)),
        10,
    );

    let started = Instant::now();
    let summary = fetcher
        .fetch_all(&FetchRequest::new(NVD_URL, 100), |_| Ok(()))
        .await
        .unwrap();
    assert_eq!(summary.pages, 7);

    let mut times = client.call_times();
    times.sort();
    assert_eq!(times.len(), 7);
    for pair in times.windows(3) {
        assert!(
            pair[2] - pair[0] >= window,
            "three requests within {:?}",
            pair[2] - pair[0]
        );
    }
    // 7 requests at 2 per window need 4 windows
    assert!(started.elapsed() >= Duration::from_secs(90));
}

#[tokio::test(start_paused = true)]
async fn test_worker_pool_bounds_in_flight_requests() {
    let client = Arc::new(MockPageClient::new(2000, 100).with_latency(Duration::from_secs(1)));
    let fetcher = PaginatedFetcher::new(
        client.clone(),
        Arc::new(RateLimiter::new(100, Duration::from_secs(30))),
        RetryPolicy::new(0, Duration::from_secs(30)),
        3,
    );

    let summary = fetcher
        .fetch_all(&FetchRequest::new(NVD_URL, 100), |_| Ok(()))
        .await
        .unwrap();

    assert_eq!(summary.pages, 20);
    assert_eq!(client.max_in_flight(), 3);
}

#[tokio::test]
async fn test_nvd_init_loads_every_record() {
    let harness = Harness::new();
    let client = Arc::new(MockPageClient::new(4500, 2000));

    let update = harness.nvd(client).update(JobMode::Init).await.unwrap();

    assert_eq!(update, SourceUpdate::Fetched { records: 4500 });
    assert_eq!(harness.store.inner().count("cve"), 4500);

    let doc = harness.store.cve("CVE-2024-00042").unwrap();
    assert_eq!(doc["nvd"]["id"], "CVE-2024-00042");
    assert!(doc.contains_key("created_at"));

    let status = harness.tracker.get_status(NVD_SOURCE).await.unwrap();
    assert!(status.is_some());
}

#[tokio::test]
async fn test_nvd_update_sends_modification_window() {
    let harness = Harness::new();
    let client = Arc::new(MockPageClient::new(3, 2000));

    harness
        .nvd(client.clone())
        .update(JobMode::Update)
        .await
        .unwrap();

    let params = &client.calls()[0].params;
    assert!(params.iter().any(|(k, _)| k == "lastModStartDate"));
    assert!(params.iter().any(|(k, _)| k == "lastModEndDate"));
}

#[tokio::test]
async fn test_nvd_long_outage_update_is_split_into_api_sized_windows() {
    let harness = Harness::new();
    harness
        .tracker
        .record_success_at(
            NVD_SOURCE,
            Document::new(),
            chrono::Utc::now() - chrono::TimeDelta::days(300),
        )
        .await
        .unwrap();
    let client = Arc::new(MockPageClient::new(2, 2000));

    let update = harness
        .nvd(client.clone())
        .update(JobMode::Update)
        .await
        .unwrap();
    assert_eq!(update, SourceUpdate::Fetched { records: 6 });

    let param = |request: &PageRequest, name: &str| {
        let value = request
            .params
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.clone())
            .unwrap();
        chrono::NaiveDateTime::parse_from_str(&value, "%Y-%m-%dT%H:%M:%SZ").unwrap()
    };

    let calls = client.calls();
    assert_eq!(calls.len(), 3);
    let mut windows: Vec<_> = calls
        .iter()
        .map(|c| (param(c, "lastModStartDate"), param(c, "lastModEndDate")))
        .collect();
    windows.sort();
    for (start, end) in &windows {
        assert!(*end - *start <= chrono::TimeDelta::days(120));
    }
    assert_eq!(windows[0].1, windows[1].0);
    assert_eq!(windows[1].1, windows[2].0);
}

#[tokio::test]
async fn test_cisa_equal_release_date_is_skipped() {
    let harness = Harness::new();
    let downloader = Arc::new(
        MockDownloader::new().with_payload(
            KEV_URL,
            kev_catalog("2024-07-23T14:01:05.000Z", &["CVE-2024-0001", "CVE-2024-0002"]),
        ),
    );
    let cisa = harness.cisa(downloader.clone());

    let first = cisa.update(JobMode::Update).await.unwrap();
    assert_eq!(first, SourceUpdate::Fetched { records: 2 });
    let writes = harness.store.write_calls("cve");

    // Same day, later in the day: still not newer
    downloader.set_payload(
        KEV_URL,
        kev_catalog(
            "2024-07-23T20:00:00.000Z",
            &["CVE-2024-0001", "CVE-2024-0002", "CVE-2024-0003"],
        ),
    );
    let second = cisa.update(JobMode::Update).await.unwrap();

    assert!(matches!(second, SourceUpdate::Skipped { .. }));
    assert_eq!(harness.store.write_calls("cve"), writes);
    assert_eq!(harness.store.inner().count("cve"), 2);
}

#[tokio::test]
async fn test_cisa_init_ignores_stored_marker() {
    let harness = Harness::new();
    let downloader = Arc::new(MockDownloader::new().with_payload(
        KEV_URL,
        kev_catalog("2024-07-23T14:01:05.000Z", &["CVE-2024-0001"]),
    ));
    let cisa = harness.cisa(downloader);

    cisa.update(JobMode::Update).await.unwrap();
    let again = cisa.update(JobMode::Init).await.unwrap();

    assert_eq!(again, SourceUpdate::Fetched { records: 1 });
    let status = harness.tracker.get_status(CISA_SOURCE).await.unwrap().unwrap();
    assert_eq!(
        status.source_last_update.unwrap().date_naive().to_string(),
        "2024-07-23"
    );
    assert_eq!(status.extra["catalog_version"], "2024.07.23");
}

#[tokio::test]
async fn test_sources_merge_without_clobbering_each_other() {
    let harness = Harness::new();
    let client = Arc::new(MockPageClient::with_ids(
        &["CVE-2024-0001", "CVE-2024-0002"],
        2000,
    ));
    harness.nvd(client).update(JobMode::Init).await.unwrap();
    let created = harness.store.cve("CVE-2024-0001").unwrap()["created_at"].clone();

    let downloader = Arc::new(MockDownloader::new().with_payload(
        KEV_URL,
        kev_catalog("2024-07-23T14:01:05.000Z", &["CVE-2024-0001", "CVE-2024-9999"]),
    ));
    harness.cisa(downloader).update(JobMode::Init).await.unwrap();

    let merged = harness.store.cve("CVE-2024-0001").unwrap();
    assert_eq!(merged["nvd"]["id"], "CVE-2024-0001");
    assert_eq!(merged["kev"]["cveID"], "CVE-2024-0001");
    assert_eq!(merged["created_at"], created);

    let nvd_only = harness.store.cve("CVE-2024-0002").unwrap();
    assert!(nvd_only.contains_key("nvd"));
    assert!(!nvd_only.contains_key("kev"));

    let kev_only = harness.store.cve("CVE-2024-9999").unwrap();
    assert!(!kev_only.contains_key("nvd"));
    assert_eq!(harness.store.inner().count("cve"), 3);
}

#[tokio::test]
async fn test_job_isolates_failing_source() {
    let harness = Harness::new();
    let client = Arc::new(MockPageClient::with_ids(&["CVE-2024-0001"], 2000));
    let downloader = Arc::new(MockDownloader::new().with_payload(
        KEV_URL,
        kev_catalog("2024-07-23T14:01:05.000Z", &["CVE-2024-0001"]),
    ));

    // EPSS URL is not served: its download fails
    let sources: Vec<Arc<dyn SourceAdapter>> = vec![
        Arc::new(harness.nvd(client)),
        Arc::new(EpssSource::new(
            EPSS_URL,
            downloader.clone(),
            harness.queue.clone(),
            harness.tracker.clone(),
        )),
        Arc::new(harness.cisa(downloader)),
    ];
    let job = RunIngestionJobUseCase::new(sources, harness.queue.clone(), harness.tracker.clone());

    let report = job.execute(JobMode::Init).await.unwrap();

    assert_eq!(report.failed_sources(), vec!["epss"]);
    assert_eq!(report.records_fetched(), 2);
    assert!(matches!(
        report.outcomes[2].result,
        SourceResult::Fetched { records: 1 }
    ));

    let merged = harness.store.cve("CVE-2024-0001").unwrap();
    assert!(merged.contains_key("nvd"));
    assert!(merged.contains_key("kev"));
    assert!(!merged.contains_key("epss"));

    assert!(harness.tracker.get_status("epss").await.unwrap().is_none());
    assert!(harness
        .tracker
        .get_status("overall-job")
        .await
        .unwrap()
        .is_some());
}

#[tokio::test]
async fn test_epss_scores_are_merged() {
    let harness = Harness::new();
    let csv = "#model_version:v2023.03.01,score_date:2024-07-23T00:00:00+0000\n\
cve,epss,percentile\n\
CVE-2024-0001,0.01155,0.84817\n";
    let downloader = Arc::new(MockDownloader::new().with_payload(EPSS_URL, csv));
    let epss = EpssSource::new(
        EPSS_URL,
        downloader,
        harness.queue.clone(),
        harness.tracker.clone(),
    );

    epss.update(JobMode::Update).await.unwrap();
    let skipped = epss.update(JobMode::Update).await.unwrap();

    assert!(matches!(skipped, SourceUpdate::Skipped { .. }));
    let doc = harness.store.cve("CVE-2024-0001").unwrap();
    assert_eq!(doc["epss"]["epss_score"], json!(0.01155));
    assert_eq!(doc["epss"]["percentile"], json!(0.84817));
}

#[tokio::test]
async fn test_scheduler_picks_init_then_update() {
    let harness = Harness::new();
    let job = Arc::new(RunIngestionJobUseCase::new(
        Vec::new(),
        harness.queue.clone(),
        harness.tracker.clone(),
    ));
    let scheduler = JobScheduler::new(
        job,
        harness.tracker.clone(),
        SchedulerSettings {
            interval: Duration::from_secs(6 * 3600),
            poll_interval: Duration::from_secs(5),
            timezone: chrono::FixedOffset::east_opt(0).unwrap(),
        },
    );

    let (delay, mode) = scheduler.next_delay().await.unwrap();
    assert_eq!(delay, Duration::ZERO);
    assert_eq!(mode, JobMode::Init);

    scheduler.try_run_job(mode).await.unwrap();

    let (delay, mode) = scheduler.next_delay().await.unwrap();
    assert_eq!(mode, JobMode::Update);
    assert!(delay > Duration::from_secs(5 * 3600));
    assert!(!scheduler.is_running());
}
