//! Dispatcher, queue and built-in handlers against the in-memory stores.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value as JsonValue};
use tokio::sync::{Mutex, Notify};
use uuid::Uuid;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use datacat_db::{MemoryCatalog, MemoryJobStore};
use datacat_jobs::{
    defaults, CatalogRepository, DatasetProcessor, DispatchOutcome, Dispatcher, DispatcherBuilder,
    DispatcherConfig, DispatcherEvent, Error, Job, JobContext, JobHandler, JobPatch, JobQueue,
    JobResult, JobStatus, JobStore, JobType, ProcessDatasetHandler, ProcessDatasetUrlHandler,
    Result, RetentionSweeper, SweeperConfig,
};

// =============================================================================
// Test handlers
// =============================================================================

/// Records the ids it was invoked with and echoes the payload back.
#[derive(Clone, Default)]
struct RecordingHandler {
    seen: Arc<Mutex<Vec<Uuid>>>,
}

#[async_trait]
impl JobHandler for RecordingHandler {
    fn job_type(&self) -> JobType {
        JobType::custom("record")
    }

    async fn execute(&self, ctx: JobContext) -> JobResult {
        self.seen.lock().await.push(ctx.job_id());
        ctx.report_progress(40, Some("halfway")).await;
        JobResult::Success(Some(json!({"echo": ctx.payload().clone()})))
    }
}

struct FailingHandler;

#[async_trait]
impl JobHandler for FailingHandler {
    fn job_type(&self) -> JobType {
        JobType::custom("fail")
    }

    async fn execute(&self, _ctx: JobContext) -> JobResult {
        let err: anyhow::Result<JsonValue> =
            Err(anyhow::anyhow!("bad row 7").context("parse failed"));
        err.into()
    }
}

struct PanickingHandler;

#[async_trait]
impl JobHandler for PanickingHandler {
    fn job_type(&self) -> JobType {
        JobType::custom("panic")
    }

    async fn execute(&self, _ctx: JobContext) -> JobResult {
        panic!("handler blew up");
    }
}

/// Blocks until released, so a test can act while the job is RUNNING.
struct GatedHandler {
    started: Arc<Notify>,
    release: Arc<Notify>,
}

#[async_trait]
impl JobHandler for GatedHandler {
    fn job_type(&self) -> JobType {
        JobType::custom("gated")
    }

    async fn execute(&self, _ctx: JobContext) -> JobResult {
        self.started.notify_one();
        self.release.notified().await;
        JobResult::Success(Some(json!({"done": true})))
    }
}

/// Reads its own record mid-execution.
struct StatusCheckHandler {
    queue: JobQueue,
    observed: Arc<Mutex<Vec<JobStatus>>>,
}

#[async_trait]
impl JobHandler for StatusCheckHandler {
    fn job_type(&self) -> JobType {
        JobType::custom("lifecycle")
    }

    async fn execute(&self, ctx: JobContext) -> JobResult {
        if let Ok(Some(job)) = self.queue.get_status(ctx.job_id()).await {
            self.observed.lock().await.push(job.status);
        }
        JobResult::Success(None)
    }
}

// =============================================================================
// Helpers
// =============================================================================

fn memory_queue() -> JobQueue {
    JobQueue::new(Arc::new(MemoryJobStore::new()))
}

async fn dispatcher_with(queue: &JobQueue, recorder: &RecordingHandler) -> Dispatcher {
    DispatcherBuilder::new(queue.clone())
        .with_config(DispatcherConfig::default().with_poll_interval(10))
        .with_handler(recorder.clone())
        .with_handler(FailingHandler)
        .with_handler(PanickingHandler)
        .build()
        .await
}

async fn status_of(queue: &JobQueue, id: Uuid) -> JobStatus {
    queue.get_status(id).await.unwrap().unwrap().status
}

fn write_file(dir: &Path, name: &str, contents: &str) -> String {
    let path = dir.join(name);
    std::fs::write(&path, contents).unwrap();
    path.to_str().unwrap().to_string()
}

// =============================================================================
// Lifecycle
// =============================================================================

#[tokio::test]
async fn test_higher_priority_dispatched_first() {
    let queue = memory_queue();
    let recorder = RecordingHandler::default();
    let dispatcher = dispatcher_with(&queue, &recorder).await;

    let low = queue
        .submit(JobType::custom("record"), json!({"n": 1}), 1)
        .await
        .unwrap();
    let high = queue
        .submit(JobType::custom("record"), json!({"n": 5}), 5)
        .await
        .unwrap();

    assert_eq!(
        dispatcher.dispatch_next().await.unwrap(),
        DispatchOutcome::Completed(high)
    );
    assert_eq!(
        dispatcher.dispatch_next().await.unwrap(),
        DispatchOutcome::Completed(low)
    );
    assert_eq!(dispatcher.dispatch_next().await.unwrap(), DispatchOutcome::Idle);
    assert_eq!(*recorder.seen.lock().await, vec![high, low]);
}

#[tokio::test]
async fn test_successful_job_is_completed() {
    let queue = memory_queue();
    let recorder = RecordingHandler::default();
    let dispatcher = dispatcher_with(&queue, &recorder).await;

    let id = queue
        .submit(JobType::custom("record"), json!({"k": "v"}), 0)
        .await
        .unwrap();
    dispatcher.dispatch_next().await.unwrap();

    let job = queue.get_status(id).await.unwrap().unwrap();
    assert_eq!(job.status, JobStatus::Completed);
    assert_eq!(job.progress_percent, 100);
    assert_eq!(job.result, Some(json!({"echo": {"k": "v"}})));
    assert!(job.started_at.is_some());
    assert!(job.completed_at.is_some());
    assert!(job.error_message.is_none());
}

#[tokio::test]
async fn test_status_follows_lifecycle() {
    let queue = memory_queue();
    let observed = Arc::new(Mutex::new(Vec::new()));
    let dispatcher = DispatcherBuilder::new(queue.clone())
        .with_handler(StatusCheckHandler {
            queue: queue.clone(),
            observed: observed.clone(),
        })
        .build()
        .await;

    let id = queue
        .submit(JobType::custom("lifecycle"), json!({}), 0)
        .await
        .unwrap();
    let mut statuses = vec![status_of(&queue, id).await];
    dispatcher.dispatch_next().await.unwrap();
    statuses.extend(observed.lock().await.iter().copied());
    statuses.push(status_of(&queue, id).await);

    assert_eq!(
        statuses,
        vec![JobStatus::Pending, JobStatus::Running, JobStatus::Completed]
    );
    for pair in statuses.windows(2) {
        assert!(pair[0].can_transition_to(pair[1]), "{:?}", pair);
    }
    assert!(statuses[2].is_terminal());
}

#[tokio::test]
async fn test_cancelled_pending_job_never_runs() {
    let queue = memory_queue();
    let recorder = RecordingHandler::default();
    let dispatcher = dispatcher_with(&queue, &recorder).await;

    let id = queue
        .submit(JobType::custom("record"), json!({}), 0)
        .await
        .unwrap();
    assert!(queue.cancel(id).await.unwrap());

    assert_eq!(dispatcher.dispatch_next().await.unwrap(), DispatchOutcome::Idle);
    assert!(recorder.seen.lock().await.is_empty());
    assert_eq!(status_of(&queue, id).await, JobStatus::Cancelled);
}

#[tokio::test]
async fn test_stale_queue_entry_is_skipped() {
    let store = Arc::new(MemoryJobStore::new());
    let queue = JobQueue::new(store.clone());
    let recorder = RecordingHandler::default();
    let dispatcher = dispatcher_with(&queue, &recorder).await;

    // Record updated behind the queue's back; the id stays enqueued.
    let id = queue
        .submit(JobType::custom("record"), json!({}), 0)
        .await
        .unwrap();
    datacat_jobs::JobStore::update(
        store.as_ref(),
        id,
        &datacat_jobs::JobPatch::failed(chrono::Utc::now(), "stale", None),
    )
    .await
    .unwrap();

    assert_eq!(
        dispatcher.dispatch_next().await.unwrap(),
        DispatchOutcome::Skipped(id)
    );
    assert!(recorder.seen.lock().await.is_empty());
}

#[tokio::test]
async fn test_failing_handler_marks_failed() {
    let queue = memory_queue();
    let dispatcher = dispatcher_with(&queue, &RecordingHandler::default()).await;

    let id = queue
        .submit(JobType::custom("fail"), json!({}), 0)
        .await
        .unwrap();
    assert_eq!(
        dispatcher.dispatch_next().await.unwrap(),
        DispatchOutcome::Failed(id)
    );

    let job = queue.get_status(id).await.unwrap().unwrap();
    assert_eq!(job.status, JobStatus::Failed);
    assert_eq!(job.error_message.as_deref(), Some("parse failed: bad row 7"));
    assert!(job.error_trace.is_some());
    assert!(job.completed_at.is_some());
    assert!(job.result.is_none());
}

#[tokio::test]
async fn test_unknown_job_type_marks_failed() {
    let queue = memory_queue();
    let dispatcher = dispatcher_with(&queue, &RecordingHandler::default()).await;

    let id = queue
        .submit(JobType::custom("reindex"), json!({}), 0)
        .await
        .unwrap();
    assert_eq!(
        dispatcher.dispatch_next().await.unwrap(),
        DispatchOutcome::Failed(id)
    );

    let job = queue.get_status(id).await.unwrap().unwrap();
    assert_eq!(job.status, JobStatus::Failed);
    assert_eq!(
        job.error_message.as_deref(),
        Some("No handler registered for job type: reindex")
    );
    let trace = job.error_trace.expect("failure trace");
    assert!(trace.contains("HandlerNotFound"));
    assert!(trace.contains("registered job types: [fail, panic, record]"), "{}", trace);
}

#[tokio::test]
async fn test_panicking_handler_marks_failed_and_loop_survives() {
    let queue = memory_queue();
    let recorder = RecordingHandler::default();
    let dispatcher = dispatcher_with(&queue, &recorder).await;

    let bad = queue
        .submit(JobType::custom("panic"), json!({}), 5)
        .await
        .unwrap();
    let good = queue
        .submit(JobType::custom("record"), json!({}), 1)
        .await
        .unwrap();

    assert_eq!(
        dispatcher.dispatch_next().await.unwrap(),
        DispatchOutcome::Failed(bad)
    );
    let job = queue.get_status(bad).await.unwrap().unwrap();
    assert!(job
        .error_message
        .unwrap()
        .starts_with("Handler panicked"));
    assert!(job.error_trace.unwrap().contains("handler blew up"));

    assert_eq!(
        dispatcher.dispatch_next().await.unwrap(),
        DispatchOutcome::Completed(good)
    );
}

#[tokio::test]
async fn test_cancel_running_job_is_overwritten_on_completion() {
    let queue = memory_queue();
    let started = Arc::new(Notify::new());
    let release = Arc::new(Notify::new());
    let dispatcher = Arc::new(
        DispatcherBuilder::new(queue.clone())
            .with_handler(GatedHandler {
                started: started.clone(),
                release: release.clone(),
            })
            .build()
            .await,
    );

    let id = queue
        .submit(JobType::custom("gated"), json!({}), 0)
        .await
        .unwrap();

    let running = dispatcher.clone();
    let task = tokio::spawn(async move { running.dispatch_next().await });
    started.notified().await;

    assert_eq!(status_of(&queue, id).await, JobStatus::Running);
    assert!(queue.cancel(id).await.unwrap());
    assert_eq!(status_of(&queue, id).await, JobStatus::Cancelled);

    release.notify_one();
    assert_eq!(
        task.await.unwrap().unwrap(),
        DispatchOutcome::Completed(id)
    );

    // The handler's terminal write replaces the cancellation marker.
    let job = queue.get_status(id).await.unwrap().unwrap();
    assert_eq!(job.status, JobStatus::Completed);
    assert_eq!(job.result, Some(json!({"done": true})));
}

#[tokio::test]
async fn test_queue_stats_after_processing() {
    let queue = memory_queue();
    let dispatcher = dispatcher_with(&queue, &RecordingHandler::default()).await;

    for priority in [3, 2, 1] {
        queue
            .submit(JobType::custom("record"), json!({}), priority)
            .await
            .unwrap();
    }
    dispatcher.dispatch_next().await.unwrap();

    let stats = queue.queue_stats().await.unwrap();
    assert_eq!(stats.queue_length, 2);
    assert_eq!(stats.total_jobs, 3);
    assert_eq!(stats.status_counts.pending, 2);
    assert_eq!(stats.status_counts.completed, 1);
    assert_eq!(stats.status_counts.running, 0);
}

#[tokio::test]
async fn test_progress_events_and_store() {
    let queue = memory_queue();
    let dispatcher = dispatcher_with(&queue, &RecordingHandler::default()).await;
    let mut events = dispatcher.events();

    let id = queue
        .submit(JobType::custom("record"), json!({}), 0)
        .await
        .unwrap();
    dispatcher.dispatch_next().await.unwrap();

    let mut seen = Vec::new();
    while let Ok(event) = events.try_recv() {
        seen.push(event);
    }
    assert_eq!(
        seen,
        vec![
            DispatcherEvent::JobStarted {
                job_id: id,
                job_type: JobType::custom("record")
            },
            DispatcherEvent::JobProgress {
                job_id: id,
                percent: 40,
                message: Some("halfway".to_string())
            },
            DispatcherEvent::JobCompleted {
                job_id: id,
                job_type: JobType::custom("record")
            },
        ]
    );

    // Completion overrides the last progress checkpoint but keeps its message.
    let job = queue.get_status(id).await.unwrap().unwrap();
    assert_eq!(job.progress_percent, 100);
    assert_eq!(job.progress_message.as_deref(), Some("halfway"));
}

#[tokio::test]
async fn test_dispatcher_loop_start_and_shutdown() {
    let queue = memory_queue();
    let recorder = RecordingHandler::default();
    let handle = dispatcher_with(&queue, &recorder).await.start();
    let mut events = handle.events();

    let id = queue
        .submit(JobType::custom("record"), json!({}), 0)
        .await
        .unwrap();

    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            match events.recv().await {
                Ok(DispatcherEvent::JobCompleted { job_id, .. }) if job_id == id => break,
                Ok(_) => continue,
                Err(e) => panic!("event stream ended: {}", e),
            }
        }
    })
    .await
    .expect("job should complete");

    let mut events = handle.events();
    handle.shutdown().await.unwrap();

    let mut stopped = false;
    while let Ok(event) = events.recv().await {
        if event == DispatcherEvent::DispatcherStopped {
            stopped = true;
        }
    }
    assert!(stopped);
    assert_eq!(status_of(&queue, id).await, JobStatus::Completed);
}

// =============================================================================
// Retention
// =============================================================================

#[tokio::test]
async fn test_sweeper_deletes_only_old_terminal_jobs() {
    let store = Arc::new(MemoryJobStore::new());
    let queue = JobQueue::new(store.clone());
    let dispatcher = dispatcher_with(&queue, &RecordingHandler::default()).await;

    let done = queue
        .submit(JobType::custom("record"), json!({}), 9)
        .await
        .unwrap();
    dispatcher.dispatch_next().await.unwrap();
    let pending = queue
        .submit(JobType::custom("record"), json!({}), 0)
        .await
        .unwrap();

    let sweeper = RetentionSweeper::new(store, SweeperConfig::default());
    assert_eq!(sweeper.sweep().await.unwrap(), 0);

    let tomorrow = chrono::Utc::now() + chrono::Duration::hours(25);
    assert_eq!(sweeper.sweep_at(tomorrow).await.unwrap(), 1);
    assert!(queue.get_status(done).await.unwrap().is_none());
    assert_eq!(status_of(&queue, pending).await, JobStatus::Pending);
}

/// In-memory store with one record that fails to decode.
struct UnreadableRecordStore {
    inner: MemoryJobStore,
    unreadable: Uuid,
}

#[async_trait]
impl JobStore for UnreadableRecordStore {
    async fn create(&self, job: &Job) -> Result<()> {
        self.inner.create(job).await
    }

    async fn get(&self, id: Uuid) -> Result<Option<Job>> {
        if id == self.unreadable {
            return Err(Error::Store(format!("job {} has no status field", id)));
        }
        self.inner.get(id).await
    }

    async fn update(&self, id: Uuid, patch: &JobPatch) -> Result<()> {
        self.inner.update(id, patch).await
    }

    async fn delete(&self, id: Uuid) -> Result<bool> {
        self.inner.delete(id).await
    }

    async fn exists(&self, id: Uuid) -> Result<bool> {
        self.inner.exists(id).await
    }

    async fn list_ids(&self) -> Result<Vec<Uuid>> {
        self.inner.list_ids().await
    }

    async fn pop_highest(&self) -> Result<Option<Uuid>> {
        self.inner.pop_highest().await
    }

    async fn dequeue(&self, id: Uuid) -> Result<bool> {
        self.inner.dequeue(id).await
    }

    async fn queue_len(&self) -> Result<i64> {
        self.inner.queue_len().await
    }
}

#[tokio::test]
async fn test_unreadable_record_is_skipped_by_stats_and_sweep() {
    let now = chrono::Utc::now();
    let mut expired = Job::new(JobType::custom("record"), json!({}), 0);
    expired.apply(&JobPatch {
        status: Some(JobStatus::Cancelled),
        completed_at: Some(now - chrono::Duration::hours(48)),
        ..Default::default()
    });
    let broken = Job::new(JobType::custom("record"), json!({}), 0);

    let inner = MemoryJobStore::new();
    inner.put(expired.clone()).await;
    inner.put(broken.clone()).await;
    let store = Arc::new(UnreadableRecordStore {
        inner,
        unreadable: broken.id,
    });

    let stats = JobQueue::new(store.clone()).queue_stats().await.unwrap();
    assert_eq!(stats.total_jobs, 2);
    assert_eq!(stats.status_counts.cancelled, 1);
    assert_eq!(stats.status_counts.pending, 0);

    let sweeper = RetentionSweeper::new(store.clone(), SweeperConfig::default());
    assert_eq!(sweeper.sweep_at(now).await.unwrap(), 1);
    assert!(!store.inner.exists(expired.id).await.unwrap());
    assert!(store.inner.exists(broken.id).await.unwrap());
}

// =============================================================================
// Dataset handlers
// =============================================================================

async fn dataset_dispatcher(queue: &JobQueue, catalog: Arc<MemoryCatalog>) -> Dispatcher {
    let processor = DatasetProcessor::new(catalog);
    DispatcherBuilder::new(queue.clone())
        .with_handler(ProcessDatasetHandler::new(processor.clone()))
        .with_handler(ProcessDatasetUrlHandler::new(processor, reqwest::Client::new()))
        .build()
        .await
}

#[tokio::test]
async fn test_process_dataset_file_end_to_end() {
    let dir = tempfile::tempdir().unwrap();
    let file_path = write_file(
        dir.path(),
        "upload-8f2c.csv",
        "VendorID,pickup,fare\n1,2023-01-01 00:10:00,9.5\n2,2023-01-01 00:20:00,\n",
    );

    let queue = memory_queue();
    let catalog = Arc::new(MemoryCatalog::new());
    let dispatcher = dataset_dispatcher(&queue, catalog.clone()).await;

    let id = queue
        .submit(
            JobType::ProcessDataset,
            json!({"file_path": file_path, "original_filename": "yellow_trips.csv"}),
            defaults::DATASET_JOB_PRIORITY,
        )
        .await
        .unwrap();
    assert_eq!(
        dispatcher.dispatch_next().await.unwrap(),
        DispatchOutcome::Completed(id)
    );

    let job = queue.get_status(id).await.unwrap().unwrap();
    let result = job.result.unwrap();
    assert_eq!(result["status"], "success");
    assert_eq!(result["rows_processed"], 2);
    assert_eq!(result["columns_analyzed"], 3);
    assert_eq!(result["metadata"]["schema_name"], "nyc_taxi");
    assert_eq!(result["metadata"]["table_name"], "yellow_trips");
    assert_eq!(job.progress_message.as_deref(), Some("Processing complete"));

    assert!(!Path::new(&file_path).exists(), "upload should be removed");

    let stored = catalog
        .get_profile("nyc_taxi", "yellow_trips")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(result["table_id"], stored.table.id.to_string());
    let names: Vec<_> = stored.columns.iter().map(|c| c.column_name.as_str()).collect();
    assert_eq!(names, vec!["VendorID", "pickup", "fare"]);
    assert_eq!(stored.columns[2].null_count, 1);
}

#[tokio::test]
async fn test_reprofiling_replaces_columns() {
    let dir = tempfile::tempdir().unwrap();
    let queue = memory_queue();
    let catalog = Arc::new(MemoryCatalog::new());
    let dispatcher = dataset_dispatcher(&queue, catalog.clone()).await;

    let first = write_file(dir.path(), "a.csv", "a,b,c\n1,2,3\n");
    let second = write_file(dir.path(), "b.csv", "a,b\n1,2\n3,4\n5,6\n");

    let mut table_ids = Vec::new();
    for file_path in [first, second] {
        let id = queue
            .submit(
                JobType::ProcessDataset,
                json!({"file_path": file_path, "schema_name": "staging", "table_name": "trips"}),
                1,
            )
            .await
            .unwrap();
        dispatcher.dispatch_next().await.unwrap();
        let result = queue.get_status(id).await.unwrap().unwrap().result.unwrap();
        table_ids.push(result["table_id"].clone());
    }

    assert_eq!(table_ids[0], table_ids[1]);
    assert_eq!(catalog.table_count().await, 1);
    let stored = catalog.get_profile("staging", "trips").await.unwrap().unwrap();
    assert_eq!(stored.table.row_count, 3);
    assert_eq!(stored.columns.len(), 2);
}

#[tokio::test]
async fn test_process_dataset_failures_remove_file() {
    let dir = tempfile::tempdir().unwrap();
    let file_path = write_file(dir.path(), "report.xlsx", "not really a spreadsheet");

    let queue = memory_queue();
    let dispatcher = dataset_dispatcher(&queue, Arc::new(MemoryCatalog::new())).await;

    let id = queue
        .submit(JobType::ProcessDataset, json!({"file_path": file_path}), 1)
        .await
        .unwrap();
    assert_eq!(
        dispatcher.dispatch_next().await.unwrap(),
        DispatchOutcome::Failed(id)
    );

    let job = queue.get_status(id).await.unwrap().unwrap();
    assert!(job
        .error_message
        .unwrap()
        .contains("Unsupported file format: .xlsx"));
    assert!(!Path::new(&file_path).exists());

    let bad = queue
        .submit(JobType::ProcessDataset, json!({"path": "/tmp/x.csv"}), 1)
        .await
        .unwrap();
    dispatcher.dispatch_next().await.unwrap();
    let job = queue.get_status(bad).await.unwrap().unwrap();
    assert_eq!(job.status, JobStatus::Failed);
    assert!(job.error_message.unwrap().starts_with("Invalid payload"));
    assert!(job.error_trace.is_some());
}

#[tokio::test]
async fn test_process_dataset_invalid_payload_removes_file() {
    let dir = tempfile::tempdir().unwrap();
    let file_path = write_file(dir.path(), "trips.csv", "id\n1\n");

    let queue = memory_queue();
    let dispatcher = dataset_dispatcher(&queue, Arc::new(MemoryCatalog::new())).await;

    let id = queue
        .submit(
            JobType::ProcessDataset,
            json!({"file_path": file_path, "schema_name": 5}),
            1,
        )
        .await
        .unwrap();
    assert_eq!(
        dispatcher.dispatch_next().await.unwrap(),
        DispatchOutcome::Failed(id)
    );

    let job = queue.get_status(id).await.unwrap().unwrap();
    assert!(job.error_message.unwrap().starts_with("Invalid payload"));
    assert!(job.error_trace.is_some());
    assert!(!Path::new(&file_path).exists());
}

#[tokio::test]
async fn test_process_dataset_url_end_to_end() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/exports/green_trips.tsv"))
        .respond_with(ResponseTemplate::new(200).set_body_string("id\tzone\n1\tQueens\n2\tBronx\n"))
        .expect(1)
        .mount(&server)
        .await;

    let download_dir = tempfile::tempdir().unwrap();
    let queue = memory_queue();
    let catalog = Arc::new(MemoryCatalog::new());
    let processor = DatasetProcessor::new(catalog.clone());
    let dispatcher = DispatcherBuilder::new(queue.clone())
        .with_handler(
            ProcessDatasetUrlHandler::new(processor, reqwest::Client::new())
                .with_download_dir(download_dir.path()),
        )
        .build()
        .await;

    let id = queue
        .submit(
            JobType::ProcessDatasetUrl,
            json!({"url": format!("{}/exports/green_trips.tsv", server.uri())}),
            1,
        )
        .await
        .unwrap();
    assert_eq!(
        dispatcher.dispatch_next().await.unwrap(),
        DispatchOutcome::Completed(id)
    );

    let stored = catalog
        .get_profile("nyc_taxi", "green_trips")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.table.row_count, 2);
    assert_eq!(stored.columns.len(), 2);
    assert_eq!(
        std::fs::read_dir(download_dir.path()).unwrap().count(),
        0,
        "download should be removed"
    );
}

#[tokio::test]
async fn test_process_dataset_url_http_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/gone.csv"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let queue = memory_queue();
    let dispatcher = dataset_dispatcher(&queue, Arc::new(MemoryCatalog::new())).await;

    let id = queue
        .submit(
            JobType::ProcessDatasetUrl,
            json!({"url": format!("{}/gone.csv", server.uri()), "schema_name": "raw"}),
            1,
        )
        .await
        .unwrap();
    assert_eq!(
        dispatcher.dispatch_next().await.unwrap(),
        DispatchOutcome::Failed(id)
    );

    let job = queue.get_status(id).await.unwrap().unwrap();
    assert_eq!(job.error_message.as_deref(), Some("HTTP 404 Not Found"));
    assert_eq!(job.progress_percent, 10);
}
