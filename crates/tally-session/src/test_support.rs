//! 세션 테스트 공용 픽스처.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tally_core::error::CoreError;
use tally_core::models::device::DeviceIdentity;
use tally_core::models::event::EventSet;
use tally_core::models::request::PendingRequest;
use tally_core::ports::clock::ManualClock;
use tally_core::ports::collector::Collector;
use tally_core::ports::storage::{EventStore, PreferenceStore, RequestQueue};
use tally_network::uploader::Uploader;
use tally_storage::sqlite::SqliteStorage;

/// 전송된 쿼리를 기록하는 수집기
#[derive(Default)]
pub struct RecordingCollector {
    pub sent: Mutex<Vec<String>>,
}

#[async_trait]
impl Collector for RecordingCollector {
    async fn send(&self, query: &str) -> Result<(), CoreError> {
        self.sent.lock().push(query.to_string());
        Ok(())
    }
}

/// 적재 실패를 켜고 끌 수 있는 저장소
pub struct FlakyStorage {
    pub inner: Arc<SqliteStorage>,
    fail_enqueue: AtomicBool,
}

impl FlakyStorage {
    pub fn new(inner: Arc<SqliteStorage>) -> Self {
        Self {
            inner,
            fail_enqueue: AtomicBool::new(false),
        }
    }

    pub fn set_fail_enqueue(&self, fail: bool) {
        self.fail_enqueue.store(fail, Ordering::SeqCst);
    }
}

impl RequestQueue for FlakyStorage {
    fn enqueue_request(&self, payload: &str) -> Result<(), CoreError> {
        if self.fail_enqueue.load(Ordering::SeqCst) {
            return Err(CoreError::Storage("디스크 가득 참".to_string()));
        }
        self.inner.enqueue_request(payload)
    }

    fn peek_next_request(&self) -> Result<Option<PendingRequest>, CoreError> {
        self.inner.peek_next_request()
    }

    fn dequeue_request(&self, id: i64) -> Result<(), CoreError> {
        self.inner.dequeue_request(id)
    }

    fn is_request_queue_empty(&self) -> Result<bool, CoreError> {
        self.inner.is_request_queue_empty()
    }

    fn request_queue_len(&self) -> Result<usize, CoreError> {
        self.inner.request_queue_len()
    }
}

impl EventStore for FlakyStorage {
    fn load_aggregated_events(&self) -> Result<EventSet, CoreError> {
        self.inner.load_aggregated_events()
    }

    fn save_aggregated_events(&self, events: &EventSet) -> Result<(), CoreError> {
        self.inner.save_aggregated_events(events)
    }

    fn clear_aggregated_events(&self) -> Result<(), CoreError> {
        self.inner.clear_aggregated_events()
    }
}

impl PreferenceStore for FlakyStorage {
    fn get_preference(&self, key: &str) -> Result<Option<String>, CoreError> {
        self.inner.get_preference(key)
    }

    fn set_preference(&self, key: &str, value: &str) -> Result<(), CoreError> {
        self.inner.set_preference(key, value)
    }
}

pub struct Fixture {
    pub storage: Arc<SqliteStorage>,
    pub collector: Arc<RecordingCollector>,
    pub device: Arc<DeviceIdentity>,
    pub clock: Arc<ManualClock>,
    pub uploader: Uploader,
}

impl Fixture {
    /// 디바이스 ID 미확정 상태의 픽스처 (업로더는 플레이스홀더에서 멈춘다)
    pub fn new() -> Self {
        let storage = Arc::new(SqliteStorage::open_in_memory().unwrap());
        let collector = Arc::new(RecordingCollector::default());
        let device = Arc::new(DeviceIdentity::new());
        let uploader = Uploader::new(storage.clone(), collector.clone(), device.clone()).unwrap();
        Self {
            storage,
            collector,
            device,
            clock: Arc::new(ManualClock::new(1_000.0)),
            uploader,
        }
    }

    /// 큐를 비우며 페이로드를 오래된 순으로 반환
    pub fn take_queued(&self) -> Vec<String> {
        let mut out = Vec::new();
        while let Some(req) = self.storage.peek_next_request().unwrap() {
            self.storage.dequeue_request(req.id).unwrap();
            out.push(req.payload);
        }
        out
    }
}
