//! 요청 생성기.
//!
//! [`RequestKind`]에 공통 필드(앱 키, 디바이스 ID, 타임스탬프, 디멘션)를 채워
//! 페이로드를 만들고, 큐에 적재한 뒤 업로더를 깨운다.
//! 디바이스 ID가 아직 없으면 플레이스홀더가 들어간다.

use std::sync::Arc;
use tally_core::error::CoreError;
use tally_core::models::device::DeviceIdentity;
use tally_core::models::request::{RequestContext, RequestKind};
use tally_core::ports::clock::Clock;
use tally_core::ports::storage::RequestQueue;
use tally_network::uploader::Uploader;
use tracing::debug;

use crate::dimensions::Dimensions;

/// 요청 생성기
pub struct RequestBuilder {
    queue: Arc<dyn RequestQueue>,
    uploader: Uploader,
    device: Arc<DeviceIdentity>,
    dimensions: Arc<Dimensions>,
    clock: Arc<dyn Clock>,
    app_key: String,
    sdk_version: String,
}

impl RequestBuilder {
    pub fn new(
        queue: Arc<dyn RequestQueue>,
        uploader: Uploader,
        device: Arc<DeviceIdentity>,
        dimensions: Arc<Dimensions>,
        clock: Arc<dyn Clock>,
        app_key: impl Into<String>,
        sdk_version: impl Into<String>,
    ) -> Self {
        Self {
            queue,
            uploader,
            device,
            dimensions,
            clock,
            app_key: app_key.into(),
            sdk_version: sdk_version.into(),
        }
    }

    /// 페이로드 생성 (적재 안함)
    pub fn build(&self, kind: &RequestKind) -> Result<String, CoreError> {
        let device_id = self.device.query_value();
        let dimensions = self.dimensions.snapshot();
        kind.to_query(&RequestContext {
            app_key: &self.app_key,
            device_id: &device_id,
            timestamp: self.clock.now_timestamp(),
            sdk_version: &self.sdk_version,
            dimensions: &dimensions,
        })
    }

    /// 생성 → 큐 적재 → 업로더 깨우기
    pub fn submit(&self, kind: RequestKind) -> Result<(), CoreError> {
        let payload = self.build(&kind)?;
        self.queue.enqueue_request(&payload)?;
        debug!("요청 적재: {}", kind.name());
        self.uploader.wake();
        Ok(())
    }

    pub fn begin_session(&self, metrics: &str) -> Result<(), CoreError> {
        self.submit(RequestKind::BeginSession {
            metrics: metrics.to_string(),
        })
    }

    pub fn update_session(&self, duration_secs: u64) -> Result<(), CoreError> {
        self.submit(RequestKind::UpdateSession { duration_secs })
    }

    pub fn end_session(&self, duration_secs: u64) -> Result<(), CoreError> {
        self.submit(RequestKind::EndSession { duration_secs })
    }

    pub fn token_session(&self, token: &str, locale: &str) -> Result<(), CoreError> {
        self.submit(RequestKind::TokenSession {
            token: token.to_string(),
            locale: locale.to_string(),
        })
    }

    /// `events`는 인코딩이 끝난 `events=` 값
    pub fn events(&self, events: String) -> Result<(), CoreError> {
        self.submit(RequestKind::Events { events })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::Fixture;

    fn builder(fx: &Fixture) -> RequestBuilder {
        let dimensions = Arc::new(Dimensions::load(fx.storage.clone()).unwrap());
        RequestBuilder::new(
            fx.storage.clone(),
            fx.uploader.clone(),
            fx.device.clone(),
            dimensions,
            fx.clock.clone(),
            "app key",
            "2.0",
        )
    }

    #[tokio::test]
    async fn unresolved_device_gets_placeholder() {
        let fx = Fixture::new();
        let builder = builder(&fx);

        builder.update_session(60).unwrap();
        builder.end_session(5).unwrap();

        let queued = fx.take_queued();
        assert_eq!(
            queued,
            vec![
                "app_key=app+key&device_id=REPLACE_UDID&timestamp=1000&session_duration=60",
                "app_key=app+key&device_id=REPLACE_UDID&timestamp=1000&end_session=1&session_duration=5",
            ]
        );
    }

    #[tokio::test]
    async fn resolved_device_is_written_directly() {
        let fx = Fixture::new();
        fx.device.resolve("dev/1").unwrap();
        let builder = builder(&fx);

        let payload = builder
            .build(&RequestKind::UpdateSession { duration_secs: 1 })
            .unwrap();
        assert!(payload.starts_with("app_key=app+key&device_id=dev%2F1&timestamp=1000"));
    }

    #[tokio::test]
    async fn dimensions_follow_latest_state() {
        let fx = Fixture::new();
        let dimensions = Arc::new(Dimensions::load(fx.storage.clone()).unwrap());
        let builder = RequestBuilder::new(
            fx.storage.clone(),
            fx.uploader.clone(),
            fx.device.clone(),
            dimensions.clone(),
            fx.clock.clone(),
            "k",
            "2.0",
        );

        let before = builder
            .build(&RequestKind::UpdateSession { duration_secs: 1 })
            .unwrap();
        assert!(!before.contains("dimensions="));

        dimensions.add("push", "true").unwrap();
        let after = builder
            .build(&RequestKind::UpdateSession { duration_secs: 1 })
            .unwrap();
        assert!(after.contains("dimensions=%7B%22push%22%3A%22true%22%7D"));
    }

    #[tokio::test]
    async fn submit_wakes_uploader() {
        let fx = Fixture::new();
        fx.device.resolve("dev-1").unwrap();
        let builder = builder(&fx);

        builder.begin_session("%7B%7D").unwrap();
        fx.uploader.wait_idle().await;

        let sent = fx.collector.sent.lock().clone();
        assert_eq!(sent.len(), 1);
        assert!(sent[0].contains("&begin_session=1&metrics=%7B%7D"));
        assert!(fx.storage.is_request_queue_empty().unwrap());
    }
}
