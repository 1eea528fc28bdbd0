//! 세션 오케스트레이터.
//!
//! 포그라운드 진입/이탈 카운트로 세션 경계를 정한다.
//!
//! - 카운트 0→1: 세션 시작 (`begin_session`)
//! - 카운트 1→0: 대기 이벤트 배출 후 세션 종료 (`end_session`)
//! - 하트비트: 세션 중에만 `session_duration` 보고 후 대기 이벤트 배출
//!
//! 보고하는 시간은 정수 초다. 잘라낸 소수부는 다음 측정 구간에 더해진다.

use parking_lot::Mutex;
use std::sync::Arc;
use tally_core::config::AgentConfig;
use tally_core::error::CoreError;
use tally_core::models::device::{DeviceIdentity, DeviceMetrics};
use tally_core::models::event::Segmentation;
use tally_core::models::push::{PUSH_ACTION_EVENT, PUSH_ID_SEGMENT, PUSH_OPEN_EVENT};
use tally_core::ports::clock::Clock;
use tally_core::ports::storage::{EventStore, PreferenceStore, RequestQueue};
use tally_network::uploader::Uploader;
use tracing::{debug, info, warn};

use crate::aggregator::EventAggregator;
use crate::dimensions::{Dimensions, PUSH_DIMENSION};
use crate::push_registry::PushRegistry;
use crate::request_builder::RequestBuilder;

/// 호스트가 제공하는 세션 파라미터
#[derive(Debug, Clone)]
pub struct SessionOptions {
    pub app_key: String,
    pub sdk_version: String,
    /// 인코딩이 끝난 디바이스 메트릭 (`metrics=` 값)
    pub metrics: String,
    pub locale: String,
    /// 푸시 토큰 캐시의 기준 버전
    pub app_version: String,
    pub event_flush_threshold: usize,
}

impl SessionOptions {
    pub fn from_config(config: &AgentConfig, metrics: &DeviceMetrics) -> Result<Self, CoreError> {
        Ok(Self {
            app_key: config.server.app_key.clone(),
            sdk_version: config.session.sdk_version.clone(),
            metrics: metrics.to_query_value()?,
            locale: metrics.locale.clone(),
            app_version: metrics.app_version.clone(),
            event_flush_threshold: config.session.event_flush_threshold,
        })
    }
}

#[derive(Debug, Default)]
struct SessionState {
    active: bool,
    activity_count: u32,
    /// 마지막 측정 시각 (epoch 초, 소수 포함)
    last_time: f64,
    /// 아직 보고하지 않은 소수부 초
    unsent_secs: f64,
}

/// 보고 전 측정값. 요청 적재에 성공한 뒤에만 [`SessionState::commit`]으로 반영한다.
#[derive(Debug, Clone, Copy)]
struct Measurement {
    now: f64,
    whole_secs: u64,
    remainder: f64,
}

impl SessionState {
    /// 마지막 측정 이후 경과한 정수 초와 이월할 소수부
    fn measure(&self, now: f64) -> Measurement {
        let elapsed = (now - self.last_time).max(0.0) + self.unsent_secs;
        let whole = elapsed.floor();
        Measurement {
            now,
            whole_secs: whole as u64,
            remainder: elapsed - whole,
        }
    }

    fn commit(&mut self, measurement: Measurement) {
        self.last_time = measurement.now;
        self.unsent_secs = measurement.remainder;
    }
}

/// 세션 오케스트레이터
pub struct SessionOrchestrator {
    builder: RequestBuilder,
    aggregator: EventAggregator,
    dimensions: Arc<Dimensions>,
    push: PushRegistry,
    device: Arc<DeviceIdentity>,
    uploader: Uploader,
    clock: Arc<dyn Clock>,
    options: SessionOptions,
    state: Mutex<SessionState>,
}

impl SessionOrchestrator {
    /// 저장소 하나로 큐/집계 이벤트/환경설정을 모두 처리하는 경우의 생성자
    pub fn new<S>(
        storage: Arc<S>,
        uploader: Uploader,
        device: Arc<DeviceIdentity>,
        clock: Arc<dyn Clock>,
        options: SessionOptions,
    ) -> Result<Self, CoreError>
    where
        S: RequestQueue + EventStore + PreferenceStore + 'static,
    {
        if options.event_flush_threshold == 0 {
            return Err(CoreError::Config(
                "event_flush_threshold는 1 이상이어야 함".to_string(),
            ));
        }

        let dimensions = Arc::new(Dimensions::load(storage.clone())?);
        let push = PushRegistry::new(storage.clone());
        let aggregator = EventAggregator::load(storage.clone(), clock.clone())?;
        let builder = RequestBuilder::new(
            storage,
            uploader.clone(),
            device.clone(),
            dimensions.clone(),
            clock.clone(),
            options.app_key.clone(),
            options.sdk_version.clone(),
        );

        Ok(Self {
            builder,
            aggregator,
            dimensions,
            push,
            device,
            uploader,
            clock,
            options,
            state: Mutex::new(SessionState::default()),
        })
    }

    /// 포그라운드 진입
    pub fn on_start(&self) -> Result<(), CoreError> {
        let mut state = self.state.lock();
        state.activity_count += 1;
        if state.activity_count == 1 {
            if let Err(e) = self.begin_session(&mut state) {
                state.activity_count -= 1;
                return Err(e);
            }
        }
        Ok(())
    }

    /// 포그라운드 이탈
    pub fn on_stop(&self) -> Result<(), CoreError> {
        let mut state = self.state.lock();
        if state.activity_count == 0 {
            warn!("on_start 없이 on_stop 호출됨, 무시");
            return Ok(());
        }
        state.activity_count -= 1;
        if state.activity_count == 0 {
            if let Err(e) = self.end_session(&mut state) {
                state.activity_count += 1;
                return Err(e);
            }
        }
        Ok(())
    }

    /// 주기 하트비트. 세션 중이 아니면 아무것도 하지 않는다.
    pub fn on_heartbeat(&self) -> Result<(), CoreError> {
        let mut state = self.state.lock();
        if !state.active {
            return Ok(());
        }
        let measurement = state.measure(self.clock.now_secs());
        self.builder.update_session(measurement.whole_secs)?;
        state.commit(measurement);
        drop(state);

        self.flush_events()?;
        Ok(())
    }

    fn begin_session(&self, state: &mut SessionState) -> Result<(), CoreError> {
        let now = self.clock.now_secs();
        self.builder.begin_session(&self.options.metrics)?;
        state.last_time = now;
        state.unsent_secs = 0.0;
        state.active = true;
        info!("세션 시작");
        Ok(())
    }

    fn end_session(&self, state: &mut SessionState) -> Result<(), CoreError> {
        self.flush_events()?;
        let measurement = state.measure(self.clock.now_secs());
        self.builder.end_session(measurement.whole_secs)?;
        state.commit(measurement);
        state.active = false;
        info!("세션 종료: {}초", measurement.whole_secs);
        Ok(())
    }

    /// 이벤트 기록. 대기 이벤트가 임계값에 도달하면 즉시 배출한다.
    pub fn record_event(
        &self,
        key: &str,
        segmentation: Option<Segmentation>,
        count: u32,
        sum: Option<f64>,
    ) -> Result<(), CoreError> {
        let pending = self
            .aggregator
            .record_event(key, segmentation, count, sum)?;
        if pending >= self.options.event_flush_threshold {
            debug!("대기 이벤트 {pending}건, 배출");
            self.flush_events()?;
        }
        Ok(())
    }

    /// 푸시 메시지 열람
    pub fn record_message_open(&self, message_id: &str) -> Result<(), CoreError> {
        self.record_push_event(PUSH_OPEN_EVENT, message_id)
    }

    /// 푸시 메시지 액션 수행
    pub fn record_message_action(&self, message_id: &str) -> Result<(), CoreError> {
        self.record_push_event(PUSH_ACTION_EVENT, message_id)
    }

    fn record_push_event(&self, key: &str, message_id: &str) -> Result<(), CoreError> {
        if message_id.is_empty() {
            return Err(CoreError::validation("message_id", "빈 메시지 ID"));
        }
        let mut segmentation = Segmentation::new();
        segmentation.insert(PUSH_ID_SEGMENT.to_string(), message_id.to_string());
        self.record_event(key, Some(segmentation), 1, None)
    }

    /// 대기 이벤트를 이벤트 배치 요청으로 적재. 적재했으면 `true`.
    pub fn flush_events(&self) -> Result<bool, CoreError> {
        self.aggregator
            .drain_with(|events| self.builder.events(events))
    }

    /// 푸시 토큰 수신. `push=true` 디멘션을 먼저 기록하고 등록 요청을 적재한 뒤
    /// 현재 앱 버전 기준으로 토큰을 캐시한다.
    pub fn on_push_token(&self, token: &str) -> Result<(), CoreError> {
        if token.is_empty() {
            return Err(CoreError::validation("token", "빈 푸시 토큰"));
        }
        self.dimensions.add(PUSH_DIMENSION, "true")?;
        self.builder.token_session(token, &self.options.locale)?;
        self.push.store_token(token, &self.options.app_version)?;
        info!("푸시 토큰 등록 요청 적재");
        Ok(())
    }

    /// 같은 앱 버전에서 받아 둔 토큰이 있으면 다시 등록한다. 등록했으면 `true`.
    pub fn replay_cached_push_token(&self) -> Result<bool, CoreError> {
        match self.push.cached_token(&self.options.app_version)? {
            Some(token) => {
                debug!("캐시된 푸시 토큰 재등록");
                self.on_push_token(&token)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// 디바이스 ID 확정. 플레이스홀더에서 멈춘 요청이 흐르도록 업로더를 깨운다.
    pub fn on_device_id_resolved(&self, device_id: &str) -> Result<bool, CoreError> {
        let first = self.device.resolve(device_id)?;
        if first {
            info!("디바이스 ID 확정");
        } else {
            debug!("디바이스 ID 이미 확정됨, 무시");
        }
        self.uploader.wake();
        Ok(first)
    }

    /// 디멘션 추가
    pub fn add_dimension(&self, key: &str, value: &str) -> Result<(), CoreError> {
        self.dimensions.add(key, value)
    }

    pub fn is_session_active(&self) -> bool {
        self.state.lock().active
    }

    pub fn pending_event_count(&self) -> usize {
        self.aggregator.pending_count()
    }

    pub fn uploader(&self) -> &Uploader {
        &self.uploader
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::push_registry::PushRegistry;
    use crate::test_support::{Fixture, FlakyStorage};
    use tally_core::models::encode_query_value;

    fn options() -> SessionOptions {
        SessionOptions {
            app_key: "k".to_string(),
            sdk_version: "2.0".to_string(),
            metrics: "%7B%7D".to_string(),
            locale: "en_US".to_string(),
            app_version: "1.0.0".to_string(),
            event_flush_threshold: 10,
        }
    }

    fn orchestrator(fx: &Fixture) -> SessionOrchestrator {
        SessionOrchestrator::new(
            fx.storage.clone(),
            fx.uploader.clone(),
            fx.device.clone(),
            fx.clock.clone(),
            options(),
        )
        .unwrap()
    }

    fn duration_of(payload: &str) -> u64 {
        payload
            .split('&')
            .find_map(|kv| kv.strip_prefix("session_duration="))
            .unwrap()
            .parse()
            .unwrap()
    }

    #[tokio::test]
    async fn start_and_stop_are_counted() {
        let fx = Fixture::new();
        let orch = orchestrator(&fx);

        orch.on_start().unwrap();
        orch.on_start().unwrap();
        assert!(orch.is_session_active());
        orch.on_stop().unwrap();
        assert!(orch.is_session_active());
        fx.clock.advance(12.0);
        orch.on_stop().unwrap();
        assert!(!orch.is_session_active());

        let queued = fx.take_queued();
        assert_eq!(queued.len(), 2);
        assert!(queued[0].contains("&begin_session=1&metrics=%7B%7D"));
        assert!(queued[1].contains("&end_session=1&session_duration=12"));
    }

    #[tokio::test]
    async fn unmatched_stop_is_ignored() {
        let fx = Fixture::new();
        let orch = orchestrator(&fx);
        orch.on_stop().unwrap();
        assert!(fx.take_queued().is_empty());
    }

    #[tokio::test]
    async fn failed_end_session_keeps_session_open() {
        let fx = Fixture::new();
        let storage = Arc::new(FlakyStorage::new(fx.storage.clone()));
        let orch = SessionOrchestrator::new(
            storage.clone(),
            fx.uploader.clone(),
            fx.device.clone(),
            fx.clock.clone(),
            options(),
        )
        .unwrap();

        orch.on_start().unwrap();
        fx.clock.advance(30.0);
        storage.set_fail_enqueue(true);
        assert!(orch.on_stop().is_err());
        assert!(orch.is_session_active());

        // 실패한 종료 구간은 다음 보고에 합산된다
        storage.set_fail_enqueue(false);
        fx.clock.advance(60.0);
        orch.on_heartbeat().unwrap();
        orch.on_stop().unwrap();
        assert!(!orch.is_session_active());

        let queued = fx.take_queued();
        assert_eq!(queued.len(), 3);
        assert!(queued[0].contains("begin_session=1"));
        assert_eq!(duration_of(&queued[1]), 90);
        assert!(!queued[1].contains("end_session"));
        assert!(queued[2].contains("&end_session=1&session_duration=0"));
    }

    #[tokio::test]
    async fn failed_begin_session_can_be_retried() {
        let fx = Fixture::new();
        let storage = Arc::new(FlakyStorage::new(fx.storage.clone()));
        let orch = SessionOrchestrator::new(
            storage.clone(),
            fx.uploader.clone(),
            fx.device.clone(),
            fx.clock.clone(),
            options(),
        )
        .unwrap();

        storage.set_fail_enqueue(true);
        assert!(orch.on_start().is_err());
        assert!(!orch.is_session_active());
        // 카운트가 복구되어 있으므로 on_stop은 무시된다
        orch.on_stop().unwrap();

        storage.set_fail_enqueue(false);
        orch.on_start().unwrap();
        let queued = fx.take_queued();
        assert_eq!(queued.len(), 1);
        assert!(queued[0].contains("begin_session=1"));
    }

    #[tokio::test]
    async fn heartbeat_only_while_active() {
        let fx = Fixture::new();
        let orch = orchestrator(&fx);

        orch.on_heartbeat().unwrap();
        assert!(fx.take_queued().is_empty());

        orch.on_start().unwrap();
        fx.clock.advance(60.0);
        orch.on_heartbeat().unwrap();
        let queued = fx.take_queued();
        assert_eq!(queued.len(), 2);
        assert!(queued[1].ends_with("&session_duration=60"));
    }

    #[tokio::test]
    async fn heartbeat_carries_fractional_seconds() {
        let fx = Fixture::new();
        let orch = orchestrator(&fx);
        orch.on_start().unwrap();

        for _ in 0..3 {
            fx.clock.advance(60.4);
            orch.on_heartbeat().unwrap();
        }

        let durations: Vec<u64> = fx
            .take_queued()
            .iter()
            .filter(|p| p.contains("session_duration="))
            .map(|p| duration_of(p))
            .collect();
        assert_eq!(durations.len(), 3);
        let total: u64 = durations.iter().sum();
        assert!(total >= 180);
        // 매번 잘라내면 180
        assert_ne!(total, 3 * 60);
        assert_eq!(total, 181);
    }

    #[tokio::test]
    async fn heartbeat_flushes_pending_events() {
        let fx = Fixture::new();
        let orch = orchestrator(&fx);
        orch.on_start().unwrap();
        orch.record_event("a", None, 1, None).unwrap();

        fx.clock.advance(60.0);
        orch.on_heartbeat().unwrap();

        let queued = fx.take_queued();
        assert_eq!(queued.len(), 3);
        assert!(queued[1].contains("session_duration=60"));
        assert!(queued[2].contains("&events="));
        assert_eq!(orch.pending_event_count(), 0);
    }

    #[tokio::test]
    async fn threshold_triggers_flush() {
        let fx = Fixture::new();
        let orch = orchestrator(&fx);

        for i in 0..9 {
            orch.record_event(&format!("e{i}"), None, 1, None).unwrap();
        }
        assert_eq!(orch.pending_event_count(), 9);
        assert!(fx.take_queued().is_empty());

        orch.record_event("e9", None, 1, None).unwrap();
        assert_eq!(orch.pending_event_count(), 0);
        let queued = fx.take_queued();
        assert_eq!(queued.len(), 1);
        assert!(queued[0].contains("&events="));

        // 같은 키 반복은 대기 건수를 늘리지 않는다
        for _ in 0..20 {
            orch.record_event("same", None, 1, None).unwrap();
        }
        assert_eq!(orch.pending_event_count(), 1);
    }

    #[tokio::test]
    async fn purchase_scenario() {
        let fx = Fixture::new();
        let orch = orchestrator(&fx);

        orch.on_start().unwrap();
        orch.record_event("purchase", None, 1, Some(9.99)).unwrap();
        orch.record_event("purchase", None, 2, Some(19.98)).unwrap();
        assert_eq!(orch.pending_event_count(), 1);
        fx.clock.advance(30.0);
        orch.on_stop().unwrap();

        let queued = fx.take_queued();
        assert_eq!(queued.len(), 3);
        assert!(queued[0].contains("begin_session=1"));
        assert!(queued[1].contains("&events="));
        assert!(queued[2].contains("&end_session=1&session_duration=30"));

        let events = queued[1]
            .split('&')
            .find_map(|kv| kv.strip_prefix("events="))
            .unwrap();
        assert!(events.contains(&encode_query_value(r#""key":"purchase","count":3,"sum":29.97"#)));
        assert!(fx.storage.load_aggregated_events().unwrap().is_empty());
    }

    #[tokio::test]
    async fn push_events_use_message_id_segment() {
        let fx = Fixture::new();
        let orch = orchestrator(&fx);

        orch.record_message_open("m1").unwrap();
        orch.record_message_action("m1").unwrap();
        orch.record_message_open("m2").unwrap();
        orch.record_message_open("m1").unwrap();
        assert_eq!(orch.pending_event_count(), 3);
        assert!(orch.record_message_open("").is_err());
    }

    #[tokio::test]
    async fn push_token_sets_dimension_first() {
        let fx = Fixture::new();
        let orch = orchestrator(&fx);

        orch.on_push_token("tok").unwrap();

        let queued = fx.take_queued();
        assert_eq!(queued.len(), 1);
        assert!(queued[0].contains("&token_session=1&android_token=tok&locale=en_US"));
        assert!(queued[0].ends_with("&dimensions=%7B%22push%22%3A%22true%22%7D"));
    }

    #[tokio::test]
    async fn push_token_is_cached_per_app_version() {
        let fx = Fixture::new();
        let orch = orchestrator(&fx);
        assert!(!orch.replay_cached_push_token().unwrap());

        orch.on_push_token("tok").unwrap();
        let registry = PushRegistry::new(fx.storage.clone());
        assert_eq!(registry.cached_token("1.0.0").unwrap(), Some("tok".to_string()));
        assert_eq!(registry.cached_token("1.0.1").unwrap(), None);
    }

    #[tokio::test]
    async fn cached_token_is_replayed_for_same_version() {
        let fx = Fixture::new();
        orchestrator(&fx).on_push_token("tok").unwrap();
        fx.take_queued();

        // 재시작
        let orch = orchestrator(&fx);
        assert!(orch.replay_cached_push_token().unwrap());
        let queued = fx.take_queued();
        assert_eq!(queued.len(), 1);
        assert!(queued[0].contains("&token_session=1&android_token=tok"));
    }

    #[tokio::test]
    async fn cached_token_is_dropped_after_upgrade() {
        let fx = Fixture::new();
        orchestrator(&fx).on_push_token("tok").unwrap();
        fx.take_queued();

        let mut upgraded = options();
        upgraded.app_version = "1.1.0".to_string();
        let orch = SessionOrchestrator::new(
            fx.storage.clone(),
            fx.uploader.clone(),
            fx.device.clone(),
            fx.clock.clone(),
            upgraded,
        )
        .unwrap();
        assert!(!orch.replay_cached_push_token().unwrap());
        assert!(fx.take_queued().is_empty());
    }

    #[tokio::test]
    async fn device_resolution_releases_blocked_requests() {
        let fx = Fixture::new();
        let orch = orchestrator(&fx);

        orch.on_start().unwrap();
        fx.uploader.wait_idle().await;
        assert!(fx.collector.sent.lock().is_empty());
        assert_eq!(fx.storage.request_queue_len().unwrap(), 1);

        assert!(orch.on_device_id_resolved("dev-1").unwrap());
        fx.uploader.wait_idle().await;

        let sent = fx.collector.sent.lock().clone();
        assert_eq!(sent.len(), 1);
        assert!(sent[0].contains("device_id=dev-1"));
        assert!(fx.storage.is_request_queue_empty().unwrap());

        assert!(!orch.on_device_id_resolved("dev-2").unwrap());
        assert_eq!(fx.device.get(), Some("dev-1"));
    }

    #[tokio::test]
    async fn zero_threshold_is_rejected() {
        let fx = Fixture::new();
        let mut opts = options();
        opts.event_flush_threshold = 0;
        let result = SessionOrchestrator::new(
            fx.storage.clone(),
            fx.uploader.clone(),
            fx.device.clone(),
            fx.clock.clone(),
            opts,
        );
        assert!(result.is_err());
    }
}
