//! 이벤트 집계기.
//!
//! 메모리의 [`EventSet`] 하나와 저장소의 단일 레코드를 항상 같게 유지한다.
//! 변경은 사본에 적용 → 저장 → 성공 시 교체 순서로 진행하므로,
//! 저장에 실패하면 메모리 상태도 바뀌지 않고 에러가 호출자에게 전달된다.

use parking_lot::Mutex;
use std::sync::Arc;
use tally_core::error::CoreError;
use tally_core::models::event::{validate_record, EventSet, Segmentation};
use tally_core::ports::clock::Clock;
use tally_core::ports::storage::EventStore;
use tracing::debug;

/// 이벤트 집계기
pub struct EventAggregator {
    store: Arc<dyn EventStore>,
    clock: Arc<dyn Clock>,
    events: Mutex<EventSet>,
}

impl EventAggregator {
    /// 저장된 집계 이벤트로 초기화
    pub fn load(store: Arc<dyn EventStore>, clock: Arc<dyn Clock>) -> Result<Self, CoreError> {
        let events = store.load_aggregated_events()?;
        if !events.is_empty() {
            debug!("저장된 집계 이벤트 {}건 복원", events.len());
        }
        Ok(Self {
            store,
            clock,
            events: Mutex::new(events),
        })
    }

    /// 이벤트 기록. 기록 후 대기 중인 이벤트 수를 반환한다.
    pub fn record_event(
        &self,
        key: &str,
        segmentation: Option<Segmentation>,
        count: u32,
        sum: Option<f64>,
    ) -> Result<usize, CoreError> {
        validate_record(key, count)?;

        let mut events = self.events.lock();
        let mut next = events.clone();
        next.record(
            key,
            segmentation,
            count,
            sum.unwrap_or(0.0),
            self.clock.now_timestamp(),
        );
        self.store.save_aggregated_events(&next)?;
        *events = next;
        Ok(events.len())
    }

    pub fn pending_count(&self) -> usize {
        self.events.lock().len()
    }

    /// 현재 이벤트를 `events=` 값으로 만들어 넘기고 비운다.
    ///
    /// `sink`가 실패하면 아무것도 지우지 않는다. 잠금을 쥔 채 진행하므로
    /// 동시에 기록된 이벤트는 이번 배치에 들어가거나 다음 배치로 남을 뿐 유실되지 않는다.
    /// 비어 있으면 `sink`를 호출하지 않고 `false`.
    pub fn drain_with<F>(&self, sink: F) -> Result<bool, CoreError>
    where
        F: FnOnce(String) -> Result<(), CoreError>,
    {
        let mut events = self.events.lock();
        if events.is_empty() {
            return Ok(false);
        }

        let value = events.to_query_value()?;
        let drained = events.len();
        sink(value)?;
        self.store.clear_aggregated_events()?;
        *events = EventSet::default();
        debug!("집계 이벤트 {drained}건 배출");
        Ok(true)
    }

    /// 현재 이벤트를 `events=` 값으로 반환하고 비운다. 비어 있으면 `None`.
    pub fn drain_to_payload(&self) -> Result<Option<String>, CoreError> {
        let mut payload = None;
        self.drain_with(|value| {
            payload = Some(value);
            Ok(())
        })?;
        Ok(payload)
    }
}
