//! # tally-session
//!
//! 세션 수명 주기와 이벤트 흐름.
//!
//! - [`aggregator`]: 병합 키 기준 이벤트 집계, 변경마다 즉시 저장
//! - [`request_builder`]: 요청 페이로드 생성 → 큐 적재 → 업로더 깨우기
//! - [`orchestrator`]: 포그라운드 카운트 기반 세션 시작/갱신/종료
//! - [`heartbeat`]: 세션 갱신 주기 태스크
//! - [`dimensions`], [`push_registry`]: 환경설정에 보관되는 부가 상태

pub mod aggregator;
pub mod dimensions;
pub mod heartbeat;
pub mod orchestrator;
pub mod push_registry;
pub mod request_builder;

#[cfg(test)]
pub(crate) mod test_support;
