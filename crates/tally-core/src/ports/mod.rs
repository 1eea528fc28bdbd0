//! 포트 인터페이스 (trait).
//!
//! 각 어댑터 crate가 이 trait들을 구현하며,
//! `tally-app`에서 `Arc<dyn T>`로 와이어링한다.
//!
//! 로컬 저장소 포트는 동기 trait이다. 호출자 스레드에서 바로 끝나야 하는
//! 연산이기 때문이다. 네트워크 포트만 `async_trait`을 사용한다.

pub mod clock;
pub mod collector;
pub mod storage;
