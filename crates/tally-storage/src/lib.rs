//! # tally-storage
//!
//! 로컬 저장소 어댑터.
//! SQLite 기반 전송 대기 요청 큐, 집계 이벤트 단일 레코드, 환경설정 키-값을
//! 관리한다.
//!
//! ## 모듈
//! - `sqlite`: `RequestQueue` + `EventStore` + `PreferenceStore` 구현
//! - `migration`: 스키마 마이그레이션

pub mod migration;
pub mod sqlite;
