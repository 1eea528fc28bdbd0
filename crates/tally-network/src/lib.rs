//! # tally-network
//!
//! 수집 서버 네트워크 어댑터.
//!
//! - [`http_client`]: `Collector` 포트 구현 (`GET <base>/i?<query>`)
//! - [`uploader`]: 요청 큐를 순서대로 비우는 단일 실행 백그라운드 업로더

pub mod http_client;
pub mod uploader;
