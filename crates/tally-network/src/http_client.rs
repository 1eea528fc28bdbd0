//! 수집 서버 HTTP 클라이언트.
//!
//! `Collector` 포트 구현. 재시도는 하지 않는다. 실패한 요청은 큐에 남고
//! 다음 wake 때 다시 시도된다.

use async_trait::async_trait;
use std::time::Duration;
use tally_core::error::CoreError;
use tally_core::ports::collector::Collector;
use tracing::{debug, warn};

/// 이벤트 수집 경로
pub const INGEST_PATH: &str = "/i";

/// 수집 서버 클라이언트 — `Collector` 포트 구현
pub struct HttpCollector {
    client: reqwest::Client,
    base_url: String,
}

impl HttpCollector {
    /// 새 클라이언트 생성
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, CoreError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| CoreError::Network(format!("HTTP 클라이언트 빌드 실패: {e}")))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    /// 페이로드 전송 URL
    pub fn ingest_url(&self, query: &str) -> String {
        format!("{}{}?{}", self.base_url, INGEST_PATH, query)
    }
}

#[async_trait]
impl Collector for HttpCollector {
    async fn send(&self, query: &str) -> Result<(), CoreError> {
        let url = self.ingest_url(query);

        let resp = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| CoreError::Network(format!("요청 전송 실패: {e}")))?;

        let status = resp.status();
        // 본문을 끝까지 읽어야 전송 완료로 본다
        let body = resp
            .bytes()
            .await
            .map_err(|e| CoreError::Network(format!("응답 본문 읽기 실패: {e}")))?;

        if status.is_success() {
            debug!("전송 성공 ({status}, {}바이트)", body.len());
        } else {
            warn!("수집 서버 비정상 응답 ({status}), 전송 완료로 처리");
        }
        Ok(())
    }
}
