//! 에이전트 종료 절차.
//!
//! 종료 순서:
//! 1. 종료 신호 발송 (하트비트 등 백그라운드 태스크 중단)
//! 2. 추적 중인 태스크 합류
//! 3. 세션 종료 요청 적재
//! 4. 업로더가 큐를 비울 때까지 대기

use tally_core::error::CoreError;
use tally_network::uploader::DrainOutcome;
use tally_session::orchestrator::SessionOrchestrator;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

pub struct AgentLifecycle {
    shutdown_tx: watch::Sender<bool>,
    tasks: Vec<(&'static str, JoinHandle<()>)>,
}

impl AgentLifecycle {
    pub fn new() -> Self {
        let (shutdown_tx, _) = watch::channel(false);
        Self {
            shutdown_tx,
            tasks: Vec::new(),
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.shutdown_tx.subscribe()
    }

    /// 종료 시 합류할 태스크 등록
    pub fn track(&mut self, name: &'static str, handle: JoinHandle<()>) {
        self.tasks.push((name, handle));
    }

    pub fn is_shutting_down(&self) -> bool {
        *self.shutdown_tx.borrow()
    }

    pub fn request_shutdown(&self) {
        if !self.shutdown_tx.send_replace(true) {
            info!("종료 신호 발송");
        }
    }

    /// 태스크를 정리하고 세션을 닫은 뒤 남은 요청을 전송한다.
    ///
    /// 세션 종료 적재가 실패해도 이미 쌓인 요청은 전송을 시도하고, 그 뒤에 에러를 돌려준다.
    pub async fn shutdown(
        self,
        orchestrator: &SessionOrchestrator,
    ) -> Result<Option<DrainOutcome>, CoreError> {
        self.request_shutdown();

        for (name, handle) in self.tasks {
            match handle.await {
                Ok(()) => debug!("{name} 태스크 종료"),
                Err(e) => warn!("{name} 태스크 종료 실패: {e}"),
            }
        }

        let stopped = orchestrator.on_stop();
        let outcome = orchestrator.uploader().wait_idle().await;
        stopped?;
        Ok(outcome)
    }
}

impl Default for AgentLifecycle {
    fn default() -> Self {
        Self::new()
    }
}

/// OS 시그널 대기 (SIGINT, SIGTERM). 핸들러 등록에 실패하면 Ctrl+C만 기다린다.
pub async fn wait_for_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        if let (Ok(mut sigint), Ok(mut sigterm)) = (
            signal(SignalKind::interrupt()),
            signal(SignalKind::terminate()),
        ) {
            tokio::select! {
                _ = sigint.recv() => info!("SIGINT 수신"),
                _ = sigterm.recv() => info!("SIGTERM 수신"),
            }
            return;
        }
        warn!("시그널 핸들러 등록 실패, Ctrl+C만 대기");
    }

    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Ctrl+C 핸들러 등록 실패: {e}");
        std::future::pending::<()>().await;
    }
    info!("Ctrl+C 수신");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;
    use std::time::Duration;
    use tally_core::models::device::DeviceIdentity;
    use tally_core::ports::clock::ManualClock;
    use tally_core::ports::storage::RequestQueue;
    use tally_network::http_client::HttpCollector;
    use tally_network::uploader::Uploader;
    use tally_session::orchestrator::SessionOptions;
    use tally_storage::sqlite::SqliteStorage;

    fn orchestrator(storage: Arc<SqliteStorage>) -> SessionOrchestrator {
        let collector =
            Arc::new(HttpCollector::new("http://127.0.0.1:1", Duration::from_secs(1)).unwrap());
        let device = Arc::new(DeviceIdentity::new());
        let uploader = Uploader::new(storage.clone(), collector, device.clone()).unwrap();
        let options = SessionOptions {
            app_key: "k".to_string(),
            sdk_version: "2.0".to_string(),
            metrics: "%7B%7D".to_string(),
            locale: "en_US".to_string(),
            app_version: "1.0.0".to_string(),
            event_flush_threshold: 10,
        };
        SessionOrchestrator::new(
            storage,
            uploader,
            device,
            Arc::new(ManualClock::new(1_000.0)),
            options,
        )
        .unwrap()
    }

    #[tokio::test]
    async fn shutdown_joins_tasks_before_closing_session() {
        let storage = Arc::new(SqliteStorage::open_in_memory().unwrap());
        let orch = orchestrator(storage.clone());
        orch.on_start().unwrap();

        let mut lifecycle = AgentLifecycle::new();
        let mut rx = lifecycle.subscribe();
        let joined = Arc::new(AtomicBool::new(false));
        let flag = joined.clone();
        lifecycle.track(
            "watcher",
            tokio::spawn(async move {
                let _ = rx.changed().await;
                flag.store(true, Ordering::SeqCst);
            }),
        );

        let outcome = lifecycle.shutdown(&orch).await.unwrap();

        assert!(joined.load(Ordering::SeqCst));
        assert!(!orch.is_session_active());
        // 디바이스 ID가 없으므로 begin/end 모두 큐에 남는다
        assert_eq!(outcome, Some(DrainOutcome::Blocked { sent: 0 }));
        let first = storage.peek_next_request().unwrap().unwrap();
        assert!(first.payload.contains("begin_session=1"));
        assert_eq!(storage.request_queue_len().unwrap(), 2);
    }

    #[tokio::test]
    async fn shutdown_without_session_is_quiet() {
        let storage = Arc::new(SqliteStorage::open_in_memory().unwrap());
        let orch = orchestrator(storage.clone());

        let outcome = AgentLifecycle::new().shutdown(&orch).await.unwrap();
        assert_eq!(outcome, None);
        assert!(storage.is_request_queue_empty().unwrap());
    }

    #[test]
    fn shutdown_request_is_visible() {
        let lifecycle = AgentLifecycle::new();
        let rx = lifecycle.subscribe();
        assert!(!lifecycle.is_shutting_down());
        lifecycle.request_shutdown();
        lifecycle.request_shutdown();
        assert!(lifecycle.is_shutting_down());
        assert!(*rx.borrow());
    }
}
