//! 세션 하트비트 스케줄러.
//!
//! 첫 틱은 한 주기 뒤에 발생한다. 종료 신호를 받으면 루프를 빠져나온다.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::orchestrator::SessionOrchestrator;

pub struct HeartbeatScheduler {
    orchestrator: Arc<SessionOrchestrator>,
    interval: Duration,
}

impl HeartbeatScheduler {
    pub fn new(orchestrator: Arc<SessionOrchestrator>, interval: Duration) -> Self {
        Self {
            orchestrator,
            interval,
        }
    }

    /// 하트비트 루프 시작
    pub fn spawn(self, mut shutdown_rx: watch::Receiver<bool>) -> JoinHandle<()> {
        tokio::spawn(async move {
            info!("하트비트 시작: {}초 주기", self.interval.as_secs());
            let mut ticker = interval_at(Instant::now() + self.interval, self.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        debug!("하트비트");
                        if let Err(e) = self.orchestrator.on_heartbeat() {
                            warn!("하트비트 처리 실패: {e}");
                        }
                    }
                    _ = shutdown_rx.changed() => {
                        info!("하트비트 루프 종료");
                        break;
                    }
                }
            }
        })
    }
}
