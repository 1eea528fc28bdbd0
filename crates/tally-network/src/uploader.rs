//! 단일 실행 백그라운드 업로더.
//!
//! 요청 큐를 가장 오래된 것부터 하나씩 전송한다. 상태는 Idle/Draining 두 가지.
//!
//! - `wake()`는 Idle이고 큐가 비어 있지 않을 때만 드레인 태스크를 띄운다.
//!   Draining 중의 wake는 무시된다 (동시에 도는 드레인은 최대 하나).
//! - 선두 요청에 디바이스 ID 플레이스홀더가 있고 아직 미확정이면 멈춘다.
//!   확정됐으면 전송 사본에만 치환하고 저장된 요청은 그대로 둔다.
//! - 전송 실패 시 즉시 멈춘다. 실패한 요청과 그 뒤 요청은 순서대로 큐에 남는다.

use parking_lot::Mutex;
use std::sync::Arc;
use tally_core::error::CoreError;
use tally_core::models::device::DeviceIdentity;
use tally_core::ports::collector::Collector;
use tally_core::ports::storage::RequestQueue;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// 드레인 한 번의 결과
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DrainOutcome {
    /// 큐를 모두 비움
    Exhausted { sent: usize },
    /// 디바이스 ID 미확정으로 멈춤
    Blocked { sent: usize },
    /// 전송 또는 저장소 실패로 멈춤
    Failed { sent: usize, error: String },
}

impl DrainOutcome {
    pub fn sent(&self) -> usize {
        match self {
            Self::Exhausted { sent } | Self::Blocked { sent } | Self::Failed { sent, .. } => *sent,
        }
    }
}

#[derive(Default)]
struct UploaderState {
    draining: bool,
    worker: Option<JoinHandle<DrainOutcome>>,
}

struct Inner {
    queue: Arc<dyn RequestQueue>,
    collector: Arc<dyn Collector>,
    device: Arc<DeviceIdentity>,
    state: Mutex<UploaderState>,
}

/// 백그라운드 업로더
#[derive(Clone)]
pub struct Uploader {
    inner: Arc<Inner>,
    runtime: Handle,
}

impl Uploader {
    /// 현재 tokio 런타임에서 드레인 태스크를 띄우는 업로더 생성
    pub fn new(
        queue: Arc<dyn RequestQueue>,
        collector: Arc<dyn Collector>,
        device: Arc<DeviceIdentity>,
    ) -> Result<Self, CoreError> {
        let runtime = Handle::try_current()
            .map_err(|e| CoreError::Internal(format!("tokio 런타임 없음: {e}")))?;
        Ok(Self::with_runtime(queue, collector, device, runtime))
    }

    /// 지정한 런타임 핸들로 생성
    pub fn with_runtime(
        queue: Arc<dyn RequestQueue>,
        collector: Arc<dyn Collector>,
        device: Arc<DeviceIdentity>,
        runtime: Handle,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                queue,
                collector,
                device,
                state: Mutex::new(UploaderState::default()),
            }),
            runtime,
        }
    }

    /// 드레인 시도. 새 드레인 태스크를 띄웠으면 `true`.
    ///
    /// 호출자를 막지 않는다. 네트워크 I/O는 모두 백그라운드 태스크에서 일어난다.
    pub fn wake(&self) -> bool {
        let mut state = self.inner.state.lock();
        if state.draining {
            return false;
        }

        match self.inner.queue.is_request_queue_empty() {
            Ok(true) => return false,
            Ok(false) => {}
            Err(e) => {
                warn!("요청 큐 확인 실패, 드레인 생략: {e}");
                return false;
            }
        }

        state.draining = true;
        let inner = Arc::clone(&self.inner);
        state.worker = Some(self.runtime.spawn(async move { inner.run().await }));
        debug!("업로더 드레인 시작");
        true
    }

    pub fn is_draining(&self) -> bool {
        self.inner.state.lock().draining
    }

    /// 진행 중인 드레인이 끝날 때까지 대기. 마지막 결과를 반환한다.
    pub async fn wait_idle(&self) -> Option<DrainOutcome> {
        let mut last = None;
        loop {
            let handle = self.inner.state.lock().worker.take();
            let Some(handle) = handle else {
                return last;
            };
            match handle.await {
                Ok(outcome) => last = Some(outcome),
                Err(e) => error!("업로더 태스크 비정상 종료: {e}"),
            }
        }
    }
}

/// 드레인 태스크가 정상 종료 판정 없이 사라지면 (패닉, 취소) Idle로 되돌린다
struct DrainingGuard<'a> {
    state: &'a Mutex<UploaderState>,
    armed: bool,
}

impl Drop for DrainingGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            warn!("드레인 태스크 중단, Idle로 복구");
            self.state.lock().draining = false;
        }
    }
}

impl Inner {
    async fn run(self: Arc<Self>) -> DrainOutcome {
        let mut guard = DrainingGuard {
            state: &self.state,
            armed: true,
        };
        let mut sent = 0;
        loop {
            let outcome = self.drain_pass(&mut sent).await;

            // 큐가 빈 것을 확인한 뒤 들어온 요청은 같은 태스크가 이어서 처리한다.
            // wake와 같은 잠금 아래에서 판단하므로 wake 신호를 잃지 않는다.
            let finished = {
                let mut state = self.state.lock();
                let more = matches!(outcome, DrainOutcome::Exhausted { .. })
                    && matches!(self.queue.is_request_queue_empty(), Ok(false));
                if !more {
                    state.draining = false;
                    guard.armed = false;
                }
                !more
            };

            if finished {
                match &outcome {
                    DrainOutcome::Exhausted { sent } => info!("업로더 드레인 완료: {sent}건 전송"),
                    DrainOutcome::Blocked { sent } => {
                        debug!("디바이스 ID 대기로 드레인 중단: {sent}건 전송")
                    }
                    DrainOutcome::Failed { sent, error } => {
                        warn!("드레인 중단 ({sent}건 전송): {error}")
                    }
                }
                return outcome;
            }
        }
    }

    async fn drain_pass(&self, sent: &mut usize) -> DrainOutcome {
        loop {
            let request = match self.queue.peek_next_request() {
                Ok(Some(request)) => request,
                Ok(None) => return DrainOutcome::Exhausted { sent: *sent },
                Err(e) => {
                    return DrainOutcome::Failed {
                        sent: *sent,
                        error: e.to_string(),
                    }
                }
            };

            let Some(payload) = self.device.substitute(&request.payload) else {
                debug!("디바이스 ID 미확정: 요청 id={} 보류", request.id);
                return DrainOutcome::Blocked { sent: *sent };
            };

            if let Err(e) = self.collector.send(&payload).await {
                warn!("전송 실패: 요청 id={}: {e}", request.id);
                return DrainOutcome::Failed {
                    sent: *sent,
                    error: e.to_string(),
                };
            }

            if let Err(e) = self.queue.dequeue_request(request.id) {
                error!("전송한 요청 제거 실패: id={}: {e}", request.id);
                return DrainOutcome::Failed {
                    sent: *sent,
                    error: e.to_string(),
                };
            }

            *sent += 1;
            debug!("전송 완료: 요청 id={}", request.id);
        }
    }
}
