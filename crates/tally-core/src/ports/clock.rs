//! 시계 포트.
//!
//! 세션 길이 계산에 쓰는 초 단위 시계. 테스트에서는 수동 시계를 주입한다.

use parking_lot::Mutex;

/// epoch 기준 초 (소수 포함)
pub trait Clock: Send + Sync {
    fn now_secs(&self) -> f64;

    /// 정수 epoch 초
    fn now_timestamp(&self) -> i64 {
        self.now_secs().floor() as i64
    }
}

/// 시스템 벽시계
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_secs(&self) -> f64 {
        chrono::Utc::now().timestamp_millis() as f64 / 1000.0
    }
}

/// 수동으로 진행시키는 시계
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<f64>,
}

impl ManualClock {
    pub fn new(start_secs: f64) -> Self {
        Self {
            now: Mutex::new(start_secs),
        }
    }

    pub fn advance(&self, secs: f64) {
        *self.now.lock() += secs;
    }

    pub fn set(&self, secs: f64) {
        *self.now.lock() = secs;
    }
}

impl Clock for ManualClock {
    fn now_secs(&self) -> f64 {
        *self.now.lock()
    }
}
