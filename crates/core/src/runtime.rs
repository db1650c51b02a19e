//! 런타임 협력자 trait — 엔진이 외부에 요구하는 확장 포인트
//!
//! - [`ActionExecutor`]: 외부 명령 실행 (fork/exec는 데몬이 담당)
//! - [`Clock`]: 현재 시각 (테스트에서는 [`ManualClock`]으로 대체)

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::types::{ActionRequest, Timestamp};

/// 외부 명령 실행 trait
///
/// 실행은 fire-and-forget 입니다. 구현체는 프로세스 생성 성공 여부만
/// 반환하고, 종료 상태는 비동기로 수집해야 합니다.
pub trait ActionExecutor: Send + Sync {
    /// 실행기 이름
    fn name(&self) -> &str;

    /// 명령을 실행합니다. 프로세스를 시작하지 못하면 `false`를 반환합니다.
    fn execute(&self, request: &ActionRequest) -> bool;
}

impl<E: ActionExecutor + ?Sized> ActionExecutor for Arc<E> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn execute(&self, request: &ActionRequest) -> bool {
        (**self).execute(request)
    }
}

/// 시각 공급 trait
pub trait Clock: Send + Sync {
    /// 현재 시각 (초 단위 Unix 타임스탬프)
    fn now(&self) -> Timestamp;

    /// 현재 시각 (밀리초 단위). 폴링 주기 계산에 사용합니다.
    fn now_millis(&self) -> u64 {
        self.now().saturating_mul(1000)
    }
}

/// 시스템 시계
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Timestamp {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or_default()
    }

    fn now_millis(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
            .unwrap_or_default()
    }
}

/// 수동 시계 -- 테스트와 벤치마크에서 합성 시각을 주입합니다.
///
/// 복제본끼리 같은 시각을 공유합니다.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    now: Arc<AtomicU64>,
}

impl ManualClock {
    /// 주어진 시각으로 시작하는 시계를 생성합니다.
    pub fn new(start: Timestamp) -> Self {
        Self {
            now: Arc::new(AtomicU64::new(start)),
        }
    }

    /// 시각을 설정합니다.
    pub fn set(&self, now: Timestamp) {
        self.now.store(now, Ordering::SeqCst);
    }

    /// 시각을 `secs`초 앞으로 이동합니다.
    pub fn advance(&self, secs: u64) {
        self.now.fetch_add(secs, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Timestamp {
        self.now.load(Ordering::SeqCst)
    }
}
