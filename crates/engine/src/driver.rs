//! 스케줄링 드라이버 -- 이벤트 루프의 대기 시간 계산과 주기 처리
//!
//! 이벤트 루프는 매 반복마다 [`Driver::poll_timeout`]으로 대기 시간을 구하고,
//! 깨어나면 [`Driver::tick`]을 호출합니다. 대기 시간은
//! `min(다음 윈도우 만료, 다음 리셋, 다음 재확인) - now`이며 음수가 되지 않습니다.
//!
//! 엔진 시각은 초 단위이고, 존재하지 않는 파일 재확인 주기는 밀리초 단위이므로
//! 드라이버는 밀리초 시각을 받습니다.

use std::time::Duration;

use reactd_core::runtime::ActionExecutor;
use reactd_core::types::Timestamp;

use crate::engine::ReactionEngine;

/// 주어진 시각 중 가장 이른 값. 모두 없으면 `None`입니다.
pub fn next_wake(
    hit_expiry: Option<u64>,
    reset: Option<u64>,
    rescan: Option<u64>,
) -> Option<u64> {
    [hit_expiry, reset, rescan].into_iter().flatten().min()
}

/// 한 번의 tick 처리 결과
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickReport {
    /// 실행한 리셋 수
    pub resets_run: usize,
    /// 만료된 발생 윈도우 수
    pub hits_expired: usize,
    /// 존재하지 않는 소스를 다시 확인해야 하는지
    pub rescan_due: bool,
}

/// 스케줄링 드라이버
#[derive(Debug, Clone)]
pub struct Driver {
    rescan_interval_ms: u64,
    last_rescan_ms: Option<u64>,
}

impl Driver {
    pub fn new(rescan_interval: Duration) -> Self {
        Self {
            rescan_interval_ms: u64::try_from(rescan_interval.as_millis())
                .unwrap_or(u64::MAX)
                .max(1),
            last_rescan_ms: None,
        }
    }

    /// 다음 이벤트까지 대기할 시간을 계산합니다.
    ///
    /// 대기할 것이 없으면 `None` (라인이나 시그널이 올 때까지 무기한 대기).
    pub fn poll_timeout<E: ActionExecutor>(
        &self,
        now_ms: u64,
        engine: &ReactionEngine<E>,
        sources_missing: bool,
    ) -> Option<Duration> {
        let to_ms = |t: Timestamp| t.saturating_mul(1000);
        let rescan = sources_missing.then(|| self.next_rescan_ms());
        next_wake(
            engine.next_hit_expiry().map(to_ms),
            engine.next_reset().map(to_ms),
            rescan,
        )
        .map(|deadline| Duration::from_millis(deadline.saturating_sub(now_ms)))
    }

    /// 만료된 리셋과 발생 윈도우를 처리하고 재확인 시점인지 판단합니다.
    ///
    /// 리셋을 먼저, 발생 윈도우를 나중에 각각 만료 순서대로 처리합니다.
    pub fn tick<E: ActionExecutor>(
        &mut self,
        now_ms: u64,
        engine: &mut ReactionEngine<E>,
        sources_missing: bool,
    ) -> TickReport {
        let now = now_ms / 1000;
        let resets_run = engine.run_resets(now);
        let hits_expired = engine.expire_hits(now);
        if resets_run + hits_expired > 0 {
            engine.publish_gauges();
        }

        let rescan_due = sources_missing && now_ms >= self.next_rescan_ms();
        if rescan_due {
            self.last_rescan_ms = Some(now_ms);
        }

        TickReport {
            resets_run,
            hits_expired,
            rescan_due,
        }
    }

    fn next_rescan_ms(&self) -> u64 {
        match self.last_rescan_ms {
            Some(last) => last.saturating_add(self.rescan_interval_ms),
            None => 0,
        }
    }
}
