//! 반응 엔진 -- 소스별 규칙 평가, 명령 실행, 만료 처리
//!
//! [`ReactionEngine`]은 모든 소스의 규칙과 두 개의 만료 목록을 소유합니다.
//!
//! - 발생 윈도우 만료 ([`DedupExpiryList`]): `(소스, 규칙, 키)`마다 하나,
//!   발생할 때마다 `trigger_window` 뒤로 갱신
//! - 리셋 대기열 ([`ExpiryList`]): 트리거마다 하나씩 추가
//!
//! 엔진은 단일 스레드에서 동작합니다. 이벤트 루프가 라인과 타이머 깨어남을
//! 순서대로 전달합니다.
//!
//! ```text
//! line -> on_line -> ReactionRule::evaluate -> executor.execute(action)
//!                                           -> resets.add(reset)
//!                                           -> hit_expiry.upsert(key)
//! tick -> on_tick -> resets.run_expired -> executor.execute(reset)
//!                 -> hit_expiry.run_expired -> rule.expire_key
//! ```

use std::collections::HashMap;
use std::time::Duration;

use metrics::{counter, gauge};
use tracing::{debug, info, warn};

use reactd_core::config::{ReactdConfig, RuleConfig};
use reactd_core::metrics as m;
use reactd_core::runtime::ActionExecutor;
use reactd_core::types::{ActionRequest, Timestamp};

use crate::error::EngineError;
use crate::expire::{DedupExpiryList, ExpiryList};
use crate::rule::ReactionRule;

/// 발생 윈도우 만료 항목
///
/// 윈도우 자체는 규칙의 [`HitTracker`](crate::hits::HitTracker)가 소유하고,
/// 이 항목은 만료 시 조회할 위치만 담습니다.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HitExpiry {
    /// 소스 인덱스
    pub source: usize,
    /// 소스 내 규칙 인덱스
    pub rule: usize,
    /// 카운팅 키
    pub key: String,
}

/// 실행 대기 중인 리셋 명령
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingReset {
    /// 규칙 이름
    pub rule: String,
    /// 소스 이름
    pub source: String,
    /// 트리거한 키
    pub key: Option<String>,
    /// 트리거 시점에 렌더링된 명령과 환경변수
    pub request: ActionRequest,
}

/// 엔진 통계 스냅샷
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EngineStats {
    /// 평가한 라인 수
    pub lines: u64,
    /// 규칙 매칭 수
    pub matches: u64,
    /// 트리거 수 (실행 실패 포함)
    pub triggers: u64,
    /// 실행한 리셋 수
    pub resets_run: u64,
    /// 규칙 평가 중 에러 수
    pub rule_errors: u64,
    /// 대기 중인 리셋 수
    pub pending_resets: usize,
    /// 추적 중인 키 수
    pub tracked_keys: usize,
}

/// 한 소스에 연결된 규칙 묶음
#[derive(Debug)]
struct SourceRules {
    name: String,
    rules: Vec<ReactionRule>,
}

/// 반응 엔진
pub struct ReactionEngine<E> {
    sources: Vec<SourceRules>,
    index: HashMap<String, usize>,
    hit_expiry: DedupExpiryList<HitExpiry>,
    resets: ExpiryList<PendingReset>,
    executor: E,
    env_prefix: String,
    stats: EngineStats,
}

impl<E: ActionExecutor> ReactionEngine<E> {
    /// 규칙 없는 엔진을 생성합니다.
    pub fn new(executor: E, env_prefix: impl Into<String>) -> Self {
        Self {
            sources: Vec::new(),
            index: HashMap::new(),
            hit_expiry: DedupExpiryList::new(),
            resets: ExpiryList::new(),
            executor,
            env_prefix: env_prefix.into(),
            stats: EngineStats::default(),
        }
    }

    /// 설정의 모든 소스와 규칙으로 엔진을 생성합니다.
    ///
    /// 정규식이나 템플릿이 하나라도 컴파일되지 않으면 실패합니다.
    pub fn from_config(config: &ReactdConfig, executor: E) -> Result<Self, EngineError> {
        let mut engine = Self::new(executor, config.general.env_prefix.clone());
        for (name, rules) in config.sources() {
            engine.add_source(name, rules)?;
        }
        info!(
            sources = engine.sources.len(),
            rules = engine.rule_count(),
            executor = engine.executor.name(),
            "reaction engine ready"
        );
        Ok(engine)
    }

    /// 소스를 등록하고 규칙을 컴파일합니다. 소스 인덱스를 반환합니다.
    pub fn add_source(&mut self, name: &str, rules: &[RuleConfig]) -> Result<usize, EngineError> {
        if self.index.contains_key(name) {
            return Err(EngineError::DuplicateSource(name.to_owned()));
        }
        let rules = rules
            .iter()
            .enumerate()
            .map(|(i, config)| ReactionRule::from_config(name, i, config))
            .collect::<Result<Vec<_>, _>>()?;

        let idx = self.sources.len();
        debug!(source = name, rules = rules.len(), "source registered");
        self.sources.push(SourceRules {
            name: name.to_owned(),
            rules,
        });
        self.index.insert(name.to_owned(), idx);
        Ok(idx)
    }

    /// 소스에서 들어온 라인을 평가합니다.
    ///
    /// 규칙은 설정 순서대로 평가됩니다. 한 규칙의 런타임 에러는 로그로 남기고
    /// 나머지 규칙은 계속 평가합니다. 트리거 수를 반환합니다.
    pub fn on_line(
        &mut self,
        source: &str,
        line: &str,
        now: Timestamp,
    ) -> Result<usize, EngineError> {
        let source_idx = *self
            .index
            .get(source)
            .ok_or_else(|| EngineError::UnknownSource(source.to_owned()))?;

        self.stats.lines += 1;
        counter!(m::ENGINE_LINES_TOTAL).increment(1);

        let mut triggered = 0;
        let source_rules = &mut self.sources[source_idx];
        for (rule_idx, rule) in source_rules.rules.iter_mut().enumerate() {
            let evaluation = match rule.evaluate(line, now, &source_rules.name, &self.env_prefix)
            {
                Ok(evaluation) => evaluation,
                Err(e) => {
                    self.stats.rule_errors += 1;
                    counter!(m::ENGINE_RULE_ERRORS_TOTAL, m::LABEL_RULE => rule.name().to_owned())
                        .increment(1);
                    warn!(source, rule = rule.name(), error = %e, "rule evaluation failed, skipping");
                    continue;
                }
            };
            if !evaluation.matched {
                continue;
            }

            self.stats.matches += 1;
            counter!(m::ENGINE_MATCHES_TOTAL, m::LABEL_RULE => rule.name().to_owned())
                .increment(1);

            if let Some(key) = evaluation.tracked_key {
                let item = HitExpiry {
                    source: source_idx,
                    rule: rule_idx,
                    key,
                };
                self.hit_expiry.upsert(item, now, rule.trigger_window());
            }

            if let Some(e) = evaluation.build_error {
                self.stats.rule_errors += 1;
                counter!(m::ENGINE_RULE_ERRORS_TOTAL, m::LABEL_RULE => rule.name().to_owned())
                    .increment(1);
                warn!(source, rule = rule.name(), error = %e, "could not build command, skipping");
                continue;
            }

            let Some(trigger) = evaluation.trigger else {
                debug!(source, rule = rule.name(), "match recorded");
                continue;
            };

            triggered += 1;
            self.stats.triggers += 1;
            counter!(m::ENGINE_TRIGGERS_TOTAL, m::LABEL_RULE => rule.name().to_owned())
                .increment(1);
            info!(
                source,
                rule = rule.name(),
                key = trigger.key.as_deref().unwrap_or(""),
                action = %trigger.action,
                "rule triggered"
            );

            let ok = self.executor.execute(&trigger.action);
            record_execution("action", ok);
            if !ok {
                warn!(rule = rule.name(), action = %trigger.action, "action failed to start, reset not scheduled");
                continue;
            }

            if let (Some(request), Some(delay)) = (trigger.reset, rule.reset_delay()) {
                let deadline = self.resets.add(
                    PendingReset {
                        rule: rule.name().to_owned(),
                        source: source_rules.name.clone(),
                        key: trigger.key,
                        request,
                    },
                    now,
                    delay,
                );
                debug!(rule = rule.name(), deadline, "reset scheduled");
            }
        }

        self.publish_gauges();
        Ok(triggered)
    }

    /// 만료된 리셋과 발생 윈도우를 처리하고 다음 권장 대기 시간을 반환합니다.
    ///
    /// 대기할 것이 없으면 `None`입니다.
    pub fn on_tick(&mut self, now: Timestamp) -> Option<Duration> {
        self.run_resets(now);
        self.expire_hits(now);
        self.publish_gauges();
        self.next_wake()
            .map(|deadline| Duration::from_secs(deadline.saturating_sub(now)))
    }

    /// 만료된 리셋을 만료 순서대로 실행합니다. 실행한 수를 반환합니다.
    pub fn run_resets(&mut self, now: Timestamp) -> usize {
        let executor = &self.executor;
        let stats = &mut self.stats;
        self.resets.run_expired(now, |reset| {
            info!(
                rule = %reset.rule,
                source = %reset.source,
                key = reset.key.as_deref().unwrap_or(""),
                reset = %reset.request,
                "running reset"
            );
            let ok = executor.execute(&reset.request);
            record_execution("reset", ok);
            stats.resets_run += 1;
            counter!(m::ENGINE_RESETS_TOTAL).increment(1);
        })
    }

    /// 만료된 발생 윈도우를 삭제합니다. 삭제한 수를 반환합니다.
    pub fn expire_hits(&mut self, now: Timestamp) -> usize {
        let sources = &mut self.sources;
        self.hit_expiry.run_expired(now, |expiry| {
            let Some(rule) = sources
                .get_mut(expiry.source)
                .and_then(|s| s.rules.get_mut(expiry.rule))
            else {
                return;
            };
            if rule.expire_key(&expiry.key) {
                debug!(rule = rule.name(), key = %expiry.key, "occurrence window expired");
            }
        })
    }

    /// 다음 발생 윈도우 만료 시각
    pub fn next_hit_expiry(&self) -> Option<Timestamp> {
        self.hit_expiry.next_deadline()
    }

    /// 다음 리셋 실행 시각
    pub fn next_reset(&self) -> Option<Timestamp> {
        self.resets.next_deadline()
    }

    /// 두 만료 목록 중 가장 이른 시각
    pub fn next_wake(&self) -> Option<Timestamp> {
        crate::driver::next_wake(self.next_hit_expiry(), self.next_reset(), None)
    }

    /// 대기 중인 리셋을 만료 순서대로 순회합니다.
    pub fn pending_resets(&self) -> impl Iterator<Item = (Timestamp, &PendingReset)> + '_ {
        self.resets.iter()
    }

    /// 대기 중인 리셋과 발생 윈도우를 모두 버립니다. 리셋은 실행하지 않습니다.
    pub fn shutdown(&mut self) {
        let resets = self.resets.clear();
        let expiries = self.hit_expiry.clear();
        let windows: usize = self
            .sources
            .iter_mut()
            .flat_map(|s| s.rules.iter_mut())
            .map(ReactionRule::clear_hits)
            .sum();
        info!(
            pending_resets = resets,
            hit_expiries = expiries,
            windows,
            "reaction engine shut down, pending resets discarded"
        );
        self.publish_gauges();
    }

    /// 통계 스냅샷
    pub fn stats(&self) -> EngineStats {
        EngineStats {
            pending_resets: self.resets.count(),
            tracked_keys: self.tracked_keys(),
            ..self.stats
        }
    }

    /// 등록된 소스 이름 (등록 순서)
    pub fn source_names(&self) -> impl Iterator<Item = &str> + '_ {
        self.sources.iter().map(|s| s.name.as_str())
    }

    /// 전체 규칙 수
    pub fn rule_count(&self) -> usize {
        self.sources.iter().map(|s| s.rules.len()).sum()
    }

    /// 이름으로 규칙을 찾습니다.
    pub fn rule(&self, source: &str, name: &str) -> Option<&ReactionRule> {
        let idx = *self.index.get(source)?;
        self.sources[idx].rules.iter().find(|r| r.name() == name)
    }

    pub fn executor(&self) -> &E {
        &self.executor
    }

    fn tracked_keys(&self) -> usize {
        self.sources
            .iter()
            .flat_map(|s| s.rules.iter())
            .map(|r| r.hits().len())
            .sum()
    }

    pub(crate) fn publish_gauges(&self) {
        gauge!(m::ENGINE_PENDING_RESETS).set(self.resets.count() as f64);
        gauge!(m::ENGINE_TRACKED_KEYS).set(self.tracked_keys() as f64);
    }
}

fn record_execution(kind: &'static str, ok: bool) {
    let result = if ok { "success" } else { "failure" };
    counter!(m::ACTION_EXECUTIONS_TOTAL, m::LABEL_KIND => kind, m::LABEL_RESULT => result)
        .increment(1);
}
