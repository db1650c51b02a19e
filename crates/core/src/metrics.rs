//! 메트릭 상수 및 설명 등록
//!
//! 모든 Prometheus 메트릭의 이름과 설명을 중앙에서 정의합니다.
//! 엔진과 데몬은 이 상수를 사용하여 `metrics::counter!()`, `metrics::gauge!()`
//! 매크로를 호출합니다.
//!
//! # 네이밍 컨벤션
//!
//! - 접두어: `reactd_`
//! - 모듈명: `engine_`, `source_`, `action_`, `daemon_`
//! - 접미어: `_total` (counter), 없음 (gauge)
//!
//! # 사용 예시
//!
//! ```ignore
//! use metrics::counter;
//!
//! counter!(reactd_core::metrics::ENGINE_LINES_TOTAL).increment(1);
//! ```

// ─── 레이블 키 상수 ────────────────────────────────────────────────

/// 소스 레이블 키 (파일 경로 또는 journal 이름)
pub const LABEL_SOURCE: &str = "source";

/// 규칙 레이블 키
pub const LABEL_RULE: &str = "rule";

/// 실행 종류 레이블 키 (action, reset)
pub const LABEL_KIND: &str = "kind";

/// 결과 레이블 키 (success, failure)
pub const LABEL_RESULT: &str = "result";

// ─── Engine 메트릭 ──────────────────────────────────────────────────

/// Engine: 평가된 로그 라인 수 (counter)
pub const ENGINE_LINES_TOTAL: &str = "reactd_engine_lines_total";

/// Engine: 정규식 매칭 수 (counter, label: rule)
pub const ENGINE_MATCHES_TOTAL: &str = "reactd_engine_matches_total";

/// Engine: 트리거된 액션 수 (counter, label: rule)
pub const ENGINE_TRIGGERS_TOTAL: &str = "reactd_engine_triggers_total";

/// Engine: 실행된 리셋 수 (counter)
pub const ENGINE_RESETS_TOTAL: &str = "reactd_engine_resets_total";

/// Engine: 규칙 평가 중 런타임 에러 수 (counter, label: rule)
pub const ENGINE_RULE_ERRORS_TOTAL: &str = "reactd_engine_rule_errors_total";

/// Engine: 대기 중인 리셋 수 (gauge)
pub const ENGINE_PENDING_RESETS: &str = "reactd_engine_pending_resets";

/// Engine: 추적 중인 키 수 (gauge)
pub const ENGINE_TRACKED_KEYS: &str = "reactd_engine_tracked_keys";

// ─── Source 메트릭 ──────────────────────────────────────────────────

/// Source: 읽은 라인 수 (counter, label: source)
pub const SOURCE_LINES_READ_TOTAL: &str = "reactd_source_lines_read_total";

/// Source: 존재하지 않는 파일 수 (gauge)
pub const SOURCE_MISSING: &str = "reactd_source_missing";

// ─── Action 메트릭 ──────────────────────────────────────────────────

/// Action: 실행 시도 수 (counter, labels: kind, result)
pub const ACTION_EXECUTIONS_TOTAL: &str = "reactd_action_executions_total";

// ─── Daemon 메트릭 ──────────────────────────────────────────────────

/// Daemon: 가동 시간 (gauge, 초)
pub const DAEMON_UPTIME_SECONDS: &str = "reactd_daemon_uptime_seconds";

/// Daemon: 빌드 정보 (gauge, 항상 1, label: version)
pub const DAEMON_BUILD_INFO: &str = "reactd_daemon_build_info";

// ─── 설명 등록 함수 ─────────────────────────────────────────────────

/// 모든 메트릭의 설명(description)을 등록합니다.
///
/// 전역 레코더 설치 후 한 번만 호출해야 합니다.
pub fn describe_all() {
    use metrics::{describe_counter, describe_gauge};

    // Engine
    describe_counter!(ENGINE_LINES_TOTAL, "Total number of log lines evaluated");
    describe_counter!(
        ENGINE_MATCHES_TOTAL,
        "Total number of rule pattern matches"
    );
    describe_counter!(
        ENGINE_TRIGGERS_TOTAL,
        "Total number of rule triggers that ran an action"
    );
    describe_counter!(
        ENGINE_RESETS_TOTAL,
        "Total number of expired reset actions run"
    );
    describe_counter!(
        ENGINE_RULE_ERRORS_TOTAL,
        "Total number of per-rule runtime errors"
    );
    describe_gauge!(
        ENGINE_PENDING_RESETS,
        "Number of reset actions waiting for their deadline"
    );
    describe_gauge!(
        ENGINE_TRACKED_KEYS,
        "Number of keys with an active occurrence window"
    );

    // Source
    describe_counter!(
        SOURCE_LINES_READ_TOTAL,
        "Total number of lines read from each source"
    );
    describe_gauge!(
        SOURCE_MISSING,
        "Number of configured files that do not currently exist"
    );

    // Action
    describe_counter!(
        ACTION_EXECUTIONS_TOTAL,
        "Total number of external command spawn attempts"
    );

    // Daemon
    describe_gauge!(DAEMON_UPTIME_SECONDS, "reactd daemon uptime in seconds");
    describe_gauge!(
        DAEMON_BUILD_INFO,
        "Build information (always 1, with version label)"
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL_METRIC_NAMES: &[&str] = &[
        ENGINE_LINES_TOTAL,
        ENGINE_MATCHES_TOTAL,
        ENGINE_TRIGGERS_TOTAL,
        ENGINE_RESETS_TOTAL,
        ENGINE_RULE_ERRORS_TOTAL,
        ENGINE_PENDING_RESETS,
        ENGINE_TRACKED_KEYS,
        SOURCE_LINES_READ_TOTAL,
        SOURCE_MISSING,
        ACTION_EXECUTIONS_TOTAL,
        DAEMON_UPTIME_SECONDS,
        DAEMON_BUILD_INFO,
    ];

    #[test]
    fn all_metrics_start_with_reactd_prefix() {
        for name in ALL_METRIC_NAMES {
            assert!(
                name.starts_with("reactd_"),
                "Metric '{}' does not start with 'reactd_' prefix",
                name
            );
        }
    }

    #[test]
    fn counters_end_with_total() {
        let counters = [
            ENGINE_LINES_TOTAL,
            ENGINE_MATCHES_TOTAL,
            ENGINE_TRIGGERS_TOTAL,
            ENGINE_RESETS_TOTAL,
            ENGINE_RULE_ERRORS_TOTAL,
            SOURCE_LINES_READ_TOTAL,
            ACTION_EXECUTIONS_TOTAL,
        ];
        for name in counters {
            assert!(name.ends_with("_total"), "counter '{name}' lacks _total");
        }
    }

    #[test]
    fn describe_all_does_not_panic() {
        describe_all();
    }

    #[test]
    fn label_keys_are_lowercase() {
        for label in [LABEL_SOURCE, LABEL_RULE, LABEL_KIND, LABEL_RESULT] {
            assert_eq!(label.to_lowercase(), label);
        }
    }
}
