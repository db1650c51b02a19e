//! reactd.toml 통합 설정 테스트
//!
//! - reactd.toml.example 파싱 테스트
//! - 부분 설정 로딩 테스트
//! - 환경변수 우선순위 테스트
//! - 잘못된 형식 에러 테스트

use reactd_core::config::ReactdConfig;
use reactd_core::error::{ConfigError, ReactdError};

// =============================================================================
// reactd.toml.example 파싱 테스트
// =============================================================================

#[test]
fn example_config_parses_successfully() {
    let content = include_str!("../../../reactd.toml.example");
    let config = ReactdConfig::parse(content).expect("example config should parse");

    assert_eq!(config.general.log_level, "info");
    assert_eq!(config.general.log_format, "json");
    assert_eq!(config.general.pid_file, "/run/reactd.pid");
    assert_eq!(config.general.env_prefix, "REACT");
}

#[test]
fn example_config_passes_validation() {
    let content = include_str!("../../../reactd.toml.example");
    let config = ReactdConfig::parse(content).expect("should parse");
    config
        .validate()
        .expect("example config should pass validation");
}

#[test]
fn example_config_has_expected_rules() {
    let content = include_str!("../../../reactd.toml.example");
    let config = ReactdConfig::parse(content).expect("should parse");

    assert_eq!(config.files.len(), 1);
    assert_eq!(config.files[0].path, "/var/log/auth.log");
    assert_eq!(config.files[0].rules.len(), 2);

    let ban = &config.files[0].rules[0];
    assert_eq!(ban.name.as_deref(), Some("ssh-failed"));
    assert_eq!(ban.key.as_deref(), Some(r"\1"));
    assert_eq!(ban.action, vec!["/usr/sbin/ipset", "add", "reactd-ban", r"\1"]);
    assert_eq!(ban.trigger_count, 5);
    assert_eq!(ban.trigger_window, 600);
    assert_eq!(ban.reset_delay, 3600);
    assert!(!ban.shell_escape);

    let stateless = &config.files[0].rules[1];
    assert_eq!(stateless.trigger_count, 0);
    assert!(stateless.reset.is_none());
}

#[test]
fn example_config_has_journal_source() {
    let content = include_str!("../../../reactd.toml.example");
    let config = ReactdConfig::parse(content).expect("should parse");

    assert_eq!(config.journals.len(), 1);
    let journal = &config.journals[0];
    assert_eq!(journal.name, "sshd-journal");
    assert_eq!(
        journal.matches.get("_SYSTEMD_UNIT").map(String::as_str),
        Some("sshd.service")
    );
    assert_eq!(journal.rules[0].trigger_count, 20);
}

#[test]
fn example_config_matches_code_defaults() {
    let content = include_str!("../../../reactd.toml.example");
    let config = ReactdConfig::parse(content).expect("should parse");
    let default = ReactdConfig::default();

    assert_eq!(
        config.general.rescan_interval_ms,
        default.general.rescan_interval_ms
    );
    assert_eq!(
        config.general.poll_interval_ms,
        default.general.poll_interval_ms
    );
    assert_eq!(config.metrics.enabled, default.metrics.enabled);
    assert_eq!(config.metrics.port, default.metrics.port);
    assert_eq!(config.metrics.endpoint, default.metrics.endpoint);
}

// =============================================================================
// 부분 설정 테스트
// =============================================================================

#[test]
fn partial_config_journal_only() {
    let toml = r#"
[[journal]]

[[journal.rule]]
pattern = "segfault at ([0-9a-f]+)"
action = ["/usr/bin/logger", "crash"]
"#;
    let config = ReactdConfig::parse(toml).expect("should parse");
    config.validate().expect("should validate");

    assert!(config.files.is_empty());
    assert_eq!(config.journals[0].name, "journal");
    assert!(config.journals[0].matches.is_empty());
    assert_eq!(config.general.log_level, "info");
}

#[test]
fn partial_config_rule_defaults() {
    let toml = r#"
[[file]]
path = "/tmp/app.log"

[[file.rule]]
pattern = "boom"
action = ["/bin/true"]
"#;
    let config = ReactdConfig::parse(toml).expect("should parse");
    let rule = &config.files[0].rules[0];

    assert!(rule.name.is_none());
    assert!(rule.key.is_none());
    assert_eq!(rule.trigger_count, 0);
    assert_eq!(rule.trigger_window, 0);
    assert_eq!(rule.reset_delay, 0);
    assert!(!rule.literal_templates);
    assert_eq!(rule.display_name("/tmp/app.log", 0), "/tmp/app.log#0");
}

#[test]
fn empty_config_parses_but_fails_validation() {
    let config = ReactdConfig::parse("").expect("empty string should parse");
    let err = config.validate().unwrap_err();
    assert!(matches!(
        err,
        ReactdError::Config(ConfigError::InvalidValue { .. })
    ));
}

// =============================================================================
// 환경변수 우선순위 테스트
// =============================================================================

#[test]
#[serial_test::serial]
fn env_override_takes_precedence_over_toml() {
    let toml = r#"
[general]
log_level = "info"
"#;

    let original = std::env::var("REACTD_GENERAL_LOG_LEVEL").ok();
    // SAFETY: serial 테스트로 직렬화되어 환경변수 조작이 안전합니다.
    unsafe {
        std::env::set_var("REACTD_GENERAL_LOG_LEVEL", "error");
    }

    let mut config = ReactdConfig::parse(toml).expect("should parse");
    config.apply_env_overrides();
    let result = config.general.log_level.clone();

    // SAFETY: 테스트 정리
    unsafe {
        match original {
            Some(val) => std::env::set_var("REACTD_GENERAL_LOG_LEVEL", val),
            None => std::env::remove_var("REACTD_GENERAL_LOG_LEVEL"),
        }
    }

    assert_eq!(result, "error");
}

#[test]
#[serial_test::serial]
fn env_override_metrics_port_and_enabled() {
    let original_port = std::env::var("REACTD_METRICS_PORT").ok();
    let original_enabled = std::env::var("REACTD_METRICS_ENABLED").ok();
    // SAFETY: serial 테스트로 직렬화되어 환경변수 조작이 안전합니다.
    unsafe {
        std::env::set_var("REACTD_METRICS_PORT", "9999");
        std::env::set_var("REACTD_METRICS_ENABLED", "true");
    }

    let mut config = ReactdConfig::parse("").expect("should parse");
    config.apply_env_overrides();

    // SAFETY: 테스트 정리
    unsafe {
        match original_port {
            Some(val) => std::env::set_var("REACTD_METRICS_PORT", val),
            None => std::env::remove_var("REACTD_METRICS_PORT"),
        }
        match original_enabled {
            Some(val) => std::env::set_var("REACTD_METRICS_ENABLED", val),
            None => std::env::remove_var("REACTD_METRICS_ENABLED"),
        }
    }

    assert_eq!(config.metrics.port, 9999);
    assert!(config.metrics.enabled);
}

#[test]
#[serial_test::serial]
fn env_override_missing_var_keeps_toml_value() {
    let toml = r#"
[general]
env_prefix = "BAN"
"#;

    // SAFETY: 존재하지 않는 변수를 명시적으로 제거
    unsafe {
        std::env::remove_var("REACTD_GENERAL_ENV_PREFIX");
    }

    let mut config = ReactdConfig::parse(toml).expect("should parse");
    config.apply_env_overrides();

    assert_eq!(config.general.env_prefix, "BAN");
}

// =============================================================================
// 잘못된 형식 에러 테스트
// =============================================================================

#[test]
fn malformed_toml_returns_parse_error() {
    let result = ReactdConfig::parse("[invalid toml");
    assert!(matches!(
        result.unwrap_err(),
        ReactdError::Config(ConfigError::ParseFailed { .. })
    ));
}

#[test]
fn invalid_type_returns_parse_error() {
    let toml = r#"
[[file]]
path = "/var/log/auth.log"

[[file.rule]]
pattern = "x"
action = "/bin/true"
"#;
    let result = ReactdConfig::parse(toml);
    assert!(matches!(
        result.unwrap_err(),
        ReactdError::Config(ConfigError::ParseFailed { .. })
    ));
}

#[test]
fn zero_rescan_interval_fails_validation() {
    let toml = r#"
[general]
rescan_interval_ms = 0

[[file]]
path = "/var/log/auth.log"
"#;
    let config = ReactdConfig::parse(toml).expect("should parse");
    let err = config.validate().unwrap_err();
    assert!(err.to_string().contains("rescan_interval_ms"));
}

#[tokio::test]
#[serial_test::serial]
async fn load_reads_file_from_disk() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("reactd.toml");
    std::fs::write(&path, include_str!("../../../reactd.toml.example")).expect("write");

    let config = ReactdConfig::load(&path).await.expect("should load");
    assert_eq!(config.files.len(), 1);
}
