//! 설정 관리 — reactd.toml 파싱 및 런타임 설정
//!
//! [`ReactdConfig`]는 데몬 전체 설정을 담는 최상위 구조체입니다.
//!
//! # 설정 로딩 우선순위
//! 1. CLI 인자 (최고 우선)
//! 2. 환경변수 (`REACTD_GENERAL_LOG_LEVEL=debug` 형식)
//! 3. 설정 파일 (`reactd.toml`)
//! 4. 기본값 (`Default` 구현)
//!
//! # 사용 예시
//! ```no_run
//! # async fn example() -> Result<(), reactd_core::error::ReactdError> {
//! use reactd_core::config::ReactdConfig;
//!
//! // 파일에서 로드 + 환경변수 오버라이드
//! let config = ReactdConfig::load("/etc/reactd/reactd.toml").await?;
//!
//! // TOML 문자열에서 직접 파싱
//! let config = ReactdConfig::parse("[general]\nlog_level = \"debug\"")?;
//! # Ok(())
//! # }
//! ```

use std::collections::{BTreeMap, HashSet};
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{ConfigError, ReactdError};

/// reactd 통합 설정
///
/// `reactd.toml` 파일의 최상위 구조를 나타냅니다.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReactdConfig {
    /// 일반 설정
    #[serde(default)]
    pub general: GeneralConfig,
    /// Prometheus 메트릭 설정
    #[serde(default)]
    pub metrics: MetricsConfig,
    /// 감시할 로그 파일 목록 (`[[file]]`)
    #[serde(default, rename = "file")]
    pub files: Vec<FileSourceConfig>,
    /// 감시할 journal 필터 목록 (`[[journal]]`)
    #[serde(default, rename = "journal")]
    pub journals: Vec<JournalSourceConfig>,
}

impl ReactdConfig {
    /// TOML 파일에서 설정을 로드하고 환경변수 오버라이드를 적용합니다.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, ReactdError> {
        let mut config = Self::from_file(path).await?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// TOML 파일에서 설정을 로드합니다 (환경변수 오버라이드 없음).
    pub async fn from_file(path: impl AsRef<Path>) -> Result<Self, ReactdError> {
        let path = path.as_ref();
        let content = tokio::fs::read_to_string(path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                ReactdError::Config(ConfigError::FileNotFound {
                    path: path.display().to_string(),
                })
            } else {
                ReactdError::Io(e)
            }
        })?;
        Self::parse(&content)
    }

    /// TOML 문자열에서 설정을 파싱합니다.
    pub fn parse(toml_str: &str) -> Result<Self, ReactdError> {
        toml::from_str(toml_str).map_err(|e| {
            ReactdError::Config(ConfigError::ParseFailed {
                reason: e.to_string(),
            })
        })
    }

    /// 환경변수로 설정값을 오버라이드합니다.
    ///
    /// 환경변수 네이밍 규칙: `REACTD_{SECTION}_{FIELD}`
    /// 예: `REACTD_GENERAL_LOG_LEVEL=debug`
    ///
    /// 소스와 규칙은 배열이므로 오버라이드 대상이 아닙니다.
    pub fn apply_env_overrides(&mut self) {
        // General
        override_string(&mut self.general.log_level, "REACTD_GENERAL_LOG_LEVEL");
        override_string(&mut self.general.log_format, "REACTD_GENERAL_LOG_FORMAT");
        override_string(&mut self.general.pid_file, "REACTD_GENERAL_PID_FILE");
        override_string(&mut self.general.env_prefix, "REACTD_GENERAL_ENV_PREFIX");
        override_u64(
            &mut self.general.rescan_interval_ms,
            "REACTD_GENERAL_RESCAN_INTERVAL_MS",
        );
        override_u64(
            &mut self.general.poll_interval_ms,
            "REACTD_GENERAL_POLL_INTERVAL_MS",
        );

        // Metrics
        override_bool(&mut self.metrics.enabled, "REACTD_METRICS_ENABLED");
        override_string(&mut self.metrics.listen_addr, "REACTD_METRICS_LISTEN_ADDR");
        override_u16(&mut self.metrics.port, "REACTD_METRICS_PORT");
    }

    /// 설정된 모든 소스를 (이름, 규칙 목록) 쌍으로 반환합니다.
    ///
    /// 파일이 먼저, journal이 나중이며 각각 설정 순서를 따릅니다.
    pub fn sources(&self) -> Vec<(&str, &[RuleConfig])> {
        self.files
            .iter()
            .map(|f| (f.path.as_str(), f.rules.as_slice()))
            .chain(
                self.journals
                    .iter()
                    .map(|j| (j.name.as_str(), j.rules.as_slice())),
            )
            .collect()
    }

    /// 설정값의 유효성을 검증합니다.
    pub fn validate(&self) -> Result<(), ReactdError> {
        // log_level 검증
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.general.log_level.as_str()) {
            return Err(ConfigError::InvalidValue {
                field: "general.log_level".to_owned(),
                reason: format!("must be one of: {}", valid_levels.join(", ")),
            }
            .into());
        }

        // log_format 검증
        let valid_formats = ["json", "pretty"];
        if !valid_formats.contains(&self.general.log_format.as_str()) {
            return Err(ConfigError::InvalidValue {
                field: "general.log_format".to_owned(),
                reason: format!("must be one of: {}", valid_formats.join(", ")),
            }
            .into());
        }

        // 환경변수 이름에 쓰이므로 영숫자와 '_'만 허용
        let prefix = &self.general.env_prefix;
        if prefix.is_empty()
            || !prefix
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_')
        {
            return Err(ConfigError::InvalidValue {
                field: "general.env_prefix".to_owned(),
                reason: "must be a non-empty [A-Za-z0-9_] identifier".to_owned(),
            }
            .into());
        }

        if self.general.rescan_interval_ms == 0 {
            return Err(ConfigError::InvalidValue {
                field: "general.rescan_interval_ms".to_owned(),
                reason: "must be greater than 0".to_owned(),
            }
            .into());
        }

        if self.general.poll_interval_ms == 0 {
            return Err(ConfigError::InvalidValue {
                field: "general.poll_interval_ms".to_owned(),
                reason: "must be greater than 0".to_owned(),
            }
            .into());
        }

        if self.metrics.enabled && self.metrics.endpoint != "/metrics" {
            return Err(ConfigError::InvalidValue {
                field: "metrics.endpoint".to_owned(),
                reason: "only '/metrics' is supported".to_owned(),
            }
            .into());
        }

        if self.files.is_empty() && self.journals.is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "file".to_owned(),
                reason: "nothing to monitor: configure at least one [[file]] or [[journal]]"
                    .to_owned(),
            }
            .into());
        }

        let mut seen = HashSet::new();
        for (idx, file) in self.files.iter().enumerate() {
            if file.path.is_empty() {
                return Err(ConfigError::InvalidValue {
                    field: format!("file[{idx}].path"),
                    reason: "path must not be empty".to_owned(),
                }
                .into());
            }
        }
        for (idx, journal) in self.journals.iter().enumerate() {
            if journal.name.is_empty() {
                return Err(ConfigError::InvalidValue {
                    field: format!("journal[{idx}].name"),
                    reason: "name must not be empty".to_owned(),
                }
                .into());
            }
        }

        for (source, rules) in self.sources() {
            if !seen.insert(source) {
                return Err(ConfigError::InvalidValue {
                    field: "source".to_owned(),
                    reason: format!("duplicate source '{source}'"),
                }
                .into());
            }
            if rules.is_empty() {
                warn!(source, "source has no rules and will only be tailed");
            }
            for (idx, rule) in rules.iter().enumerate() {
                rule.validate(&format!("{source}.rule[{idx}]"))?;
            }
        }

        Ok(())
    }
}

/// 일반 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// 로그 레벨 (trace, debug, info, warn, error)
    pub log_level: String,
    /// 로그 형식 (json, pretty)
    pub log_format: String,
    /// PID 파일 경로 (빈 문자열이면 생성하지 않음)
    pub pid_file: String,
    /// 실행 명령에 전달할 환경변수 접두어 (`REACT_0`, `REACT_KEY` ...)
    pub env_prefix: String,
    /// 존재하지 않는 파일 재확인 주기 (밀리초)
    pub rescan_interval_ms: u64,
    /// 파일 tail 폴링 주기 (밀리초)
    pub poll_interval_ms: u64,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_owned(),
            log_format: "pretty".to_owned(),
            pid_file: "/run/reactd.pid".to_owned(),
            env_prefix: "REACT".to_owned(),
            rescan_interval_ms: 2000,
            poll_interval_ms: 250,
        }
    }
}

/// Prometheus 메트릭 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    /// 활성화 여부
    pub enabled: bool,
    /// 바인드 주소
    pub listen_addr: String,
    /// 포트
    pub port: u16,
    /// 스크레이프 경로
    pub endpoint: String,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            listen_addr: "127.0.0.1".to_owned(),
            port: 9105,
            endpoint: "/metrics".to_owned(),
        }
    }
}

/// 감시 대상 로그 파일
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileSourceConfig {
    /// 파일 경로 (소스 식별자로도 쓰임)
    pub path: String,
    /// 이 파일에 적용할 규칙 (설정 순서대로 평가)
    #[serde(default, rename = "rule")]
    pub rules: Vec<RuleConfig>,
}

/// 감시 대상 systemd journal 필터
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JournalSourceConfig {
    /// 소스 식별자
    #[serde(default = "default_journal_name")]
    pub name: String,
    /// journal 필드 일치 조건 (예: `_SYSTEMD_UNIT = "sshd.service"`)
    #[serde(default)]
    pub matches: BTreeMap<String, String>,
    /// 이 journal 스트림에 적용할 규칙
    #[serde(default, rename = "rule")]
    pub rules: Vec<RuleConfig>,
}

fn default_journal_name() -> String {
    "journal".to_owned()
}

/// 반응 규칙 설정
///
/// ```toml
/// [[file.rule]]
/// name = "ssh-failed"
/// pattern = 'Failed password for .* from (\S+)'
/// key = '\1'
/// action = ["/usr/sbin/ipset", "add", "reactd", '\1']
/// trigger_count = 5
/// trigger_window = 600
/// reset = ["/usr/sbin/ipset", "del", "reactd", '\1']
/// reset_delay = 3600
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RuleConfig {
    /// 로그에 표시할 규칙 이름 (생략 시 `소스#순번`)
    pub name: Option<String>,
    /// 매칭할 정규식
    pub pattern: String,
    /// 카운팅 키 템플릿 (`\1` 등)
    pub key: Option<String>,
    /// 실행할 명령 템플릿 (argv)
    pub action: Vec<String>,
    /// 트리거에 필요한 발생 횟수 (0이면 매칭마다 실행)
    pub trigger_count: u32,
    /// 트리거 윈도우 (초)
    pub trigger_window: u32,
    /// 리셋 명령 템플릿 (argv)
    pub reset: Option<Vec<String>>,
    /// 리셋 지연 (초)
    pub reset_delay: u32,
    /// 템플릿에서 `\n`, `\t` 등의 특수 이스케이프를 해석하지 않음
    pub literal_templates: bool,
    /// 캡처 문자열을 셸 안전하게 작은따옴표로 감쌈
    pub shell_escape: bool,
}

impl RuleConfig {
    /// 규칙 이름을 결정합니다.
    pub fn display_name(&self, source: &str, index: usize) -> String {
        match &self.name {
            Some(name) if !name.is_empty() => name.clone(),
            _ => format!("{source}#{index}"),
        }
    }

    /// 규칙 설정의 구조적 유효성을 검증합니다.
    ///
    /// 정규식과 템플릿 컴파일은 엔진이 규칙을 만들 때 검증합니다.
    pub fn validate(&self, field: &str) -> Result<(), ReactdError> {
        if self.pattern.is_empty() {
            return Err(ConfigError::InvalidValue {
                field: format!("{field}.pattern"),
                reason: "pattern must not be empty".to_owned(),
            }
            .into());
        }

        if self.action.is_empty() || self.action[0].is_empty() {
            return Err(ConfigError::InvalidValue {
                field: format!("{field}.action"),
                reason: "action must name a program".to_owned(),
            }
            .into());
        }

        if let Some(reset) = &self.reset {
            if reset.is_empty() || reset[0].is_empty() {
                return Err(ConfigError::InvalidValue {
                    field: format!("{field}.reset"),
                    reason: "reset must name a program".to_owned(),
                }
                .into());
            }
            if self.reset_delay == 0 {
                return Err(ConfigError::InvalidValue {
                    field: format!("{field}.reset_delay"),
                    reason: "reset requires reset_delay greater than 0".to_owned(),
                }
                .into());
            }
        } else if self.reset_delay > 0 {
            warn!(field, "reset_delay set without reset command, ignoring");
        }

        if self.trigger_count == 0 && self.trigger_window > 0 {
            warn!(
                field,
                "trigger_window set without trigger_count, rule fires on every match"
            );
        }

        Ok(())
    }
}

// --- 환경변수 오버라이드 헬퍼 ---

fn override_string(target: &mut String, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        *target = val;
    }
}

fn override_bool(target: &mut bool, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.parse::<bool>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                "failed to parse bool from env var, ignoring"
            ),
        }
    }
}

fn override_u16(target: &mut u16, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.parse::<u16>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                "failed to parse u16 from env var, ignoring"
            ),
        }
    }
}

fn override_u64(target: &mut u64, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.parse::<u64>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                "failed to parse u64 from env var, ignoring"
            ),
        }
    }
}
