//! 에러 타입 — 도메인별 에러 정의

/// reactd 최상위 에러 타입
#[derive(Debug, thiserror::Error)]
pub enum ReactdError {
    /// 설정 관련 에러
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    /// 반응 규칙 구성 에러 (정규식, 템플릿 등)
    #[error("rule error: {0}")]
    Rule(#[from] RuleError),

    /// 로그 소스 에러 (파일 tail, journal)
    #[error("source error: {0}")]
    Source(#[from] SourceError),

    /// I/O 에러
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// 설정 관련 에러
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// 설정 파일을 찾을 수 없음
    #[error("config file not found: {path}")]
    FileNotFound { path: String },

    /// 설정 파싱 실패
    #[error("failed to parse config: {reason}")]
    ParseFailed { reason: String },

    /// 유효하지 않은 설정 값
    #[error("invalid config value for '{field}': {reason}")]
    InvalidValue { field: String, reason: String },
}

/// 반응 규칙 구성 에러
///
/// 시작 시점에만 발생하며, 발생하면 데몬 시작이 중단됩니다.
#[derive(Debug, thiserror::Error)]
pub enum RuleError {
    /// 정규식 컴파일 실패
    #[error("rule '{rule}': invalid pattern: {reason}")]
    Pattern { rule: String, reason: String },

    /// 치환 템플릿 컴파일 실패
    #[error("rule '{rule}': invalid template in {field}: {reason}")]
    Template {
        rule: String,
        field: String,
        reason: String,
    },

    /// 그 밖의 규칙 구성 오류
    #[error("rule '{rule}': {reason}")]
    Invalid { rule: String, reason: String },
}

/// 로그 소스 에러
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    /// 알 수 없는 소스 식별자
    #[error("unknown source: {0}")]
    Unknown(String),

    /// 소스 읽기 실패
    #[error("failed to read {source_name}: {reason}")]
    Read { source_name: String, reason: String },
}
