//! 엔진 에러 타입
//!
//! [`EngineError`]는 엔진 내부에서 발생하는 모든 에러를 표현합니다.
//! `From<EngineError> for ReactdError` 변환이 구현되어 있어
//! 상위 레이어에서 `?` 연산자로 전파할 수 있습니다.

use reactd_core::error::{ReactdError, RuleError, SourceError};

/// 치환 템플릿 컴파일 에러
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TemplateError {
    /// 역참조 번호가 `usize` 범위를 넘음
    #[error("backreference \\{digits} at offset {offset} is too large")]
    BackreferenceOverflow {
        /// 원문 숫자열
        digits: String,
        /// 템플릿 내 바이트 오프셋
        offset: usize,
    },
}

/// 반응 엔진 도메인 에러
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// 정규식 컴파일 실패
    #[error("rule '{rule}': pattern compile error: {source}")]
    PatternCompile {
        /// 규칙 이름
        rule: String,
        /// 원인
        #[source]
        source: regex::Error,
    },

    /// 템플릿 컴파일 실패
    #[error("rule '{rule}': template compile error in {field}: {source}")]
    TemplateCompile {
        /// 규칙 이름
        rule: String,
        /// 문제가 된 설정 필드 (`key`, `action[2]` 등)
        field: String,
        /// 원인
        #[source]
        source: TemplateError,
    },

    /// 링 버퍼 용량이 0
    #[error("ring buffer capacity must be greater than 0")]
    ZeroCapacity,

    /// 실행 요청을 만들 수 없음 (렌더링된 프로그램 경로가 비어 있음 등)
    #[error("rule '{rule}': cannot build {kind} request: {reason}")]
    ActionBuild {
        /// 규칙 이름
        rule: String,
        /// `action` 또는 `reset`
        kind: &'static str,
        /// 사유
        reason: String,
    },

    /// 규칙 구성 오류
    #[error("rule '{rule}': {reason}")]
    InvalidRule {
        /// 규칙 이름
        rule: String,
        /// 사유
        reason: String,
    },

    /// 등록되지 않은 소스에서 들어온 라인
    #[error("unknown source: {0}")]
    UnknownSource(String),

    /// 같은 이름의 소스를 두 번 등록
    #[error("duplicate source: {0}")]
    DuplicateSource(String),
}

impl From<EngineError> for ReactdError {
    fn from(err: EngineError) -> Self {
        match err {
            EngineError::PatternCompile { rule, source } => ReactdError::Rule(RuleError::Pattern {
                rule,
                reason: source.to_string(),
            }),
            EngineError::TemplateCompile {
                rule,
                field,
                source,
            } => ReactdError::Rule(RuleError::Template {
                rule,
                field,
                reason: source.to_string(),
            }),
            EngineError::ActionBuild { rule, reason, .. }
            | EngineError::InvalidRule { rule, reason } => {
                ReactdError::Rule(RuleError::Invalid { rule, reason })
            }
            EngineError::ZeroCapacity => ReactdError::Rule(RuleError::Invalid {
                rule: String::new(),
                reason: "ring buffer capacity must be greater than 0".to_owned(),
            }),
            EngineError::UnknownSource(name) => ReactdError::Source(SourceError::Unknown(name)),
            EngineError::DuplicateSource(name) => ReactdError::Rule(RuleError::Invalid {
                rule: name,
                reason: "duplicate source".to_owned(),
            }),
        }
    }
}
