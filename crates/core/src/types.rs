//! 도메인 타입 — 모듈 간 공유되는 기본 데이터 구조

use std::fmt;

/// 초 단위 Unix 타임스탬프
///
/// 엔진은 1초 해상도로 동작합니다. 트리거 윈도우, 리셋 지연, 만료 시각이
/// 모두 이 단위를 사용합니다.
pub type Timestamp = u64;

/// 로그 소스에서 읽어 온 한 줄
///
/// 파일 tail 태스크와 journal 리더가 생성하고, 이벤트 루프가 소비합니다.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceLine {
    /// 소스 식별자 (파일 경로 또는 journal 이름)
    pub source: String,
    /// 줄바꿈이 제거된 로그 라인
    pub line: String,
}

impl SourceLine {
    /// 새 라인을 생성합니다.
    pub fn new(source: impl Into<String>, line: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            line: line.into(),
        }
    }
}

/// 외부 명령 실행 요청
///
/// 엔진이 렌더링한 argv와 자식 프로세스에만 추가될 환경변수 목록입니다.
/// 데몬 자신의 환경은 변경하지 않습니다.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ActionRequest {
    /// 실행할 프로그램과 인자 (argv[0] = 프로그램 경로)
    pub argv: Vec<String>,
    /// 자식 프로세스에 추가할 환경변수
    pub env: Vec<(String, String)>,
}

impl ActionRequest {
    /// 프로그램 경로를 반환합니다.
    pub fn program(&self) -> Option<&str> {
        self.argv.first().map(String::as_str)
    }

    /// 환경변수 값을 이름으로 조회합니다.
    pub fn env_var(&self, name: &str) -> Option<&str> {
        self.env
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }
}

impl fmt::Display for ActionRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.argv.join(" "))
    }
}
