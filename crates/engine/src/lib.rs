#![doc = include_str!("../README.md")]
//!
//! # 모듈 구성
//!
//! - [`ring`]: 고정 용량 링 버퍼 (키별 발생 시각 윈도우)
//! - [`template`]: `\N` 역참조 치환 템플릿 컴파일/렌더링
//! - [`expire`]: 만료 시각 순 스케줄러 (추가 전용 / 중복 제거)
//! - [`hits`]: 키별 발생 윈도우 추적기
//! - [`rule`]: 규칙 매칭과 트리거 판정
//! - [`engine`]: 소스별 규칙 평가, 명령 실행, 만료 처리
//! - [`driver`]: 이벤트 루프 대기 시간 계산
//! - [`error`]: 도메인 에러 타입
//!
//! # 아키텍처
//!
//! ```text
//! SourceLine -> ReactionEngine::on_line -> ReactionRule -> HitTracker/RingBuffer
//!                                      \-> ActionExecutor      \-> DedupExpiryList
//!                                      \-> ExpiryList (reset)
//! Driver::tick -> ExpiryList::run_expired -> ActionExecutor (reset)
//!             -> DedupExpiryList::run_expired -> HitTracker::delete
//! ```

pub mod driver;
pub mod engine;
pub mod error;
pub mod expire;
pub mod hits;
pub mod ring;
pub mod rule;
pub mod template;

// --- 주요 타입 re-export ---

// 엔진
pub use engine::{EngineStats, HitExpiry, PendingReset, ReactionEngine};

// 드라이버
pub use driver::{Driver, TickReport, next_wake};

// 규칙
pub use rule::{Evaluation, ReactionRule, Trigger};

// 자료구조
pub use expire::{DedupExpiryList, ExpiryList};
pub use hits::HitTracker;
pub use ring::RingBuffer;
pub use template::{RenderOptions, Template};

// 에러
pub use error::{EngineError, TemplateError};
