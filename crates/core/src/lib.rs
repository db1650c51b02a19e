#![doc = include_str!("../README.md")]

pub mod config;
pub mod error;
pub mod metrics;
pub mod runtime;
pub mod types;

// --- 주요 타입 re-export ---

// 에러
pub use error::{ConfigError, ReactdError, RuleError, SourceError};

// 설정
pub use config::{
    FileSourceConfig, GeneralConfig, JournalSourceConfig, MetricsConfig, ReactdConfig, RuleConfig,
};

// 런타임 협력자 trait
pub use runtime::{ActionExecutor, Clock, ManualClock, SystemClock};

// 도메인 타입
pub use types::{ActionRequest, SourceLine, Timestamp};
