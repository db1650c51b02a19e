//! 반응 규칙 -- 정규식 매칭, 키별 발생 카운팅, 트리거 판정
//!
//! [`ReactionRule`]은 설정의 [`RuleConfig`] 하나를 컴파일한 결과입니다.
//! 정규식과 템플릿은 생성 시 한 번만 컴파일하고, 키별 발생 윈도우
//! ([`HitTracker`])를 소유합니다.
//!
//! # 트리거 조건
//! `trigger_count > 0`인 규칙은 키별로 최근 `trigger_count`개의 발생 시각을
//! 보관하고, 윈도우가 가득 찼고 `newest - oldest <= trigger_window`이면
//! 트리거합니다. 판정은 삽입마다 다시 이루어지므로, 만료 전에 조건을 다시
//! 만족하면 다시 트리거합니다. `trigger_count == 0`이면 매칭마다 트리거합니다.

use std::ops::Range;

use regex::Regex;
use tracing::warn;

use reactd_core::config::RuleConfig;
use reactd_core::types::{ActionRequest, Timestamp};

use crate::error::EngineError;
use crate::hits::HitTracker;
use crate::template::{RenderOptions, Template, capture_spans};

/// 키 템플릿이 없는 규칙이 공유하는 카운터 키
pub const KEYLESS: &str = "";

/// 한 라인에 대한 규칙 평가 결과
///
/// 발생이 기록된 뒤 요청 생성에 실패하면 `tracked_key`는 채워진 채로
/// `build_error`가 설정됩니다. 호출자는 이 경우에도 키의 만료를 예약해야 합니다.
#[derive(Debug, Default)]
pub struct Evaluation {
    /// 정규식 매칭 여부
    pub matched: bool,
    /// 발생이 기록된 키 (만료 예약 대상)
    pub tracked_key: Option<String>,
    /// 트리거되었으면 실행할 요청
    pub trigger: Option<Trigger>,
    /// 트리거되었지만 요청을 만들지 못한 경우의 에러
    pub build_error: Option<EngineError>,
}

/// 트리거 결과
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Trigger {
    /// 렌더링된 키 (키 템플릿이 없으면 `None`)
    pub key: Option<String>,
    /// 즉시 실행할 명령
    pub action: ActionRequest,
    /// `reset_delay` 후 실행할 명령
    pub reset: Option<ActionRequest>,
}

/// 컴파일된 반응 규칙
#[derive(Debug)]
pub struct ReactionRule {
    name: String,
    pattern: Regex,
    key: Option<Template>,
    action: Vec<Template>,
    trigger_count: usize,
    trigger_window: u64,
    reset: Option<Vec<Template>>,
    reset_delay: u64,
    render: RenderOptions,
    hits: HitTracker,
}

impl ReactionRule {
    /// 설정에서 규칙을 만듭니다.
    ///
    /// `source`와 `index`는 이름이 없는 규칙의 표시 이름에 사용됩니다.
    pub fn from_config(
        source: &str,
        index: usize,
        config: &RuleConfig,
    ) -> Result<Self, EngineError> {
        let name = config.display_name(source, index);

        let pattern = Regex::new(&config.pattern).map_err(|e| EngineError::PatternCompile {
            rule: name.clone(),
            source: e,
        })?;

        if config.action.is_empty() {
            return Err(EngineError::InvalidRule {
                rule: name,
                reason: "action must name a program".to_owned(),
            });
        }

        let literal = config.literal_templates;
        let compile = |field: String, text: &str| {
            Template::compile(text, literal).map_err(|e| EngineError::TemplateCompile {
                rule: name.clone(),
                field,
                source: e,
            })
        };

        let key = config
            .key
            .as_deref()
            .map(|text| compile("key".to_owned(), text))
            .transpose()?;
        let action = config
            .action
            .iter()
            .enumerate()
            .map(|(i, text)| compile(format!("action[{i}]"), text))
            .collect::<Result<Vec<_>, _>>()?;

        // reset_delay 없는 reset은 실행되지 않으므로 무시
        let reset = match &config.reset {
            Some(argv) if config.reset_delay > 0 && !argv.is_empty() => Some(
                argv.iter()
                    .enumerate()
                    .map(|(i, text)| compile(format!("reset[{i}]"), text))
                    .collect::<Result<Vec<_>, _>>()?,
            ),
            _ => None,
        };

        let rule = Self {
            name,
            pattern,
            key,
            action,
            trigger_count: usize::try_from(config.trigger_count).unwrap_or(usize::MAX),
            trigger_window: u64::from(config.trigger_window),
            reset,
            reset_delay: u64::from(config.reset_delay),
            render: RenderOptions {
                shell_escape: config.shell_escape,
            },
            hits: HitTracker::new(),
        };
        rule.warn_unknown_groups();
        Ok(rule)
    }

    /// 라인을 평가합니다.
    ///
    /// `env_prefix`와 `source`는 실행 요청의 환경변수를 만드는 데 쓰입니다.
    pub fn evaluate(
        &mut self,
        line: &str,
        now: Timestamp,
        source: &str,
        env_prefix: &str,
    ) -> Result<Evaluation, EngineError> {
        let Some(caps) = self.pattern.captures(line) else {
            return Ok(Evaluation::default());
        };
        let spans = capture_spans(&caps);

        let key = self
            .key
            .as_ref()
            .map(|tpl| tpl.render(line, &spans, RenderOptions::default()));

        let mut evaluation = Evaluation {
            matched: true,
            ..Evaluation::default()
        };

        if self.trigger_count > 0 {
            let counter_key = key.as_deref().unwrap_or(KEYLESS);
            let (ring, _) = self.hits.find_or_create(counter_key, self.trigger_count)?;
            ring.put(now);
            let fired = ring.is_full() && ring.span().is_some_and(|s| s <= self.trigger_window);
            evaluation.tracked_key = Some(counter_key.to_owned());
            if !fired {
                return Ok(evaluation);
            }
        }

        let env = build_env(env_prefix, line, &spans, key.as_deref(), source);
        match self.build_trigger(key, line, &spans, &env) {
            Ok(trigger) => evaluation.trigger = Some(trigger),
            Err(e) => evaluation.build_error = Some(e),
        }
        Ok(evaluation)
    }

    fn build_trigger(
        &self,
        key: Option<String>,
        line: &str,
        spans: &[Option<Range<usize>>],
        env: &[(String, String)],
    ) -> Result<Trigger, EngineError> {
        let action = self.build_request("action", &self.action, line, spans, env)?;
        let reset = match &self.reset {
            Some(templates) => Some(self.build_request("reset", templates, line, spans, env)?),
            None => None,
        };
        Ok(Trigger { key, action, reset })
    }

    /// 만료된 키의 발생 윈도우를 삭제합니다.
    pub fn expire_key(&mut self, key: &str) -> bool {
        self.hits.delete(key).is_some()
    }

    /// 모든 발생 윈도우를 삭제하고 삭제한 수를 반환합니다.
    pub fn clear_hits(&mut self) -> usize {
        self.hits.clear()
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn pattern(&self) -> &Regex {
        &self.pattern
    }

    pub fn trigger_count(&self) -> usize {
        self.trigger_count
    }

    /// 키별 윈도우의 만료 지연 (초)
    pub fn trigger_window(&self) -> u64 {
        self.trigger_window
    }

    /// 리셋 지연 (초). 리셋이 없으면 `None`입니다.
    pub fn reset_delay(&self) -> Option<u64> {
        self.reset.as_ref().map(|_| self.reset_delay)
    }

    pub fn hits(&self) -> &HitTracker {
        &self.hits
    }

    fn build_request(
        &self,
        kind: &'static str,
        templates: &[Template],
        line: &str,
        spans: &[Option<Range<usize>>],
        env: &[(String, String)],
    ) -> Result<ActionRequest, EngineError> {
        let argv: Vec<String> = templates
            .iter()
            .map(|tpl| tpl.render(line, spans, self.render))
            .collect();

        if argv.first().is_none_or(|program| program.is_empty()) {
            return Err(EngineError::ActionBuild {
                rule: self.name.clone(),
                kind,
                reason: "rendered program path is empty".to_owned(),
            });
        }

        Ok(ActionRequest {
            argv,
            env: env.to_vec(),
        })
    }

    fn warn_unknown_groups(&self) {
        let highest_group = self.pattern.captures_len().saturating_sub(1);
        let templates = self
            .key
            .iter()
            .chain(self.action.iter())
            .chain(self.reset.iter().flatten());
        for tpl in templates {
            let Some(n) = tpl.max_backreference() else {
                continue;
            };
            if n > highest_group {
                warn!(
                    rule = %self.name,
                    template = %tpl,
                    group = n,
                    groups = highest_group,
                    "template references a capture group the pattern does not have"
                );
            }
        }
    }
}

/// 자식 프로세스 환경변수를 만듭니다.
///
/// 매칭된 그룹마다 `<PREFIX>_<n>`, 키가 있으면 `<PREFIX>_KEY`,
/// 그리고 `<PREFIX>_SOURCE`를 추가합니다.
fn build_env(
    prefix: &str,
    line: &str,
    spans: &[Option<Range<usize>>],
    key: Option<&str>,
    source: &str,
) -> Vec<(String, String)> {
    let mut env = Vec::with_capacity(spans.len() + 2);
    for (n, span) in spans.iter().enumerate() {
        if let Some(text) = span.as_ref().and_then(|r| line.get(r.clone())) {
            env.push((format!("{prefix}_{n}"), text.to_owned()));
        }
    }
    if let Some(key) = key {
        env.push((format!("{prefix}_KEY"), key.to_owned()));
    }
    env.push((format!("{prefix}_SOURCE"), source.to_owned()));
    env
}
