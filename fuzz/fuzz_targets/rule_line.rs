#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use reactd_core::config::RuleConfig;
use reactd_core::runtime::ActionExecutor;
use reactd_core::types::ActionRequest;
use reactd_engine::ReactionEngine;

struct NullExecutor;

impl ActionExecutor for NullExecutor {
    fn name(&self) -> &str {
        "null"
    }

    fn execute(&self, _request: &ActionRequest) -> bool {
        true
    }
}

/// 퍼저용 구조적 입력
#[derive(Arbitrary, Debug)]
struct FuzzInput {
    pattern: String,
    key: Option<String>,
    action: Vec<String>,
    trigger_count: u8,
    trigger_window: u16,
    reset: Option<Vec<String>>,
    reset_delay: u16,
    shell_escape: bool,
    /// (라인, 직전 라인 이후 경과 초)
    lines: Vec<(String, u8)>,
}

fuzz_target!(|input: FuzzInput| {
    // 정규식 컴파일 비용 제한
    if input.pattern.len() > 256 {
        return;
    }

    let rule = RuleConfig {
        name: Some("fuzz".to_owned()),
        pattern: input.pattern,
        key: input.key,
        action: input.action.into_iter().take(8).collect(),
        trigger_count: u32::from(input.trigger_count),
        trigger_window: u32::from(input.trigger_window),
        reset: input.reset.map(|r| r.into_iter().take(8).collect()),
        reset_delay: u32::from(input.reset_delay),
        shell_escape: input.shell_escape,
        ..RuleConfig::default()
    };

    let mut engine = ReactionEngine::new(NullExecutor, "REACT");
    if engine.add_source("fuzz", &[rule]).is_err() {
        return;
    }

    let mut now = 0u64;
    for (line, delta) in input.lines.iter().take(64) {
        now += u64::from(*delta);
        let _ = engine.on_line("fuzz", line, now);
        engine.on_tick(now);

        // 만료 목록은 항상 정렬 상태를 유지해야 함
        let deadlines: Vec<u64> = engine.pending_resets().map(|(d, _)| d).collect();
        assert!(deadlines.windows(2).all(|w| w[0] <= w[1]));
    }

    engine.shutdown();
    assert_eq!(engine.stats().pending_resets, 0);
    assert_eq!(engine.stats().tracked_keys, 0);
});
