#![no_main]

use std::ops::Range;

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use reactd_engine::template::{RenderOptions, Template};

/// 퍼저용 구조적 입력
#[derive(Arbitrary, Debug)]
struct FuzzInput {
    template: String,
    no_special_escapes: bool,
    shell_escape: bool,
    subject: String,
    /// 캡처 범위 (범위 밖이거나 문자 경계가 아니어도 패닉하면 안 됨)
    spans: Vec<Option<(u16, u16)>>,
}

fuzz_target!(|input: FuzzInput| {
    let Ok(template) = Template::compile(&input.template, input.no_special_escapes) else {
        return;
    };

    let spans: Vec<Option<Range<usize>>> = input
        .spans
        .iter()
        .take(16)
        .map(|s| s.map(|(a, b)| usize::from(a)..usize::from(b)))
        .collect();

    let rendered = template.render(
        &input.subject,
        &spans,
        RenderOptions {
            shell_escape: input.shell_escape,
        },
    );

    // 역참조가 없고 이스케이프를 끄면 출력은 원문 그대로
    if input.no_special_escapes && template.max_backreference().is_none() && !input.shell_escape {
        assert_eq!(rendered, input.template);
    }
});
