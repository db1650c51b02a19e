//! 역참조 치환 템플릿
//!
//! 규칙의 `key`, `action`, `reset` 문자열은 시작 시 [`Template`]으로 한 번
//! 컴파일되고, 매칭될 때마다 캡처 범위로 렌더링됩니다.
//!
//! # 문법
//! - `\N` (N은 십진수): N번 캡처 그룹 (`\0`은 전체 매치)
//! - `\\`, `\n`, `\r`, `\t`, `\e`, `\a`, `\f`: 제어 문자
//!   (`no_special_escapes`이면 해석하지 않음)
//! - 알 수 없는 이스케이프는 백슬래시만 제거 (`\q` → `q`), 끝의 `\`는 제거
//!   (`no_special_escapes`이면 `\N` 외의 백슬래시는 그대로 유지)
//! - 그 밖의 모든 문자는 그대로 유지
//!
//! ```
//! use reactd_engine::template::{RenderOptions, Template};
//!
//! let tpl = Template::compile(r"ban \1", false).unwrap();
//! let out = tpl.render("host 10.0.0.1", &[Some(0..13), Some(5..13)], RenderOptions::default());
//! assert_eq!(out, "ban 10.0.0.1");
//! ```

use std::fmt;
use std::ops::Range;

use regex::Captures;

use crate::error::TemplateError;

/// 템플릿 구성 요소
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    /// 그대로 출력되는 문자열
    Literal(String),
    /// 캡처 그룹 번호
    Backreference(usize),
}

/// 렌더링 옵션
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RenderOptions {
    /// 치환된 캡처를 작은따옴표로 감싸 셸 인자로 안전하게 만듦
    pub shell_escape: bool,
}

/// 컴파일된 치환 템플릿
///
/// 컴파일 후에는 불변이며, 인접한 두 `Literal`이 존재하지 않습니다.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Template {
    source: String,
    segments: Vec<Segment>,
}

impl Template {
    /// 템플릿 문자열을 컴파일합니다.
    pub fn compile(source: &str, no_special_escapes: bool) -> Result<Self, TemplateError> {
        let mut segments = Vec::new();
        let mut literal = String::new();
        let mut chars = source.char_indices().peekable();

        while let Some((offset, ch)) = chars.next() {
            if ch != '\\' {
                literal.push(ch);
                continue;
            }

            match chars.peek().map(|&(_, next)| next) {
                Some(next) if next.is_ascii_digit() => {
                    let mut digits = String::new();
                    while let Some(&(_, d)) = chars.peek() {
                        if !d.is_ascii_digit() {
                            break;
                        }
                        digits.push(d);
                        chars.next();
                    }
                    let index = digits
                        .parse::<usize>()
                        .map_err(|_| TemplateError::BackreferenceOverflow { digits, offset })?;
                    flush_literal(&mut segments, &mut literal);
                    segments.push(Segment::Backreference(index));
                }
                _ if no_special_escapes => literal.push('\\'),
                Some(next) => {
                    if let Some(ctrl) = control_char(next) {
                        literal.push(ctrl);
                        chars.next();
                    }
                }
                None => {}
            }
        }
        flush_literal(&mut segments, &mut literal);

        Ok(Self {
            source: source.to_owned(),
            segments,
        })
    }

    /// 캡처 범위로 템플릿을 렌더링합니다.
    ///
    /// `captures[n]`이 `None`이거나 `n`이 범위를 벗어나면 해당 역참조는
    /// 조용히 생략됩니다.
    pub fn render(
        &self,
        subject: &str,
        captures: &[Option<Range<usize>>],
        options: RenderOptions,
    ) -> String {
        let mut out = String::with_capacity(self.source.len() + subject.len());
        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => out.push_str(text),
                Segment::Backreference(n) => {
                    let Some(text) = captures
                        .get(*n)
                        .and_then(Option::as_ref)
                        .and_then(|range| subject.get(range.clone()))
                    else {
                        continue;
                    };
                    if options.shell_escape {
                        push_shell_quoted(&mut out, text);
                    } else {
                        out.push_str(text);
                    }
                }
            }
        }
        out
    }

    /// 템플릿이 참조하는 가장 큰 캡처 그룹 번호
    pub fn max_backreference(&self) -> Option<usize> {
        self.segments
            .iter()
            .filter_map(|s| match s {
                Segment::Backreference(n) => Some(*n),
                Segment::Literal(_) => None,
            })
            .max()
    }

    /// 컴파일된 구성 요소
    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// 원본 템플릿 문자열
    pub fn source(&self) -> &str {
        &self.source
    }
}

impl fmt::Display for Template {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

/// `regex::Captures`를 렌더링용 범위 목록으로 변환합니다.
pub fn capture_spans(captures: &Captures<'_>) -> Vec<Option<Range<usize>>> {
    captures.iter().map(|m| m.map(|m| m.range())).collect()
}

fn flush_literal(segments: &mut Vec<Segment>, literal: &mut String) {
    if !literal.is_empty() {
        segments.push(Segment::Literal(std::mem::take(literal)));
    }
}

fn control_char(escape: char) -> Option<char> {
    match escape {
        '\\' => Some('\\'),
        'n' => Some('\n'),
        'r' => Some('\r'),
        't' => Some('\t'),
        'e' => Some('\x1b'),
        'a' => Some('\x07'),
        'f' => Some('\x0c'),
        _ => None,
    }
}

fn push_shell_quoted(out: &mut String, text: &str) {
    out.push('\'');
    for ch in text.chars() {
        if ch == '\'' {
            out.push_str("'\"'\"'");
        } else {
            out.push(ch);
        }
    }
    out.push('\'');
}

#[cfg(test)]
mod tests {
    use super::*;
    use regex::Regex;

    fn lit(s: &str) -> Segment {
        Segment::Literal(s.to_owned())
    }

    #[test]
    fn backreference_between_literals() {
        let tpl = Template::compile(r"a\1b", false).unwrap();
        assert_eq!(
            tpl.segments(),
            &[lit("a"), Segment::Backreference(1), lit("b")]
        );
        let out = tpl.render("xQy", &[Some(0..3), Some(1..2)], RenderOptions::default());
        assert_eq!(out, "aQb");
    }

    #[test]
    fn multi_digit_backreference() {
        let tpl = Template::compile(r"\12x", false).unwrap();
        assert_eq!(tpl.segments(), &[Segment::Backreference(12), lit("x")]);
        assert_eq!(tpl.max_backreference(), Some(12));
    }

    #[test]
    fn escaped_backslash_becomes_single() {
        let tpl = Template::compile(r"a\\b", false).unwrap();
        assert_eq!(tpl.segments(), &[lit(r"a\b")]);
        assert_eq!(tpl.render("", &[], RenderOptions::default()), r"a\b");
    }

    #[test]
    fn escaped_backslash_before_digit_is_literal() {
        let tpl = Template::compile(r"\\1", false).unwrap();
        assert_eq!(tpl.segments(), &[lit(r"\1")]);
    }

    #[test]
    fn control_escapes_are_coalesced() {
        let tpl = Template::compile(r"a\tb\nc\e", false).unwrap();
        assert_eq!(tpl.segments(), &[lit("a\tb\nc\x1b")]);
    }

    #[test]
    fn no_special_escapes_keeps_text() {
        let tpl = Template::compile(r"a\tb\\c\1", true).unwrap();
        assert_eq!(
            tpl.segments(),
            &[lit(r"a\tb\\c"), Segment::Backreference(1)]
        );
    }

    #[test]
    fn unknown_escape_and_trailing_backslash_drop_backslash() {
        let tpl = Template::compile(r"a\qb\", false).unwrap();
        assert_eq!(tpl.segments(), &[lit("aqb")]);

        let tpl = Template::compile(r"\.\1", false).unwrap();
        assert_eq!(tpl.segments(), &[lit("."), Segment::Backreference(1)]);
    }

    #[test]
    fn no_special_escapes_keeps_unknown_and_trailing_backslash() {
        let tpl = Template::compile(r"a\qb\", true).unwrap();
        assert_eq!(tpl.segments(), &[lit(r"a\qb\")]);
    }

    #[test]
    fn overflowing_backreference_is_rejected() {
        let err = Template::compile(r"id=\99999999999999999999999999", false).unwrap_err();
        assert!(matches!(
            err,
            TemplateError::BackreferenceOverflow { offset: 3, .. }
        ));
    }

    #[test]
    fn missing_or_unmatched_groups_are_skipped() {
        let tpl = Template::compile(r"[\1|\2|\7]", false).unwrap();
        let out = tpl.render("abc", &[Some(0..3), Some(0..1), None], RenderOptions::default());
        assert_eq!(out, "[a||]");
    }

    #[test]
    fn empty_template_renders_empty() {
        let tpl = Template::compile("", false).unwrap();
        assert!(tpl.segments().is_empty());
        assert_eq!(tpl.max_backreference(), None);
        assert_eq!(tpl.render("x", &[Some(0..1)], RenderOptions::default()), "");
    }

    #[test]
    fn shell_escape_wraps_and_rewrites_quotes() {
        let tpl = Template::compile(r"echo \1", false).unwrap();
        let subject = "it's";
        let out = tpl.render(
            subject,
            &[Some(0..4), Some(0..4)],
            RenderOptions { shell_escape: true },
        );
        assert_eq!(out, r#"echo 'it'"'"'s'"#);
    }

    #[test]
    fn shell_escape_leaves_literals_alone() {
        let tpl = Template::compile("it's", false).unwrap();
        let out = tpl.render("", &[], RenderOptions { shell_escape: true });
        assert_eq!(out, "it's");
    }

    #[test]
    fn render_is_repeatable() {
        let tpl = Template::compile(r"\0-\1", false).unwrap();
        let first = tpl.render("ab", &[Some(0..2), Some(1..2)], RenderOptions::default());
        let second = tpl.render("ab", &[Some(0..2), Some(1..2)], RenderOptions::default());
        assert_eq!(first, "ab-b");
        assert_eq!(first, second);
    }

    #[test]
    fn capture_spans_follow_regex_groups() {
        let re = Regex::new(r"from (\S+)(?: port (\d+))?").unwrap();
        let line = "Failed password from 10.0.0.1";
        let caps = re.captures(line).unwrap();
        let spans = capture_spans(&caps);
        assert_eq!(spans.len(), 3);
        assert_eq!(spans[2], None);

        let tpl = Template::compile(r"\1:\2", false).unwrap();
        assert_eq!(tpl.render(line, &spans, RenderOptions::default()), "10.0.0.1:");
    }

    #[test]
    fn display_prints_source_form() {
        let tpl = Template::compile(r"ban \1\n", false).unwrap();
        assert_eq!(tpl.to_string(), r"ban \1\n");
    }

    #[test]
    fn multibyte_text_survives() {
        let tpl = Template::compile(r"차단 \1 ✓", false).unwrap();
        let subject = "호스트 가";
        let out = tpl.render(
            subject,
            &[Some(0..subject.len()), Some(10..13)],
            RenderOptions::default(),
        );
        assert_eq!(out, "차단 가 ✓");
    }
}
