//! 반응 엔진 벤치마크
//!
//! 라인 평가, 템플릿 렌더링, 만료 목록 갱신 성능과 규칙 수에 따른 스케일링을
//! 측정합니다.

use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};
use reactd_core::config::RuleConfig;
use reactd_core::runtime::ActionExecutor;
use reactd_core::types::ActionRequest;
use reactd_engine::template::{RenderOptions, Template};
use reactd_engine::{DedupExpiryList, ReactionEngine};

struct NullExecutor;

impl ActionExecutor for NullExecutor {
    fn name(&self) -> &str {
        "null"
    }

    fn execute(&self, _request: &ActionRequest) -> bool {
        true
    }
}

const LINE: &str = "Jan 12 10:11:12 host sshd[4242]: Failed password for root from 192.168.1.100 port 51234 ssh2";

fn ssh_rule(id: usize, trigger_count: u32) -> RuleConfig {
    RuleConfig {
        name: Some(format!("rule-{id}")),
        pattern: r"Failed password for (\S+) from (\S+) port (\d+)".to_owned(),
        key: Some(r"\2".to_owned()),
        action: vec![
            "/usr/sbin/ipset".to_owned(),
            "add".to_owned(),
            "ban".to_owned(),
            r"\2".to_owned(),
        ],
        trigger_count,
        trigger_window: 600,
        ..RuleConfig::default()
    }
}

fn miss_rule(id: usize) -> RuleConfig {
    RuleConfig {
        name: Some(format!("miss-{id}")),
        pattern: r"Invalid user (\S+) from (\S+)".to_owned(),
        action: vec!["/bin/true".to_owned()],
        ..RuleConfig::default()
    }
}

fn bench_line_evaluation(c: &mut Criterion) {
    let mut group = c.benchmark_group("on_line");
    group.throughput(Throughput::Elements(1));

    let mut counting = ReactionEngine::new(NullExecutor, "REACT");
    counting.add_source("auth", &[ssh_rule(0, 1_000_000)]).unwrap();
    let mut now = 0u64;
    group.bench_function("counting_match", |b| {
        b.iter(|| {
            now += 1;
            counting.on_line("auth", black_box(LINE), now).unwrap()
        })
    });

    let mut stateless = ReactionEngine::new(NullExecutor, "REACT");
    stateless.add_source("auth", &[ssh_rule(0, 0)]).unwrap();
    group.bench_function("stateless_trigger", |b| {
        b.iter(|| stateless.on_line("auth", black_box(LINE), 0).unwrap())
    });

    let mut missing = ReactionEngine::new(NullExecutor, "REACT");
    missing.add_source("auth", &[miss_rule(0)]).unwrap();
    group.bench_function("no_match", |b| {
        b.iter(|| missing.on_line("auth", black_box(LINE), 0).unwrap())
    });

    group.finish();
}

fn bench_rules_scaling(c: &mut Criterion) {
    let mut group = c.benchmark_group("rules_scaling");

    for rule_count in [1usize, 10, 100] {
        let rules: Vec<RuleConfig> = (0..rule_count)
            .map(|i| {
                if i % 2 == 0 {
                    miss_rule(i)
                } else {
                    ssh_rule(i, 1_000_000)
                }
            })
            .collect();
        let mut engine = ReactionEngine::new(NullExecutor, "REACT");
        engine.add_source("auth", &rules).unwrap();

        group.throughput(Throughput::Elements(1));
        group.bench_with_input(
            BenchmarkId::new("rules", rule_count),
            &rule_count,
            |b, _| b.iter(|| engine.on_line("auth", black_box(LINE), 0).unwrap()),
        );
    }

    group.finish();
}

fn bench_template_render(c: &mut Criterion) {
    let tpl = Template::compile(r"ban \2 user=\1 port=\3\n", false).unwrap();
    let spans = vec![
        Some(0..LINE.len()),
        Some(54..58),
        Some(64..77),
        Some(83..88),
    ];

    let mut group = c.benchmark_group("template");
    group.bench_function("compile", |b| {
        b.iter(|| Template::compile(black_box(r"ban \2 user=\1 port=\3\n"), false).unwrap())
    });
    group.bench_function("render", |b| {
        b.iter(|| tpl.render(black_box(LINE), &spans, RenderOptions::default()))
    });
    group.bench_function("render_shell_escaped", |b| {
        b.iter(|| {
            tpl.render(
                black_box(LINE),
                &spans,
                RenderOptions { shell_escape: true },
            )
        })
    });
    group.finish();
}

fn bench_expiry_upsert(c: &mut Criterion) {
    let mut group = c.benchmark_group("expiry");

    for keys in [10usize, 1_000] {
        group.bench_with_input(BenchmarkId::new("upsert", keys), &keys, |b, &keys| {
            let mut list = DedupExpiryList::new();
            for k in 0..keys {
                list.upsert(k, 0, 600);
            }
            let mut now = 0u64;
            b.iter(|| {
                now += 1;
                list.upsert(black_box(now as usize % keys), now, 600)
            })
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_line_evaluation,
    bench_rules_scaling,
    bench_template_render,
    bench_expiry_upsert,
);
criterion_main!(benches);
