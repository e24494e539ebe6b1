use criterion::{Criterion, black_box, criterion_group, criterion_main};
use decree::{CompiledRuleSet, Decision, Engine, RuleSpec};

/// Build a schema with `n` integer fields, one rule per field, and a
/// matching decision.
fn build_ruleset(n: usize) -> (CompiledRuleSet, Decision) {
    let mut schema = String::new();
    let mut specs = Vec::with_capacity(n);
    let mut decision = Decision::new();
    for i in 0..n {
        schema.push_str(&format!("f{i}: Int\n"));
        specs.push(RuleSpec::new(format!("r{i}"), format!("f{i} >= 1")));
        decision = decision.set(&format!("f{i}"), 10_i64);
    }
    let mut engine = Engine::load_schema(&schema).unwrap();
    let set = engine.compile(&specs, None).unwrap();
    (set, decision)
}

fn bench_evaluate(c: &mut Criterion) {
    let mut group = c.benchmark_group("single_eval");

    for &n in &[5, 20, 50] {
        let (set, decision) = build_ruleset(n);
        group.bench_function(format!("{n}_rules"), |b| {
            b.iter(|| set.eval_single(black_box(&decision)));
        });
    }

    group.finish();
}

fn bench_compilation(c: &mut Criterion) {
    let mut group = c.benchmark_group("compilation");

    for &n in &[5, 20, 50] {
        let mut schema = String::new();
        let mut specs = Vec::with_capacity(n);
        for i in 0..n {
            schema.push_str(&format!("f{i}: Int\n"));
            specs.push(RuleSpec::new(
                format!("r{i}"),
                format!("f{i} >= 1 and f{i} < 100"),
            ));
        }
        let mut engine = Engine::load_schema(&schema).unwrap();
        group.bench_function(format!("{n}_rules"), |b| {
            b.iter(|| black_box(engine.compile(&specs, None).unwrap()));
        });
    }

    group.finish();
}

fn bench_decision_validation(c: &mut Criterion) {
    let mut group = c.benchmark_group("validation");

    let schema = "\
struct Addr { city: Str {minLength: 1}, zip: Str {pattern: '[0-9]{5}'} }
credit_score: Int {min: 300, max: 850}
state: Str {oneOf: ['CA', 'NY', 'TX']}
addr: Addr
";
    let mut engine = Engine::load_schema(schema).unwrap();
    let set = engine
        .compile(
            &[RuleSpec::new(
                "decline",
                "credit_score < 600 and state in ['CA', 'NY']",
            )],
            None,
        )
        .unwrap();
    let decision = Decision::new()
        .set("credit_score", 580_i64)
        .set("state", "CA")
        .set("addr.city", "SF")
        .set("addr.zip", "94110");

    group.bench_function("constrained_decision", |b| {
        b.iter(|| set.eval_single(black_box(&decision)));
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_evaluate,
    bench_compilation,
    bench_decision_validation
);
criterion_main!(benches);
