use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use cj_core::{ChoiceTable, CoefficientRow, CoefficientTable, Observation, Stage};
use cj_inference::{
    BridgeConfig, EncoderConfig, EncodingMode, EstimatorConfig, bridge, estimate_partworths,
};
use std::hint::black_box;

const LEVELS: [&str; 3] = ["l0", "l1", "l2"];

/// Full-factorial 3x3x3 design per respondent with a deterministic choice pattern.
fn panel(n_resp: usize) -> ChoiceTable {
    let mut rows = Vec::with_capacity(n_resp * 27);
    for r in 0..n_resp {
        for i in 0..27usize {
            let (a, b, c) = (i % 3, (i / 3) % 3, i / 9);
            let chosen = (a * 7 + b * 3 + c + r) % 5 < 2;
            rows.push(Observation {
                respondent: format!("r{r}"),
                chosen,
                levels: vec![LEVELS[a].into(), LEVELS[b].into(), LEVELS[c].into()],
            });
        }
    }
    ChoiceTable::new(vec!["speed".into(), "battery".into(), "price".into()], rows)
}

fn ratings(n_resp: usize) -> CoefficientTable {
    let rows = (0..n_resp)
        .map(|r| CoefficientRow {
            respondent: format!("r{r}"),
            values: vec![1.0 + (r % 4) as f64, 2.0, 3.0 + (r % 3) as f64, 0.5],
        })
        .collect();
    CoefficientTable::new(
        Stage::Stage2,
        vec!["speed_l1".into(), "design".into(), "battery_l1".into(), "warranty".into()],
        rows,
    )
    .unwrap()
}

fn bench_estimate_and_bridge(c: &mut Criterion) {
    let mut group = c.benchmark_group("two_stage");
    for &n in &[100usize, 1000] {
        let table = panel(n);
        let s2 = ratings(n);
        let mut cfg = EstimatorConfig::new(EncoderConfig::new(
            vec!["speed".into(), "battery".into(), "price".into()],
            EncodingMode::Reduced,
        ));

        group.bench_with_input(BenchmarkId::new("estimate_parallel", n), &n, |b, _| {
            cfg.parallel = true;
            b.iter(|| black_box(estimate_partworths(black_box(&table), Stage::Stage1, &cfg)).unwrap())
        });
        group.bench_with_input(BenchmarkId::new("estimate_sequential", n), &n, |b, _| {
            cfg.parallel = false;
            b.iter(|| black_box(estimate_partworths(black_box(&table), Stage::Stage1, &cfg)).unwrap())
        });

        let s1 = estimate_partworths(&table, Stage::Stage1, &cfg).unwrap().coefficient_table().unwrap();
        let bcfg = BridgeConfig::new("speed_l1", "battery_l1");
        group.bench_with_input(BenchmarkId::new("bridge", n), &n, |b, _| {
            b.iter(|| black_box(bridge(black_box(&s1), black_box(&s2), &bcfg)).unwrap())
        });
    }
    group.finish();
}

criterion_group!(benches, bench_estimate_and_bridge);
criterion_main!(benches);
