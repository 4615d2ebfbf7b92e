//! Scoring benchmark: reading → probability → level.

use chrono::Utc;
use criterion::{black_box, criterion_group, criterion_main, Criterion};
use minewatch_agent::config::RiskConfig;
use minewatch_agent::features::{normalize, Feature, SensorReading};
use minewatch_agent::risk::{classify, score, RiskEngine};

fn sample_reading() -> SensorReading {
    SensorReading::zeroed("bench", Utc::now())
        .with(Feature::Displacement, 15.0)
        .with(Feature::Strain, 400.0)
        .with(Feature::PorePressure, 80.0)
        .with(Feature::Rainfall, 90.0)
        .with(Feature::Temperature, 38.0)
        .with(Feature::Slope, 70.0)
        .with(Feature::CrackScore, 8.0)
}

fn bench_score(c: &mut Criterion) {
    let reading = sample_reading();
    c.bench_function("score_single_reading", |b| b.iter(|| score(black_box(&reading))));
    c.bench_function("normalize_single_reading", |b| b.iter(|| normalize(black_box(&reading))));
}

fn bench_classify(c: &mut Criterion) {
    c.bench_function("classify_sweep_1000", |b| {
        b.iter(|| {
            for i in 0..1000 {
                black_box(classify(black_box(i as f64 / 1000.0)));
            }
        })
    });
}

fn bench_assess(c: &mut Criterion) {
    let engine = RiskEngine::new(RiskConfig::default());
    let reading = sample_reading();
    c.bench_function("assess_with_contributions", |b| {
        b.iter(|| black_box(engine.assess(black_box(&reading))))
    });
}

criterion_group!(benches, bench_score, bench_classify, bench_assess);
criterion_main!(benches);
