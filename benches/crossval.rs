use std::hint::black_box;
use criterion::{criterion_group, criterion_main, Criterion};
use mcpa::rsa::permutation_scores;
use mcpa::{enumerate_subsets, run_mcpa, Condition, CorrelationClassifier, Dimension, LabeledTensor, McpaConfig, PatternSet};
use ndarray::{Array2, ArrayD, IxDyn};

const EVENTS: [&str; 4] = ["face", "house", "tool", "body"];

/// `[instance, feature, session, subject]`, 4 instances per event.
fn patterns(n_events: usize, n_features: usize, n_subjects: usize) -> PatternSet {
    let n_inst = 4 * n_events;
    let data = ArrayD::from_shape_fn(IxDyn(&[n_inst, n_features, 2, n_subjects]), |ix| {
        let e = (ix[0] % n_events) as f64;
        ((ix[1] as f64 + 1.0) * (e * 1.37 + 0.5)).sin() + 0.01 * ((ix[2] + 3 * ix[3]) % 7) as f64
    });
    let dims = vec![Dimension::Instance, Dimension::Feature, Dimension::Session, Dimension::Subject];
    let events = (0..n_inst).map(|i| EVENTS[i % n_events].to_string()).collect();
    PatternSet::new(LabeledTensor::new(data, dims).unwrap(), events, None).unwrap()
}

fn conditions(n: usize) -> Vec<Condition> {
    EVENTS[..n].iter().map(|e| Condition::named(*e)).collect()
}

fn bench_enumerate(c: &mut Criterion) {
    let pool: Vec<usize> = (0..24).collect();
    c.bench_function("enumerate_subsets C(24,4) = 10626", |b| {
        b.iter(|| black_box(enumerate_subsets(black_box(&pool), 4, 1_000_000, 0).unwrap().len()))
    });
    c.bench_function("enumerate_subsets sample 10k of C(40,8)", |b| {
        let pool: Vec<usize> = (0..40).collect();
        b.iter(|| black_box(enumerate_subsets(black_box(&pool), 8, 10_000, 0).unwrap().len()))
    });
}

fn bench_permutations(c: &mut Criterion) {
    let n = 8;
    let m = Array2::from_shape_fn((n, n), |(i, j)| if i == j { f64::NAN } else { ((i * j + i + j) as f64).sin() });
    c.bench_function("permutation_scores 8 labels (40320)", |b| {
        b.iter(|| black_box(permutation_scores(black_box(&m), black_box(&m)).count()))
    });
}

fn bench_binary(c: &mut Criterion) {
    let data = patterns(2, 8, 10);
    c.bench_function("binary LOSO 10 subjects × C(8,3) subsets", |b| {
        b.iter(|| {
            let cfg = McpaConfig { conditions: conditions(2), setsize: Some(3), ..McpaConfig::default() };
            black_box(run_mcpa(cfg, &data, &CorrelationClassifier).unwrap())
        })
    });
}

fn bench_rsa(c: &mut Criterion) {
    let data = patterns(4, 8, 10);
    c.bench_function("RSA n-way LOSO 10 subjects × 4 conditions", |b| {
        b.iter(|| {
            let cfg = McpaConfig { conditions: conditions(4), ..McpaConfig::default() };
            black_box(run_mcpa(cfg, &data, &CorrelationClassifier).unwrap())
        })
    });
}

criterion_group!(benches, bench_enumerate, bench_permutations, bench_binary, bench_rsa);
criterion_main!(benches);
