/// Shared builders for synthetic pattern sets.
use mcpa::{Dimension, LabeledTensor, PatternSet};
use ndarray::{ArrayD, IxDyn};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

pub const EVENTS: [&str; 4] = ["face", "house", "tool", "body"];

/// Sample times −5, −4, …, 9 (s).
pub fn times() -> Vec<f64> {
    (-5..10).map(f64::from).collect()
}

/// Spatial signature of `event` on `feature`, shared by every subject.
pub fn signature(event: usize, feature: usize) -> f64 {
    ((feature as f64 + 1.0) * (event as f64 * 1.37 + 0.5)).sin()
}

#[allow(unused)]
/// `[instance, time, feature, session, subject]` with one block of `reps`
/// instances per event in `EVENTS[..n_events]`.
///
/// The signature is present inside t ∈ [2, 6]; every sample carries a little
/// seeded noise and a per-subject offset (removed by baseline correction).
pub fn synthetic_set(
    n_events: usize,
    reps: usize,
    n_features: usize,
    n_sessions: usize,
    n_subjects: usize,
    noise: f64,
    seed: u64,
) -> PatternSet {
    let times = times();
    let n_inst = n_events * reps;
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let shape = [n_inst, times.len(), n_features, n_sessions, n_subjects];
    let mut data = ArrayD::zeros(IxDyn(&shape));
    for (ix, v) in data.indexed_iter_mut() {
        let event = ix[0] % n_events;
        let t = times[ix[1]];
        let active = (2.0..=6.0).contains(&t);
        let offset = 10.0 * ix[4] as f64;
        *v = offset + if active { signature(event, ix[2]) } else { 0.0 } + noise * (rng.gen::<f64>() - 0.5);
    }
    let dims = vec![
        Dimension::Instance,
        Dimension::Time,
        Dimension::Feature,
        Dimension::Session,
        Dimension::Subject,
    ];
    let events = (0..n_inst).map(|i| EVENTS[i % n_events].to_string()).collect();
    PatternSet::new(LabeledTensor::new(data, dims).unwrap(), events, Some(times)).unwrap()
}

#[allow(unused)]
/// `[instance, feature, subject]` where every value of subject `s` lies in
/// `[1000 s, 1000 s + 1)`, so rows reveal which subject they came from.
pub fn tagged_set(n_events: usize, n_features: usize, n_subjects: usize) -> PatternSet {
    let n_inst = 2 * n_events;
    let data = ArrayD::from_shape_fn(IxDyn(&[n_inst, n_features, n_subjects]), |ix| {
        1000.0 * ix[2] as f64 + 0.5 + 0.4 * signature(ix[0] % n_events, ix[1])
    });
    let dims = vec![Dimension::Instance, Dimension::Feature, Dimension::Subject];
    let events = (0..n_inst).map(|i| EVENTS[i % n_events].to_string()).collect();
    PatternSet::new(LabeledTensor::new(data, dims).unwrap(), events, None).unwrap()
}

#[allow(unused)]
/// Subject a value was tagged with by [`tagged_set`].
pub fn subject_tag(v: f64) -> usize {
    (v / 1000.0).floor() as usize
}
