mod common;
use common::{subject_tag, synthetic_set, tagged_set};
use mcpa::{
    run_mcpa, split_fold, Condition, CorrelationClassifier, CrossValidator, DistanceClassifier, DriverState,
    McpaConfig, McpaError, McpaResults, Normalization, PatternClassifier, RsaOptions,
};
use ndarray::ArrayView2;
use std::cell::{Cell, RefCell};

/// Delegates to [`CorrelationClassifier`] and counts calls.
#[derive(Default)]
struct Counting {
    calls: Cell<usize>,
}

impl PatternClassifier for Counting {
    fn classify(
        &self,
        train: ArrayView2<'_, f64>,
        train_labels: &[String],
        test: ArrayView2<'_, f64>,
    ) -> anyhow::Result<Vec<Option<String>>> {
        self.calls.set(self.calls.get() + 1);
        CorrelationClassifier.classify(train, train_labels, test)
    }
}

/// Records the held-out subject of every call and checks training rows.
#[derive(Default)]
struct Spy {
    folds: RefCell<Vec<usize>>,
}

impl PatternClassifier for Spy {
    fn classify(
        &self,
        train: ArrayView2<'_, f64>,
        train_labels: &[String],
        test: ArrayView2<'_, f64>,
    ) -> anyhow::Result<Vec<Option<String>>> {
        let test_subjects: Vec<usize> = test.iter().map(|&v| subject_tag(v)).collect();
        let held_out = test_subjects[0];
        assert!(test_subjects.iter().all(|&s| s == held_out), "test rows mix subjects");
        assert!(
            train.iter().all(|&v| subject_tag(v) != held_out),
            "subject {held_out} leaked into training"
        );
        self.folds.borrow_mut().push(held_out);
        Ok(vec![train_labels.first().cloned(); test.nrows()])
    }
}

fn failing(_: ArrayView2<'_, f64>, _: &[String], _: ArrayView2<'_, f64>) -> anyhow::Result<Vec<Option<String>>> {
    anyhow::bail!("solver diverged")
}

fn conditions(names: &[&str]) -> Vec<Condition> {
    names.iter().map(|n| Condition::named(*n)).collect()
}

#[test]
fn four_subjects_two_conditions_single_subset() {
    let data = synthetic_set(2, 3, 6, 2, 4, 0.1, 7);
    let cfg = McpaConfig { conditions: conditions(&["face", "house"]), ..McpaConfig::default() };

    let McpaResults::Binary(r) = run_mcpa(cfg, &data, &CorrelationClassifier).unwrap() else {
        panic!("two conditions must take the binary path");
    };
    assert_eq!(r.conditions, vec!["face", "house"]);
    assert_eq!(r.subjects, vec![0, 1, 2, 3]);
    assert_eq!(r.subsets.len(), 1);
    assert_eq!(r.subsets.rows()[0], vec![0, 1, 2, 3, 4, 5]);
    for c in 0..2 {
        let acc = r.subset_x_subj(c);
        assert_eq!(acc.dim(), (1, 4), "condition {c}");
        assert!(acc.iter().all(|&a| a == 1.0), "condition {c}: {acc:?}");
    }
    // every feature is in the only subset
    assert_eq!(r.subj_x_feature.dim(), (2, 4, 6));
    assert!(r.subj_x_feature.iter().all(|&a| a == 1.0));
}

#[test]
fn held_out_subject_never_trains() {
    let data = tagged_set(2, 4, 5);
    let spy = Spy::default();
    let cfg = McpaConfig { conditions: conditions(&["face", "house"]), setsize: Some(2), ..McpaConfig::default() };
    run_mcpa(cfg, &data, &spy).unwrap();

    let folds = spy.folds.into_inner();
    // 6 subsets of 2 out of 4 features, per fold
    assert_eq!(folds.len(), 5 * 6);
    for s in 0..5 {
        assert_eq!(folds.iter().filter(|&&f| f == s).count(), 6);
    }
}

#[test]
fn split_excludes_held_out_subject() {
    let data = tagged_set(2, 3, 4);
    let conds = mcpa::events::resolve_conditions(&conditions(&["face", "house"]), &data.events).unwrap();
    let split = split_fold(&data.patterns, &conds, 2, &[0, 1, 3], &[0, 1, 2]).unwrap();
    assert!(!split.group_subjects.contains(&2));
    assert!(split.subj_data.iter().all(|&v| subject_tag(v) == 2));
}

#[test]
fn two_conditions_never_reach_rsa() {
    let data = synthetic_set(3, 2, 4, 2, 3, 0.1, 1);
    let counting = Counting::default();
    // pairwise RSA settings must not change the dispatch
    let cfg = McpaConfig {
        conditions: conditions(&["face", "tool"]),
        rsa: RsaOptions { pairwise: true, ..RsaOptions::default() },
        ..McpaConfig::default()
    };
    let r = run_mcpa(cfg, &data, &counting).unwrap();
    assert!(matches!(r, McpaResults::Binary(_)));
    assert_eq!(counting.calls.get(), 3);
}

#[test]
fn three_conditions_never_reach_the_classifier() {
    let data = synthetic_set(3, 2, 5, 2, 3, 0.1, 2);
    let counting = Counting::default();
    for pairwise in [false, true] {
        let cfg = McpaConfig {
            conditions: conditions(&["face", "house", "tool"]),
            rsa: RsaOptions { pairwise, ..RsaOptions::default() },
            ..McpaConfig::default()
        };
        let r = run_mcpa(cfg, &data, &counting).unwrap();
        assert!(matches!(r, McpaResults::Multiclass(_)));
    }
    assert_eq!(counting.calls.get(), 0);
}

#[test]
fn rsa_n_way_recovers_every_condition() {
    let data = synthetic_set(4, 2, 8, 2, 4, 0.05, 11);
    let cfg = McpaConfig { conditions: conditions(&["face", "house", "tool", "body"]), ..McpaConfig::default() };
    let McpaResults::Multiclass(r) = run_mcpa(cfg, &data, &CorrelationClassifier).unwrap() else {
        panic!("four conditions must take the RSA path");
    };
    assert!(!r.pairwise);
    assert_eq!(r.accuracy.dim(), (4, 4, 1, 4));
    for f in 0..4 {
        for i in 0..4 {
            for j in 0..4 {
                let expected = if i == j { 1.0 } else { 0.0 };
                assert_eq!(r.accuracy[[i, j, 0, f]], expected, "fold {f} cell ({i}, {j})");
            }
        }
    }
    assert_eq!(r.mean_accuracy(), vec![1.0; 4]);
}

#[test]
fn rsa_pairwise_fills_symmetric_cells() {
    let data = synthetic_set(4, 2, 8, 2, 4, 0.05, 11);
    let cfg = McpaConfig {
        conditions: conditions(&["face", "house", "tool", "body"]),
        rsa: RsaOptions { pairwise: true, ..RsaOptions::default() },
        ..McpaConfig::default()
    };
    let McpaResults::Multiclass(r) = run_mcpa(cfg, &data, &CorrelationClassifier).unwrap() else {
        panic!("expected RSA results");
    };
    assert!(r.pairwise);
    for f in 0..4 {
        for i in 0..4 {
            assert!(r.accuracy[[i, i, 0, f]].is_nan());
            for j in 0..4 {
                if i != j {
                    assert_eq!(r.accuracy[[i, j, 0, f]], r.accuracy[[j, i, 0, f]]);
                }
            }
        }
    }
    assert_eq!(r.mean_accuracy(), vec![1.0; 4]);
}

#[test]
fn classifier_failure_aborts_the_run() {
    let data = synthetic_set(2, 2, 3, 1, 3, 0.1, 3);
    let cfg = McpaConfig { conditions: conditions(&["face", "house"]), ..McpaConfig::default() };
    let err = run_mcpa(cfg, &data, &failing).unwrap_err();
    assert!(matches!(err, McpaError::Classifier { subject: 0, .. }), "{err}");
    assert!(!err.is_configuration());
}

#[test]
fn configuration_errors_surface_before_any_fold() {
    let data = synthetic_set(2, 2, 3, 1, 3, 0.1, 3);
    let counting = Counting::default();
    let cfg = McpaConfig { conditions: conditions(&["face", "house"]), setsize: Some(4), ..McpaConfig::default() };
    let err = CrossValidator::new(cfg, &data, &counting).err().unwrap();
    assert!(matches!(err, McpaError::SetSizeTooLarge { setsize: 4, available: 3 }));
    assert!(err.is_configuration());
    assert_eq!(counting.calls.get(), 0);
}

#[test]
fn distance_classifier_with_normalization() {
    let data = synthetic_set(2, 3, 5, 2, 4, 0.1, 5);
    let cfg = McpaConfig {
        conditions: conditions(&["face", "house"]),
        setsize: Some(4),
        norm_data: Some(Normalization::ZScore),
        ..McpaConfig::default()
    };
    let mut cv = CrossValidator::new(cfg, &data, &DistanceClassifier).unwrap();
    let McpaResults::Binary(r) = cv.run().unwrap() else { panic!("expected binary results") };
    assert_eq!(cv.state(), DriverState::Complete);
    assert_eq!(r.accuracy.dim(), (2, 5, 4));
    assert!(r.accuracy.iter().all(|a| (0.0..=1.0).contains(a)));
}

#[test]
fn subset_cap_is_seeded() {
    let data = synthetic_set(2, 2, 8, 1, 3, 0.1, 9);
    let run = |seed| {
        let cfg = McpaConfig {
            conditions: conditions(&["face", "house"]),
            setsize: Some(3),
            max_sets: 10,
            seed,
            ..McpaConfig::default()
        };
        let McpaResults::Binary(r) = run_mcpa(cfg, &data, &CorrelationClassifier).unwrap() else {
            panic!("expected binary results")
        };
        r.subsets.rows().to_vec()
    };
    let a = run(42);
    assert_eq!(a.len(), 10);
    assert_eq!(a, run(42));
}

#[test]
fn repeated_subject_is_held_out_once() {
    let data = tagged_set(2, 4, 3);
    let spy = Spy::default();
    let cfg = McpaConfig {
        conditions: conditions(&["face", "house"]),
        incl_subjects: Some(vec![0, 0, 1, 2]),
        ..McpaConfig::default()
    };
    let McpaResults::Binary(r) = run_mcpa(cfg, &data, &spy).unwrap() else {
        panic!("expected binary results")
    };
    assert_eq!(r.subjects, vec![0, 1, 2]);
    assert_eq!(r.subset_x_subj(0).dim(), (1, 3));
    assert_eq!(spy.folds.into_inner(), vec![0, 1, 2]);
}
