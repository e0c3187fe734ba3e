use mcpa::subsets::{enumerate_subsets, n_choose_k};
use std::collections::HashSet;

/// Every row has `k` distinct members of `pool`, no row repeats, and the row
/// count is `min(C(n, k), cap)`.
fn check(pool: &[usize], k: usize, cap: usize, seed: u64) {
    let list = enumerate_subsets(pool, k, cap, seed).unwrap();
    let c = n_choose_k(pool.len(), k).unwrap();
    assert_eq!(list.len() as u128, c.min(cap as u128), "n={} k={k} cap={cap}", pool.len());

    let mut seen = HashSet::new();
    for row in list.iter() {
        assert_eq!(row.len(), k);
        assert!(row.windows(2).all(|w| w[0] < w[1]), "row {row:?} not strictly increasing");
        assert!(row.iter().all(|i| pool.contains(i)), "row {row:?} leaves the pool");
        assert!(seen.insert(row.to_vec()), "duplicate row {row:?}");
    }
}

#[test]
fn enumeration_properties_hold_for_small_inputs() {
    for n in 1..=9 {
        let pool: Vec<usize> = (0..n).map(|i| 3 * i + 1).collect();
        for k in 1..=n {
            for cap in [1, 5, 40, 1_000_000] {
                check(&pool, k, cap, n as u64 * 31 + k as u64);
            }
        }
    }
}

#[test]
fn full_set_is_the_only_row() {
    let list = enumerate_subsets(&[9, 2, 5, 0], 4, 1_000_000, 0).unwrap();
    assert_eq!(list.rows(), &[vec![0, 2, 5, 9]]);
    assert!(!list.is_subsampled());
}

#[test]
fn sampling_covers_the_space_evenly() {
    // C(10, 2) = 45 pairs; 20 draws per seed, 200 seeds
    let mut counts = vec![0usize; 10];
    for seed in 0..200 {
        for row in enumerate_subsets(&(0..10).collect::<Vec<_>>(), 2, 20, seed).unwrap().iter() {
            for &i in row {
                counts[i] += 1;
            }
        }
    }
    // each feature is in 9 of 45 pairs → expected 200 · 20 · 2 / 10 = 800
    for (i, &c) in counts.iter().enumerate() {
        assert!((650..=950).contains(&c), "feature {i} drawn {c} times");
    }
}

#[test]
fn large_pools_are_sampled_without_enumerating() {
    let pool: Vec<usize> = (0..200).collect();
    let list = enumerate_subsets(&pool, 100, 50, 3).unwrap();
    assert_eq!(list.len(), 50);
    assert!(list.is_subsampled());
    assert_eq!(list.setsize(), 100);
    let distinct: HashSet<&[usize]> = list.iter().collect();
    assert_eq!(distinct.len(), 50);
}
