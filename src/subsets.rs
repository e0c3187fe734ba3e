//! Feature (channel) subset enumeration.
//!
//! Produces every `setsize`-combination of the included features in
//! lexicographic order.  When `C(n, setsize)` exceeds `max_sets`, a uniform
//! sample of `max_sets` distinct combinations is drawn instead, from a
//! `ChaCha8Rng` seeded by the caller so that reruns pick the same subsets.
//!
//! Sampling never materialises the full enumeration: distinct ranks are drawn
//! from `0..C(n, k)` and unranked through a Pascal table.  Only when the
//! combination count overflows `usize` does it fall back to rejection
//! sampling of random k-sets, where collisions are vanishingly rare.
use std::collections::HashSet;

use ndarray::Array2;
use rand::seq::index;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

use crate::error::{McpaError, Result};

/// Default cap on the number of subsets analysed.
pub const DEFAULT_MAX_SETS: usize = 1_000_000;

/// Rows of feature indices, each strictly increasing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubsetList {
    sets: Vec<Vec<usize>>,
    possible: Option<u128>,
    subsampled: bool,
}

impl SubsetList {
    /// The full inclusion list as the only subset.
    pub fn single(features: &[usize]) -> Self {
        let mut f = features.to_vec();
        f.sort_unstable();
        f.dedup();
        Self { sets: vec![f], possible: Some(1), subsampled: false }
    }

    pub fn len(&self) -> usize {
        self.sets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sets.is_empty()
    }

    pub fn setsize(&self) -> usize {
        self.sets.first().map_or(0, Vec::len)
    }

    pub fn rows(&self) -> &[Vec<usize>] {
        &self.sets
    }

    pub fn get(&self, i: usize) -> Option<&[usize]> {
        self.sets.get(i).map(Vec::as_slice)
    }

    pub fn iter(&self) -> impl Iterator<Item = &[usize]> {
        self.sets.iter().map(Vec::as_slice)
    }

    /// `C(n, k)`, or `None` if it does not fit in `u128`.
    pub fn possible(&self) -> Option<u128> {
        self.possible
    }

    /// Whether the list is a sample rather than the full enumeration.
    pub fn is_subsampled(&self) -> bool {
        self.subsampled
    }

    /// `[n_sets, setsize]` matrix of feature indices.
    pub fn to_array(&self) -> Array2<usize> {
        let k = self.setsize();
        Array2::from_shape_fn((self.sets.len(), k), |(r, c)| self.sets[r][c])
    }
}

/// Binomial coefficient, `None` on `u128` overflow.
pub fn n_choose_k(n: usize, k: usize) -> Option<u128> {
    if k > n {
        return Some(0);
    }
    let k = k.min(n - k);
    let mut acc: u128 = 1;
    for i in 0..k {
        // acc * (n - i) is always divisible by (i + 1)
        acc = acc.checked_mul((n - i) as u128)? / (i as u128 + 1);
    }
    Some(acc)
}

/// Enumerate (or sample) `setsize`-subsets of `included`.
///
/// `included` is sorted and de-duplicated first; row entries are values from
/// it, not positions into it.
pub fn enumerate_subsets(
    included: &[usize],
    setsize: usize,
    max_sets: usize,
    seed: u64,
) -> Result<SubsetList> {
    let mut pool = included.to_vec();
    pool.sort_unstable();
    pool.dedup();
    let n = pool.len();

    if setsize > n {
        return Err(McpaError::SetSizeTooLarge { setsize, available: n });
    }
    if setsize == 0 || n == 0 {
        return Err(McpaError::EmptySubset { setsize, available: n });
    }
    if max_sets == 0 {
        return Err(McpaError::InvalidConfig("max_sets must be at least 1".into()));
    }

    let possible = n_choose_k(n, setsize);
    let fits = possible.is_some_and(|p| p <= max_sets as u128);
    if fits {
        let sets = all_combinations(n, setsize)
            .into_iter()
            .map(|c| c.into_iter().map(|i| pool[i]).collect())
            .collect();
        return Ok(SubsetList { sets, possible, subsampled: false });
    }

    tracing::info!(
        possible = ?possible,
        max_sets,
        "subset count exceeds cap; sampling uniformly"
    );
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let positions = match possible.and_then(|p| usize::try_from(p).ok()) {
        Some(total) => {
            let table = pascal(n, setsize);
            let mut ranks = index::sample(&mut rng, total, max_sets).into_vec();
            ranks.sort_unstable();
            ranks.into_iter().map(|r| unrank(r as u128, n, setsize, &table)).collect()
        }
        None => rejection_sample(&mut rng, n, setsize, max_sets),
    };
    let sets = positions
        .into_iter()
        .map(|c: Vec<usize>| c.into_iter().map(|i| pool[i]).collect())
        .collect();
    Ok(SubsetList { sets, possible, subsampled: true })
}

/// All k-combinations of `0..n` in lexicographic order.
fn all_combinations(n: usize, k: usize) -> Vec<Vec<usize>> {
    let mut out = Vec::new();
    let mut c: Vec<usize> = (0..k).collect();
    loop {
        out.push(c.clone());
        // rightmost position that can still advance
        let Some(i) = (0..k).rev().find(|&i| c[i] < n - k + i) else {
            return out;
        };
        c[i] += 1;
        for j in i + 1..k {
            c[j] = c[j - 1] + 1;
        }
    }
}

/// `table[m][j] = C(m, j)` for `m <= n`, `j <= k`, saturating.
fn pascal(n: usize, k: usize) -> Vec<Vec<u128>> {
    let mut t = vec![vec![0u128; k + 1]; n + 1];
    for m in 0..=n {
        t[m][0] = 1;
        for j in 1..=k.min(m) {
            t[m][j] = t[m - 1][j - 1].saturating_add(t[m - 1][j]);
        }
    }
    t
}

/// Combination of rank `r` (lexicographic) among k-subsets of `0..n`.
fn unrank(mut r: u128, n: usize, k: usize, table: &[Vec<u128>]) -> Vec<usize> {
    let mut combo = Vec::with_capacity(k);
    let mut x = 0;
    for i in 0..k {
        loop {
            let below = table[n - x - 1][k - i - 1];
            if r < below {
                combo.push(x);
                x += 1;
                break;
            }
            r -= below;
            x += 1;
        }
    }
    combo
}

fn rejection_sample(rng: &mut ChaCha8Rng, n: usize, k: usize, want: usize) -> Vec<Vec<usize>> {
    let mut seen: HashSet<Vec<usize>> = HashSet::with_capacity(want);
    while seen.len() < want {
        let mut c = index::sample(rng, n, k).into_vec();
        c.sort_unstable();
        seen.insert(c);
    }
    let mut out: Vec<Vec<usize>> = seen.into_iter().collect();
    out.sort_unstable();
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn binomials() {
        assert_eq!(n_choose_k(5, 2), Some(10));
        assert_eq!(n_choose_k(40, 20), Some(137_846_528_820));
        assert_eq!(n_choose_k(3, 4), Some(0));
        assert_eq!(n_choose_k(500, 250), None);
    }

    #[test]
    fn full_enumeration_is_lexicographic() {
        let s = enumerate_subsets(&[7, 3, 5, 9], 2, 100, 0).unwrap();
        assert_eq!(
            s.rows(),
            &[vec![3, 5], vec![3, 7], vec![3, 9], vec![5, 7], vec![5, 9], vec![7, 9]]
        );
        assert!(!s.is_subsampled());
    }

    #[test]
    fn setsize_equal_to_n_gives_single_row() {
        let s = enumerate_subsets(&[4, 0, 2], 3, 10, 0).unwrap();
        assert_eq!(s.rows(), &[vec![0, 2, 4]]);
    }

    #[test]
    fn setsize_too_large_is_an_error() {
        assert!(matches!(
            enumerate_subsets(&[0, 1], 3, 10, 0),
            Err(McpaError::SetSizeTooLarge { setsize: 3, available: 2 })
        ));
    }

    #[test]
    fn unrank_matches_enumeration() {
        let all = all_combinations(7, 3);
        let table = pascal(7, 3);
        for (r, c) in all.iter().enumerate() {
            assert_eq!(&unrank(r as u128, 7, 3, &table), c);
        }
    }

    #[test]
    fn sampling_is_capped_distinct_and_seeded() {
        let pool: Vec<usize> = (0..20).collect();
        let a = enumerate_subsets(&pool, 5, 50, 11).unwrap();
        let b = enumerate_subsets(&pool, 5, 50, 11).unwrap();
        assert_eq!(a.len(), 50);
        assert!(a.is_subsampled());
        assert_eq!(a.possible(), Some(15_504));
        assert_eq!(a, b);
        let distinct: HashSet<_> = a.rows().iter().collect();
        assert_eq!(distinct.len(), 50);
    }

    #[test]
    fn overflowing_count_falls_back_to_rejection() {
        let pool: Vec<usize> = (0..200).collect();
        let s = enumerate_subsets(&pool, 100, 5, 3).unwrap();
        assert_eq!(s.len(), 5);
        assert!(s.possible().is_none() || s.possible() > Some(usize::MAX as u128));
        for row in s.iter() {
            assert_eq!(row.len(), 100);
            assert!(row.windows(2).all(|w| w[0] < w[1]));
        }
    }
}
