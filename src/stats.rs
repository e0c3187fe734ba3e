//! Correlation and distance measures over `f64` slices.
//!
//! Pairs where either value is `NaN` are dropped before computing anything.
//! Degenerate inputs (fewer than two complete pairs, zero variance) give `NaN`
//! rather than a number that looks meaningful.

/// Complete (non-`NaN`) pairs of `a` and `b`.
fn complete_pairs(a: &[f64], b: &[f64]) -> (Vec<f64>, Vec<f64>) {
    a.iter()
        .zip(b)
        .filter(|(x, y)| !x.is_nan() && !y.is_nan())
        .map(|(&x, &y)| (x, y))
        .unzip()
}

/// Pearson product-moment correlation.
pub fn pearson(a: &[f64], b: &[f64]) -> f64 {
    let (x, y) = complete_pairs(a, b);
    pearson_complete(&x, &y)
}

pub(crate) fn pearson_complete(x: &[f64], y: &[f64]) -> f64 {
    let n = x.len();
    if n < 2 {
        return f64::NAN;
    }
    let mx = x.iter().sum::<f64>() / n as f64;
    let my = y.iter().sum::<f64>() / n as f64;
    let (mut sxy, mut sxx, mut syy) = (0.0, 0.0, 0.0);
    for (&a, &b) in x.iter().zip(y) {
        let (dx, dy) = (a - mx, b - my);
        sxy += dx * dy;
        sxx += dx * dx;
        syy += dy * dy;
    }
    if sxx <= 0.0 || syy <= 0.0 {
        return f64::NAN;
    }
    (sxy / (sxx * syy).sqrt()).clamp(-1.0, 1.0)
}

/// Spearman rank correlation (average ranks for ties).
pub fn spearman(a: &[f64], b: &[f64]) -> f64 {
    let (x, y) = complete_pairs(a, b);
    pearson_complete(&ranks(&x), &ranks(&y))
}

/// Fractional ranks starting at 1; ties share their mean rank.
pub fn ranks(v: &[f64]) -> Vec<f64> {
    let mut order: Vec<usize> = (0..v.len()).collect();
    order.sort_by(|&i, &j| v[i].total_cmp(&v[j]));
    let mut out = vec![0.0; v.len()];
    let mut i = 0;
    while i < order.len() {
        let mut j = i;
        while j + 1 < order.len() && v[order[j + 1]] == v[order[i]] {
            j += 1;
        }
        let r = (i + j) as f64 / 2.0 + 1.0;
        for &k in &order[i..=j] {
            out[k] = r;
        }
        i = j + 1;
    }
    out
}

pub fn euclidean(a: &[f64], b: &[f64]) -> f64 {
    let (x, y) = complete_pairs(a, b);
    if x.is_empty() {
        return f64::NAN;
    }
    x.iter().zip(&y).map(|(p, q)| (p - q).powi(2)).sum::<f64>().sqrt()
}

pub fn cityblock(a: &[f64], b: &[f64]) -> f64 {
    let (x, y) = complete_pairs(a, b);
    if x.is_empty() {
        return f64::NAN;
    }
    x.iter().zip(&y).map(|(p, q)| (p - q).abs()).sum()
}

/// `1 − cos(a, b)`.
pub fn cosine_distance(a: &[f64], b: &[f64]) -> f64 {
    let (x, y) = complete_pairs(a, b);
    let dot: f64 = x.iter().zip(&y).map(|(p, q)| p * q).sum();
    let nx = x.iter().map(|v| v * v).sum::<f64>().sqrt();
    let ny = y.iter().map(|v| v * v).sum::<f64>().sqrt();
    if nx == 0.0 || ny == 0.0 {
        return f64::NAN;
    }
    1.0 - dot / (nx * ny)
}

/// Inverse hyperbolic tangent; `±1` maps to `±∞`.
pub fn fisher_z(r: f64) -> f64 {
    r.atanh()
}
