pub fn assert_exact(label: &str, expected: f64, got: f64) {
    assert!(
        expected == got,
        "{}: expected exactly {:.9}, got {:.9}",
        label,
        expected,
        got
    );
}

/// Relative comparison; values within `rtol` of zero compare absolutely.
pub fn assert_rel_close(label: &str, expected: f64, got: f64, rtol: f64) {
    let denom = expected.abs().max(1.0);
    let rel = ((expected - got).abs()) / denom;
    assert!(
        rel < rtol,
        "{}: expected ~= {:.9}, got {:.9}, rel_err={:.6e}, rtol={:.6e}",
        label,
        expected,
        got,
        rel,
        rtol
    );
}

pub fn assert_all_close(label: &str, expected: &[f64], got: &[f64], rtol: f64) {
    assert_eq!(
        expected.len(),
        got.len(),
        "{}: length {} vs {}",
        label,
        expected.len(),
        got.len()
    );
    for (i, (e, g)) in expected.iter().zip(got.iter()).enumerate() {
        assert_rel_close(&format!("{label}[{i}]"), *e, *g, rtol);
    }
}

/// Ground truth straight from the samples: `(mean, population std, count)`.
pub fn direct_stats(values: &[f64]) -> (f64, f64, f64) {
    let n = values.len() as f64;
    if values.is_empty() {
        return (0.0, 0.0, 0.0);
    }
    let mean = values.iter().sum::<f64>() / n;
    let var = values.iter().map(|v| (v - mean) * (v - mean)).sum::<f64>() / n;
    (mean, var.sqrt(), n)
}

/// Split `values` into `parts` contiguous groups of near-equal size (some may be empty).
pub fn split_even(values: &[f64], parts: usize) -> Vec<Vec<f64>> {
    assert!(parts > 0, "split_even() requires at least one part");
    let chunk = values.len().div_ceil(parts).max(1);
    let mut out: Vec<Vec<f64>> = values.chunks(chunk).map(|c| c.to_vec()).collect();
    out.resize(parts, Vec::new());
    out
}
