//! rsage-stats-testdata
//! Synthetic galaxy catalogues shared by benches and tests.
//! `x` plays the role of log10 stellar mass, `y` a property that scales with it.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, Exp, Normal};

/// Lower edge of the mass range every generator draws from (log10 Msun).
pub const MASS_LOW: f64 = 8.0;
/// Upper edge of the mass range (exclusive for binning purposes).
pub const MASS_HIGH: f64 = 12.0;

/// Available mass distributions.
#[derive(Clone, Copy, Debug)]
pub enum MassKind {
    /// Uniform in \[MASS_LOW, MASS_HIGH)
    Uniform,
    /// Steep low-mass end, roughly the shape of a stellar mass function
    Schechter,
    /// A few tight clusters of galaxies, so many bins stay empty or sparse
    Clumped,
    /// Uniform, plus ~5% of samples outside the mass range
    WithOutliers,
}

/// A deterministic catalogue of `n` galaxies.
#[derive(Clone, Debug, PartialEq)]
pub struct Catalogue {
    pub x: Vec<f64>,
    pub y: Vec<f64>,
}

impl Catalogue {
    pub fn len(&self) -> usize {
        self.x.len()
    }
    pub fn is_empty(&self) -> bool {
        self.x.is_empty()
    }

    /// Split into `parts` contiguous pieces (the last ones may be empty).
    pub fn split(&self, parts: usize) -> Vec<Catalogue> {
        assert!(parts > 0, "split() requires at least one part");
        let chunk = self.len().div_ceil(parts).max(1);
        let mut out: Vec<Catalogue> = self
            .x
            .chunks(chunk)
            .zip(self.y.chunks(chunk))
            .map(|(x, y)| Catalogue {
                x: x.to_vec(),
                y: y.to_vec(),
            })
            .collect();
        out.resize(
            parts,
            Catalogue {
                x: Vec::new(),
                y: Vec::new(),
            },
        );
        out
    }
}

/// Generate `n` galaxies: `y = 0.8·(x − 10) + N(0, scatter²)`.
pub fn gen_catalogue(kind: MassKind, n: usize, scatter: f64, seed: u64) -> Catalogue {
    let mut rng = StdRng::seed_from_u64(seed);
    let noise = Normal::new(0.0, scatter).unwrap();
    let mut x = Vec::with_capacity(n);
    let mut y = Vec::with_capacity(n);

    for _ in 0..n {
        let m = match kind {
            MassKind::Uniform => rng.random_range(MASS_LOW..MASS_HIGH),
            MassKind::Schechter => {
                let tail = Exp::new(2.0).unwrap();
                let d: f64 = tail.sample(&mut rng);
                (MASS_LOW + d).min(MASS_HIGH - 1e-9)
            }
            MassKind::Clumped => {
                let center = match rng.random_range(0..3) {
                    0 => 8.6,
                    1 => 9.9,
                    _ => 11.3,
                };
                center + rng.random_range(-0.05..0.05)
            }
            MassKind::WithOutliers => {
                if rng.random_range(0..100) < 5 {
                    if rng.random_bool(0.5) {
                        MASS_LOW - rng.random_range(0.1..2.0)
                    } else {
                        MASS_HIGH + rng.random_range(0.0..2.0)
                    }
                } else {
                    rng.random_range(MASS_LOW..MASS_HIGH)
                }
            }
        };
        let e: f64 = noise.sample(&mut rng);
        x.push(m);
        y.push(0.8 * (m - 10.0) + e);
    }
    Catalogue { x, y }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn smoke_gen() {
        for kind in [MassKind::Uniform, MassKind::Schechter, MassKind::Clumped] {
            let c = gen_catalogue(kind, 5_000, 0.3, 7);
            assert_eq!(c.len(), 5_000);
            assert!(c.x.iter().all(|&m| (MASS_LOW..MASS_HIGH).contains(&m)));
            assert!(c.y.iter().all(|v| v.is_finite()));
        }
        let c = gen_catalogue(MassKind::WithOutliers, 5_000, 0.3, 7);
        assert!(c.x.iter().any(|&m| !(MASS_LOW..MASS_HIGH).contains(&m)));
    }

    #[test]
    fn same_seed_same_catalogue() {
        let a = gen_catalogue(MassKind::Schechter, 100, 0.1, 42);
        let b = gen_catalogue(MassKind::Schechter, 100, 0.1, 42);
        assert_eq!(a, b);
    }

    #[test]
    fn split_keeps_every_sample() {
        let c = gen_catalogue(MassKind::Uniform, 11, 0.1, 1);
        let parts = c.split(5);
        assert_eq!(parts.len(), 5);
        assert_eq!(parts.iter().map(Catalogue::len).sum::<usize>(), 11);
    }
}
