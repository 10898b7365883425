//! Ensemble statistics consumed by the cavity solver.

use crate::community::{offdiag, Community};
use crate::error::Result;
use crate::sampling::InteractionKind;
use serde::{Deserialize, Serialize};

/// Size-normalised summary of an interaction ensemble.
///
/// `mu` and `sigma` are scaled by `S` and `sqrt(S)` respectively, so a
/// community drawn with `A_ij ~ N(mu / S, sigma / sqrt(S))` maps back to
/// `(mu, sigma)`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CavityParameters {
    pub mu: f64,
    pub sigma: f64,
    /// Correlation between `A_ij` and `A_ji`.
    pub gamma: f64,
    pub k_mean: f64,
    pub k_std: f64,
}

impl CavityParameters {
    pub fn new(mu: f64, sigma: f64, gamma: f64, k_mean: f64, k_std: f64) -> Self {
        Self {
            mu,
            sigma,
            gamma,
            k_mean,
            k_std,
        }
    }

    /// Extracts the statistics of `c`, from the raw matrix or from its core
    /// interactions.
    pub fn from_community(c: &Community, kind: InteractionKind) -> Result<Self> {
        let core;
        let matrix = match kind {
            InteractionKind::Raw => c.a(),
            InteractionKind::Core => {
                core = c.core_interactions()?;
                &core
            }
        };
        let s = c.richness() as f64;

        let entries = offdiag(matrix);
        let forward: Vec<f64> = entries.iter().map(|&(_, v)| v).collect();
        let backward: Vec<f64> = entries.iter().map(|&((i, j), _)| matrix[(j, i)]).collect();

        let k: Vec<f64> = c.k().iter().copied().collect();
        Ok(Self {
            mu: s * mean(&forward),
            sigma: s.sqrt() * sample_std(&forward),
            gamma: correlation(&forward, &backward),
            k_mean: mean(&k),
            k_std: sample_std(&k),
        })
    }
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Standard deviation with the `n - 1` normalisation; zero for fewer than two
/// values.
fn sample_std(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let m = mean(values);
    let ss: f64 = values.iter().map(|v| (v - m).powi(2)).sum();
    (ss / (values.len() - 1) as f64).sqrt()
}

/// Pearson correlation; zero when either side has no spread.
fn correlation(x: &[f64], y: &[f64]) -> f64 {
    let (mx, my) = (mean(x), mean(y));
    let mut sxy = 0.0;
    let mut sxx = 0.0;
    let mut syy = 0.0;
    for (a, b) in x.iter().zip(y) {
        sxy += (a - mx) * (b - my);
        sxx += (a - mx).powi(2);
        syy += (b - my).powi(2);
    }
    if sxx == 0.0 || syy == 0.0 {
        return 0.0;
    }
    (sxy / (sxx * syy).sqrt()).clamp(-1.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sampling::{CommunitySampler, EntryDistribution};
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn symmetric_matrix_has_unit_correlation() {
        let c = Community::from_slices(
            &[-1.0, 0.2, -0.4, 0.2, -1.0, 0.6, -0.4, 0.6, -1.0],
            &[1.0; 3],
            &[1.0, 2.0, 3.0],
        )
        .unwrap();
        let p = CavityParameters::from_community(&c, InteractionKind::Raw).unwrap();
        assert!((p.gamma - 1.0).abs() < 1e-12);
        // Off-diagonal mean 0.8 / 6, mu = 3 * mean.
        assert!((p.mu - 3.0 * (0.8 / 6.0)).abs() < 1e-12);
        assert!((p.k_mean - 2.0).abs() < 1e-12);
        assert!((p.k_std - 1.0).abs() < 1e-12);
    }

    #[test]
    fn antisymmetric_matrix_has_negative_unit_correlation() {
        let c = Community::from_slices(
            &[-1.0, 0.5, -0.3, -0.5, -1.0, 0.1, 0.3, -0.1, -1.0],
            &[1.0; 3],
            &[1.0; 3],
        )
        .unwrap();
        let p = CavityParameters::from_community(&c, InteractionKind::Raw).unwrap();
        assert!((p.gamma + 1.0).abs() < 1e-12);
        assert!(p.mu.abs() < 1e-12);
        assert_eq!(p.k_std, 0.0);
    }

    #[test]
    fn diagonal_is_ignored() {
        let with = |d: f64| {
            Community::from_slices(&[d, 0.3, 0.1, d], &[1.0; 2], &[1.0; 2]).unwrap()
        };
        let a = CavityParameters::from_community(&with(-1.0), InteractionKind::Raw).unwrap();
        let b = CavityParameters::from_community(&with(-7.0), InteractionKind::Raw).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn constant_interactions_have_no_spread_or_correlation() {
        let c = Community::from_slices(&[-1.0, 0.5, 0.5, -1.0], &[1.0; 2], &[1.0; 2]).unwrap();
        let p = CavityParameters::from_community(&c, InteractionKind::Raw).unwrap();
        assert_eq!(p.sigma, 0.0);
        assert_eq!(p.gamma, 0.0);
        assert!((p.mu - 1.0).abs() < 1e-12);
    }

    #[test]
    fn core_statistics_undo_capacity_rescaling() {
        let mut rng = StdRng::seed_from_u64(17);
        let sampler = CommunitySampler {
            a_ij: EntryDistribution::constant(-0.01),
            k_i: EntryDistribution::uniform(1.0, 5.0),
            ..CommunitySampler::default()
        }
        .with_interaction(InteractionKind::Core);
        let c = sampler.sample(50, &mut rng).unwrap();
        let core = CavityParameters::from_community(&c, InteractionKind::Core).unwrap();
        assert!((core.mu + 0.5).abs() < 1e-12);
        assert!(core.sigma < 1e-12);
        let raw = CavityParameters::from_community(&c, InteractionKind::Raw).unwrap();
        assert!(raw.sigma > 1e-3);
    }

    #[test]
    fn scaled_ensemble_recovers_its_parameters() {
        let mut rng = StdRng::seed_from_u64(3);
        let s = 150;
        let c = CommunitySampler::scaled_normal(s, -1.0, 0.5, 1.0, 0.2)
            .sample(s, &mut rng)
            .unwrap();
        let p = CavityParameters::from_community(&c, InteractionKind::Raw).unwrap();
        assert!((p.mu + 1.0).abs() < 0.2, "mu {}", p.mu);
        assert!((p.sigma - 0.5).abs() < 0.02, "sigma {}", p.sigma);
        assert!(p.gamma.abs() < 0.05, "gamma {}", p.gamma);
        assert!((p.k_mean - 1.0).abs() < 0.05);
        assert!((p.k_std - 0.2).abs() < 0.04);
    }
}
