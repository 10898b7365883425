//! Random community construction.

use crate::community::Community;
use crate::error::{GlvError, Result};
use nalgebra::{DMatrix, DVector};
use rand::Rng;
use rand_distr::{Distribution, Normal, Uniform};
use serde::{Deserialize, Serialize};

/// Distribution of a single community parameter.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EntryDistribution {
    Constant { value: f64 },
    Normal { mean: f64, std: f64 },
    Uniform { low: f64, high: f64 },
}

impl EntryDistribution {
    pub fn constant(value: f64) -> Self {
        Self::Constant { value }
    }

    pub fn normal(mean: f64, std: f64) -> Self {
        Self::Normal { mean, std }
    }

    pub fn uniform(low: f64, high: f64) -> Self {
        Self::Uniform { low, high }
    }

    fn sampler(&self) -> Result<EntrySampler> {
        match *self {
            EntryDistribution::Constant { value } => {
                if !value.is_finite() {
                    return Err(GlvError::InvalidDistribution(format!(
                        "constant value {value} is not finite."
                    )));
                }
                Ok(EntrySampler::Constant(value))
            }
            EntryDistribution::Normal { mean, std } => {
                if !(std >= 0.0) || !std.is_finite() || !mean.is_finite() {
                    return Err(GlvError::InvalidDistribution(format!(
                        "Normal({mean}, {std}) needs a finite mean and a finite std >= 0."
                    )));
                }
                if std == 0.0 {
                    return Ok(EntrySampler::Constant(mean));
                }
                Normal::new(mean, std)
                    .map(EntrySampler::Normal)
                    .map_err(|e| {
                        GlvError::InvalidDistribution(format!("Normal({mean}, {std}): {e}."))
                    })
            }
            EntryDistribution::Uniform { low, high } => {
                if !(low < high) || !low.is_finite() || !high.is_finite() {
                    return Err(GlvError::InvalidDistribution(format!(
                        "Uniform({low}, {high}) needs finite low < high."
                    )));
                }
                Ok(EntrySampler::Uniform(Uniform::new(low, high)))
            }
        }
    }
}

enum EntrySampler {
    Constant(f64),
    Normal(Normal<f64>),
    Uniform(Uniform<f64>),
}

impl Distribution<f64> for EntrySampler {
    fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> f64 {
        match self {
            EntrySampler::Constant(v) => *v,
            EntrySampler::Normal(d) => d.sample(rng),
            EntrySampler::Uniform(d) => d.sample(rng),
        }
    }
}

/// How sampled off-diagonal entries are interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InteractionKind {
    /// Entries are the raw `a_ij`.
    #[default]
    Raw,
    /// Entries are core interactions `b_ij`; the stored matrix is
    /// `a_ij = b_ij * K_j / K_i`.
    Core,
}

/// Per-role distributions for [`random_community`]. Defaults: `a_ij ~ N(0, 1)`,
/// self-regulation fixed at `-1`, unit growth rates and carrying capacities.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CommunitySampler {
    pub a_ij: EntryDistribution,
    pub a_ii: EntryDistribution,
    pub r_i: EntryDistribution,
    pub k_i: EntryDistribution,
    pub interaction: InteractionKind,
}

impl Default for CommunitySampler {
    fn default() -> Self {
        Self {
            a_ij: EntryDistribution::normal(0.0, 1.0),
            a_ii: EntryDistribution::constant(-1.0),
            r_i: EntryDistribution::constant(1.0),
            k_i: EntryDistribution::constant(1.0),
            interaction: InteractionKind::Raw,
        }
    }
}

impl CommunitySampler {
    /// The usual disordered ensemble: `a_ij ~ N(mu / S, sigma / sqrt(S))` and
    /// `K_i ~ N(k_mean, k_std)`.
    pub fn scaled_normal(richness: usize, mu: f64, sigma: f64, k_mean: f64, k_std: f64) -> Self {
        let s = richness.max(1) as f64;
        Self {
            a_ij: EntryDistribution::normal(mu / s, sigma / s.sqrt()),
            k_i: EntryDistribution::normal(k_mean, k_std),
            ..Self::default()
        }
    }

    pub fn with_interaction(mut self, interaction: InteractionKind) -> Self {
        self.interaction = interaction;
        self
    }

    pub fn sample<R: Rng + ?Sized>(&self, richness: usize, rng: &mut R) -> Result<Community> {
        random_community(richness, self, rng)
    }
}

/// Draws a community of `richness` species with independent entries. The
/// diagonal is always taken from `a_ii`, whatever `a_ij` is.
pub fn random_community<R: Rng + ?Sized>(
    richness: usize,
    sampler: &CommunitySampler,
    rng: &mut R,
) -> Result<Community> {
    if richness == 0 {
        return Err(GlvError::EmptyCommunity);
    }
    let off = sampler.a_ij.sampler()?;
    let diag = sampler.a_ii.sampler()?;
    let growth = sampler.r_i.sampler()?;
    let capacity = sampler.k_i.sampler()?;

    let mut a = DMatrix::from_fn(richness, richness, |_, _| off.sample(rng));
    for i in 0..richness {
        a[(i, i)] = diag.sample(rng);
    }
    let r = DVector::from_fn(richness, |_, _| growth.sample(rng));
    let k = DVector::from_fn(richness, |_, _| capacity.sample(rng));

    if sampler.interaction == InteractionKind::Core {
        if let Some(index) = k.iter().position(|&v| v == 0.0) {
            return Err(GlvError::InvalidCarryingCapacity { index });
        }
        for i in 0..richness {
            for j in 0..richness {
                if i != j {
                    a[(i, j)] *= k[j] / k[i];
                }
            }
        }
    }

    Community::new(a, r, k)
}
