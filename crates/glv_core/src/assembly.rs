//! Community assembly: simulate, drop the species that died out, repeat.

use crate::community::Community;
use crate::dynamics::GlvField;
use crate::error::{GlvError, Result};
use crate::integrate::{integrate, IntegratorSettings};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct AssemblySettings {
    /// Every species starts each round at this abundance.
    pub initial_abundance: f64,
    pub horizon: f64,
    /// A species survives when its final abundance is strictly above this.
    pub extinction_threshold: f64,
    pub integrator: IntegratorSettings,
}

impl Default for AssemblySettings {
    fn default() -> Self {
        Self {
            initial_abundance: 1.0,
            horizon: 10_000.0,
            extinction_threshold: 1e-6,
            integrator: IntegratorSettings::default(),
        }
    }
}

impl AssemblySettings {
    pub fn validate(&self) -> Result<()> {
        if !(self.initial_abundance > 0.0) || !self.initial_abundance.is_finite() {
            return Err(GlvError::InvalidSettings(
                "initial_abundance must be positive and finite.".into(),
            ));
        }
        if !(self.horizon > 0.0) || !self.horizon.is_finite() {
            return Err(GlvError::InvalidSettings(
                "horizon must be positive and finite.".into(),
            ));
        }
        if !(self.extinction_threshold >= 0.0) {
            return Err(GlvError::InvalidSettings(
                "extinction_threshold must be non-negative.".into(),
            ));
        }
        self.integrator.validate()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Assembly {
    /// The stable sub-community.
    pub community: Community,
    /// Indices into the original community of the surviving species, in order.
    pub surviving: Vec<usize>,
    /// Indices into the original community of the species that were dropped.
    pub removed: Vec<usize>,
    /// Final abundances of the last round, aligned with `surviving`.
    pub abundances: Vec<f64>,
    /// Number of simulate-and-prune rounds, including the final stable one.
    pub iterations: usize,
}

impl Assembly {
    pub fn richness(&self) -> usize {
        self.surviving.len()
    }
}

/// Assembles `c` into the sub-community that persists under its own dynamics.
///
/// Richness strictly decreases between rounds, so the loop runs at most
/// `richness(c)` times. Removing every species is [`GlvError::CommunityCollapsed`];
/// a failed integration is [`GlvError::IntegrationFailure`].
pub fn assemble(c: &Community, settings: &AssemblySettings) -> Result<Assembly> {
    settings.validate()?;
    let original = c.richness();
    let mut current = c.clone();
    let mut surviving: Vec<usize> = (0..original).collect();

    for iteration in 1..=original {
        let richness = current.richness();
        let field = GlvField::new(&current)?;
        let initial = vec![settings.initial_abundance; richness];
        let final_state = integrate(
            &field,
            &initial,
            (0.0, settings.horizon),
            &settings.integrator,
        )?
        .into_final_state()?;

        let keep: Vec<usize> = (0..richness)
            .filter(|&i| final_state[i] > settings.extinction_threshold)
            .collect();
        debug!(
            iteration,
            richness,
            survivors = keep.len(),
            "assembly round finished"
        );

        if keep.len() == richness {
            info!(
                iterations = iteration,
                richness,
                removed = original - richness,
                "community assembled"
            );
            let removed = (0..original).filter(|i| !surviving.contains(i)).collect();
            return Ok(Assembly {
                community: current,
                surviving,
                removed,
                abundances: final_state,
                iterations: iteration,
            });
        }
        if keep.is_empty() {
            return Err(GlvError::CommunityCollapsed {
                iterations: iteration,
            });
        }

        surviving = keep.iter().map(|&i| surviving[i]).collect();
        current = current.subcommunity(&keep)?;
    }

    Err(GlvError::CommunityCollapsed {
        iterations: original,
    })
}
