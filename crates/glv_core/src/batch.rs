//! Embarrassingly parallel sweeps. Every task is independent and results come
//! back in input order.

use crate::assembly::{assemble, Assembly, AssemblySettings};
use crate::cavity::{cavity_predictions, CavityPrediction, CavitySettings};
use crate::community::Community;
use crate::dynamics::{simulate_noise, simulate_pulse, SimulationSettings};
use crate::error::Result;
use crate::integrate::Trajectory;
use crate::sampling::CommunitySampler;
use crate::statistics::CavityParameters;
use rand::rngs::StdRng;
use rand::SeedableRng;
use rayon::prelude::*;

/// Cavity predictions for every parameter set.
pub fn cavity_sweep(
    params: &[CavityParameters],
    settings: &CavitySettings,
) -> Result<Vec<CavityPrediction>> {
    settings.newton.validate()?;
    params
        .par_iter()
        .map(|p| cavity_predictions(p, settings))
        .collect()
}

/// One pulse recovery per perturbation vector.
pub fn pulse_trials(
    c: &Community,
    perturbations: &[Vec<f64>],
    horizon: f64,
    settings: &SimulationSettings,
) -> Result<Vec<Trajectory>> {
    perturbations
        .par_iter()
        .map(|x| simulate_pulse(c, x, horizon, settings))
        .collect()
}

/// `trials` noisy runs from equilibrium; trial `i` uses the generator seeded
/// with `seed + i`.
pub fn noise_trials<N>(
    c: &Community,
    noise: N,
    tspan: (f64, f64),
    trials: usize,
    seed: u64,
    settings: &SimulationSettings,
) -> Result<Vec<Trajectory>>
where
    N: Fn(&[f64], f64, &mut [f64]) + Sync,
{
    (0..trials)
        .into_par_iter()
        .map(|i| {
            let mut rng = StdRng::seed_from_u64(seed.wrapping_add(i as u64));
            let mut forcing = |x: &[f64], t: f64, g: &mut [f64]| noise(x, t, g);
            simulate_noise(c, &mut forcing, tspan, settings, &mut rng)
        })
        .collect()
}

/// Samples and assembles `trials` independent communities. Each trial keeps its
/// own outcome, so a collapsed community does not abort the rest.
pub fn assembly_trials(
    sampler: &CommunitySampler,
    richness: usize,
    trials: usize,
    seed: u64,
    settings: &AssemblySettings,
) -> Vec<Result<Assembly>> {
    (0..trials)
        .into_par_iter()
        .map(|i| {
            let mut rng = StdRng::seed_from_u64(seed.wrapping_add(i as u64));
            let c = sampler.sample(richness, &mut rng)?;
            assemble(&c, settings)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::GlvError;

    #[test]
    fn cavity_sweep_preserves_order() {
        let grid: Vec<CavityParameters> = [0.0, -1.0, -2.0]
            .iter()
            .map(|&mu| CavityParameters::new(mu, 0.3, 0.0, 1.0, 0.2))
            .collect();
        let settings = CavitySettings::default();
        let sweep = cavity_sweep(&grid, &settings).unwrap();
        assert_eq!(sweep.len(), 3);
        for (p, prediction) in grid.iter().zip(&sweep) {
            assert_eq!(*prediction, cavity_predictions(p, &settings).unwrap());
        }
        assert!(sweep[0].phi() > sweep[1].phi() && sweep[1].phi() > sweep[2].phi());
    }

    #[test]
    fn pulse_trials_all_start_from_their_own_displacement() {
        let c = Community::from_slices(&[-1.0, 0.0, 0.0, -1.0], &[1.0, 1.0], &[1.0, 2.0])
            .unwrap();
        let pulses = vec![vec![0.1, 0.0], vec![0.0, -0.5], vec![0.3, 0.3]];
        let trials = pulse_trials(&c, &pulses, 20.0, &SimulationSettings::default()).unwrap();
        assert_eq!(trials.len(), 3);
        for (x, trajectory) in pulses.iter().zip(&trials) {
            assert_eq!(trajectory.states[0], vec![1.0 + x[0], 2.0 + x[1]]);
            assert!(trajectory.is_success());
        }
    }

    #[test]
    fn noise_trials_are_seeded_per_trial() {
        let c = Community::from_slices(&[-1.0, -0.2, -0.2, -1.0], &[1.0, 1.0], &[1.0, 1.0])
            .unwrap();
        let noise = |x: &[f64], _t: f64, g: &mut [f64]| {
            for (gi, xi) in g.iter_mut().zip(x) {
                *gi = 0.1 * xi;
            }
        };
        let settings = SimulationSettings::default();
        let first = noise_trials(&c, noise, (0.0, 2.0), 4, 99, &settings).unwrap();
        let again = noise_trials(&c, noise, (0.0, 2.0), 4, 99, &settings).unwrap();
        assert_eq!(first.len(), 4);
        for (a, b) in first.iter().zip(&again) {
            assert_eq!(a.states, b.states);
        }
        assert_ne!(first[0].states, first[1].states);
    }

    #[test]
    fn assembly_trials_report_each_outcome() {
        let sampler = CommunitySampler::scaled_normal(20, -1.0, 0.5, 1.0, 0.2);
        let outcomes = assembly_trials(&sampler, 20, 3, 7, &AssemblySettings::default());
        assert_eq!(outcomes.len(), 3);
        for outcome in &outcomes {
            let assembly = outcome.as_ref().unwrap();
            assert!(assembly.richness() <= 20);
        }
        let empty = assembly_trials(&sampler, 0, 1, 7, &AssemblySettings::default());
        assert_eq!(empty[0], Err(GlvError::EmptyCommunity));
    }
}
