//! The generalized Lotka-Volterra vector field and its perturbation variants.

use crate::community::Community;
use crate::equilibrium::{equilibrium_abundance, EquilibriumSettings};
use crate::error::{GlvError, Result};
use crate::integrate::{integrate, integrate_sde, IntegratorSettings, Trajectory};
use crate::traits::{constant, DynamicalSystem, Scalar};
use nalgebra::{DMatrix, DVector};
use rand::Rng;
use serde::{Deserialize, Serialize};

/// `dN_i/dt = r_i N_i (K_i + sum_j A_ij N_j) / K_i`.
///
/// Coordinates marked as removed have zero derivative, so a removed species
/// started at zero stays there. Every other coordinate is still absorbing at
/// zero because the field is proportional to `N_i`.
pub struct GlvField<'a> {
    a: &'a DMatrix<f64>,
    r: &'a DVector<f64>,
    k: &'a DVector<f64>,
    removed: Vec<bool>,
}

impl<'a> GlvField<'a> {
    pub fn new(c: &'a Community) -> Result<Self> {
        Self::with_capacities(c, c.k())
    }

    /// The field of `c` with `k` in place of its own carrying capacities.
    pub fn with_capacities(c: &'a Community, k: &'a DVector<f64>) -> Result<Self> {
        let s = c.richness();
        if k.len() != s {
            return Err(GlvError::DimensionMismatch {
                what: "carrying capacities",
                expected: s,
                actual: k.len(),
            });
        }
        if let Some(index) = k.iter().position(|&v| v == 0.0) {
            return Err(GlvError::InvalidCarryingCapacity { index });
        }
        Ok(Self {
            a: c.a(),
            r: c.r(),
            k,
            removed: vec![false; s],
        })
    }

    /// Holds the given species at zero.
    pub fn with_removed(mut self, indices: &[usize]) -> Result<Self> {
        let s = self.removed.len();
        for &index in indices {
            if index >= s {
                return Err(GlvError::SpeciesOutOfRange { index, richness: s });
            }
            self.removed[index] = true;
        }
        Ok(self)
    }
}

impl<T: Scalar> DynamicalSystem<T> for GlvField<'_> {
    fn dimension(&self) -> usize {
        self.r.len()
    }

    fn apply(&self, _t: T, x: &[T], out: &mut [T]) {
        let s = self.r.len();
        for i in 0..s {
            if self.removed[i] {
                out[i] = T::zero();
                continue;
            }
            let k_i = constant::<T>(self.k[i]);
            let mut drive = k_i;
            for j in 0..s {
                drive = drive + constant::<T>(self.a[(i, j)]) * x[j];
            }
            out[i] = constant::<T>(self.r[i]) * x[i] * drive / k_i;
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationSettings {
    pub integrator: IntegratorSettings,
    /// Used by the variants that start from the interior equilibrium.
    pub equilibrium: EquilibriumSettings,
    /// Fixed Euler-Maruyama step of the noisy variants.
    pub noise_dt: f64,
}

impl Default for SimulationSettings {
    fn default() -> Self {
        Self {
            integrator: IntegratorSettings::default(),
            equilibrium: EquilibriumSettings::default(),
            noise_dt: 1e-2,
        }
    }
}

fn check_length(what: &'static str, expected: usize, actual: usize) -> Result<()> {
    if expected != actual {
        return Err(GlvError::DimensionMismatch {
            what,
            expected,
            actual,
        });
    }
    Ok(())
}

/// Unperturbed relaxation from `u0`.
pub fn solve(
    c: &Community,
    u0: &[f64],
    tspan: (f64, f64),
    settings: &SimulationSettings,
) -> Result<Trajectory> {
    let field = GlvField::new(c)?;
    integrate(&field, u0, tspan, &settings.integrator)
}

/// Relaxation under additive stochastic forcing: `noise(x, t, g)` writes the
/// diffusion coefficient of each species into `g`.
pub fn solve_noisy<N, R>(
    c: &Community,
    u0: &[f64],
    tspan: (f64, f64),
    noise: &mut N,
    settings: &SimulationSettings,
    rng: &mut R,
) -> Result<Trajectory>
where
    N: FnMut(&[f64], f64, &mut [f64]),
    R: Rng + ?Sized,
{
    let field = GlvField::new(c)?;
    integrate_sde(
        &field,
        noise,
        u0,
        tspan,
        settings.noise_dt,
        &settings.integrator,
        rng,
    )
}

/// Noisy dynamics started from the interior equilibrium.
pub fn simulate_noise<N, R>(
    c: &Community,
    noise: &mut N,
    tspan: (f64, f64),
    settings: &SimulationSettings,
    rng: &mut R,
) -> Result<Trajectory>
where
    N: FnMut(&[f64], f64, &mut [f64]),
    R: Rng + ?Sized,
{
    let start = equilibrium_abundance(c, &settings.equilibrium)?;
    solve_noisy(c, start.as_slice(), tspan, noise, settings, rng)
}

/// Recovery from the displaced state `equilibrium + x` over `(0, horizon)`.
pub fn simulate_pulse(
    c: &Community,
    x: &[f64],
    horizon: f64,
    settings: &SimulationSettings,
) -> Result<Trajectory> {
    check_length("pulse perturbation", c.richness(), x.len())?;
    let mut start = equilibrium_abundance(c, &settings.equilibrium)?;
    for (n, dx) in start.iter_mut().zip(x) {
        *n += dx;
    }
    solve(c, start.as_slice(), (0.0, horizon), settings)
}

/// Response to a sustained change of carrying capacities to `k_new`, started
/// from the original equilibrium.
pub fn simulate_press(
    c: &Community,
    k_new: &[f64],
    tspan: (f64, f64),
    settings: &SimulationSettings,
) -> Result<Trajectory> {
    check_length("pressed carrying capacities", c.richness(), k_new.len())?;
    let start = equilibrium_abundance(c, &settings.equilibrium)?;
    let k_new = DVector::from_column_slice(k_new);
    let field = GlvField::with_capacities(c, &k_new)?;
    integrate(&field, start.as_slice(), tspan, &settings.integrator)
}

/// Permanent removal of `indices`, started from the original equilibrium with
/// the removed species set to zero.
pub fn simulate_extinctions(
    c: &Community,
    indices: &[usize],
    tspan: (f64, f64),
    settings: &SimulationSettings,
) -> Result<Trajectory> {
    let field = GlvField::new(c)?.with_removed(indices)?;
    let mut start = equilibrium_abundance(c, &settings.equilibrium)?;
    for &index in indices {
        start[index] = 0.0;
    }
    integrate(&field, start.as_slice(), tspan, &settings.integrator)
}
