use crate::autodiff::{jacobian_by_columns, Dual};
use crate::error::{GlvError, Result};
use crate::traits::DynamicalSystem;
use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct NewtonSettings {
    pub max_steps: usize,
    pub tolerance: f64,
    /// Backtracking gives up once the step has been halved below this fraction
    /// of the full Newton step.
    pub min_step_fraction: f64,
}

impl Default for NewtonSettings {
    fn default() -> Self {
        Self {
            max_steps: 100,
            tolerance: 1e-10,
            min_step_fraction: 1e-6,
        }
    }
}

impl NewtonSettings {
    pub fn validate(&self) -> Result<()> {
        if self.max_steps == 0 {
            return Err(GlvError::InvalidSettings(
                "max_steps must be greater than zero.".into(),
            ));
        }
        if !(self.tolerance > 0.0) {
            return Err(GlvError::InvalidSettings(
                "tolerance must be positive.".into(),
            ));
        }
        if !(self.min_step_fraction > 0.0 && self.min_step_fraction <= 1.0) {
            return Err(GlvError::InvalidSettings(
                "min_step_fraction must lie in (0, 1].".into(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewtonSolution {
    pub state: Vec<f64>,
    pub residual_norm: f64,
    pub iterations: usize,
}

/// Finds a root of `system` (read as `F(x) = apply(0, x)`) starting from
/// `initial_guess`.
///
/// The Jacobian comes from forward-mode dual numbers. Each Newton step is
/// halved until the residual norm decreases and stays finite, so iterates never
/// wander into the region where `F` is undefined.
pub fn solve_newton<S>(
    system: &S,
    initial_guess: &[f64],
    settings: &NewtonSettings,
) -> Result<NewtonSolution>
where
    S: DynamicalSystem<f64> + DynamicalSystem<Dual>,
{
    settings.validate()?;
    let dim = DynamicalSystem::<f64>::dimension(system);
    if dim == 0 {
        return Err(GlvError::InvalidSettings("System has zero dimension.".into()));
    }
    if initial_guess.len() != dim {
        return Err(GlvError::DimensionMismatch {
            what: "initial guess",
            expected: dim,
            actual: initial_guess.len(),
        });
    }

    let mut state = initial_guess.to_vec();
    let mut residual = vec![0.0; dim];
    evaluate_residual(system, &state, &mut residual);
    let mut residual_norm = l2_norm(&residual);
    if !residual_norm.is_finite() {
        return Err(GlvError::NonConvergence {
            steps: 0,
            residual_norm,
        });
    }

    let mut candidate = vec![0.0; dim];
    let mut candidate_residual = vec![0.0; dim];
    let mut iterations = 0usize;

    while residual_norm > settings.tolerance {
        if iterations >= settings.max_steps {
            return Err(GlvError::NonConvergence {
                steps: settings.max_steps,
                residual_norm,
            });
        }

        let jacobian = jacobian_by_columns(&state, dim, |x, out| {
            DynamicalSystem::<Dual>::apply(system, Dual::constant(0.0), x, out)
        });
        let delta = DMatrix::from_row_slice(dim, dim, &jacobian)
            .lu()
            .solve(&DVector::from_column_slice(&residual))
            .ok_or(GlvError::NonConvergence {
                steps: iterations,
                residual_norm,
            })?;

        let mut fraction = 1.0;
        loop {
            for i in 0..dim {
                candidate[i] = state[i] - fraction * delta[i];
            }
            evaluate_residual(system, &candidate, &mut candidate_residual);
            let candidate_norm = l2_norm(&candidate_residual);
            if candidate_norm.is_finite() && candidate_norm < residual_norm {
                std::mem::swap(&mut state, &mut candidate);
                std::mem::swap(&mut residual, &mut candidate_residual);
                residual_norm = candidate_norm;
                break;
            }
            fraction *= 0.5;
            if fraction < settings.min_step_fraction {
                return Err(GlvError::NonConvergence {
                    steps: iterations,
                    residual_norm,
                });
            }
        }

        iterations += 1;
    }

    Ok(NewtonSolution {
        state,
        residual_norm,
        iterations,
    })
}

fn evaluate_residual<S: DynamicalSystem<f64>>(system: &S, state: &[f64], out: &mut [f64]) {
    system.apply(0.0, state, out);
}

fn l2_norm(values: &[f64]) -> f64 {
    values.iter().map(|v| v * v).sum::<f64>().sqrt()
}
