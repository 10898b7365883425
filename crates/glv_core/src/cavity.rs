//! Mean-field (cavity) predictions for large disordered communities.
//!
//! Unknowns are `(phi, N_mean, N2_mean, v)`: the surviving fraction, the first
//! two moments of the abundance of survivors, and the response of a species to
//! its own carrying capacity. With
//!
//! ```text
//! s     = sqrt(K_std^2 + sigma^2 phi N2_mean)
//! Delta = (K_mean + mu phi N_mean) / s
//! ```
//!
//! the self-consistency conditions are
//!
//! ```text
//! phi         = w0(Delta)
//! phi N_mean  = v s w1(Delta)
//! phi N2_mean = v^2 s^2 w2(Delta)
//! v (1 - gamma sigma^2 phi v) = 1
//! ```
//!
//! where `w0 = Phi`, `w1 = Delta Phi + phi`, `w2 = (1 + Delta^2) Phi + Delta phi`
//! are the truncated-Gaussian moments (Bunin 2017; Barbier et al. 2018).

use crate::autodiff::GaussianScalar;
use crate::community::Community;
use crate::error::{GlvError, Result};
use crate::newton::{solve_newton, NewtonSettings};
use crate::sampling::InteractionKind;
use crate::statistics::CavityParameters;
use crate::traits::{constant, DynamicalSystem};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Outcome of a cavity solve. `Diverged` means the parameter regime predicts
/// collapse or unbounded growth; it is an answer, not an error.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum CavityPrediction {
    Converged {
        phi: f64,
        n_mean: f64,
        n2_mean: f64,
        v: f64,
    },
    Diverged,
}

impl CavityPrediction {
    pub fn is_converged(&self) -> bool {
        matches!(self, CavityPrediction::Converged { .. })
    }

    /// `(phi, N_mean, N2_mean, v)`, all zero when the solve diverged.
    pub fn values(&self) -> (f64, f64, f64, f64) {
        match *self {
            CavityPrediction::Converged {
                phi,
                n_mean,
                n2_mean,
                v,
            } => (phi, n_mean, n2_mean, v),
            CavityPrediction::Diverged => (0.0, 0.0, 0.0, 0.0),
        }
    }

    pub fn phi(&self) -> f64 {
        self.values().0
    }

    pub fn n_mean(&self) -> f64 {
        self.values().1
    }

    pub fn n2_mean(&self) -> f64 {
        self.values().2
    }

    pub fn v(&self) -> f64 {
        self.values().3
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CavitySettings {
    pub newton: NewtonSettings,
}

/// Residual of the self-consistency conditions over `[phi, N_mean, N2_mean, v]`.
struct CavityEquations {
    params: CavityParameters,
}

impl<T: GaussianScalar> DynamicalSystem<T> for CavityEquations {
    fn dimension(&self) -> usize {
        4
    }

    fn apply(&self, _t: T, x: &[T], out: &mut [T]) {
        let p = &self.params;
        let (phi, n_mean, n2_mean, v) = (x[0], x[1], x[2], x[3]);
        let one = T::one();
        let mu = constant::<T>(p.mu);
        let sigma2 = constant::<T>(p.sigma * p.sigma);
        let gamma = constant::<T>(p.gamma);

        let variance = constant::<T>(p.k_std * p.k_std) + sigma2 * phi * n2_mean;
        let s = variance.sqrt();
        let delta = (constant::<T>(p.k_mean) + mu * phi * n_mean) / s;
        let cdf = delta.normal_cdf();
        let pdf = delta.normal_pdf();
        let w1 = delta * cdf + pdf;
        let w2 = (one + delta * delta) * cdf + delta * pdf;

        out[0] = phi - cdf;
        out[1] = phi * n_mean - v * s * w1;
        out[2] = phi * n2_mean - v * v * variance * w2;
        out[3] = v * (one - gamma * sigma2 * phi * v) - one;
    }
}

/// Solves the cavity equations for `params`.
///
/// Errors only on invalid settings. Non-convergence and infeasible fixed
/// points (`phi` outside `[0, 1]`, `N2_mean < N_mean^2`, non-positive `v`, or
/// `v` on the larger root with `2 gamma sigma^2 phi v >= 1`) yield
/// [`CavityPrediction::Diverged`].
pub fn cavity_predictions(
    params: &CavityParameters,
    settings: &CavitySettings,
) -> Result<CavityPrediction> {
    settings.newton.validate()?;
    let p = params;
    if ![p.mu, p.sigma, p.gamma, p.k_mean, p.k_std]
        .iter()
        .all(|v| v.is_finite())
    {
        debug!(?params, "cavity parameters are not finite");
        return Ok(CavityPrediction::Diverged);
    }

    if p.sigma == 0.0 && p.k_std == 0.0 {
        return Ok(noiseless_prediction(params));
    }

    // Start from the noiseless fixed point, which keeps Newton in the basin of
    // the physical root under strong competition.
    let drag = 1.0 - p.mu;
    let n_guess = if drag > 0.0 && p.k_mean / drag > 0.0 {
        p.k_mean / drag
    } else {
        p.k_mean
    };
    let guess = [1.0, n_guess, n_guess * n_guess + p.k_std * p.k_std, 1.0];

    let system = CavityEquations { params: *params };
    let solution = match solve_newton(&system, &guess, &settings.newton) {
        Ok(solution) => solution,
        Err(GlvError::NonConvergence {
            steps,
            residual_norm,
        }) => {
            debug!(?params, steps, residual_norm, "cavity solve did not converge");
            return Ok(CavityPrediction::Diverged);
        }
        Err(err) => return Err(err),
    };

    let state = &solution.state;
    Ok(feasible(params, state[0], state[1], state[2], state[3]))
}

/// Extracts the ensemble statistics of `c` and solves the cavity equations.
pub fn cavity_predictions_for(
    c: &Community,
    kind: InteractionKind,
    settings: &CavitySettings,
) -> Result<CavityPrediction> {
    let params = CavityParameters::from_community(c, kind)?;
    cavity_predictions(&params, settings)
}

/// `sigma = K_std = 0`: every species survives at `N = K_mean / (1 - mu)`.
fn noiseless_prediction(params: &CavityParameters) -> CavityPrediction {
    let drag = 1.0 - params.mu;
    if !(drag > 0.0) {
        debug!(?params, "mean interaction overwhelms self-regulation");
        return CavityPrediction::Diverged;
    }
    let n_mean = params.k_mean / drag;
    feasible(params, 1.0, n_mean, n_mean * n_mean, 1.0)
}

fn feasible(
    params: &CavityParameters,
    phi: f64,
    n_mean: f64,
    n2_mean: f64,
    v: f64,
) -> CavityPrediction {
    let reason = if ![phi, n_mean, n2_mean, v].iter().all(|x| x.is_finite()) {
        Some("non-finite solution")
    } else if !(0.0..=1.0).contains(&phi) {
        Some("survival fraction outside [0, 1]")
    } else if !(n_mean > 0.0) {
        Some("non-positive mean abundance")
    } else if n2_mean < n_mean * n_mean {
        Some("negative abundance variance")
    } else if !(v > 0.0) {
        Some("non-positive response")
    } else if !(2.0 * params.gamma * params.sigma * params.sigma * phi * v < 1.0) {
        // The response equation has two roots for gamma > 0; only the smaller
        // one connects continuously to v = 1 at gamma = 0.
        Some("response on the unphysical branch")
    } else {
        None
    };

    match reason {
        Some(reason) => {
            debug!(?params, phi, n_mean, n2_mean, v, reason, "cavity solution rejected");
            CavityPrediction::Diverged
        }
        None => CavityPrediction::Converged {
            phi,
            n_mean,
            n2_mean,
            v,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assembly::{assemble, AssemblySettings};
    use crate::sampling::CommunitySampler;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn solve(mu: f64, sigma: f64, gamma: f64, k_mean: f64, k_std: f64) -> CavityPrediction {
        cavity_predictions(
            &CavityParameters::new(mu, sigma, gamma, k_mean, k_std),
            &CavitySettings::default(),
        )
        .unwrap()
    }

    fn assert_close(actual: f64, expected: f64, tol: f64) {
        assert!(
            (actual - expected).abs() < tol,
            "expected {expected}, got {actual}"
        );
    }

    #[test]
    fn weak_coupling_keeps_everyone_at_carrying_capacity() {
        let prediction = solve(0.0, 0.1, 0.0, 1.0, 0.0);
        assert!(prediction.is_converged());
        assert!(prediction.phi() > 0.999);
        assert_close(prediction.n_mean(), 1.0, 1e-3);
        assert_close(prediction.v(), 1.0, 1e-12);
    }

    #[test]
    fn unit_disorder_without_capacity_spread() {
        let prediction = solve(0.0, 1.0, 0.0, 1.0, 0.0);
        let (phi, n_mean, n2_mean, v) = prediction.values();
        assert_close(phi, 0.68106, 1e-4);
        assert_close(n_mean, 2.11409, 1e-4);
        assert_close(n2_mean, 6.62843, 1e-4);
        assert_close(v, 1.0, 1e-12);

        // With K_std = 0 and sigma = 1 the second-moment condition reduces to
        // w2(Delta) = 1.
        let delta = 1.0 / (phi * n2_mean).sqrt();
        let w2 = (1.0 + delta * delta) * delta.normal_cdf() + delta * delta.normal_pdf();
        assert_close(w2, 1.0, 1e-8);
    }

    #[test]
    fn heterogeneous_capacities_reduce_survival_slightly() {
        let prediction = solve(0.0, 0.3, 0.0, 1.0, 0.2);
        let (phi, n_mean, n2_mean, _) = prediction.values();
        assert_close(phi, 0.99593, 1e-4);
        assert_close(n_mean, 1.00457, 1e-4);
        assert_close(n2_mean, 1.14742, 1e-4);
    }

    #[test]
    fn antisymmetric_interactions_lower_the_response() {
        let (phi, n_mean, n2_mean, v) = solve(0.0, 1.0, -1.0, 1.0, 0.3).values();
        assert_close(phi, 0.86490, 1e-4);
        assert_close(n_mean, 0.78912, 1e-4);
        assert_close(n2_mean, 0.84697, 1e-4);
        assert_close(v, 0.64272, 1e-4);
    }

    #[test]
    fn stronger_competition_lowers_survival() {
        for &sigma in &[0.3, 1.0] {
            let mut previous = f64::INFINITY;
            for &mu in &[0.0, -0.5, -1.0, -1.5, -2.0, -3.0, -4.0, -6.0] {
                let prediction = solve(mu, sigma, 0.0, 1.0, 0.2);
                assert!(prediction.is_converged(), "mu {mu} sigma {sigma}");
                let phi = prediction.phi();
                assert!(phi < previous, "phi {phi} at mu {mu} sigma {sigma}");
                previous = phi;
            }
        }
        assert_close(solve(-1.0, 0.3, 0.0, 1.0, 0.2).phi(), 0.97162, 1e-4);
        assert_close(solve(-2.0, 0.3, 0.0, 1.0, 0.2).phi(), 0.91995, 1e-4);
    }

    #[test]
    fn converged_moments_are_consistent() {
        for &(mu, sigma, gamma, k_std) in &[
            (0.0, 1.0, 0.0, 0.2),
            (-1.0, 1.0, 0.0, 0.2),
            (0.5, 0.5, 0.3, 0.1),
            (-1.0, 0.0, 0.0, 0.3),
            (0.0, 1.0, -1.0, 0.3),
        ] {
            let prediction = solve(mu, sigma, gamma, 1.0, k_std);
            let (phi, n_mean, n2_mean, _) = prediction.values();
            assert!(prediction.is_converged());
            assert!(phi > 0.0 && phi <= 1.0);
            assert!(n2_mean >= n_mean * n_mean);
        }
    }

    #[test]
    fn unstable_regimes_diverge_to_all_zero() {
        for &(mu, sigma, gamma, k_std) in &[
            (0.0, 1.0, 0.5, 0.2),
            (2.0, 1.0, 1.0, 0.2),
            (0.0, 2.0, 0.0, 0.0),
        ] {
            let prediction = solve(mu, sigma, gamma, 1.0, k_std);
            assert_eq!(prediction, CavityPrediction::Diverged);
            assert_eq!(prediction.values(), (0.0, 0.0, 0.0, 0.0));
        }
    }

    #[test]
    fn response_stays_on_the_physical_branch() {
        // Newton lands on the larger root v ~ 2.26 here; the physical one is ~ 1.80.
        assert_eq!(solve(-1.0, 0.8, 1.0, 1.0, 0.0), CavityPrediction::Diverged);

        for &gamma in &[0.3, 0.6, 0.9, 1.0] {
            for &sigma in &[0.3, 0.5, 0.8, 1.0] {
                for &mu in &[0.0, -1.0, -2.0] {
                    let prediction = solve(mu, sigma, gamma, 1.0, 0.0);
                    if let CavityPrediction::Converged { phi, v, .. } = prediction {
                        let g = gamma * sigma * sigma * phi;
                        let physical = (1.0 - (1.0 - 4.0 * g).sqrt()) / (2.0 * g);
                        assert!(2.0 * g * v < 1.0, "gamma {gamma} sigma {sigma} mu {mu}");
                        assert_close(v, physical, 1e-6);
                    }
                }
            }
        }
    }

    #[test]
    fn noiseless_ensemble_is_solved_exactly() {
        let prediction = solve(-1.0, 0.0, 0.3, 2.0, 0.0);
        assert_eq!(
            prediction,
            CavityPrediction::Converged {
                phi: 1.0,
                n_mean: 1.0,
                n2_mean: 1.0,
                v: 1.0,
            }
        );
        assert_eq!(solve(1.0, 0.0, 0.0, 1.0, 0.0), CavityPrediction::Diverged);
        assert_eq!(solve(-1.0, 0.0, 0.0, -1.0, 0.0), CavityPrediction::Diverged);
    }

    #[test]
    fn non_finite_parameters_diverge() {
        assert_eq!(solve(f64::NAN, 1.0, 0.0, 1.0, 0.0), CavityPrediction::Diverged);
    }

    #[test]
    fn invalid_newton_settings_are_an_error() {
        let settings = CavitySettings {
            newton: NewtonSettings {
                tolerance: 0.0,
                ..NewtonSettings::default()
            },
        };
        assert!(matches!(
            cavity_predictions(&CavityParameters::new(0.0, 1.0, 0.0, 1.0, 0.2), &settings),
            Err(GlvError::InvalidSettings(_))
        ));
    }

    #[test]
    fn prediction_from_a_sampled_community() {
        let mut rng = StdRng::seed_from_u64(8);
        let s = 100;
        let c = CommunitySampler::scaled_normal(s, 0.0, 0.3, 1.0, 0.2)
            .sample(s, &mut rng)
            .unwrap();
        let prediction =
            cavity_predictions_for(&c, InteractionKind::Raw, &CavitySettings::default()).unwrap();
        assert!(prediction.is_converged());
        assert!(prediction.phi() > 0.95);
        assert_close(prediction.n_mean(), 1.0, 0.1);
    }

    #[test]
    fn prediction_matches_assembled_community() {
        let mut rng = StdRng::seed_from_u64(31);
        let s = 200;
        let c = CommunitySampler::scaled_normal(s, -1.0, 0.3, 1.0, 0.2)
            .sample(s, &mut rng)
            .unwrap();
        let prediction =
            cavity_predictions_for(&c, InteractionKind::Raw, &CavitySettings::default()).unwrap();
        assert!(prediction.is_converged());

        let assembled = assemble(&c, &AssemblySettings::default()).unwrap();
        let phi = assembled.richness() as f64 / s as f64;
        let n_mean =
            assembled.abundances.iter().sum::<f64>() / assembled.abundances.len() as f64;
        assert_close(phi, prediction.phi(), 0.04);
        assert!(
            (n_mean / prediction.n_mean() - 1.0).abs() < 0.05,
            "simulated {n_mean}, predicted {}",
            prediction.n_mean()
        );
    }

    #[test]
    fn prediction_serializes_with_an_outcome_tag() {
        let json = serde_json::to_string(&CavityPrediction::Diverged).unwrap();
        assert_eq!(json, r#"{"outcome":"diverged"}"#);
    }
}
