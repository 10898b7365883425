//! Trajectory integration.
//!
//! Every dynamics variant funnels through [`integrate`] (deterministic) or
//! [`integrate_sde`] (additive stochastic forcing). Failures never panic or
//! error: they are recorded on the returned [`Trajectory`] so that batch sweeps
//! can keep going.

use crate::error::{GlvError, Result};
use crate::solvers::{EulerMaruyama, Tsit5, RK4};
use crate::traits::{DynamicalSystem, EmbeddedSteppable, Steppable};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum IntegrationMethod {
    /// Adaptive Tsitouras 5(4) with error control.
    Tsit5,
    /// Classic RK4 with a fixed step.
    Rk4 { dt: f64 },
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct IntegratorSettings {
    pub method: IntegrationMethod,
    pub rtol: f64,
    pub atol: f64,
    pub initial_step: f64,
    pub min_step: f64,
    pub max_step: f64,
    pub max_steps: usize,
    /// Record the state every `saveat` time units instead of at every step.
    pub saveat: Option<f64>,
}

impl Default for IntegratorSettings {
    fn default() -> Self {
        Self {
            method: IntegrationMethod::Tsit5,
            rtol: 1e-6,
            atol: 1e-9,
            initial_step: 1e-2,
            min_step: 1e-12,
            max_step: f64::MAX,
            max_steps: 1_000_000,
            saveat: None,
        }
    }
}

impl IntegratorSettings {
    pub fn validate(&self) -> Result<()> {
        if !(self.rtol > 0.0) || !(self.atol > 0.0) {
            return Err(GlvError::InvalidSettings(
                "rtol and atol must be positive.".into(),
            ));
        }
        if !(self.initial_step > 0.0) || !(self.min_step > 0.0) || !(self.max_step > 0.0) {
            return Err(GlvError::InvalidSettings(
                "step sizes must be positive.".into(),
            ));
        }
        if self.min_step > self.max_step {
            return Err(GlvError::InvalidSettings(
                "min_step must not exceed max_step.".into(),
            ));
        }
        if self.max_steps == 0 {
            return Err(GlvError::InvalidSettings(
                "max_steps must be greater than zero.".into(),
            ));
        }
        if let IntegrationMethod::Rk4 { dt } = self.method {
            if !(dt > 0.0) {
                return Err(GlvError::InvalidSettings(
                    "RK4 step dt must be positive.".into(),
                ));
            }
        }
        if let Some(every) = self.saveat {
            if !(every > 0.0) {
                return Err(GlvError::InvalidSettings(
                    "saveat must be positive.".into(),
                ));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status")]
pub enum IntegrationStatus {
    Success,
    /// The state became non-finite at time `t`.
    Diverged { t: f64 },
    /// The step budget ran out at time `t`.
    MaxStepsExceeded { t: f64 },
    /// The adaptive controller asked for a step below `min_step` at time `t`.
    StepSizeTooSmall { t: f64 },
}

impl fmt::Display for IntegrationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IntegrationStatus::Success => write!(f, "success"),
            IntegrationStatus::Diverged { t } => write!(f, "state diverged at t = {t}"),
            IntegrationStatus::MaxStepsExceeded { t } => {
                write!(f, "step budget exhausted at t = {t}")
            }
            IntegrationStatus::StepSizeTooSmall { t } => {
                write!(f, "step size underflow at t = {t}")
            }
        }
    }
}

/// Time-indexed states. `states[k]` is the abundance vector at `times[k]`;
/// the first entry is always the initial condition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trajectory {
    pub times: Vec<f64>,
    pub states: Vec<Vec<f64>>,
    pub status: IntegrationStatus,
}

impl Trajectory {
    fn start(t0: f64, initial: &[f64]) -> Self {
        Self {
            times: vec![t0],
            states: vec![initial.to_vec()],
            status: IntegrationStatus::Success,
        }
    }

    fn record(&mut self, t: f64, state: &[f64]) {
        self.times.push(t);
        self.states.push(state.to_vec());
    }

    pub fn len(&self) -> usize {
        self.times.len()
    }

    pub fn is_empty(&self) -> bool {
        self.times.is_empty()
    }

    pub fn is_success(&self) -> bool {
        self.status == IntegrationStatus::Success
    }

    /// The final state, only when the integration succeeded.
    pub fn final_state(&self) -> Option<&[f64]> {
        if self.is_success() {
            self.last_state()
        } else {
            None
        }
    }

    /// The last recorded state, regardless of status.
    pub fn last_state(&self) -> Option<&[f64]> {
        self.states.last().map(|s| s.as_slice())
    }

    /// Time series of species `index`.
    pub fn species(&self, index: usize) -> Result<Vec<f64>> {
        let richness = self.states.first().map_or(0, Vec::len);
        if index >= richness {
            return Err(GlvError::SpeciesOutOfRange { index, richness });
        }
        Ok(self.states.iter().map(|s| s[index]).collect())
    }

    /// The final state or the failure wrapped as [`GlvError::IntegrationFailure`].
    pub fn into_final_state(self) -> Result<Vec<f64>> {
        match self.status {
            IntegrationStatus::Success => Ok(self.states.into_iter().last().unwrap_or_default()),
            status => Err(GlvError::IntegrationFailure { status }),
        }
    }
}

/// Keeps track of the next requested output time when `saveat` is active.
struct OutputGrid {
    t0: f64,
    every: Option<f64>,
    index: usize,
}

impl OutputGrid {
    fn new(t0: f64, every: Option<f64>) -> Self {
        Self {
            t0,
            every,
            index: 1,
        }
    }

    fn next_time(&self, t_end: f64) -> f64 {
        match self.every {
            Some(every) => (self.t0 + every * self.index as f64).min(t_end),
            None => t_end,
        }
    }

    fn advance(&mut self) {
        self.index += 1;
    }

    fn saves_every_step(&self) -> bool {
        self.every.is_none()
    }
}

fn all_finite(state: &[f64]) -> bool {
    state.iter().all(|v| v.is_finite())
}

fn validate_problem(
    dimension: usize,
    initial: &[f64],
    tspan: (f64, f64),
    settings: &IntegratorSettings,
) -> Result<()> {
    settings.validate()?;
    if initial.len() != dimension {
        return Err(GlvError::DimensionMismatch {
            what: "initial condition",
            expected: dimension,
            actual: initial.len(),
        });
    }
    if !tspan.0.is_finite() || !tspan.1.is_finite() || tspan.1 < tspan.0 {
        return Err(GlvError::InvalidSettings(format!(
            "time span ({}, {}) must be finite and non-decreasing.",
            tspan.0, tspan.1
        )));
    }
    Ok(())
}

/// Integrates `system` from `initial` over `tspan`.
///
/// Fails only on invalid input; numerical failure is reported through
/// [`Trajectory::status`].
pub fn integrate<S: DynamicalSystem<f64>>(
    system: &S,
    initial: &[f64],
    tspan: (f64, f64),
    settings: &IntegratorSettings,
) -> Result<Trajectory> {
    validate_problem(system.dimension(), initial, tspan, settings)?;
    let trajectory = match settings.method {
        IntegrationMethod::Tsit5 => {
            let mut stepper = Tsit5::new(initial.len());
            integrate_adaptive(system, &mut stepper, initial, tspan, settings)
        }
        IntegrationMethod::Rk4 { dt } => integrate_fixed(system, initial, tspan, dt, settings),
    };
    if !trajectory.is_success() {
        warn!(status = %trajectory.status, "integration failed");
    }
    Ok(trajectory)
}

fn integrate_adaptive<S, E>(
    system: &S,
    stepper: &mut E,
    initial: &[f64],
    tspan: (f64, f64),
    settings: &IntegratorSettings,
) -> Trajectory
where
    S: DynamicalSystem<f64>,
    E: EmbeddedSteppable<f64>,
{
    let (t0, t_end) = tspan;
    let dim = initial.len();
    let mut trajectory = Trajectory::start(t0, initial);
    let mut grid = OutputGrid::new(t0, settings.saveat);
    let mut state = initial.to_vec();
    let mut next = vec![0.0; dim];
    let mut error = vec![0.0; dim];
    let mut t = t0;
    let mut h = settings.initial_step.min(settings.max_step);
    let exponent = 1.0 / (stepper.error_order() as f64 + 1.0);
    let mut steps = 0usize;

    if !all_finite(&state) {
        trajectory.status = IntegrationStatus::Diverged { t };
        return trajectory;
    }

    while t < t_end {
        if steps >= settings.max_steps {
            trajectory.status = IntegrationStatus::MaxStepsExceeded { t };
            return trajectory;
        }
        steps += 1;

        let target = grid.next_time(t_end);
        let clamped = h >= target - t;
        let dt = if clamped { target - t } else { h };

        stepper.trial_step(system, t, &state, dt, &mut next, &mut error);

        let mut norm = 0.0;
        for i in 0..dim {
            let scale = settings.atol + settings.rtol * state[i].abs().max(next[i].abs());
            let ratio = error[i] / scale;
            norm += ratio * ratio;
        }
        let norm = if dim == 0 { 0.0 } else { (norm / dim as f64).sqrt() };

        if !norm.is_finite() {
            // Treat a non-finite trial as a rejection; shrink hard.
            h = dt * 0.2;
            if h < settings.min_step {
                trajectory.status = IntegrationStatus::Diverged { t };
                return trajectory;
            }
            continue;
        }

        let factor = if norm == 0.0 {
            5.0
        } else {
            (0.9 * norm.powf(-exponent)).clamp(0.2, 5.0)
        };

        if norm <= 1.0 {
            t = if clamped { target } else { t + dt };
            std::mem::swap(&mut state, &mut next);
            if !all_finite(&state) {
                trajectory.status = IntegrationStatus::Diverged { t };
                return trajectory;
            }
            if clamped && !grid.saves_every_step() {
                trajectory.record(t, &state);
                grid.advance();
            } else if grid.saves_every_step() {
                trajectory.record(t, &state);
            }
            // A step shortened to hit an output time says little about the
            // natural step size.
            let proposal = dt * factor;
            h = if clamped { proposal.max(h) } else { proposal };
        } else {
            h = dt * factor;
        }
        h = h.min(settings.max_step);

        if h < settings.min_step && t < t_end {
            trajectory.status = IntegrationStatus::StepSizeTooSmall { t };
            return trajectory;
        }
    }

    trajectory
}

fn integrate_fixed<S: DynamicalSystem<f64>>(
    system: &S,
    initial: &[f64],
    tspan: (f64, f64),
    dt: f64,
    settings: &IntegratorSettings,
) -> Trajectory {
    let (t0, t_end) = tspan;
    let mut stepper = RK4::new(initial.len());
    let mut trajectory = Trajectory::start(t0, initial);
    let mut grid = OutputGrid::new(t0, settings.saveat);
    let mut state = initial.to_vec();
    let mut t = t0;
    let mut steps = 0usize;

    while t < t_end {
        if steps >= settings.max_steps {
            trajectory.status = IntegrationStatus::MaxStepsExceeded { t };
            return trajectory;
        }
        steps += 1;

        let target = grid.next_time(t_end);
        let clamped = dt >= target - t;
        let h = if clamped { target - t } else { dt };
        stepper.step(system, &mut t, &mut state, h);
        if clamped {
            t = target;
        }
        if !all_finite(&state) {
            trajectory.status = IntegrationStatus::Diverged { t };
            return trajectory;
        }
        if grid.saves_every_step() {
            trajectory.record(t, &state);
        } else if clamped {
            trajectory.record(t, &state);
            grid.advance();
        }
    }

    trajectory
}

/// Integrates `dX = f dt + g dW` with Euler-Maruyama at fixed step `dt`, where
/// `noise(x, t, g)` writes the diffusion `g` in place.
pub fn integrate_sde<S, N, R>(
    system: &S,
    noise: &mut N,
    initial: &[f64],
    tspan: (f64, f64),
    dt: f64,
    settings: &IntegratorSettings,
    rng: &mut R,
) -> Result<Trajectory>
where
    S: DynamicalSystem<f64>,
    N: FnMut(&[f64], f64, &mut [f64]),
    R: Rng + ?Sized,
{
    validate_problem(system.dimension(), initial, tspan, settings)?;
    if !(dt > 0.0) {
        return Err(GlvError::InvalidSettings(
            "SDE step dt must be positive.".into(),
        ));
    }

    let (t0, t_end) = tspan;
    let mut stepper = EulerMaruyama::new(initial.len());
    let mut trajectory = Trajectory::start(t0, initial);
    let mut grid = OutputGrid::new(t0, settings.saveat);
    let mut state = initial.to_vec();
    let mut t = t0;
    let mut steps = 0usize;

    while t < t_end {
        if steps >= settings.max_steps {
            trajectory.status = IntegrationStatus::MaxStepsExceeded { t };
            break;
        }
        steps += 1;

        let target = grid.next_time(t_end);
        let clamped = dt >= target - t;
        let h = if clamped { target - t } else { dt };
        stepper.step(system, &mut *noise, &mut *rng, &mut t, &mut state, h);
        if clamped {
            t = target;
        }
        if !all_finite(&state) {
            trajectory.status = IntegrationStatus::Diverged { t };
            break;
        }
        if grid.saves_every_step() {
            trajectory.record(t, &state);
        } else if clamped {
            trajectory.record(t, &state);
            grid.advance();
        }
    }

    if !trajectory.is_success() {
        warn!(status = %trajectory.status, "stochastic integration failed");
    }
    Ok(trajectory)
}
