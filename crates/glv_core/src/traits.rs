use num_traits::{Float, FromPrimitive};
use std::fmt::Debug;

/// Numeric types the vector fields and residuals are written over: `f64` for
/// integration, `Dual` for exact Jacobians.
pub trait Scalar: Float + FromPrimitive + Debug + 'static {}

impl<T: Float + FromPrimitive + Debug + 'static> Scalar for T {}

/// Lifts an f64 constant into `T`. Never fails for `f64` or `Dual`.
pub fn constant<T: Scalar>(value: f64) -> T {
    T::from_f64(value).unwrap_or_else(T::nan)
}

/// A continuous-time system `dx/dt = f(t, x)`. Root-finding reuses it with `f`
/// read as a residual.
pub trait DynamicalSystem<T: Scalar> {
    /// Returns the dimension of the state space.
    fn dimension(&self) -> usize;

    /// Writes `f(t, x)` into `out`.
    fn apply(&self, t: T, x: &[T], out: &mut [T]);
}

/// A trait for solvers that can step a system forward.
pub trait Steppable<T: Scalar> {
    /// Performs one step of size dt.
    /// t: current time (updated after step)
    /// state: current state (updated after step)
    /// dt: step size
    fn step(&mut self, system: &impl DynamicalSystem<T>, t: &mut T, state: &mut [T], dt: T);
}

/// Steppers carrying an embedded lower-order solution for error control.
pub trait EmbeddedSteppable<T: Scalar>: Steppable<T> {
    /// Computes a trial step from `state` into `next` without touching `state`,
    /// writing the local error estimate into `error`.
    fn trial_step(
        &mut self,
        system: &impl DynamicalSystem<T>,
        t: T,
        state: &[T],
        dt: T,
        next: &mut [T],
        error: &mut [T],
    );

    /// Order of the embedded estimate, used by the step-size controller.
    fn error_order(&self) -> usize;
}
