use crate::traits::{constant, DynamicalSystem, EmbeddedSteppable, Scalar, Steppable};
use rand::Rng;
use rand_distr::StandardNormal;

/// Classic Runge-Kutta 4th Order Solver
pub struct RK4<T: Scalar> {
    k1: Vec<T>,
    k2: Vec<T>,
    k3: Vec<T>,
    k4: Vec<T>,
    tmp: Vec<T>,
}

impl<T: Scalar> RK4<T> {
    pub fn new(dim: usize) -> Self {
        let z = T::zero();
        Self {
            k1: vec![z; dim],
            k2: vec![z; dim],
            k3: vec![z; dim],
            k4: vec![z; dim],
            tmp: vec![z; dim],
        }
    }
}

impl<T: Scalar> Steppable<T> for RK4<T> {
    fn step(&mut self, system: &impl DynamicalSystem<T>, t: &mut T, state: &mut [T], dt: T) {
        let half = constant::<T>(0.5);
        let sixth = constant::<T>(1.0 / 6.0);
        let two = constant::<T>(2.0);

        let t0 = *t;

        // k1 = f(t, y)
        system.apply(t0, state, &mut self.k1);

        // k2 = f(t + dt/2, y + dt*k1/2)
        for i in 0..state.len() {
            self.tmp[i] = state[i] + dt * self.k1[i] * half;
        }
        system.apply(t0 + dt * half, &self.tmp, &mut self.k2);

        // k3 = f(t + dt/2, y + dt*k2/2)
        for i in 0..state.len() {
            self.tmp[i] = state[i] + dt * self.k2[i] * half;
        }
        system.apply(t0 + dt * half, &self.tmp, &mut self.k3);

        // k4 = f(t + dt, y + dt*k3)
        for i in 0..state.len() {
            self.tmp[i] = state[i] + dt * self.k3[i];
        }
        system.apply(t0 + dt, &self.tmp, &mut self.k4);

        // y_next = y + dt/6 * (k1 + 2k2 + 2k3 + k4)
        for i in 0..state.len() {
            state[i] = state[i]
                + dt * sixth * (self.k1[i] + two * self.k2[i] + two * self.k3[i] + self.k4[i]);
        }

        *t = t0 + dt;
    }
}

// Tsitouras (2011) 5(4) tableau.
const TSIT5_C: [f64; 6] = [0.0, 0.161, 0.327, 0.9, 0.9800255409045097, 1.0];
const TSIT5_A: [[f64; 6]; 6] = [
    [0.0, 0.0, 0.0, 0.0, 0.0, 0.0],
    [0.161, 0.0, 0.0, 0.0, 0.0, 0.0],
    [-0.008480655492356989, 0.335480655492357, 0.0, 0.0, 0.0, 0.0],
    [2.897153057105493, -6.359448489975075, 4.3622954328695815, 0.0, 0.0, 0.0],
    [
        5.325864828439257,
        -11.748883564062828,
        7.4955393428898365,
        -0.09249506636175525,
        0.0,
        0.0,
    ],
    [
        5.86145544294642,
        -12.92096931784711,
        8.159367898576159,
        -0.071584973281401,
        -0.028269050394068383,
        0.0,
    ],
];
const TSIT5_B: [f64; 6] = [
    0.09646076681806523,
    0.01,
    0.4798896504144996,
    1.379008574103742,
    -3.290069515436081,
    2.324710524099774,
];
// Difference between the 5th and embedded 4th order weights; the 7th stage is
// f(t + dt, y_next).
const TSIT5_BTILDE: [f64; 7] = [
    -0.00178001105222577714,
    -0.0008164344596567469,
    0.007880878010261995,
    -0.1447110071732629,
    0.5823571654525552,
    -0.45808210592918697,
    1.0 / 66.0,
];

/// Tsitouras 5/4 Solver
pub struct Tsit5<T: Scalar> {
    k: [Vec<T>; 7],
    tmp: Vec<T>,
    next: Vec<T>,
    error: Vec<T>,
}

impl<T: Scalar> Tsit5<T> {
    pub fn new(dim: usize) -> Self {
        let z = T::zero();
        Self {
            k: std::array::from_fn(|_| vec![z; dim]),
            tmp: vec![z; dim],
            next: vec![z; dim],
            error: vec![z; dim],
        }
    }
}

impl<T: Scalar> EmbeddedSteppable<T> for Tsit5<T> {
    fn trial_step(
        &mut self,
        system: &impl DynamicalSystem<T>,
        t: T,
        state: &[T],
        dt: T,
        next: &mut [T],
        error: &mut [T],
    ) {
        let dim = state.len();

        system.apply(t, state, &mut self.k[0]);
        for stage in 1..6 {
            for i in 0..dim {
                let mut incr = T::zero();
                for (j, &a) in TSIT5_A[stage][..stage].iter().enumerate() {
                    incr = incr + constant::<T>(a) * self.k[j][i];
                }
                self.tmp[i] = state[i] + dt * incr;
            }
            system.apply(
                t + constant::<T>(TSIT5_C[stage]) * dt,
                &self.tmp,
                &mut self.k[stage],
            );
        }

        for i in 0..dim {
            let mut incr = T::zero();
            for (j, &b) in TSIT5_B.iter().enumerate() {
                incr = incr + constant::<T>(b) * self.k[j][i];
            }
            next[i] = state[i] + dt * incr;
        }

        system.apply(t + dt, next, &mut self.k[6]);
        for i in 0..dim {
            let mut err = T::zero();
            for (j, &bt) in TSIT5_BTILDE.iter().enumerate() {
                err = err + constant::<T>(bt) * self.k[j][i];
            }
            error[i] = dt * err;
        }
    }

    fn error_order(&self) -> usize {
        4
    }
}

impl<T: Scalar> Steppable<T> for Tsit5<T> {
    fn step(&mut self, system: &impl DynamicalSystem<T>, t: &mut T, state: &mut [T], dt: T) {
        let mut next = std::mem::take(&mut self.next);
        let mut error = std::mem::take(&mut self.error);
        self.trial_step(system, *t, state, dt, &mut next, &mut error);
        state.copy_from_slice(&next);
        self.next = next;
        self.error = error;
        *t = *t + dt;
    }
}

/// Euler-Maruyama stepper for `dX = f(X, t) dt + g(X, t) dW` with diagonal,
/// additive noise `g` supplied in place by the caller.
pub struct EulerMaruyama {
    drift: Vec<f64>,
    diffusion: Vec<f64>,
}

impl EulerMaruyama {
    pub fn new(dim: usize) -> Self {
        Self {
            drift: vec![0.0; dim],
            diffusion: vec![0.0; dim],
        }
    }

    pub fn step<N, R>(
        &mut self,
        system: &impl DynamicalSystem<f64>,
        noise: &mut N,
        rng: &mut R,
        t: &mut f64,
        state: &mut [f64],
        dt: f64,
    ) where
        N: FnMut(&[f64], f64, &mut [f64]),
        R: Rng + ?Sized,
    {
        system.apply(*t, state, &mut self.drift);
        self.diffusion.iter_mut().for_each(|g| *g = 0.0);
        noise(state, *t, &mut self.diffusion);

        let sqrt_dt = dt.sqrt();
        for i in 0..state.len() {
            let dw: f64 = rng.sample::<f64, _>(StandardNormal) * sqrt_dt;
            state[i] += self.drift[i] * dt + self.diffusion[i] * dw;
        }
        *t += dt;
    }
}
