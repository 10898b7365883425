//! The `glv_core` crate simulates species communities under generalized
//! Lotka-Volterra dynamics and predicts their macroscopic state with the cavity
//! method.
//!
//! Key components:
//! - **Community**: interaction matrix, growth rates and carrying capacities, with
//!   random construction from serde-configurable distributions.
//! - **Dynamics**: the GLV field (generic over `f64` and `Dual`) with pulse, press,
//!   extinction and noise variants, integrated by RK4, adaptive Tsit5 or
//!   Euler-Maruyama.
//! - **Assembly**: repeated simulate-and-prune down to the persistent sub-community.
//! - **Cavity**: ensemble statistics and the self-consistent mean-field solve.
pub mod assembly;
pub mod autodiff;
pub mod batch;
pub mod cavity;
pub mod community;
pub mod config;
pub mod dynamics;
pub mod equilibrium;
pub mod error;
pub mod integrate;
pub mod newton;
pub mod sampling;
pub mod solvers;
pub mod statistics;
pub mod traits;

pub use assembly::{assemble, Assembly, AssemblySettings};
pub use cavity::{cavity_predictions, cavity_predictions_for, CavityPrediction, CavitySettings};
pub use community::{offdiag, Community};
pub use config::GlvConfig;
pub use dynamics::{
    simulate_extinctions, simulate_noise, simulate_press, simulate_pulse, solve, solve_noisy,
    GlvField, SimulationSettings,
};
pub use equilibrium::{
    equilibrium_abundance, equilibrium_stability, functional_extinctions, relative_yield,
    species_reactivity, EquilibriumSettings,
};
pub use error::{GlvError, Result};
pub use integrate::{IntegrationMethod, IntegrationStatus, IntegratorSettings, Trajectory};
pub use sampling::{random_community, CommunitySampler, EntryDistribution, InteractionKind};
pub use statistics::CavityParameters;
