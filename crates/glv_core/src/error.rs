//! Error taxonomy for `glv_core`.
//!
//! Structural problems (bad dimensions, singular interaction matrices, total
//! collapse during assembly) are surfaced through [`GlvError`]. Numerical
//! non-convergence is not: trajectories carry an [`IntegrationStatus`] and the
//! cavity solver reports [`crate::cavity::CavityPrediction::Diverged`].

use crate::integrate::IntegrationStatus;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum GlvError {
    #[error("Dimension mismatch for {what}: expected {expected}, got {actual}.")]
    DimensionMismatch {
        what: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("Community must contain at least one species.")]
    EmptyCommunity,

    #[error("Species index {index} is out of range for a community of {richness} species.")]
    SpeciesOutOfRange { index: usize, richness: usize },

    #[error("Non-finite {what} at index {index}.")]
    NonFiniteParameter { what: &'static str, index: usize },

    #[error("Interaction matrix is singular (condition number {condition:e}).")]
    SingularInteractionMatrix { condition: f64 },

    #[error("Carrying capacity of species {index} is zero.")]
    InvalidCarryingCapacity { index: usize },

    #[error("Community collapsed: every species went extinct after {iterations} assembly rounds.")]
    CommunityCollapsed { iterations: usize },

    #[error("Integration failed: {status}.")]
    IntegrationFailure { status: IntegrationStatus },

    #[error("Newton solver failed to converge in {steps} steps (‖f(x)‖ = {residual_norm}).")]
    NonConvergence { steps: usize, residual_norm: f64 },

    #[error("Invalid settings: {0}")]
    InvalidSettings(String),

    #[error("Invalid distribution: {0}")]
    InvalidDistribution(String),

    #[error("Failed to parse configuration: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, GlvError>;
