use crate::autodiff::{jacobian_by_columns, Dual};
use crate::community::Community;
use crate::dynamics::GlvField;
use crate::error::{GlvError, Result};
use crate::traits::DynamicalSystem;
use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct EquilibriumSettings {
    /// Interaction matrices with a 2-norm condition number above this are
    /// treated as singular.
    pub max_condition: f64,
}

impl Default for EquilibriumSettings {
    fn default() -> Self {
        Self {
            max_condition: 1e12,
        }
    }
}

impl EquilibriumSettings {
    pub fn validate(&self) -> Result<()> {
        if !(self.max_condition >= 1.0) {
            return Err(GlvError::InvalidSettings(
                "max_condition must be at least 1.".into(),
            ));
        }
        Ok(())
    }
}

/// Ratio of the largest to the smallest singular value; infinite when the
/// matrix is exactly singular.
pub fn condition_number(matrix: &DMatrix<f64>) -> f64 {
    let singular = matrix.clone().svd(false, false).singular_values;
    let max = singular.iter().cloned().fold(0.0, f64::max);
    let min = singular.iter().cloned().fold(f64::INFINITY, f64::min);
    if min == 0.0 {
        f64::INFINITY
    } else {
        max / min
    }
}

fn check_conditioning(a: &DMatrix<f64>, settings: &EquilibriumSettings) -> Result<()> {
    settings.validate()?;
    let condition = condition_number(a);
    if !(condition <= settings.max_condition) {
        return Err(GlvError::SingularInteractionMatrix { condition });
    }
    Ok(())
}

/// Interior equilibrium `N*` solving `A N* = -K`.
///
/// Feasibility (`N* > 0`) is not checked; the caller decides what to do with
/// negative entries.
pub fn equilibrium_abundance(
    c: &Community,
    settings: &EquilibriumSettings,
) -> Result<DVector<f64>> {
    check_conditioning(c.a(), settings)?;
    let rhs = -c.k().clone();
    c.a()
        .clone()
        .lu()
        .solve(&rhs)
        .ok_or(GlvError::SingularInteractionMatrix {
            condition: f64::INFINITY,
        })
}

/// Relative yield `N*_i / K_i`: abundance in the community over abundance alone.
pub fn relative_yield(c: &Community, settings: &EquilibriumSettings) -> Result<DVector<f64>> {
    c.check_nonzero_capacities()?;
    let abundance = equilibrium_abundance(c, settings)?;
    Ok(abundance.component_div(c.k()))
}

/// Species reactivity `R0_i = sqrt(sum_{j != i} a_ij^2 eta_j^2)`, the steepest
/// initial response of species `i` to a pulse (Lajaaiti et al. 2024).
pub fn species_reactivity(c: &Community, settings: &EquilibriumSettings) -> Result<DVector<f64>> {
    let eta = relative_yield(c, settings)?;
    let s = c.richness();
    Ok(DVector::from_fn(s, |i, _| {
        (0..s)
            .filter(|&j| j != i)
            .map(|j| (c.a()[(i, j)] * eta[j]).powi(2))
            .sum::<f64>()
            .sqrt()
    }))
}

/// Jacobian `J_ij = d f_i / d N_j` of the GLV field at `state`.
pub fn community_jacobian(c: &Community, state: &[f64]) -> Result<DMatrix<f64>> {
    let s = c.richness();
    if state.len() != s {
        return Err(GlvError::DimensionMismatch {
            what: "state",
            expected: s,
            actual: state.len(),
        });
    }
    let field = GlvField::new(c)?;
    let t = Dual::constant(0.0);
    let jacobian = jacobian_by_columns(state, s, |x, out| {
        DynamicalSystem::<Dual>::apply(&field, t, x, out)
    });
    Ok(DMatrix::from_row_slice(s, s, &jacobian))
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Stability {
    /// Largest real part among the Jacobian eigenvalues.
    pub leading_real_part: f64,
    /// Asymptotic return rate `-leading_real_part`.
    pub resilience: f64,
    pub is_stable: bool,
}

/// Local stability of the interior equilibrium.
pub fn equilibrium_stability(c: &Community, settings: &EquilibriumSettings) -> Result<Stability> {
    let abundance = equilibrium_abundance(c, settings)?;
    let jacobian = community_jacobian(c, abundance.as_slice())?;
    let leading_real_part = jacobian
        .complex_eigenvalues()
        .iter()
        .map(|lambda| lambda.re)
        .fold(f64::NEG_INFINITY, f64::max);
    Ok(Stability {
        leading_real_part,
        resilience: -leading_real_part,
        is_stable: leading_real_part < 0.0,
    })
}

/// Outcome of lowering one species' carrying capacity until something dies.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FunctionalExtinction {
    /// Species whose carrying capacity is lowered.
    pub focal: usize,
    /// First species to reach zero abundance.
    pub first_extinct: usize,
    /// Smallest carrying-capacity decrease causing that extinction.
    pub capacity_drop: f64,
    /// Abundance of the focal species at that point (ecologically effective
    /// population size). Zero when the focal species is the one that dies.
    pub effective_population: f64,
}

impl FunctionalExtinction {
    /// True when another species dies while the focal one is still present.
    pub fn is_functional(&self) -> bool {
        self.first_extinct != self.focal
    }
}

/// Functional-extinction analysis after Säterberg et al. (2013).
///
/// Lowering `K_j` by `eps` shifts the equilibrium by `(A^-1)_{:, j} eps`, so
/// species `i` hits zero at `eps = -N*_i / (A^-1)_ij`. Entry `j` is `None`
/// when no positive decrease causes an extinction.
pub fn functional_extinctions(
    c: &Community,
    settings: &EquilibriumSettings,
) -> Result<Vec<Option<FunctionalExtinction>>> {
    let abundance = equilibrium_abundance(c, settings)?;
    let inverse = c
        .a()
        .clone()
        .try_inverse()
        .ok_or(GlvError::SingularInteractionMatrix {
            condition: f64::INFINITY,
        })?;
    let s = c.richness();

    let mut result = Vec::with_capacity(s);
    for j in 0..s {
        let mut best: Option<(usize, f64)> = None;
        for i in 0..s {
            let sensitivity = inverse[(i, j)];
            if sensitivity == 0.0 {
                continue;
            }
            let eps = -abundance[i] / sensitivity;
            if eps > 0.0 && best.map_or(true, |(_, current)| eps < current) {
                best = Some((i, eps));
            }
        }
        result.push(best.map(|(first_extinct, capacity_drop)| FunctionalExtinction {
            focal: j,
            first_extinct,
            capacity_drop,
            effective_population: if first_extinct == j {
                0.0
            } else {
                abundance[j] + inverse[(j, j)] * capacity_drop
            },
        }));
    }
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn independent_pair() -> Community {
        Community::from_slices(&[-1.0, 0.0, 0.0, -1.0], &[1.0, 1.0], &[1.0, 2.0]).unwrap()
    }

    #[test]
    fn non_interacting_species_sit_at_carrying_capacity() {
        let c = independent_pair();
        let settings = EquilibriumSettings::default();
        assert_eq!(
            equilibrium_abundance(&c, &settings).unwrap().as_slice(),
            &[1.0, 2.0]
        );
        assert_eq!(relative_yield(&c, &settings).unwrap().as_slice(), &[1.0, 1.0]);
    }

    #[test]
    fn relative_yield_is_abundance_over_capacity() {
        let c = Community::from_slices(
            &[-1.0, -0.2, 0.1, -0.3, -1.0, -0.1, 0.05, -0.4, -1.0],
            &[1.0, 0.5, 2.0],
            &[1.0, 1.5, 0.8],
        )
        .unwrap();
        let settings = EquilibriumSettings::default();
        let n = equilibrium_abundance(&c, &settings).unwrap();
        let eta = relative_yield(&c, &settings).unwrap();
        for i in 0..3 {
            assert_eq!(eta[i], n[i] / c.k()[i]);
        }
        let residual = c.a() * &n + c.k();
        assert!(residual.norm() < 1e-12);
    }

    #[test]
    fn singular_interaction_matrix_is_an_error() {
        let c = Community::from_slices(&[-1.0, -1.0, -1.0, -1.0], &[1.0, 1.0], &[1.0, 1.0])
            .unwrap();
        let settings = EquilibriumSettings::default();
        assert!(matches!(
            equilibrium_abundance(&c, &settings),
            Err(GlvError::SingularInteractionMatrix { .. })
        ));
        assert!(matches!(
            relative_yield(&c, &settings),
            Err(GlvError::SingularInteractionMatrix { .. })
        ));
    }

    #[test]
    fn ill_conditioned_matrix_respects_threshold() {
        let c = Community::from_slices(
            &[-1.0, -1.0, -1.0, -1.0 - 1e-6],
            &[1.0, 1.0],
            &[1.0, 1.0],
        )
        .unwrap();
        let strict = EquilibriumSettings { max_condition: 1e3 };
        assert!(matches!(
            equilibrium_abundance(&c, &strict),
            Err(GlvError::SingularInteractionMatrix { .. })
        ));
        assert!(equilibrium_abundance(&c, &EquilibriumSettings::default()).is_ok());
    }

    #[test]
    fn condition_number_of_scaled_identity_is_one() {
        let m = DMatrix::from_diagonal_element(3, 3, -2.0);
        assert!((condition_number(&m) - 1.0).abs() < 1e-12);
        assert!(condition_number(&DMatrix::zeros(2, 2)).is_infinite());
    }

    #[test]
    fn reactivity_vanishes_without_interactions() {
        let c = independent_pair();
        let r0 = species_reactivity(&c, &EquilibriumSettings::default()).unwrap();
        assert_eq!(r0.as_slice(), &[0.0, 0.0]);
    }

    #[test]
    fn reactivity_weights_interactions_by_relative_yield() {
        let c = Community::from_slices(&[-1.0, -0.5, 0.0, -1.0], &[1.0, 1.0], &[1.0, 1.0])
            .unwrap();
        let settings = EquilibriumSettings::default();
        // N* = (0.5, 1.0), eta = N*.
        let r0 = species_reactivity(&c, &settings).unwrap();
        assert!((r0[0] - 0.5).abs() < 1e-12);
        assert_eq!(r0[1], 0.0);
    }

    #[test]
    fn jacobian_at_equilibrium_matches_closed_form() {
        let c = Community::from_slices(
            &[-1.0, -0.3, 0.2, -1.0],
            &[2.0, 0.5],
            &[1.0, 2.0],
        )
        .unwrap();
        let n = equilibrium_abundance(&c, &EquilibriumSettings::default()).unwrap();
        let jac = community_jacobian(&c, n.as_slice()).unwrap();
        for i in 0..2 {
            for j in 0..2 {
                let expected = c.r()[i] * n[i] * c.a()[(i, j)] / c.k()[i];
                assert!((jac[(i, j)] - expected).abs() < 1e-12);
            }
        }
    }

    #[test]
    fn independent_species_return_at_their_growth_rate() {
        let c = Community::from_slices(&[-1.0, 0.0, 0.0, -1.0], &[1.0, 3.0], &[1.0, 2.0])
            .unwrap();
        let stability = equilibrium_stability(&c, &EquilibriumSettings::default()).unwrap();
        assert!(stability.is_stable);
        assert!((stability.leading_real_part + 1.0).abs() < 1e-10);
        assert!((stability.resilience - 1.0).abs() < 1e-10);
    }

    #[test]
    fn independent_species_only_go_numerically_extinct() {
        let c = independent_pair();
        let result = functional_extinctions(&c, &EquilibriumSettings::default()).unwrap();
        for (j, entry) in result.iter().enumerate() {
            let entry = entry.expect("lowering K always kills the focal species");
            assert_eq!(entry.focal, j);
            assert_eq!(entry.first_extinct, j);
            assert!(!entry.is_functional());
            assert_eq!(entry.effective_population, 0.0);
            assert!((entry.capacity_drop - c.k()[j]).abs() < 1e-12);
        }
    }

    #[test]
    fn dependent_species_can_die_first() {
        // Species 1 is rare and depends on species 0.
        let c = Community::from_slices(&[-1.0, 0.0, 0.5, -1.0], &[1.0, 1.0], &[1.0, -0.4])
            .unwrap();
        let settings = EquilibriumSettings::default();
        let n = equilibrium_abundance(&c, &settings).unwrap();
        assert!((n[0] - 1.0).abs() < 1e-12 && (n[1] - 0.1).abs() < 1e-12);

        let result = functional_extinctions(&c, &settings).unwrap();
        let focal0 = result[0].unwrap();
        assert_eq!(focal0.first_extinct, 1);
        assert!(focal0.is_functional());
        assert!((focal0.capacity_drop - 0.2).abs() < 1e-12);
        assert!((focal0.effective_population - 0.8).abs() < 1e-12);
    }
}
