//! A complete hop attempt: probabilities, selection and rescaling.

use nalgebra::{DMatrix, DVector, Vector3};
use num_complex::Complex64;
use rand::Rng;
use serde::Serialize;

use super::decision::{hop_probabilities, select_surface};
use super::rescale::{rescale, Frustration};
use crate::io::SimulationConfig;
use crate::oracle::OracleSnapshot;

/// What happened to the active surface in one step.
#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum HopOutcome {
    /// No state was selected.
    Stayed,
    /// The sample moved to `to` with rescaled velocities.
    Accepted { from: usize, to: usize },
    /// `to` was selected but the hop was rejected.
    Frustrated { from: usize, to: usize, reason: Frustration },
}

#[derive(Debug, Clone)]
pub struct HopAttempt {
    pub surface: usize,
    pub velocities: Vec<Vector3<f64>>,
    /// Raw per-state probabilities, kept for diagnostics.
    pub probabilities: DVector<f64>,
    pub outcome: HopOutcome,
}

/// Run the fewest-switches test for one sample.
///
/// Unless the hop is accepted the returned surface and velocities are
/// exact copies of the inputs.
pub fn try_hop<R: Rng + ?Sized>(
    c: &DVector<Complex64>,
    t: &DMatrix<f64>,
    snapshot: &OracleSnapshot,
    velocities: &[Vector3<f64>],
    surface: usize,
    config: &SimulationConfig,
    rng: &mut R,
) -> HopAttempt {
    let probabilities = hop_probabilities(c, t, config.dt, surface);
    let candidate = select_surface(&probabilities, surface, &snapshot.energy, config.max_gap_hop, rng);

    if candidate == surface {
        return HopAttempt {
            surface,
            velocities: velocities.to_vec(),
            probabilities,
            outcome: HopOutcome::Stayed,
        };
    }

    match rescale(&snapshot.energy, velocities, &snapshot.nacv, &config.mass, surface, candidate) {
        Ok(new_velocities) => HopAttempt {
            surface: candidate,
            velocities: new_velocities,
            probabilities,
            outcome: HopOutcome::Accepted { from: surface, to: candidate },
        },
        Err(reason) => HopAttempt {
            surface,
            velocities: velocities.to_vec(),
            probabilities,
            outcome: HopOutcome::Frustrated { from: surface, to: candidate, reason },
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::{InstabilityPolicy, PropagationMode};
    use crate::oracle::{ConstantCoupling, PotentialOracle};
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn config(max_gap_hop: Option<f64>) -> SimulationConfig {
        SimulationConfig {
            dt: 1.0,
            elec_substeps: 10,
            hbar: 1.0,
            max_gap_hop,
            mass: vec![1.0],
            propagation: PropagationMode::AdiabaticRk4,
            decoherence: false,
            instability_policy: InstabilityPolicy::Abort,
            seed: 0,
        }
    }

    /// Amplitude and coupling that make the upward probability ≥ 1.
    fn certain_hop() -> (DVector<Complex64>, DMatrix<f64>) {
        let c = DVector::from_vec(vec![Complex64::new(0.6, 0.0), Complex64::new(0.8, 0.0)]);
        let t = DMatrix::from_row_slice(2, 2, &[0.0, 2.0, -2.0, 0.0]);
        (c, t)
    }

    #[test]
    fn test_frustrated_hop_restores_inputs_exactly() {
        let model = ConstantCoupling { gap: 5.0, coupling: 1.0, num_atoms: 1 };
        let snap = model.evaluate(&[Vector3::zeros()]).unwrap();
        let (c, t) = certain_hop();
        let v = vec![Vector3::new(0.1, -0.037, 1e-3)];
        let mut rng = StdRng::seed_from_u64(0);

        let attempt = try_hop(&c, &t, &snap, &v, 0, &config(None), &mut rng);
        assert!(attempt.probabilities[1] >= 1.0);
        assert_eq!(
            attempt.outcome,
            HopOutcome::Frustrated { from: 0, to: 1, reason: Frustration::InsufficientKineticEnergy }
        );
        assert_eq!(attempt.surface, 0);
        assert_eq!(attempt.velocities, v);
    }

    #[test]
    fn test_accepted_hop_changes_surface_and_velocity() {
        let model = ConstantCoupling { gap: 0.01, coupling: 1.0, num_atoms: 1 };
        let snap = model.evaluate(&[Vector3::zeros()]).unwrap();
        let (c, t) = certain_hop();
        let v = vec![Vector3::new(1.0, 0.0, 0.0)];
        let mut rng = StdRng::seed_from_u64(0);

        let attempt = try_hop(&c, &t, &snap, &v, 0, &config(None), &mut rng);
        assert_eq!(attempt.outcome, HopOutcome::Accepted { from: 0, to: 1 });
        assert_eq!(attempt.surface, 1);
        assert!(attempt.velocities[0].x < 1.0);
    }

    #[test]
    fn test_gap_gate_blocks_certain_hop() {
        let model = ConstantCoupling { gap: 0.5, coupling: 1.0, num_atoms: 1 };
        let snap = model.evaluate(&[Vector3::zeros()]).unwrap();
        let (c, t) = certain_hop();
        let v = vec![Vector3::new(10.0, 0.0, 0.0)];
        let mut rng = StdRng::seed_from_u64(3);

        for _ in 0..100 {
            let attempt = try_hop(&c, &t, &snap, &v, 0, &config(Some(0.1)), &mut rng);
            assert!(attempt.probabilities[1] >= 1.0);
            assert_eq!(attempt.outcome, HopOutcome::Stayed);
            assert_eq!(attempt.velocities, v);
        }
    }
}
