//! Short-time exponential propagation in the diabatic basis.
//!
//! Near a crossing the adiabatic couplings blow up while the diabatic
//! Hamiltonian stays smooth. Over one nuclear step the diabatic Hamiltonian
//! is interpolated linearly on `elec_substeps` micro-steps and the
//! time-ordered product of the micro-step exponentials is mapped back to
//! the adiabatic basis with the old and new transforms:
//!
//!   c_new = U_newᵀ · e^{−iH_n Δτ/ħ} ⋯ e^{−iH_1 Δτ/ħ} · U_old · c_old

use nalgebra::{DMatrix, DVector};
use num_complex::Complex64;

use super::traits::{AmplitudePropagator, ElectronicContext};
use crate::error::{FsshError, Result};
use crate::oracle::DiabaticFrame;
use crate::tensor::{complexify, StateMatrix};

/// Largest tolerated `max |P†P − I|` of the accumulated propagator.
const UNITARITY_TOLERANCE: f64 = 1e-8;

#[derive(Debug, Clone, Copy, Default)]
pub struct DiabaticExponential;

impl DiabaticExponential {
    fn frame<'a>(snapshot: Option<&'a DiabaticFrame>, which: &str) -> Result<&'a DiabaticFrame> {
        snapshot.ok_or_else(|| {
            FsshError::Config(format!(
                "diabatic propagation needs a diabatic frame from the oracle ({} geometry has none)",
                which
            ))
        })
    }

    /// Time-ordered product of the micro-step exponentials.
    pub fn step_propagator(
        old_h: &DMatrix<f64>,
        new_h: &DMatrix<f64>,
        substeps: usize,
        dt: f64,
        hbar: f64,
    ) -> Result<StateMatrix> {
        if old_h.iter().chain(new_h.iter()).any(|x| !x.is_finite()) {
            return Err(FsshError::Instability {
                sample: 0,
                reason: "non-finite diabatic hamiltonian".into(),
            });
        }

        let n = old_h.nrows();
        let dtau = dt / substeps as f64;
        let phase = Complex64::new(0.0, -dtau / hbar);
        let mut propagator = StateMatrix::identity(n, n);
        for k in 1..=substeps {
            let frac = k as f64 / substeps as f64;
            let h = old_h + (new_h - old_h) * frac;
            propagator = (complexify(&h) * phase).exp() * propagator;
        }

        let defect = unitarity_defect(&propagator);
        if !defect.is_finite() || defect > UNITARITY_TOLERANCE {
            return Err(FsshError::Instability {
                sample: 0,
                reason: format!("diabatic propagator lost unitarity (defect {:.3e})", defect),
            });
        }
        Ok(propagator)
    }
}

impl AmplitudePropagator for DiabaticExponential {
    fn propagate(&self, c: &DVector<Complex64>, ctx: &ElectronicContext) -> Result<DVector<Complex64>> {
        let old = Self::frame(ctx.old.diabatic.as_ref(), "old")?;
        let new = Self::frame(ctx.new.diabatic.as_ref(), "new")?;

        let propagator = Self::step_propagator(
            &old.hamiltonian,
            &new.hamiltonian,
            ctx.config.elec_substeps,
            ctx.config.dt,
            ctx.config.hbar,
        )?;

        let to_diabatic = complexify(&old.transform);
        let to_adiabatic = complexify(&new.transform.transpose());
        Ok(to_adiabatic * (propagator * (to_diabatic * c)))
    }
}

/// `max |P†P − I|`; NaN if any entry of `p` is non-finite.
pub fn unitarity_defect(p: &StateMatrix) -> f64 {
    if p.iter().any(|z| !z.is_finite()) {
        return f64::NAN;
    }
    let n = p.nrows();
    let gram = p.adjoint() * p - StateMatrix::identity(n, n);
    gram.iter().map(|z| z.norm()).fold(0.0, f64::max)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::electronic::{populations, RungeKutta4};
    use crate::io::{InstabilityPolicy, PropagationMode, SimulationConfig};
    use crate::oracle::{ConstantCoupling, ModelOracle, OracleSnapshot, PotentialOracle, TullySimple};
    use approx::assert_relative_eq;
    use nalgebra::Vector3;

    fn config(dt: f64, substeps: usize) -> SimulationConfig {
        SimulationConfig {
            dt,
            elec_substeps: substeps,
            hbar: 1.0,
            max_gap_hop: None,
            mass: vec![2000.0],
            propagation: PropagationMode::DiabaticExponential,
            decoherence: false,
            instability_policy: InstabilityPolicy::Abort,
            seed: 0,
        }
    }

    fn ground() -> DVector<Complex64> {
        DVector::from_vec(vec![Complex64::new(1.0, 0.0), Complex64::new(0.0, 0.0)])
    }

    #[test]
    fn test_constant_hamiltonian_gives_phases() {
        let h = DMatrix::from_diagonal(&DVector::from_vec(vec![0.1, 0.4]));
        let p = DiabaticExponential::step_propagator(&h, &h, 8, 2.0, 1.0).unwrap();
        assert_relative_eq!(p[(0, 0)].re, (0.2f64).cos(), epsilon = 1e-12);
        assert_relative_eq!(p[(0, 0)].im, -(0.2f64).sin(), epsilon = 1e-12);
        assert_relative_eq!(p[(1, 1)].im, -(0.8f64).sin(), epsilon = 1e-12);
        assert_relative_eq!(p[(0, 1)].norm(), 0.0, epsilon = 1e-12);
        assert!(unitarity_defect(&p) < 1e-12);
    }

    #[test]
    fn test_non_finite_hamiltonian_is_an_instability() {
        let good = DMatrix::identity(2, 2);
        let mut bad = DMatrix::identity(2, 2);
        bad[(0, 1)] = f64::NAN;
        let err = DiabaticExponential::step_propagator(&good, &bad, 4, 1.0, 1.0).unwrap_err();
        assert!(err.is_recoverable());
    }

    #[test]
    fn test_missing_frame_is_a_configuration_error() {
        let model = ConstantCoupling { gap: 0.1, coupling: 0.2, num_atoms: 1 };
        let snap = model.evaluate(&[Vector3::zeros()]).unwrap();
        let cfg = config(1.0, 4);
        let velocities = [Vector3::new(0.1, 0.0, 0.0)];
        let ctx = ElectronicContext { old: &snap, new: &snap, velocities: &velocities, config: &cfg };
        let err = DiabaticExponential.propagate(&ground(), &ctx).unwrap_err();
        assert!(matches!(err, FsshError::Config(_)));
    }

    #[test]
    fn test_agrees_with_adiabatic_rk4_through_avoided_crossing() {
        let oracle = ModelOracle::new(TullySimple::default());
        let v = 0.02;
        let dt = 0.5;
        let cfg = config(dt, 20);
        let velocities = [Vector3::new(v, 0.0, 0.0)];

        let at = |x: f64| -> OracleSnapshot { oracle.evaluate(&[Vector3::new(x, 0.0, 0.0)]).unwrap() };

        let mut c_rk4 = ground();
        let mut c_dia = ground();
        let mut x = -4.0;
        let mut old = at(x);
        while x < 4.0 {
            x += v * dt;
            let new = at(x);
            let ctx = ElectronicContext { old: &old, new: &new, velocities: &velocities, config: &cfg };
            c_rk4 = RungeKutta4.propagate(&c_rk4, &ctx).unwrap();
            c_dia = DiabaticExponential.propagate(&c_dia, &ctx).unwrap();
            old = new;
        }

        let p_rk4 = populations(&c_rk4);
        let p_dia = populations(&c_dia);
        assert_relative_eq!(p_dia.sum(), 1.0, epsilon = 1e-6);
        assert!(p_dia[1] > 1e-3, "no transfer through the crossing");
        assert_relative_eq!(p_rk4[1], p_dia[1], epsilon = 5e-3);
    }
}
