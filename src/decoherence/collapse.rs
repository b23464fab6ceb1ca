//! Collapse rates derived from the moments, and the hook that acts on them.

use nalgebra::{DMatrix, DVector};
use num_complex::Complex64;
use rand::rngs::StdRng;

use super::moments::DecoherenceState;
use crate::hopping::HopOutcome;
use crate::oracle::OracleSnapshot;
use crate::tensor::PairTensor;

/// Scale of the force-coupling term in the decoherence rate.
pub const DEFAULT_ZETA: f64 = 1.0;

/// Per-pair rates `[n, i]`. Only the real part of the moment contractions
/// is kept.
#[derive(Clone, Debug, PartialEq)]
pub struct CollapseRates {
    /// `τ_d⁻¹`: rate of collapsing state `n` relative to `i`.
    pub decoherence: DMatrix<f64>,
    /// `τ_reset⁻¹`: rate of resetting the moments of `n`.
    pub reset: DMatrix<f64>,
}

/// `τ_d⁻¹_ni = Σ(F_n − F_i)·δR_nn/(2ħ) − 2|ζ/ħ·Σ F_in·δR_nn|` and
/// `τ_reset⁻¹_ni = −Σ(F_n − F_i)·δR_nn/(2ħ)`, with `F_in` the force
/// coupling and sums over atoms and Cartesian components.
pub fn collapse_rates(
    snapshot: &OracleSnapshot,
    delta_r: &PairTensor<Complex64>,
    hbar: f64,
    zeta: f64,
) -> CollapseRates {
    let n = snapshot.num_states();
    let mut decoherence = DMatrix::zeros(n, n);
    let mut reset = DMatrix::zeros(n, n);

    for row in 0..n {
        let moment = delta_r.pair(row, row);
        for col in 0..n {
            let force_term: f64 = snapshot.forces[row]
                .iter()
                .zip(&snapshot.forces[col])
                .zip(moment)
                .map(|((f_n, f_i), dr)| (f_n - f_i).dot(&dr.map(|z| z.re)))
                .sum::<f64>()
                / (2.0 * hbar);
            let coupling_term: f64 = snapshot
                .force_nacv
                .pair(col, row)
                .iter()
                .zip(moment)
                .map(|(f, dr)| f.dot(&dr.map(|z| z.re)))
                .sum();

            decoherence[(row, col)] = force_term - 2.0 * (zeta / hbar * coupling_term).abs();
            reset[(row, col)] = -force_term;
        }
    }
    CollapseRates { decoherence, reset }
}

/// What the collapse hook can see after the hop test of one step.
pub struct CollapseContext<'a> {
    pub sample: usize,
    pub surface: usize,
    pub outcome: &'a HopOutcome,
    pub rates: &'a CollapseRates,
    pub snapshot: &'a OracleSnapshot,
    pub dt: f64,
}

/// Stochastic collapse or moment reset applied after the hop test.
///
/// Implementations may modify the amplitude and the moments in place and
/// draw from the sample's own random stream.
pub trait CollapsePolicy: Send + Sync {
    fn apply(
        &self,
        ctx: &CollapseContext,
        amplitude: &mut DVector<Complex64>,
        moments: &mut DecoherenceState,
        rng: &mut StdRng,
    );
}

/// Leaves amplitude and moments untouched.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoCollapse;

impl CollapsePolicy for NoCollapse {
    fn apply(
        &self,
        _ctx: &CollapseContext,
        _amplitude: &mut DVector<Complex64>,
        _moments: &mut DecoherenceState,
        _rng: &mut StdRng,
    ) {
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tensor::StateMatrix;
    use approx::assert_relative_eq;
    use nalgebra::Vector3;
    use rand::SeedableRng;

    fn snapshot() -> OracleSnapshot {
        let force_nacv = PairTensor::from_fn(2, 1, |i, j, _| match (i, j) {
            (0, 1) => Vector3::new(0.2, 0.0, 0.0),
            (1, 0) => Vector3::new(0.3, 0.0, 0.0),
            _ => Vector3::zeros(),
        });
        OracleSnapshot {
            energy: DVector::from_vec(vec![0.0, 0.1]),
            forces: vec![vec![Vector3::new(-1.0, 0.0, 0.0)], vec![Vector3::new(1.0, 0.0, 0.0)]],
            nacv: PairTensor::zeros(2, 1),
            force_nacv,
            diabatic: None,
        }
    }

    fn moments() -> PairTensor<Complex64> {
        PairTensor::from_fn(2, 1, |i, j, _| match (i, j) {
            (0, 0) => Vector3::new(Complex64::new(0.5, 0.2), Complex64::new(0.0, 0.0), Complex64::new(0.0, 0.0)),
            _ => Vector3::zeros(),
        })
    }

    #[test]
    fn test_rates_by_hand() {
        let rates = collapse_rates(&snapshot(), &moments(), 2.0, DEFAULT_ZETA);
        // (F_0 − F_1)·δR_00/(2ħ) = (−2)(0.5)/4 = −0.25
        // force_nacv_10·δR_00 = 0.3·0.5 = 0.15, 2|0.15/2| = 0.15
        assert_relative_eq!(rates.decoherence[(0, 1)], -0.25 - 0.15, epsilon = 1e-14);
        assert_relative_eq!(rates.reset[(0, 1)], 0.25, epsilon = 1e-14);
        // δR_11 = 0 so the second row vanishes
        assert_relative_eq!(rates.decoherence[(1, 0)], 0.0);
        assert_relative_eq!(rates.reset[(1, 0)], 0.0);
        // F_n − F_n = 0 and the force coupling diagonal is zero
        assert_relative_eq!(rates.decoherence[(0, 0)], 0.0);
    }

    #[test]
    fn test_zeta_scales_coupling_term_only() {
        let one = collapse_rates(&snapshot(), &moments(), 1.0, 1.0);
        let two = collapse_rates(&snapshot(), &moments(), 1.0, 2.0);
        assert_relative_eq!(one.reset, two.reset);
        let coupling_one = one.decoherence[(0, 1)] + one.reset[(0, 1)];
        let coupling_two = two.decoherence[(0, 1)] + two.reset[(0, 1)];
        assert_relative_eq!(coupling_two, 2.0 * coupling_one, epsilon = 1e-14);
    }

    #[test]
    fn test_no_collapse_is_identity() {
        let snap = snapshot();
        let rates = collapse_rates(&snap, &moments(), 1.0, DEFAULT_ZETA);
        let ctx = CollapseContext {
            sample: 0,
            surface: 0,
            outcome: &HopOutcome::Stayed,
            rates: &rates,
            snapshot: &snap,
            dt: 1.0,
        };
        let mut c = DVector::from_vec(vec![Complex64::new(0.6, 0.0), Complex64::new(0.0, 0.8)]);
        let mut m = DecoherenceState::zeros(2, 1);
        m.sigma = StateMatrix::identity(2, 2);
        let (c0, m0) = (c.clone(), m.clone());
        NoCollapse.apply(&ctx, &mut c, &mut m, &mut StdRng::seed_from_u64(0));
        assert_eq!(c, c0);
        assert_eq!(m, m0);
    }
}
