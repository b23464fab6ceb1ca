//! Velocity coupling and the time derivative of the amplitude.

use nalgebra::{DMatrix, DVector, Vector3};
use num_complex::Complex64;

use crate::tensor::{complexify, PairTensor};

/// `T_ij = Σ_atoms,dims v · d_ij`.
///
/// A NaN entry means the oracle could not resolve the gap for that pair;
/// the channel is switched off instead of poisoning the amplitude.
pub fn coupling_matrix(nacv: &PairTensor<f64>, velocities: &[Vector3<f64>]) -> DMatrix<f64> {
    nacv.contract(velocities).map(|t| if t.is_nan() { 0.0 } else { t })
}

/// `dc/dt = −(i·E/ħ·c + T·c)`
pub fn amplitude_derivative(
    c: &DVector<Complex64>,
    energy: &DVector<f64>,
    t: &DMatrix<f64>,
    hbar: f64,
) -> DVector<Complex64> {
    let coupling = complexify(t) * c;
    DVector::from_fn(c.len(), |i, _| {
        -(Complex64::new(0.0, energy[i] / hbar) * c[i] + coupling[i])
    })
}

/// `|c_i|²`
pub fn populations(c: &DVector<Complex64>) -> DVector<f64> {
    c.map(|z| z.norm_sqr())
}
