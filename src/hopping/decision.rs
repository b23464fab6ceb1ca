//! Fewest-switches hop probabilities and stochastic surface selection.

use nalgebra::{DMatrix, DVector};
use num_complex::Complex64;
use rand::seq::SliceRandom;
use rand::Rng;

use crate::tensor::StateMatrix;

/// `a_ij = conj(c_i)·c_j`
pub fn density_matrix(c: &DVector<Complex64>) -> StateMatrix {
    let n = c.len();
    StateMatrix::from_fn(n, n, |i, j| c[i].conj() * c[j])
}

/// Probability of hopping from `surface` into every state over `dt`.
///
/// `b_ij = −2·Re(conj(a_ij)·T_ij)` and `p_i = dt·b_{i,s}/a_{s,s}`: the
/// population flux out of the active state into `i`, normalized by the
/// active population. Only the real part is kept. The entry for the active
/// state itself is zero since `T_ss = 0`.
pub fn hop_probabilities(
    c: &DVector<Complex64>,
    t: &DMatrix<f64>,
    dt: f64,
    surface: usize,
) -> DVector<f64> {
    let a = density_matrix(c);
    let a_ss = a[(surface, surface)];
    DVector::from_fn(c.len(), |i, _| {
        let b = -2.0 * (a[(i, surface)].conj() * t[(i, surface)]).re;
        (Complex64::new(dt * b, 0.0) / a_ss).re
    })
}

/// Visit the other states in a fresh random order and return the first one
/// whose draw falls below its probability, or `surface` if none does.
///
/// When `max_gap_hop` is set, states further than that in energy from the
/// active one are never selected, whatever their probability.
pub fn select_surface<R: Rng + ?Sized>(
    probabilities: &DVector<f64>,
    surface: usize,
    energy: &DVector<f64>,
    max_gap_hop: Option<f64>,
    rng: &mut R,
) -> usize {
    let mut order: Vec<usize> = (0..probabilities.len()).collect();
    order.shuffle(rng);

    for i in order {
        if i == surface {
            continue;
        }
        let draw: f64 = rng.gen();
        let mut hop = probabilities[i] > draw;
        if let Some(max_gap) = max_gap_hop {
            hop = hop && (energy[i] - energy[surface]).abs() <= max_gap;
        }
        if hop {
            return i;
        }
    }
    surface
}
