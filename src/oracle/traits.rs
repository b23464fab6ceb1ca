//! Interface to the external potential model.

use nalgebra::{DMatrix, DVector, Vector3};
use num_complex::Complex64;

use crate::error::{FsshError, Result};
use crate::tensor::{PairTensor, StateMatrix};

/// Diabatic Hamiltonian and the adiabatic-to-diabatic transform at one
/// geometry. Column `k` of `transform` is adiabatic state `k` expressed in
/// the diabatic basis, so `c_diabatic = transform · c_adiabatic`.
#[derive(Clone, Debug)]
pub struct DiabaticFrame {
    pub hamiltonian: DMatrix<f64>,
    pub transform: DMatrix<f64>,
}

/// Everything the propagator needs from the potential model at one
/// geometry of one sample.
#[derive(Clone, Debug)]
pub struct OracleSnapshot {
    /// Adiabatic energies, `[num_states]`.
    pub energy: DVector<f64>,
    /// Forces on every surface, `[num_states][num_atoms]`.
    pub forces: Vec<Vec<Vector3<f64>>>,
    /// Non-adiabatic coupling vectors `d_ij`; the diagonal must be zero.
    /// Off-diagonal NaN marks a pair whose gap is too small to resolve.
    pub nacv: PairTensor<f64>,
    /// `⟨i|∇H|j⟩` off the diagonal; the diagonal must be zero.
    pub force_nacv: PairTensor<f64>,
    /// Only needed by the diabatic propagation mode.
    pub diabatic: Option<DiabaticFrame>,
}

impl OracleSnapshot {
    pub fn num_states(&self) -> usize {
        self.energy.len()
    }

    /// Check every tensor against the expected extents.
    pub fn validate(&self, num_states: usize, num_atoms: usize) -> Result<()> {
        if self.energy.len() != num_states {
            return Err(FsshError::shape(
                "energy",
                format!("expected {} states, got {}", num_states, self.energy.len()),
            ));
        }
        if self.energy.iter().any(|e| !e.is_finite()) {
            return Err(FsshError::shape("energy", "non-finite adiabatic energy"));
        }
        if self.forces.len() != num_states || self.forces.iter().any(|f| f.len() != num_atoms) {
            return Err(FsshError::shape(
                "forces",
                format!("expected [{}][{}] force vectors", num_states, num_atoms),
            ));
        }
        for (name, t) in [("nacv", &self.nacv), ("force_nacv", &self.force_nacv)] {
            if t.num_states() != num_states || t.num_atoms() != num_atoms {
                return Err(FsshError::shape(
                    name,
                    format!(
                        "expected [{n}, {n}, {}, 3], got [{m}, {m}, {}, 3]",
                        num_atoms,
                        t.num_atoms(),
                        n = num_states,
                        m = t.num_states(),
                    ),
                ));
            }
            if !t.diagonal_is_zero() {
                return Err(FsshError::shape(name, "diagonal blocks must be exactly zero"));
            }
        }
        if let Some(frame) = &self.diabatic {
            let square = |m: &DMatrix<f64>| m.nrows() == num_states && m.ncols() == num_states;
            if !square(&frame.hamiltonian) || !square(&frame.transform) {
                return Err(FsshError::shape(
                    "diabatic",
                    format!("expected {0}x{0} hamiltonian and transform", num_states),
                ));
            }
        }
        Ok(())
    }

    /// Forces of a single surface, `[num_atoms]`.
    pub fn surface_forces(&self, surface: usize) -> &[Vector3<f64>] {
        &self.forces[surface]
    }

    /// `V = diag(energy)` in complex storage.
    pub fn potential_matrix(&self) -> StateMatrix {
        StateMatrix::from_diagonal(&self.energy.map(|e| Complex64::new(e, 0.0)))
    }

    /// `F_α`: surface forces on the diagonal, `−force_nacv` off it.
    pub fn force_matrix(&self) -> PairTensor<Complex64> {
        let n = self.num_states();
        let na = self.force_nacv.num_atoms();
        PairTensor::from_fn(n, na, |i, j, atom| {
            let f = if i == j {
                self.forces[i][atom]
            } else {
                -self.force_nacv.pair(i, j)[atom]
            };
            f.map(|x| Complex64::new(x, 0.0))
        })
    }
}

/// A potential model that can be evaluated at arbitrary nuclear positions.
///
/// Implementations must be pure in `positions`; the driver calls them
/// concurrently for different samples.
pub trait PotentialOracle: Sync {
    fn num_states(&self) -> usize;

    fn num_atoms(&self) -> usize;

    fn evaluate(&self, positions: &[Vector3<f64>]) -> Result<OracleSnapshot>;
}

impl<T: PotentialOracle + ?Sized> PotentialOracle for Box<T> {
    fn num_states(&self) -> usize {
        (**self).num_states()
    }

    fn num_atoms(&self) -> usize {
        (**self).num_atoms()
    }

    fn evaluate(&self, positions: &[Vector3<f64>]) -> Result<OracleSnapshot> {
        (**self).evaluate(positions)
    }
}
