//! Analytic model potentials.
//!
//! Tully's one-dimensional scattering models are defined by a small
//! diabatic Hamiltonian. [`ModelOracle`] diagonalizes it at every geometry
//! and derives the adiabatic energies, forces, NACVs and force couplings
//! the propagator consumes.
//!
//! Reference: J. C. Tully, "Molecular dynamics with electronic transitions",
//! J. Chem. Phys. 93, 1061 (1990)

use nalgebra::{DMatrix, DVector, SymmetricEigen, Vector3};
use serde::{Deserialize, Serialize};

use super::traits::{DiabaticFrame, OracleSnapshot, PotentialOracle};
use crate::error::{FsshError, Result};
use crate::tensor::PairTensor;

/// Adiabatic gaps below this are treated as degenerate: the NACV of the
/// pair is reported as NaN.
const DEGENERATE_GAP: f64 = 1e-12;

/// A model defined by its diabatic Hamiltonian and nuclear gradient.
pub trait DiabaticModel: Sync {
    fn num_states(&self) -> usize;

    fn num_atoms(&self) -> usize;

    /// `H_ij(R)`, symmetric.
    fn hamiltonian(&self, positions: &[Vector3<f64>]) -> DMatrix<f64>;

    /// `∇_R H_ij` stored as a pair tensor.
    fn gradient(&self, positions: &[Vector3<f64>]) -> PairTensor<f64>;
}

/// Tully's simple avoided crossing (model I). One particle moving along x.
#[derive(Serialize, Deserialize, Debug, Clone, Copy)]
pub struct TullySimple {
    pub a: f64,
    pub b: f64,
    pub c: f64,
    pub d: f64,
}

impl Default for TullySimple {
    fn default() -> Self {
        Self { a: 0.01, b: 1.6, c: 0.005, d: 1.0 }
    }
}

impl DiabaticModel for TullySimple {
    fn num_states(&self) -> usize {
        2
    }

    fn num_atoms(&self) -> usize {
        1
    }

    fn hamiltonian(&self, positions: &[Vector3<f64>]) -> DMatrix<f64> {
        let x = positions[0].x;
        let v11 = x.signum() * self.a * (1.0 - (-self.b * x.abs()).exp());
        let v12 = self.c * (-self.d * x * x).exp();
        DMatrix::from_row_slice(2, 2, &[v11, v12, v12, -v11])
    }

    fn gradient(&self, positions: &[Vector3<f64>]) -> PairTensor<f64> {
        let x = positions[0].x;
        let dv11 = self.a * self.b * (-self.b * x.abs()).exp();
        let dv12 = -2.0 * self.c * self.d * x * (-self.d * x * x).exp();
        PairTensor::from_fn(2, 1, |i, j, _| {
            let g = match (i, j) {
                (0, 0) => dv11,
                (1, 1) => -dv11,
                _ => dv12,
            };
            Vector3::new(g, 0.0, 0.0)
        })
    }
}

/// Tully's dual avoided crossing (model II).
#[derive(Serialize, Deserialize, Debug, Clone, Copy)]
pub struct TullyDual {
    pub a: f64,
    pub b: f64,
    pub c: f64,
    pub d: f64,
    pub e0: f64,
}

impl Default for TullyDual {
    fn default() -> Self {
        Self { a: 0.1, b: 0.28, c: 0.015, d: 0.06, e0: 0.05 }
    }
}

impl DiabaticModel for TullyDual {
    fn num_states(&self) -> usize {
        2
    }

    fn num_atoms(&self) -> usize {
        1
    }

    fn hamiltonian(&self, positions: &[Vector3<f64>]) -> DMatrix<f64> {
        let x = positions[0].x;
        let v22 = -self.a * (-self.b * x * x).exp() + self.e0;
        let v12 = self.c * (-self.d * x * x).exp();
        DMatrix::from_row_slice(2, 2, &[0.0, v12, v12, v22])
    }

    fn gradient(&self, positions: &[Vector3<f64>]) -> PairTensor<f64> {
        let x = positions[0].x;
        let dv22 = 2.0 * self.a * self.b * x * (-self.b * x * x).exp();
        let dv12 = -2.0 * self.c * self.d * x * (-self.d * x * x).exp();
        PairTensor::from_fn(2, 1, |i, j, _| {
            let g = match (i, j) {
                (0, 0) => 0.0,
                (1, 1) => dv22,
                _ => dv12,
            };
            Vector3::new(g, 0.0, 0.0)
        })
    }
}

/// Adiabatic view of a [`DiabaticModel`].
#[derive(Debug, Clone)]
pub struct ModelOracle<M> {
    pub model: M,
}

impl<M: DiabaticModel> ModelOracle<M> {
    pub fn new(model: M) -> Self {
        Self { model }
    }

    /// Eigen-decomposition with ascending energies. Each eigenvector is
    /// signed so its own diabatic component is non-negative, which keeps
    /// the transform continuous along the Tully models' coordinate.
    fn adiabatic_frame(&self, h: &DMatrix<f64>) -> (DVector<f64>, DMatrix<f64>) {
        let n = h.nrows();
        let eigen = SymmetricEigen::new(h.clone());
        let mut order: Vec<usize> = (0..n).collect();
        order.sort_by(|&a, &b| eigen.eigenvalues[a].total_cmp(&eigen.eigenvalues[b]));

        let energy = DVector::from_fn(n, |k, _| eigen.eigenvalues[order[k]]);
        let mut transform = DMatrix::zeros(n, n);
        for (k, &src) in order.iter().enumerate() {
            let mut column = eigen.eigenvectors.column(src).into_owned();
            if column[k] < 0.0 {
                column.neg_mut();
            }
            transform.set_column(k, &column);
        }
        (energy, transform)
    }
}

impl<M: DiabaticModel> PotentialOracle for ModelOracle<M> {
    fn num_states(&self) -> usize {
        self.model.num_states()
    }

    fn num_atoms(&self) -> usize {
        self.model.num_atoms()
    }

    fn evaluate(&self, positions: &[Vector3<f64>]) -> Result<OracleSnapshot> {
        let n = self.model.num_states();
        let na = self.model.num_atoms();
        if positions.len() != na {
            return Err(FsshError::shape(
                "positions",
                format!("model expects {} atoms, got {}", na, positions.len()),
            ));
        }

        let h = self.model.hamiltonian(positions);
        let grad = self.model.gradient(positions);
        let (energy, u) = self.adiabatic_frame(&h);

        // ⟨i|∇H|j⟩ for every atom and Cartesian component
        let projected = PairTensor::from_fn(n, na, |i, j, atom| {
            let mut out = Vector3::zeros();
            for k in 0..n {
                for l in 0..n {
                    out += grad.pair(k, l)[atom] * (u[(k, i)] * u[(l, j)]);
                }
            }
            out
        });

        let forces = (0..n)
            .map(|i| projected.pair(i, i).iter().map(|g| -g).collect())
            .collect();

        let nacv = PairTensor::from_fn(n, na, |i, j, atom| {
            if i == j {
                return Vector3::zeros();
            }
            let gap = energy[j] - energy[i];
            if gap.abs() < DEGENERATE_GAP {
                Vector3::repeat(f64::NAN)
            } else {
                projected.pair(i, j)[atom] / gap
            }
        });

        let force_nacv = PairTensor::from_fn(n, na, |i, j, atom| {
            if i == j {
                Vector3::zeros()
            } else {
                projected.pair(i, j)[atom]
            }
        });

        Ok(OracleSnapshot {
            energy,
            forces,
            nacv,
            force_nacv,
            diabatic: Some(DiabaticFrame { hamiltonian: h, transform: u }),
        })
    }
}

/// Two flat surfaces separated by `gap` with a constant NACV of magnitude
/// `coupling` along x on every atom. No forces act on the nuclei.
///
/// This model has no diabatic frame.
#[derive(Serialize, Deserialize, Debug, Clone, Copy)]
pub struct ConstantCoupling {
    pub gap: f64,
    pub coupling: f64,
    #[serde(default = "one_atom")]
    pub num_atoms: usize,
}

fn one_atom() -> usize {
    1
}

impl PotentialOracle for ConstantCoupling {
    fn num_states(&self) -> usize {
        2
    }

    fn num_atoms(&self) -> usize {
        self.num_atoms
    }

    fn evaluate(&self, positions: &[Vector3<f64>]) -> Result<OracleSnapshot> {
        if positions.len() != self.num_atoms {
            return Err(FsshError::shape(
                "positions",
                format!("model expects {} atoms, got {}", self.num_atoms, positions.len()),
            ));
        }
        let na = self.num_atoms;
        let d = Vector3::new(self.coupling, 0.0, 0.0);
        let nacv = PairTensor::from_fn(2, na, |i, j, _| match (i, j) {
            (0, 1) => d,
            (1, 0) => -d,
            _ => Vector3::zeros(),
        });
        // (E_j − E_i)·d_ij
        let force_nacv = PairTensor::from_fn(2, na, |i, j, _| match (i, j) {
            (0, 1) => d * self.gap,
            (1, 0) => d * self.gap,
            _ => Vector3::zeros(),
        });

        Ok(OracleSnapshot {
            energy: DVector::from_row_slice(&[0.0, self.gap]),
            forces: vec![vec![Vector3::zeros(); na]; 2],
            nacv,
            force_nacv,
            diabatic: None,
        })
    }
}
