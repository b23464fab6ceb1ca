//! State-pair tensors of shape `[num_states, num_states, num_atoms, 3]`.
//!
//! NACVs, force couplings and the decoherence moments all carry one
//! 3-vector per atom for every ordered pair of electronic states. Matrix
//! products act on the two electronic indices only and are applied
//! element-wise over the nuclear degrees of freedom.

use std::ops::{Add, Sub};

use nalgebra::{DMatrix, Scalar, Vector3};
use num_complex::Complex64;
use num_traits::Zero;
use serde::Serialize;

/// Square complex matrix in the electronic-state subspace.
pub type StateMatrix = DMatrix<Complex64>;

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct PairTensor<T: Scalar> {
    num_states: usize,
    num_atoms: usize,
    data: Vec<Vector3<T>>,
}

impl<T: Scalar + Zero> PairTensor<T> {
    pub fn zeros(num_states: usize, num_atoms: usize) -> Self {
        Self {
            num_states,
            num_atoms,
            data: vec![Vector3::zeros(); num_states * num_states * num_atoms],
        }
    }

    /// Build a tensor from `f(i, j, atom)`.
    pub fn from_fn<F>(num_states: usize, num_atoms: usize, mut f: F) -> Self
    where
        F: FnMut(usize, usize, usize) -> Vector3<T>,
    {
        let mut data = Vec::with_capacity(num_states * num_states * num_atoms);
        for i in 0..num_states {
            for j in 0..num_states {
                for atom in 0..num_atoms {
                    data.push(f(i, j, atom));
                }
            }
        }
        Self { num_states, num_atoms, data }
    }

    pub fn num_states(&self) -> usize {
        self.num_states
    }

    pub fn num_atoms(&self) -> usize {
        self.num_atoms
    }

    #[inline]
    fn offset(&self, i: usize, j: usize) -> usize {
        (i * self.num_states + j) * self.num_atoms
    }

    /// Per-atom vectors for the state pair `(i, j)`.
    pub fn pair(&self, i: usize, j: usize) -> &[Vector3<T>] {
        let start = self.offset(i, j);
        &self.data[start..start + self.num_atoms]
    }

    pub fn pair_mut(&mut self, i: usize, j: usize) -> &mut [Vector3<T>] {
        let start = self.offset(i, j);
        let end = start + self.num_atoms;
        &mut self.data[start..end]
    }
}

impl PairTensor<f64> {
    /// `M_ij = Σ_atoms,dims v · t_ij`, e.g. the velocity-NACV coupling.
    pub fn contract(&self, velocities: &[Vector3<f64>]) -> DMatrix<f64> {
        DMatrix::from_fn(self.num_states, self.num_states, |i, j| {
            self.pair(i, j)
                .iter()
                .zip(velocities)
                .map(|(d, v)| d.dot(v))
                .sum()
        })
    }

    /// True when every diagonal block is exactly zero.
    pub fn diagonal_is_zero(&self) -> bool {
        (0..self.num_states).all(|i| {
            self.pair(i, i)
                .iter()
                .all(|v| v.iter().all(|&x| x == 0.0))
        })
    }
}

impl PairTensor<Complex64> {
    /// `(A·B)_ij = Σ_k A_ik ∘ B_kj`, element-wise over nuclear dofs.
    pub fn matmul(&self, rhs: &Self) -> Self {
        let n = self.num_states;
        let mut out = Self::zeros(n, self.num_atoms);
        for i in 0..n {
            for j in 0..n {
                for k in 0..n {
                    let a = self.pair(i, k);
                    let b = rhs.pair(k, j);
                    for (o, (x, y)) in out.pair_mut(i, j).iter_mut().zip(a.iter().zip(b)) {
                        *o += x.component_mul(y);
                    }
                }
            }
        }
        out
    }

    /// `A·B − B·A` in the electronic subspace.
    pub fn commute(&self, rhs: &Self) -> Self {
        self.matmul(rhs) - &rhs.matmul(self)
    }

    /// `m · t` with a plain state matrix broadcast over nuclear dofs.
    pub fn left_mul(m: &StateMatrix, t: &Self) -> Self {
        let n = t.num_states;
        let mut out = Self::zeros(n, t.num_atoms);
        for i in 0..n {
            for j in 0..n {
                for k in 0..n {
                    let s = m[(i, k)];
                    if s.is_zero() {
                        continue;
                    }
                    for (o, x) in out.pair_mut(i, j).iter_mut().zip(t.pair(k, j)) {
                        *o += x * s;
                    }
                }
            }
        }
        out
    }

    /// `t · m` with a plain state matrix broadcast over nuclear dofs.
    pub fn right_mul(&self, m: &StateMatrix) -> Self {
        let n = self.num_states;
        let mut out = Self::zeros(n, self.num_atoms);
        for i in 0..n {
            for j in 0..n {
                for k in 0..n {
                    let s = m[(k, j)];
                    if s.is_zero() {
                        continue;
                    }
                    for (o, x) in out.pair_mut(i, j).iter_mut().zip(self.pair(i, k)) {
                        *o += x * s;
                    }
                }
            }
        }
        out
    }

    /// `[m, t]`.
    pub fn commute_matrix(m: &StateMatrix, t: &Self) -> Self {
        Self::left_mul(m, t) - &t.right_mul(m)
    }

    /// Sum over atoms and Cartesian components.
    pub fn trace_nuclear(&self) -> StateMatrix {
        StateMatrix::from_fn(self.num_states, self.num_states, |i, j| {
            self.pair(i, j).iter().map(|v| v.sum()).sum()
        })
    }

    pub fn scaled(&self, s: Complex64) -> Self {
        Self {
            num_states: self.num_states,
            num_atoms: self.num_atoms,
            data: self.data.iter().map(|v| v * s).collect(),
        }
    }

    /// `self += s · other`
    pub fn add_scaled(&mut self, s: Complex64, other: &Self) {
        for (x, y) in self.data.iter_mut().zip(&other.data) {
            *x += y * s;
        }
    }

    /// Divide every atom's block by its mass.
    pub fn per_mass(&self, mass: &[f64]) -> Self {
        let na = self.num_atoms;
        Self {
            num_states: self.num_states,
            num_atoms: na,
            data: self
                .data
                .iter()
                .enumerate()
                .map(|(idx, v)| v.map(|z| z / mass[idx % na]))
                .collect(),
        }
    }

    /// `I ⊗ t_ss`: the active-state block copied onto every diagonal pair.
    pub fn active_projection(&self, active: usize) -> Self {
        let n = self.num_states;
        let block = self.pair(active, active).to_vec();
        let mut out = Self::zeros(n, self.num_atoms);
        for i in 0..n {
            out.pair_mut(i, i).copy_from_slice(&block);
        }
        out
    }

    /// Largest modulus of any element.
    pub fn max_modulus(&self) -> f64 {
        self.data
            .iter()
            .flat_map(|v| v.iter())
            .map(|z| z.norm())
            .fold(0.0, f64::max)
    }

    pub fn is_finite(&self) -> bool {
        self.data.iter().flat_map(|v| v.iter()).all(|z| z.is_finite())
    }
}

impl Add<&PairTensor<Complex64>> for PairTensor<Complex64> {
    type Output = PairTensor<Complex64>;

    fn add(mut self, rhs: &PairTensor<Complex64>) -> Self::Output {
        for (x, y) in self.data.iter_mut().zip(&rhs.data) {
            *x += y;
        }
        self
    }
}

impl Sub<&PairTensor<Complex64>> for PairTensor<Complex64> {
    type Output = PairTensor<Complex64>;

    fn sub(mut self, rhs: &PairTensor<Complex64>) -> Self::Output {
        for (x, y) in self.data.iter_mut().zip(&rhs.data) {
            *x -= y;
        }
        self
    }
}

/// `A·B − B·A` for plain state matrices.
pub fn commute(a: &StateMatrix, b: &StateMatrix) -> StateMatrix {
    a * b - b * a
}

/// Promote a real state matrix to complex storage.
pub fn complexify(m: &DMatrix<f64>) -> StateMatrix {
    m.map(|x| Complex64::new(x, 0.0))
}
