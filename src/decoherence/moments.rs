//! Equations of motion for the augmented-FSSH moments.
//!
//! Alongside the amplitude every sample carries a position moment `δR`, a
//! momentum moment `δP` (both `[state, state, atom, xyz]`) and a coherence
//! matrix `σ`. With `V = diag(E)`, `T = v·d`, `ΔF = F_α − F_active·1` and
//! `F_α` the force matrix of the oracle:
//!
//!   dδP/dt = −i/ħ [V, δP] + ½ (ΔF·σ + σ·ΔF) − [T, δP]
//!   dδR/dt = −i/ħ [V, δR] + δP/M − [T, δR]
//!   dσ/dt  = −i/ħ [V, σ] + i/ħ Σ_nuc [F_α, δR] − [T, σ]
//!
//! The active-state block of each moment derivative is subtracted from
//! every diagonal block, so the active diagonal of `δR` and `δP` never
//! moves away from zero.

use nalgebra::{DVector, Vector3};
use num_complex::Complex64;
use serde::Serialize;

use crate::electronic::coupling_matrix;
use crate::oracle::OracleSnapshot;
use crate::tensor::{commute, complexify, PairTensor, StateMatrix};

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct DecoherenceState {
    pub delta_r: PairTensor<Complex64>,
    pub delta_p: PairTensor<Complex64>,
    pub sigma: StateMatrix,
}

impl DecoherenceState {
    pub fn zeros(num_states: usize, num_atoms: usize) -> Self {
        Self {
            delta_r: PairTensor::zeros(num_states, num_atoms),
            delta_p: PairTensor::zeros(num_states, num_atoms),
            sigma: StateMatrix::zeros(num_states, num_states),
        }
    }

    /// Zero moments with `σ = c·c†`.
    pub fn for_amplitude(c: &DVector<Complex64>, num_atoms: usize) -> Self {
        let mut state = Self::zeros(c.len(), num_atoms);
        state.sigma = c * c.adjoint();
        state
    }

    /// `self + h·k`
    fn advanced(&self, k: &DecoherenceState, h: f64) -> DecoherenceState {
        let s = Complex64::new(h, 0.0);
        let mut out = self.clone();
        out.delta_r.add_scaled(s, &k.delta_r);
        out.delta_p.add_scaled(s, &k.delta_p);
        out.sigma += &k.sigma * s;
        out
    }

    pub fn is_finite(&self) -> bool {
        self.delta_r.is_finite() && self.delta_p.is_finite() && self.sigma.iter().all(|z| z.is_finite())
    }
}

/// Right-hand side of the moment equations, frozen for one nuclear step.
pub struct MomentEquations {
    surface: usize,
    hbar: f64,
    mass: Vec<f64>,
    potential: StateMatrix,
    coupling: StateMatrix,
    force_matrix: PairTensor<Complex64>,
    force_difference: PairTensor<Complex64>,
}

impl MomentEquations {
    pub fn new(
        snapshot: &OracleSnapshot,
        velocities: &[Vector3<f64>],
        mass: &[f64],
        surface: usize,
        hbar: f64,
    ) -> Self {
        let force_matrix = snapshot.force_matrix();
        let n = snapshot.num_states();
        let active = snapshot.surface_forces(surface);
        let active_on_diagonal = PairTensor::from_fn(n, active.len(), |i, j, atom| {
            if i == j {
                active[atom].map(|x| Complex64::new(x, 0.0))
            } else {
                Vector3::zeros()
            }
        });
        let force_difference = force_matrix.clone() - &active_on_diagonal;

        Self {
            surface,
            hbar,
            mass: mass.to_vec(),
            potential: snapshot.potential_matrix(),
            coupling: complexify(&coupling_matrix(&snapshot.nacv, velocities)),
            force_matrix,
            force_difference,
        }
    }

    fn minus_i_over_hbar(&self) -> Complex64 {
        Complex64::new(0.0, -1.0 / self.hbar)
    }

    /// Remove the active-state self term from every diagonal block.
    fn project(&self, t: PairTensor<Complex64>) -> PairTensor<Complex64> {
        let projection = t.active_projection(self.surface);
        t - &projection
    }

    pub fn d_delta_p(&self, state: &DecoherenceState) -> PairTensor<Complex64> {
        let precession = PairTensor::commute_matrix(&self.potential, &state.delta_p).scaled(self.minus_i_over_hbar());
        let force = (self.force_difference.right_mul(&state.sigma)
            + &PairTensor::left_mul(&state.sigma, &self.force_difference))
            .scaled(Complex64::new(0.5, 0.0));
        let nonadiabatic = PairTensor::commute_matrix(&self.coupling, &state.delta_p);
        self.project(precession + &force - &nonadiabatic)
    }

    pub fn d_delta_r(&self, state: &DecoherenceState) -> PairTensor<Complex64> {
        let precession = PairTensor::commute_matrix(&self.potential, &state.delta_r).scaled(self.minus_i_over_hbar());
        let drift = state.delta_p.per_mass(&self.mass);
        let nonadiabatic = PairTensor::commute_matrix(&self.coupling, &state.delta_r);
        self.project(precession + &drift - &nonadiabatic)
    }

    pub fn d_sigma(&self, state: &DecoherenceState) -> StateMatrix {
        let precession = commute(&self.potential, &state.sigma) * self.minus_i_over_hbar();
        let force = self.force_matrix.commute(&state.delta_r).trace_nuclear() * Complex64::new(0.0, 1.0 / self.hbar);
        let nonadiabatic = commute(&self.coupling, &state.sigma);
        precession + force - nonadiabatic
    }

    pub fn derivative(&self, state: &DecoherenceState) -> DecoherenceState {
        DecoherenceState {
            delta_r: self.d_delta_r(state),
            delta_p: self.d_delta_p(state),
            sigma: self.d_sigma(state),
        }
    }
}

/// One coupled RK4 step for `δP`, `δR` and `σ`.
pub fn rk4_moments(state: &DecoherenceState, eqs: &MomentEquations, h: f64) -> DecoherenceState {
    let k1 = eqs.derivative(state);
    let k2 = eqs.derivative(&state.advanced(&k1, 0.5 * h));
    let k3 = eqs.derivative(&state.advanced(&k2, 0.5 * h));
    let k4 = eqs.derivative(&state.advanced(&k3, h));

    state
        .advanced(&k1, h / 6.0)
        .advanced(&k2, h / 3.0)
        .advanced(&k3, h / 3.0)
        .advanced(&k4, h / 6.0)
}

/// Advance the moments over `substeps` RK4 steps of length `h`.
pub fn propagate_moments(
    state: &DecoherenceState,
    eqs: &MomentEquations,
    h: f64,
    substeps: usize,
) -> DecoherenceState {
    let mut state = state.clone();
    for _ in 0..substeps {
        state = rk4_moments(&state, eqs, h);
    }
    state
}
