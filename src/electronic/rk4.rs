//! Fourth-order Runge-Kutta in the adiabatic basis.

use nalgebra::{DMatrix, DVector};
use num_complex::Complex64;

use super::coupling::{amplitude_derivative, coupling_matrix};
use super::traits::{AmplitudePropagator, ElectronicContext};
use crate::error::Result;

/// Classic RK4 with energies and couplings held at their end-of-step values
/// for all `elec_substeps` substeps.
#[derive(Debug, Clone, Copy, Default)]
pub struct RungeKutta4;

impl AmplitudePropagator for RungeKutta4 {
    fn propagate(&self, c: &DVector<Complex64>, ctx: &ElectronicContext) -> Result<DVector<Complex64>> {
        let t = coupling_matrix(&ctx.new.nacv, ctx.velocities);
        let elec_dt = ctx.config.elec_dt();
        let mut c = c.clone();
        for _ in 0..ctx.config.elec_substeps {
            c = rk4_step(&c, &ctx.new.energy, &t, elec_dt, ctx.config.hbar);
        }
        Ok(c)
    }
}

/// One RK4 step of length `h`. The four stages are strictly sequential.
pub fn rk4_step(
    c: &DVector<Complex64>,
    energy: &DVector<f64>,
    t: &DMatrix<f64>,
    h: f64,
    hbar: f64,
) -> DVector<Complex64> {
    let deriv = |c: &DVector<Complex64>| amplitude_derivative(c, energy, t, hbar);
    let half = Complex64::new(0.5 * h, 0.0);
    let full = Complex64::new(h, 0.0);
    let two = Complex64::new(2.0, 0.0);

    let k1 = deriv(c);
    let k2 = deriv(&(c + &k1 * half));
    let k3 = deriv(&(c + &k2 * half));
    let k4 = deriv(&(c + &k3 * full));

    c + (k1 + k2 * two + k3 * two + k4) * Complex64::new(h / 6.0, 0.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::electronic::populations;
    use crate::tensor::complexify;
    use approx::assert_relative_eq;

    /// Two states with gap `delta` and real antisymmetric coupling `g`.
    fn two_state(delta: f64, g: f64) -> (DVector<f64>, DMatrix<f64>) {
        let energy = DVector::from_vec(vec![0.0, delta]);
        let t = DMatrix::from_row_slice(2, 2, &[0.0, g, -g, 0.0]);
        (energy, t)
    }

    fn ground() -> DVector<Complex64> {
        DVector::from_vec(vec![Complex64::new(1.0, 0.0), Complex64::new(0.0, 0.0)])
    }

    fn integrate(delta: f64, g: f64, h: f64, n: usize) -> DVector<Complex64> {
        let (energy, t) = two_state(delta, g);
        let mut c = ground();
        for _ in 0..n {
            c = rk4_step(&c, &energy, &t, h, 1.0);
        }
        c
    }

    /// `exp(−i·(E − iT)·t)·c₀`
    fn exact(delta: f64, g: f64, time: f64) -> DVector<Complex64> {
        let (energy, t) = two_state(delta, g);
        let h_eff = complexify(&DMatrix::from_diagonal(&energy)) - complexify(&t) * Complex64::new(0.0, 1.0);
        (h_eff * Complex64::new(0.0, -time)).exp() * ground()
    }

    #[test]
    fn test_rabi_population() {
        let (delta, g): (f64, f64) = (0.5, 0.2);
        let h = 0.01;
        let omega = (delta * delta + 4.0 * g * g).sqrt();
        let mut c = ground();
        let (energy, t) = two_state(delta, g);
        for step in 1..=1000 {
            c = rk4_step(&c, &energy, &t, h, 1.0);
            let time = step as f64 * h;
            let rabi = 4.0 * g * g / (omega * omega) * (0.5 * omega * time).sin().powi(2);
            assert_relative_eq!(populations(&c)[1], rabi, epsilon = 1e-8);
        }
    }

    #[test]
    fn test_fourth_order_convergence() {
        let (delta, g) = (0.5, 0.2);
        let time = 4.0;
        let reference = exact(delta, g, time);
        let coarse = (integrate(delta, g, 0.4, 10) - &reference).norm();
        let fine = (integrate(delta, g, 0.2, 20) - &reference).norm();
        let ratio = coarse / fine;
        assert!(ratio > 13.0 && ratio < 19.0, "error ratio {}", ratio);
    }

    #[test]
    fn test_norm_is_conserved_for_antisymmetric_coupling() {
        let c = integrate(0.1, 0.3, 0.05, 400);
        assert_relative_eq!(populations(&c).sum(), 1.0, epsilon = 1e-6);
    }
}
