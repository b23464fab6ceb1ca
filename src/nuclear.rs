//! Velocity-Verlet propagation of the nuclei on the active surface.
//!
//! The step is split in two so the oracle can be evaluated, and the active
//! surface changed, between the half-kicks.

use nalgebra::{DVector, Vector3};

/// Full drift plus the first half-kick with the forces of the active
/// surface at the old geometry. Returns `(positions, velocities)`.
pub fn verlet_step_1(
    forces: &[Vector3<f64>],
    positions: &[Vector3<f64>],
    velocities: &[Vector3<f64>],
    mass: &[f64],
    dt: f64,
) -> (Vec<Vector3<f64>>, Vec<Vector3<f64>>) {
    let mut new_positions = Vec::with_capacity(positions.len());
    let mut new_velocities = Vec::with_capacity(velocities.len());
    for (((x, v), f), &m) in positions.iter().zip(velocities).zip(forces).zip(mass) {
        let accel = f / m;
        new_positions.push(x + v * dt + accel * (0.5 * dt * dt));
        new_velocities.push(v + accel * (0.5 * dt));
    }
    (new_positions, new_velocities)
}

/// Second half-kick with the forces of the active surface at the new
/// geometry.
pub fn verlet_step_2(
    forces: &[Vector3<f64>],
    velocities: &[Vector3<f64>],
    mass: &[f64],
    dt: f64,
) -> Vec<Vector3<f64>> {
    velocities
        .iter()
        .zip(forces)
        .zip(mass)
        .map(|((v, f), &m)| v + f * (0.5 * dt / m))
        .collect()
}

#[inline]
pub fn kinetic_energy(velocities: &[Vector3<f64>], mass: &[f64]) -> f64 {
    velocities
        .iter()
        .zip(mass)
        .map(|(v, &m)| 0.5 * m * v.dot(v))
        .sum()
}

/// Kinetic energy plus the potential of the active surface.
pub fn total_energy(velocities: &[Vector3<f64>], mass: &[f64], energy: &DVector<f64>, surface: usize) -> f64 {
    kinetic_energy(velocities, mass) + energy[surface]
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_constant_force_is_exact() {
        let f = [Vector3::new(2.0, 0.0, -1.0)];
        let mass = [4.0];
        let mut x = vec![Vector3::zeros()];
        let mut v = vec![Vector3::new(1.0, 1.0, 0.0)];
        let dt = 0.1;
        for _ in 0..50 {
            let (nx, nv) = verlet_step_1(&f, &x, &v, &mass, dt);
            v = verlet_step_2(&f, &nv, &mass, dt);
            x = nx;
        }
        let t: f64 = 5.0;
        assert_relative_eq!(x[0].x, t + 0.25 * t * t, epsilon = 1e-10);
        assert_relative_eq!(x[0].y, t, epsilon = 1e-10);
        assert_relative_eq!(x[0].z, -0.125 * t * t, epsilon = 1e-10);
        assert_relative_eq!(v[0].x, 1.0 + 0.5 * t, epsilon = 1e-10);
    }

    #[test]
    fn test_harmonic_energy_is_bounded() {
        let k = 1.0;
        let mass = [1.0];
        let force = |x: &[Vector3<f64>]| vec![-x[0] * k];
        let mut x = vec![Vector3::new(1.0, 0.0, 0.0)];
        let mut v = vec![Vector3::zeros()];
        let e0 = 0.5 * k;
        let dt = 0.01;
        for _ in 0..5000 {
            let (nx, nv) = verlet_step_1(&force(&x), &x, &v, &mass, dt);
            v = verlet_step_2(&force(&nx), &nv, &mass, dt);
            x = nx;
            let e = kinetic_energy(&v, &mass) + 0.5 * k * x[0].norm_squared();
            assert_relative_eq!(e, e0, epsilon = 1e-4);
        }
    }

    #[test]
    fn test_total_energy_uses_active_surface() {
        let v = [Vector3::new(1.0, 0.0, 0.0), Vector3::new(0.0, 2.0, 0.0)];
        let mass = [2.0, 0.5];
        let energy = DVector::from_vec(vec![-1.0, 3.0]);
        assert_relative_eq!(kinetic_energy(&v, &mass), 2.0);
        assert_relative_eq!(total_energy(&v, &mass, &energy, 1), 5.0);
    }
}
