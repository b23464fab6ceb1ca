//! Energy-conserving velocity rescaling along the coupling direction.
//!
//! Reference: B. R. Landry and J. E. Subotnik, "How to recover Marcus theory
//! with fewest switches surface hopping: Add just a touch of decoherence",
//! J. Chem. Phys. 137, 22A513 (2012)

use nalgebra::{DVector, Vector3};
use serde::Serialize;

use crate::tensor::PairTensor;

/// Why a selected hop was rejected.
#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Frustration {
    /// The coupling vector between the two surfaces is zero or undefined.
    NoCouplingDirection,
    /// Not enough kinetic energy along the coupling direction to climb the
    /// gap.
    InsufficientKineticEnergy,
}

/// Normalized `d_{from,to}`, flattened over atoms and Cartesian components.
/// `None` when the vector is zero or not finite.
pub fn coupling_direction(nacv: &PairTensor<f64>, from: usize, to: usize) -> Option<Vec<Vector3<f64>>> {
    let pair = nacv.pair(from, to);
    let norm = pair.iter().map(|d| d.norm_squared()).sum::<f64>().sqrt();
    if !norm.is_finite() || norm == 0.0 {
        return None;
    }
    Some(pair.iter().map(|d| d / norm).collect())
}

/// Smallest-magnitude root `λ` of `a·λ² + b·λ + c = 0` with
/// `a = Σ d²/(2m)`, `b = Σ v·d`, `c = E_new − E_old`, so that
/// `v' = v + λ·d/m` conserves total energy. `None` when no real root exists.
pub fn solve_quadratic(
    velocities: &[Vector3<f64>],
    direction: &[Vector3<f64>],
    old_energy: f64,
    new_energy: f64,
    mass: &[f64],
) -> Option<f64> {
    let a: f64 = direction
        .iter()
        .zip(mass)
        .map(|(d, &m)| d.norm_squared() / (2.0 * m))
        .sum();
    let b: f64 = velocities.iter().zip(direction).map(|(v, d)| v.dot(d)).sum();
    let c = new_energy - old_energy;

    let discriminant = b * b - 4.0 * a * c;
    if !discriminant.is_finite() || discriminant < 0.0 || a == 0.0 {
        return None;
    }
    let sqrt = discriminant.sqrt();
    let plus = (-b + sqrt) / (2.0 * a);
    let minus = (-b - sqrt) / (2.0 * a);
    Some(if plus.abs() <= minus.abs() { plus } else { minus })
}

/// Velocities after an energy-conserving hop `from → to`, or the reason
/// the hop is frustrated.
pub fn rescale(
    energy: &DVector<f64>,
    velocities: &[Vector3<f64>],
    nacv: &PairTensor<f64>,
    mass: &[f64],
    from: usize,
    to: usize,
) -> Result<Vec<Vector3<f64>>, Frustration> {
    let direction = coupling_direction(nacv, from, to).ok_or(Frustration::NoCouplingDirection)?;
    let scale = solve_quadratic(velocities, &direction, energy[from], energy[to], mass)
        .ok_or(Frustration::InsufficientKineticEnergy)?;

    Ok(velocities
        .iter()
        .zip(&direction)
        .zip(mass)
        .map(|((v, d), &m)| v + d * (scale / m))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nuclear::total_energy;
    use approx::assert_relative_eq;

    fn nacv(d: Vector3<f64>) -> PairTensor<f64> {
        PairTensor::from_fn(2, 2, |i, j, atom| {
            let scale = if atom == 0 { 1.0 } else { 0.5 };
            match (i, j) {
                (0, 1) => d * scale,
                (1, 0) => -d * scale,
                _ => Vector3::zeros(),
            }
        })
    }

    #[test]
    fn test_upward_hop_conserves_energy() {
        let energy = DVector::from_vec(vec![-0.02, 0.03]);
        let mass = [2000.0, 1000.0];
        let v = vec![Vector3::new(0.02, 0.006, -0.004), Vector3::new(0.01, 0.003, -0.002)];
        let d = nacv(Vector3::new(1.0, 0.3, -0.2));

        let before = total_energy(&v, &mass, &energy, 0);
        let new_v = rescale(&energy, &v, &d, &mass, 0, 1).unwrap();
        let after = total_energy(&new_v, &mass, &energy, 1);
        assert_relative_eq!(before, after, max_relative = 1e-8);
    }

    #[test]
    fn test_downward_hop_conserves_energy() {
        let energy = DVector::from_vec(vec![-0.5, 0.1]);
        let mass = [1.0, 1.0];
        let v = vec![Vector3::new(0.1, 0.0, 0.0), Vector3::zeros()];
        let d = nacv(Vector3::new(0.0, 2.0, 0.0));

        let before = total_energy(&v, &mass, &energy, 1);
        let new_v = rescale(&energy, &v, &d, &mass, 1, 0).unwrap();
        let after = total_energy(&new_v, &mass, &energy, 0);
        assert_relative_eq!(before, after, max_relative = 1e-8);
    }

    #[test]
    fn test_smallest_root_is_chosen() {
        // a = 0.5, b = 1, c = 0.1: roots ≈ −0.1056 and −1.894
        let v = [Vector3::new(1.0, 0.0, 0.0)];
        let d = [Vector3::new(1.0, 0.0, 0.0)];
        let lambda = solve_quadratic(&v, &d, 0.0, 0.1, &[1.0]).unwrap();
        assert_relative_eq!(lambda, -1.0 + (0.8f64).sqrt(), epsilon = 1e-12);
    }

    #[test]
    fn test_insufficient_energy_is_frustrated() {
        let energy = DVector::from_vec(vec![0.0, 1.0]);
        let v = vec![Vector3::new(0.01, 0.0, 0.0), Vector3::zeros()];
        let d = nacv(Vector3::new(1.0, 0.0, 0.0));
        let err = rescale(&energy, &v, &d, &[1.0, 1.0], 0, 1).unwrap_err();
        assert_eq!(err, Frustration::InsufficientKineticEnergy);
    }

    #[test]
    fn test_zero_or_nan_direction_is_frustrated() {
        let energy = DVector::from_vec(vec![0.0, 0.0]);
        let v = vec![Vector3::new(1.0, 0.0, 0.0), Vector3::zeros()];
        let zero = nacv(Vector3::zeros());
        assert_eq!(
            rescale(&energy, &v, &zero, &[1.0, 1.0], 0, 1).unwrap_err(),
            Frustration::NoCouplingDirection
        );
        let undefined = nacv(Vector3::repeat(f64::NAN));
        assert!(coupling_direction(&undefined, 0, 1).is_none());
    }
}
