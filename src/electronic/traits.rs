//! Strategy trait for advancing the electronic amplitude over one step.

use nalgebra::{DVector, Vector3};
use num_complex::Complex64;

use super::{DiabaticExponential, RungeKutta4};
use crate::error::Result;
use crate::io::{PropagationMode, SimulationConfig};
use crate::oracle::OracleSnapshot;

/// Inputs shared by every amplitude propagator for one sample and step.
pub struct ElectronicContext<'a> {
    /// Oracle output at the start of the step.
    pub old: &'a OracleSnapshot,
    /// Oracle output at the end of the step.
    pub new: &'a OracleSnapshot,
    /// Nuclear velocities after the first half-kick.
    pub velocities: &'a [Vector3<f64>],
    pub config: &'a SimulationConfig,
}

/// Advances the adiabatic amplitude across one full nuclear step.
pub trait AmplitudePropagator: Send + Sync {
    fn propagate(&self, c: &DVector<Complex64>, ctx: &ElectronicContext) -> Result<DVector<Complex64>>;
}

pub fn propagator_for(mode: PropagationMode) -> Box<dyn AmplitudePropagator> {
    match mode {
        PropagationMode::AdiabaticRk4 => Box::new(RungeKutta4),
        PropagationMode::DiabaticExponential => Box::new(DiabaticExponential),
    }
}
