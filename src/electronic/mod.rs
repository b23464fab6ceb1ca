//! Electronic module - amplitude equations of motion and their integrators.

mod traits;
mod coupling;
mod rk4;
mod diabatic;

pub use traits::{propagator_for, AmplitudePropagator, ElectronicContext};
pub use coupling::{amplitude_derivative, coupling_matrix, populations};
pub use rk4::{rk4_step, RungeKutta4};
pub use diabatic::{unitarity_defect, DiabaticExponential};
