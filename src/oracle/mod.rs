//! Oracle module - the potential-energy collaborator and analytic models.

mod traits;
mod models;

pub use traits::{DiabaticFrame, OracleSnapshot, PotentialOracle};
pub use models::{ConstantCoupling, DiabaticModel, ModelOracle, TullyDual, TullySimple};
