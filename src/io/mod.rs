//! IO module - run configuration for surface-hopping simulations.

mod config;

pub use config::{
    read_run_file, InitialConditions, InstabilityPolicy, ModelSpec, PropagationMode, RunFile,
    SimulationConfig,
};
