//! Rust FSSH - fewest-switches surface hopping in Rust
//!
//! This crate propagates ensembles of mixed quantum-classical trajectories:
//! nuclei move on one adiabatic surface with velocity Verlet, the electronic
//! amplitude is integrated alongside, and stochastic hops between surfaces
//! follow Tully's fewest-switches criterion with energy-conserving velocity
//! rescaling. Augmented-FSSH decoherence moments can be carried as well.

pub mod error;
pub mod tensor;
pub mod oracle;
pub mod electronic;
pub mod hopping;
pub mod nuclear;
pub mod decoherence;
pub mod ensemble;
pub mod io;

// Re-export commonly used types at crate root
pub use error::{FsshError, Result};
pub use tensor::{PairTensor, StateMatrix};
pub use oracle::{ConstantCoupling, DiabaticFrame, ModelOracle, OracleSnapshot, PotentialOracle, TullyDual, TullySimple};
pub use electronic::{AmplitudePropagator, DiabaticExponential, RungeKutta4};
pub use hopping::{try_hop, Frustration, HopAttempt, HopOutcome};
pub use decoherence::{CollapsePolicy, DecoherenceState, NoCollapse};
pub use ensemble::{Sample, SampleRecord, StepReport, SurfaceHopping};
pub use io::{read_run_file, InitialConditions, InstabilityPolicy, ModelSpec, PropagationMode, RunFile, SimulationConfig};
