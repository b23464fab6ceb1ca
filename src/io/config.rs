// Read run parameters from YAML, e.g.
//
// simulation:
//   dt: 0.5
//   elec_substeps: 20
//   mass: [2000.0]
//   propagation: adiabatic_rk4
//   decoherence: true
//   instability_policy: skip_sample
//   seed: 7
// model:
//   kind: tully_simple
//   a: 0.01
//   b: 1.6
//   c: 0.005
//   d: 1.0
// initial:
//   surface: 0
//   positions: [[-8.0, 0.0, 0.0]]
//   velocities: [[0.01, 0.0, 0.0]]
// num_samples: 100
// n_steps: 4000

use nalgebra::Vector3;
use num_complex::Complex64;
use rand::Rng;
use rand_distr::Normal;
use serde::{Deserialize, Serialize};

use crate::error::{FsshError, Result};
use crate::oracle::{ConstantCoupling, ModelOracle, PotentialOracle, TullyDual, TullySimple};

/// How the electronic amplitude is advanced over a nuclear step.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PropagationMode {
    /// Four-stage Runge-Kutta in the adiabatic basis.
    AdiabaticRk4,
    /// Product of short-time exponentials of the interpolated diabatic
    /// Hamiltonian.
    DiabaticExponential,
}

/// What to do when one sample's propagation diverges.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum InstabilityPolicy {
    /// Record the reason on the sample and stop propagating it.
    SkipSample,
    /// Fail the whole step.
    Abort,
}

/// Per-run parameters shared by every component.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct SimulationConfig {
    /// Nuclear timestep.
    pub dt: f64,
    /// Electronic substeps per nuclear step.
    pub elec_substeps: usize,
    #[serde(default = "default_hbar")]
    pub hbar: f64,
    /// Largest energy gap a hop may bridge; `None` disables the gate.
    pub max_gap_hop: Option<f64>,
    /// Per-atom masses.
    pub mass: Vec<f64>,
    pub propagation: PropagationMode,
    /// Propagate the augmented-FSSH moments.
    pub decoherence: bool,
    pub instability_policy: InstabilityPolicy,
    /// Base seed; sample `k` uses `seed + k`.
    pub seed: u64,
}

fn default_hbar() -> f64 {
    1.0
}

impl SimulationConfig {
    pub fn elec_dt(&self) -> f64 {
        self.dt / self.elec_substeps as f64
    }

    /// Fail fast on values no step could run with.
    pub fn validate(&self, num_atoms: usize) -> Result<()> {
        if !(self.dt.is_finite() && self.dt > 0.0) {
            return Err(FsshError::Config(format!("dt must be positive, got {}", self.dt)));
        }
        if self.elec_substeps == 0 {
            return Err(FsshError::Config("elec_substeps must be at least 1".into()));
        }
        if !(self.hbar.is_finite() && self.hbar > 0.0) {
            return Err(FsshError::Config(format!("hbar must be positive, got {}", self.hbar)));
        }
        if let Some(gap) = self.max_gap_hop {
            if gap.is_nan() || gap < 0.0 {
                return Err(FsshError::Config(format!("max_gap_hop must be non-negative, got {}", gap)));
            }
        }
        if self.mass.len() != num_atoms {
            return Err(FsshError::shape(
                "mass",
                format!("expected {} masses, got {}", num_atoms, self.mass.len()),
            ));
        }
        if let Some(m) = self.mass.iter().find(|m| !(m.is_finite() && **m > 0.0)) {
            return Err(FsshError::Config(format!("masses must be positive, got {}", m)));
        }
        Ok(())
    }
}

/// Potential model selected in a run file.
#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ModelSpec {
    TullySimple(TullySimple),
    TullyDual(TullyDual),
    ConstantCoupling(ConstantCoupling),
}

impl ModelSpec {
    pub fn build(&self) -> Box<dyn PotentialOracle> {
        match *self {
            ModelSpec::TullySimple(m) => Box::new(ModelOracle::new(m)),
            ModelSpec::TullyDual(m) => Box::new(ModelOracle::new(m)),
            ModelSpec::ConstantCoupling(m) => Box::new(m),
        }
    }
}

/// Starting point shared by all samples, optionally spread by Gaussian
/// noise so the ensemble samples a wavepacket.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct InitialConditions {
    pub surface: usize,
    pub positions: Vec<Vector3<f64>>,
    pub velocities: Vec<Vector3<f64>>,
    /// Defaults to one-hot on `surface`.
    pub amplitude: Option<Vec<Complex64>>,
    /// Standard deviation of each Cartesian position component.
    pub position_width: Option<f64>,
    /// Standard deviation of each Cartesian velocity component.
    pub velocity_width: Option<f64>,
}

impl InitialConditions {
    /// Draw one sample's positions and velocities.
    pub fn draw<R: Rng + ?Sized>(&self, rng: &mut R) -> Result<(Vec<Vector3<f64>>, Vec<Vector3<f64>>)> {
        let positions = spread(&self.positions, self.position_width, rng)?;
        let velocities = spread(&self.velocities, self.velocity_width, rng)?;
        Ok((positions, velocities))
    }
}

fn spread<R: Rng + ?Sized>(
    centers: &[Vector3<f64>],
    width: Option<f64>,
    rng: &mut R,
) -> Result<Vec<Vector3<f64>>> {
    let Some(width) = width.filter(|w| *w > 0.0) else {
        return Ok(centers.to_vec());
    };
    let normal = Normal::new(0.0, width)
        .map_err(|e| FsshError::Config(format!("invalid width {}: {}", width, e)))?;
    Ok(centers
        .iter()
        .map(|c| c + Vector3::<f64>::from_distribution(&normal, rng))
        .collect())
}

/// Everything the binary needs for one run.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct RunFile {
    pub simulation: SimulationConfig,
    pub model: ModelSpec,
    pub initial: InitialConditions,
    pub num_samples: usize,
    pub n_steps: usize,
    #[serde(default = "default_log_interval")]
    pub log_interval: usize,
}

fn default_log_interval() -> usize {
    100
}

pub fn read_run_file(filename: &str) -> Result<RunFile> {
    let file = std::fs::File::open(filename)?;
    let reader = std::io::BufReader::new(file);
    let run: RunFile = serde_yaml::from_reader(reader)?;
    Ok(run)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    const RUN: &str = r#"
simulation:
  dt: 0.5
  elec_substeps: 10
  mass: [2000.0]
  propagation: diabatic_exponential
  decoherence: false
  instability_policy: abort
  seed: 3
model:
  kind: tully_simple
  a: 0.01
  b: 1.6
  c: 0.005
  d: 1.0
initial:
  surface: 0
  positions: [[-5.0, 0.0, 0.0]]
  velocities: [[0.01, 0.0, 0.0]]
  position_width: 0.5
num_samples: 4
n_steps: 10
"#;

    fn config() -> SimulationConfig {
        SimulationConfig {
            dt: 1.0,
            elec_substeps: 4,
            hbar: 1.0,
            max_gap_hop: None,
            mass: vec![1.0],
            propagation: PropagationMode::AdiabaticRk4,
            decoherence: false,
            instability_policy: InstabilityPolicy::Abort,
            seed: 0,
        }
    }

    #[test]
    fn test_parse_run_file() {
        let run: RunFile = serde_yaml::from_str(RUN).unwrap();
        assert_eq!(run.simulation.propagation, PropagationMode::DiabaticExponential);
        assert_eq!(run.simulation.hbar, 1.0);
        assert_eq!(run.simulation.max_gap_hop, None);
        assert_eq!(run.log_interval, 100);
        assert!(matches!(run.model, ModelSpec::TullySimple(_)));
        assert!(run.initial.amplitude.is_none());
        assert_eq!(run.model.build().num_states(), 2);
        run.simulation.validate(1).unwrap();
    }

    #[test]
    fn test_validate_rejects_mass_mismatch() {
        let err = config().validate(2).unwrap_err();
        assert!(matches!(err, FsshError::Shape { what: "mass", .. }));
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut cfg = config();
        cfg.elec_substeps = 0;
        assert!(matches!(cfg.validate(1), Err(FsshError::Config(_))));

        let mut cfg = config();
        cfg.dt = -1.0;
        assert!(cfg.validate(1).is_err());

        let mut cfg = config();
        cfg.mass = vec![0.0];
        assert!(cfg.validate(1).is_err());

        let mut cfg = config();
        cfg.max_gap_hop = Some(-0.1);
        assert!(cfg.validate(1).is_err());
    }

    #[test]
    fn test_draw_is_reproducible() {
        let run: RunFile = serde_yaml::from_str(RUN).unwrap();
        let (a, va) = run.initial.draw(&mut StdRng::seed_from_u64(11)).unwrap();
        let (b, vb) = run.initial.draw(&mut StdRng::seed_from_u64(11)).unwrap();
        assert_eq!(a, b);
        assert_eq!(va, vb);
        // no velocity width: velocities are copied verbatim
        assert_eq!(va, run.initial.velocities);
        assert_ne!(a, run.initial.positions);
    }
}
