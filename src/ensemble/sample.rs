//! One surface-hopping trajectory and its per-step record.

use nalgebra::{DVector, Vector3};
use num_complex::Complex64;
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::Serialize;

use crate::decoherence::DecoherenceState;
use crate::electronic::populations;
use crate::error::{FsshError, Result};
use crate::hopping::HopOutcome;
use crate::io::{InitialConditions, SimulationConfig};
use crate::nuclear::total_energy;
use crate::oracle::{OracleSnapshot, PotentialOracle};
use crate::tensor::{PairTensor, StateMatrix};

/// Random stream of sample `index`; reproducible regardless of which
/// thread steps the sample. Seed and index fill separate halves of the
/// key, so distinct `(seed, index)` pairs never share a stream.
pub fn sample_rng(seed: u64, index: usize) -> StdRng {
    let mut key = [0u8; 32];
    key[..8].copy_from_slice(&seed.to_le_bytes());
    key[8..16].copy_from_slice(&(index as u64).to_le_bytes());
    StdRng::from_seed(key)
}

#[derive(Clone, Debug)]
pub struct Sample {
    pub index: usize,
    pub active_surface: usize,
    pub positions: Vec<Vector3<f64>>,
    pub velocities: Vec<Vector3<f64>>,
    pub amplitude: DVector<Complex64>,
    pub moments: DecoherenceState,
    /// Oracle output at the current positions.
    pub snapshot: OracleSnapshot,
    pub rng: StdRng,
    /// Set once a recoverable failure removed the sample from the run.
    pub excluded: Option<String>,
}

impl Sample {
    /// Build a sample at the given phase-space point and evaluate the
    /// oracle there. The amplitude defaults to one-hot on `surface`.
    pub fn new<O: PotentialOracle + ?Sized>(
        index: usize,
        surface: usize,
        positions: Vec<Vector3<f64>>,
        velocities: Vec<Vector3<f64>>,
        amplitude: Option<DVector<Complex64>>,
        oracle: &O,
        config: &SimulationConfig,
    ) -> Result<Self> {
        let num_states = oracle.num_states();
        let num_atoms = oracle.num_atoms();

        check_surface(surface, num_states)?;
        check_geometry(&positions, &velocities, num_atoms)?;
        let amplitude = match amplitude {
            Some(c) => {
                check_amplitude(&c, num_states)?;
                c
            }
            None => DVector::from_fn(num_states, |i, _| {
                if i == surface {
                    Complex64::new(1.0, 0.0)
                } else {
                    Complex64::new(0.0, 0.0)
                }
            }),
        };

        let snapshot = oracle.evaluate(&positions)?;
        snapshot.validate(num_states, num_atoms)?;

        Ok(Self {
            index,
            active_surface: surface,
            positions,
            velocities,
            moments: DecoherenceState::for_amplitude(&amplitude, num_atoms),
            amplitude,
            snapshot,
            rng: sample_rng(config.seed, index),
            excluded: None,
        })
    }

    /// Check the sample against the dimensions of an oracle.
    pub fn validate(&self, num_states: usize, num_atoms: usize) -> Result<()> {
        check_surface(self.active_surface, num_states)?;
        check_geometry(&self.positions, &self.velocities, num_atoms)?;
        check_amplitude(&self.amplitude, num_states)?;
        self.snapshot.validate(num_states, num_atoms)
    }

    /// Draw sample `index` from the initial conditions using its own
    /// random stream, which it then keeps for hopping.
    pub fn from_initial<O: PotentialOracle + ?Sized>(
        index: usize,
        initial: &InitialConditions,
        oracle: &O,
        config: &SimulationConfig,
    ) -> Result<Self> {
        let mut rng = sample_rng(config.seed, index);
        let (positions, velocities) = initial.draw(&mut rng)?;
        let amplitude = initial
            .amplitude
            .as_ref()
            .map(|c| DVector::from_column_slice(c));
        let mut sample = Self::new(index, initial.surface, positions, velocities, amplitude, oracle, config)?;
        sample.rng = rng;
        Ok(sample)
    }

    pub fn is_active(&self) -> bool {
        self.excluded.is_none()
    }

    pub fn populations(&self) -> DVector<f64> {
        populations(&self.amplitude)
    }

    pub fn total_energy(&self, mass: &[f64]) -> f64 {
        total_energy(&self.velocities, mass, &self.snapshot.energy, self.active_surface)
    }
}

fn check_surface(surface: usize, num_states: usize) -> Result<()> {
    if surface >= num_states {
        return Err(FsshError::Config(format!(
            "surface {} out of range for {} states",
            surface, num_states
        )));
    }
    Ok(())
}

fn check_geometry(positions: &[Vector3<f64>], velocities: &[Vector3<f64>], num_atoms: usize) -> Result<()> {
    if positions.len() != num_atoms || velocities.len() != num_atoms {
        return Err(FsshError::shape(
            "geometry",
            format!(
                "expected {} atoms, got {} positions and {} velocities",
                num_atoms,
                positions.len(),
                velocities.len()
            ),
        ));
    }
    Ok(())
}

fn check_amplitude(amplitude: &DVector<Complex64>, num_states: usize) -> Result<()> {
    if amplitude.len() != num_states {
        return Err(FsshError::shape(
            "amplitude",
            format!("expected {} states, got {}", num_states, amplitude.len()),
        ));
    }
    Ok(())
}

/// Serializable state of one sample after a completed step.
#[derive(Serialize, Debug, Clone)]
pub struct SampleRecord {
    pub index: usize,
    pub active_surface: usize,
    pub positions: Vec<Vector3<f64>>,
    pub velocities: Vec<Vector3<f64>>,
    pub amplitude: Vec<Complex64>,
    pub hop_probabilities: Vec<f64>,
    pub outcome: HopOutcome,
    pub populations: Vec<f64>,
    pub total_energy: f64,
    /// Decoherence moments; `None` unless decoherence is enabled.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delta_r: Option<PairTensor<Complex64>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delta_p: Option<PairTensor<Complex64>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sigma: Option<StateMatrix>,
}

/// A sample removed from the run during a step.
#[derive(Serialize, Debug, Clone)]
pub struct Exclusion {
    pub index: usize,
    pub reason: String,
}

/// Everything produced by one ensemble step.
#[derive(Serialize, Debug, Clone)]
pub struct StepReport {
    pub step: usize,
    pub records: Vec<SampleRecord>,
    pub exclusions: Vec<Exclusion>,
}

impl StepReport {
    /// Population of each state averaged over the recorded samples.
    pub fn mean_populations(&self) -> Vec<f64> {
        let Some(first) = self.records.first() else {
            return Vec::new();
        };
        let mut mean = vec![0.0; first.populations.len()];
        for record in &self.records {
            for (m, p) in mean.iter_mut().zip(&record.populations) {
                *m += p;
            }
        }
        let n = self.records.len() as f64;
        mean.iter_mut().for_each(|m| *m /= n);
        mean
    }

    /// Fraction of recorded samples on each surface.
    pub fn surface_fractions(&self, num_states: usize) -> Vec<f64> {
        let mut counts = vec![0.0; num_states];
        for record in &self.records {
            counts[record.active_surface] += 1.0;
        }
        let n = self.records.len().max(1) as f64;
        counts.iter().map(|c| c / n).collect()
    }

    pub fn hops(&self) -> usize {
        self.records
            .iter()
            .filter(|r| matches!(r.outcome, HopOutcome::Accepted { .. }))
            .count()
    }
}
