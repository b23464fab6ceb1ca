//! Data-parallel stepping of the whole ensemble.
//!
//! Each sample runs, in order: first Verlet half-step, oracle, amplitude
//! (and moment) propagation, hop test, collapse hook, second Verlet
//! half-kick. All samples are advanced in parallel into scratch state; the
//! step is committed only after every sample has finished, so an aborted
//! step leaves the ensemble untouched.

use std::ops::ControlFlow;

use nalgebra::{DVector, Vector3};
use num_complex::Complex64;
use rand::rngs::StdRng;
use rayon::prelude::*;

use super::sample::{Exclusion, Sample, SampleRecord, StepReport};
use crate::decoherence::{
    collapse_rates, propagate_moments, CollapseContext, CollapsePolicy, DecoherenceState, MomentEquations,
    NoCollapse, DEFAULT_ZETA,
};
use crate::electronic::{coupling_matrix, populations, propagator_for, AmplitudePropagator, ElectronicContext};
use crate::error::{FsshError, Result};
use crate::hopping::{try_hop, HopAttempt, HopOutcome};
use crate::io::{InitialConditions, InstabilityPolicy, SimulationConfig};
use crate::nuclear::{total_energy, verlet_step_1, verlet_step_2};
use crate::oracle::{OracleSnapshot, PotentialOracle};

/// Fully propagated state of one sample, not yet committed.
struct Advanced {
    positions: Vec<Vector3<f64>>,
    velocities: Vec<Vector3<f64>>,
    amplitude: DVector<Complex64>,
    moments: DecoherenceState,
    snapshot: OracleSnapshot,
    rng: StdRng,
    attempt: HopAttempt,
}

pub struct SurfaceHopping<O: PotentialOracle> {
    oracle: O,
    config: SimulationConfig,
    propagator: Box<dyn AmplitudePropagator>,
    collapse: Box<dyn CollapsePolicy>,
    samples: Vec<Sample>,
    step: usize,
}

impl<O: PotentialOracle> SurfaceHopping<O> {
    pub fn new(oracle: O, config: SimulationConfig, samples: Vec<Sample>) -> Result<Self> {
        config.validate(oracle.num_atoms())?;
        if samples.is_empty() {
            return Err(FsshError::Config("the ensemble needs at least one sample".into()));
        }
        let (num_states, num_atoms) = (oracle.num_states(), oracle.num_atoms());
        for sample in &samples {
            if let Err(e) = sample.validate(num_states, num_atoms) {
                log::warn!("sample {} does not match the oracle: {}", sample.index, e);
                return Err(e);
            }
        }
        Ok(Self {
            propagator: propagator_for(config.propagation),
            collapse: Box::new(NoCollapse),
            oracle,
            config,
            samples,
            step: 0,
        })
    }

    /// Draw `num_samples` samples from shared initial conditions.
    pub fn from_initial(
        oracle: O,
        config: SimulationConfig,
        initial: &InitialConditions,
        num_samples: usize,
    ) -> Result<Self> {
        config.validate(oracle.num_atoms())?;
        let samples = (0..num_samples)
            .map(|index| Sample::from_initial(index, initial, &oracle, &config))
            .collect::<Result<Vec<_>>>()?;
        Self::new(oracle, config, samples)
    }

    /// Replace the default no-op collapse hook.
    pub fn with_collapse<C: CollapsePolicy + 'static>(mut self, policy: C) -> Self {
        self.collapse = Box::new(policy);
        self
    }

    pub fn samples(&self) -> &[Sample] {
        &self.samples
    }

    pub fn config(&self) -> &SimulationConfig {
        &self.config
    }

    pub fn num_states(&self) -> usize {
        self.oracle.num_states()
    }

    /// Number of completed steps.
    pub fn steps_done(&self) -> usize {
        self.step
    }

    /// Advance every active sample by one nuclear step.
    pub fn step(&mut self) -> Result<StepReport> {
        let results: Vec<Option<Result<Advanced>>> = self
            .samples
            .par_iter()
            .map(|sample| sample.is_active().then(|| self.advance(sample)))
            .collect();

        let skip = self.config.instability_policy == InstabilityPolicy::SkipSample;
        let mut checked = Vec::with_capacity(results.len());
        for result in results {
            match result {
                Some(Err(e)) if !(skip && e.is_recoverable()) => {
                    log::warn!("step {} aborted: {}", self.step + 1, e);
                    return Err(e);
                }
                other => checked.push(other),
            }
        }

        self.step += 1;
        let mut records = Vec::with_capacity(checked.len());
        let mut exclusions = Vec::new();
        for (sample, result) in self.samples.iter_mut().zip(checked) {
            match result {
                None => {}
                Some(Ok(next)) => records.push(commit(sample, next, &self.config)),
                Some(Err(e)) => {
                    log::warn!("excluding sample {} at step {}: {}", sample.index, self.step, e);
                    let reason = e.to_string();
                    sample.excluded = Some(reason.clone());
                    exclusions.push(Exclusion { index: sample.index, reason });
                }
            }
        }

        log::debug!(
            "step {}: {} samples advanced, {} hops, {} excluded",
            self.step,
            records.len(),
            records.iter().filter(|r| matches!(r.outcome, HopOutcome::Accepted { .. })).count(),
            exclusions.len()
        );
        Ok(StepReport { step: self.step, records, exclusions })
    }

    /// Run `n_steps` steps, handing each report to `observer`. The run stops
    /// early when the observer breaks. Returns the number of steps taken.
    pub fn run_with<F>(&mut self, n_steps: usize, mut observer: F) -> Result<usize>
    where
        F: FnMut(&StepReport) -> ControlFlow<()>,
    {
        for done in 1..=n_steps {
            let report = self.step()?;
            if observer(&report).is_break() {
                log::info!("run stopped by observer after {} steps", done);
                return Ok(done);
            }
        }
        Ok(n_steps)
    }

    /// Run `n_steps` steps and collect every report.
    pub fn run(&mut self, n_steps: usize) -> Result<Vec<StepReport>> {
        let mut reports = Vec::with_capacity(n_steps);
        self.run_with(n_steps, |report| {
            reports.push(report.clone());
            ControlFlow::Continue(())
        })?;
        Ok(reports)
    }

    fn advance(&self, sample: &Sample) -> Result<Advanced> {
        let config = &self.config;
        let surface = sample.active_surface;
        let mut rng = sample.rng.clone();

        let (positions, half_velocities) = verlet_step_1(
            sample.snapshot.surface_forces(surface),
            &sample.positions,
            &sample.velocities,
            &config.mass,
            config.dt,
        );

        let snapshot = self.oracle.evaluate(&positions)?;
        snapshot.validate(self.oracle.num_states(), self.oracle.num_atoms())?;

        let ctx = ElectronicContext {
            old: &sample.snapshot,
            new: &snapshot,
            velocities: &half_velocities,
            config,
        };
        let mut amplitude = self
            .propagator
            .propagate(&sample.amplitude, &ctx)
            .map_err(|e| e.for_sample(sample.index))?;
        if amplitude.iter().any(|z| !z.is_finite()) {
            return Err(instability(sample.index, "non-finite electronic amplitude"));
        }

        let mut moments = if config.decoherence {
            let eqs = MomentEquations::new(&snapshot, &half_velocities, &config.mass, surface, config.hbar);
            let moments = propagate_moments(&sample.moments, &eqs, config.elec_dt(), config.elec_substeps);
            if !moments.is_finite() {
                return Err(instability(sample.index, "non-finite decoherence moments"));
            }
            moments
        } else {
            sample.moments.clone()
        };

        let t = coupling_matrix(&snapshot.nacv, &half_velocities);
        let attempt = try_hop(&amplitude, &t, &snapshot, &half_velocities, surface, config, &mut rng);
        match attempt.outcome {
            HopOutcome::Accepted { from, to } => {
                log::debug!("sample {} hopped {} -> {}", sample.index, from, to)
            }
            HopOutcome::Frustrated { from, to, reason } => {
                log::trace!("sample {} frustrated hop {} -> {}: {:?}", sample.index, from, to, reason)
            }
            HopOutcome::Stayed => {}
        }

        if config.decoherence {
            let rates = collapse_rates(&snapshot, &moments.delta_r, config.hbar, DEFAULT_ZETA);
            let collapse_ctx = CollapseContext {
                sample: sample.index,
                surface: attempt.surface,
                outcome: &attempt.outcome,
                rates: &rates,
                snapshot: &snapshot,
                dt: config.dt,
            };
            self.collapse.apply(&collapse_ctx, &mut amplitude, &mut moments, &mut rng);
        }

        let velocities = verlet_step_2(
            snapshot.surface_forces(attempt.surface),
            &attempt.velocities,
            &config.mass,
            config.dt,
        );
        if velocities.iter().chain(&positions).any(|v| v.iter().any(|x| !x.is_finite())) {
            return Err(instability(sample.index, "non-finite nuclear coordinates"));
        }

        Ok(Advanced { positions, velocities, amplitude, moments, snapshot, rng, attempt })
    }
}

fn instability(sample: usize, reason: &str) -> FsshError {
    FsshError::Instability { sample, reason: reason.to_string() }
}

fn commit(sample: &mut Sample, next: Advanced, config: &SimulationConfig) -> SampleRecord {
    let Advanced { positions, velocities, amplitude, moments, snapshot, rng, attempt } = next;
    let recorded = config.decoherence.then(|| moments.clone());

    let record = SampleRecord {
        index: sample.index,
        active_surface: attempt.surface,
        positions: positions.clone(),
        velocities: velocities.clone(),
        amplitude: amplitude.iter().copied().collect(),
        hop_probabilities: attempt.probabilities.iter().copied().collect(),
        outcome: attempt.outcome,
        populations: populations(&amplitude).iter().copied().collect(),
        total_energy: total_energy(&velocities, &config.mass, &snapshot.energy, attempt.surface),
        delta_r: recorded.as_ref().map(|m| m.delta_r.clone()),
        delta_p: recorded.as_ref().map(|m| m.delta_p.clone()),
        sigma: recorded.map(|m| m.sigma),
    };

    sample.active_surface = attempt.surface;
    sample.positions = positions;
    sample.velocities = velocities;
    sample.amplitude = amplitude;
    sample.moments = moments;
    sample.snapshot = snapshot;
    sample.rng = rng;
    record
}
