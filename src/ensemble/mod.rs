//! Ensemble module - samples, step reports and the parallel driver.

mod sample;
mod driver;

pub use sample::{sample_rng, Exclusion, Sample, SampleRecord, StepReport};
pub use driver::SurfaceHopping;
