//! Augmented-FSSH decoherence: moment propagation and collapse.

mod collapse;
mod moments;

pub use collapse::{collapse_rates, CollapseContext, CollapsePolicy, CollapseRates, NoCollapse, DEFAULT_ZETA};
pub use moments::{propagate_moments, rk4_moments, DecoherenceState, MomentEquations};
