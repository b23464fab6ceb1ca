//! Hopping module - the fewest-switches surface hopping state machine.

mod decision;
mod rescale;
mod attempt;

pub use decision::{density_matrix, hop_probabilities, select_surface};
pub use rescale::{coupling_direction, rescale, solve_quadratic, Frustration};
pub use attempt::{try_hop, HopAttempt, HopOutcome};
