//! Time step state and the Courant time step.

pub mod courant;

pub use courant::{max_inverse_step, TimeStepState, DT_GROWTH};
