//! Residual evaluation of the staggered-grid Stokes system.
//!
//! [`ResidualAssembler`] owns the solution fields of one grid and runs the
//! stages of a nonlinear iteration. The constitutive model is supplied
//! through the [`Rheology`] trait and boundary conditions through
//! [`BoundaryConstraints`].

pub mod assembler;
pub mod boundary;
pub mod pressure;
pub mod report;
pub mod residual;
pub mod rheology;
pub mod state;
pub mod strain;
pub mod transfer;

pub use assembler::{ResidualAssembler, ResidualParams};
pub use boundary::{BoundaryConstraints, NO_VALUE};
pub use report::ResidualSummary;
pub use rheology::{MatLimits, Phase, PhaseRheology, Rheology, RheologyError};
pub use state::{PhaseRatioArena, PointSet, SolVarBulk, SolVarCell, SolVarDev, SolVarEdge};
