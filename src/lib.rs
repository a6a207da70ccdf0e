//! Staggered-grid finite-difference (FDSTAG) Stokes residual engine.
//!
//! Velocities live on cell faces, pressure and temperature at cell centers
//! and shear strain rates on cell edges. The crate provides
//!
//! - axis discretization and domain decomposition ([`grid`]),
//! - ghosted distributed arrays over a pluggable process group ([`parallel`]),
//! - strain rate, vorticity, momentum and continuity residuals ([`solution`]),
//! - the Courant time step ([`timestepping`]).
//!
//! A typical nonlinear iteration:
//!
//! ```ignore
//! let mut jr = FdstagConfig::from_file("setup.toml")?.build_assembler(Arc::new(SerialComm))?;
//! jr.bc = BoundaryConstraints::free_slip_box(jr.grid())?;
//! jr.evaluate(&mut x, &mut f)?;
//! ```

pub mod config;
pub mod error;
pub mod grid;
pub mod parallel;
pub mod scaling;
pub mod solution;
pub mod timestepping;

pub use config::FdstagConfig;
pub use error::{Error, Result};
pub use grid::{
    Discret1D, DofIndex, EdgeKind, IndexMode, MeshSeg1D, SegmentInput, StaggeredGrid,
};
pub use parallel::{Communicator, DistArray, Field3, ReduceOp, SerialComm, ThreadComm};
pub use scaling::Scaling;
pub use solution::{
    BoundaryConstraints, MatLimits, Phase, PhaseRheology, ResidualAssembler, ResidualParams,
    ResidualSummary, Rheology, RheologyError,
};
pub use timestepping::TimeStepState;
