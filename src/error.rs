//! Error types for grid construction and residual evaluation.

use thiserror::Error;

use crate::solution::rheology::RheologyError;

/// Result type alias using the crate error.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised by the staggered-grid engine.
///
/// Every operation returns on the first failure; nothing here is retried.
#[derive(Error, Debug)]
pub enum Error {
    /// Process grid or point distribution cannot be built.
    #[error("topology error: {0}")]
    Topology(String),

    /// Local grid cannot be coarsened by a multigrid hierarchy.
    #[error("multigrid incompatible grid in {axis}-direction: {reason}")]
    MultigridIncompatible { axis: char, reason: &'static str },

    /// Cell aspect ratio above the supported limit.
    #[error("too large aspect ratio is not supported: {0:.5}")]
    AspectRatio(f64),

    /// Failure raised by the constitutive closure, propagated unchanged.
    #[error("constitutive error: {0}")]
    Constitutive(#[from] RheologyError),

    /// Invalid boundary constraint (unknown dof, wrong index mode).
    #[error("constraint error: {0}")]
    Constraint(String),

    /// Invalid or missing configuration parameter.
    #[error("configuration error: {0}")]
    Config(String),

    /// TOML parse failure.
    #[error("failed to parse config: {0}")]
    Toml(#[from] toml::de::Error),

    /// Residual pipeline stage executed out of order.
    #[error("{0}")]
    PhaseOrder(&'static str),

    /// Vector length does not match the local layout.
    #[error("size mismatch for {what}: expected {expected}, found {found}")]
    Size {
        what: &'static str,
        expected: usize,
        found: usize,
    },

    /// I/O errors (partitioning dump, config files).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
