//! Residual norms.

use crate::parallel::ReduceOp;

use super::assembler::ResidualAssembler;
use super::rheology::Rheology;

/// Globally reduced norms of the last assembled residual.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResidualSummary {
    /// Minimum of the continuity residual.
    pub div_min: f64,
    /// Maximum of the continuity residual.
    pub div_max: f64,
    /// L2 norm of the continuity residual.
    pub div_l2: f64,
    /// L2 norm of the momentum residual (all three components).
    pub mom_l2: f64,
}

impl<R: Rheology> ResidualAssembler<R> {
    /// Reduce the residual norms over all ranks. Collective.
    pub fn residual_summary(&self) -> ResidualSummary {
        let comm = self.fs.comm();

        let lmin = self.gc.iter().copied().fold(f64::INFINITY, f64::min);
        let lmax = self.gc.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let ldiv: f64 = self.gc.iter().map(|v| v * v).sum();
        let lmom: f64 = self.gf.iter().flatten().map(|v| v * v).sum();

        ResidualSummary {
            div_min: comm.all_reduce(lmin, ReduceOp::Min),
            div_max: comm.all_reduce(lmax, ReduceOp::Max),
            div_l2: comm.all_reduce(ldiv, ReduceOp::Sum).sqrt(),
            mom_l2: comm.all_reduce(lmom, ReduceOp::Sum).sqrt(),
        }
    }

    /// Log the residual norms on rank 0. Collective.
    pub fn view_residual(&self) -> ResidualSummary {
        let s = self.residual_summary();
        if self.fs.comm().rank() == 0 {
            log::info!("Residual summary:");
            log::info!("  Continuity:");
            log::info!("    Div_min  = {:12.12e}", s.div_min);
            log::info!("    Div_max  = {:12.12e}", s.div_max);
            log::info!("    |Div|_2  = {:12.12e}", s.div_l2);
            log::info!("  Momentum:");
            log::info!("    |mRes|_2 = {:12.12e}", s.mom_l2);
        }
        s
    }
}
