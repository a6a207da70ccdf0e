//! Pressure shift.

use crate::error::Result;
use crate::parallel::ReduceOp;

use super::assembler::{ResidualAssembler, Stage};
use super::rheology::Rheology;

impl<R: Rheology> ResidualAssembler<R> {
    /// Set `p_shift` to the mean pressure of the top cell layer.
    ///
    /// The shift is only applied to the pressure seen by the constitutive
    /// update. It is zero unless `shift_pressure` is enabled.
    pub fn press_shift(&mut self) -> Result<()> {
        self.require(Stage::Solution, "pressure shift requested before the solution was copied")?;

        if !self.params.shift_pressure {
            self.p_shift = 0.0;
            return Ok(());
        }

        let top = self.fs.ds[2].tcels as isize - 1;
        let lsum: f64 = self
            .centers()
            .filter(|p| p[2] == top)
            .map(|p| self.lp[p])
            .sum();
        let gsum = self.fs.comm().all_reduce(lsum, ReduceOp::Sum);

        let ncells = (self.fs.ds[0].tcels * self.fs.ds[1].tcels) as f64;
        self.p_shift = gsum / ncells;
        Ok(())
    }
}
