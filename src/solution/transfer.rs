//! Transfer between the coupled solver vectors and the split local fields.
//!
//! The local part of a coupled vector is laid out as
//!
//! ```text
//! [ vx (owned X faces) | vy (owned Y faces) | vz (owned Z faces) | p (owned cells) ]
//! ```
//!
//! with every block in owned point order (x fastest).

use crate::error::Result;

use super::assembler::{check_len, ResidualAssembler, Stage};
use super::rheology::Rheology;

/// Split `x` into consecutive blocks of the given lengths.
fn blocks<'a>(x: &'a [f64], lens: &[usize]) -> Vec<&'a [f64]> {
    let mut rest = x;
    let mut out = Vec::with_capacity(lens.len());
    for &n in lens {
        let (head, tail) = rest.split_at(n);
        out.push(head);
        rest = tail;
    }
    out
}

impl<R: Rheology> ResidualAssembler<R> {
    fn block_lens(&self) -> [usize; 4] {
        [self.gv[0].len(), self.gv[1].len(), self.gv[2].len(), self.gp.len()]
    }

    /// Copy a coupled solution vector into the ghosted fields.
    ///
    /// Single-point constraints are written into `x` first, so the caller sees
    /// the constrained vector. Boundary ghosts are then set from the
    /// two-point constraints.
    pub fn copy_solution(&mut self, x: &mut [f64]) -> Result<()> {
        check_len("solution vector", self.fs.dof.ln, x.len())?;

        self.bc.apply_spc(x, self.fs.dof.st)?;

        let lens = self.block_lens();
        let parts = blocks(x, &lens);
        for d in 0..3 {
            self.gv[d].copy_from_slice(parts[d]);
        }
        self.gp.copy_from_slice(parts[3]);

        let fs = &self.fs;
        for d in 0..3 {
            fs.da_face(d).global_to_local(&self.gv[d], &mut self.lv[d]);
            self.bc.apply_velocity_tpc(fs, d, &mut self.lv[d]);
        }
        fs.da_cen.global_to_local(&self.gp, &mut self.lp);
        self.bc.apply_pressure_tpc(fs, &mut self.lp);

        self.stage = Stage::Solution;
        Ok(())
    }

    /// Concatenate the residual blocks into `f` and zero constrained entries.
    pub fn copy_residual(&self, f: &mut [f64]) -> Result<()> {
        self.require(Stage::Residual, "residual copied before it was assembled")?;
        check_len("residual vector", self.fs.dof.ln, f.len())?;

        let mut off = 0;
        for block in self.gf.iter().chain(std::iter::once(&self.gc)) {
            f[off..off + block.len()].copy_from_slice(block);
            off += block.len();
        }

        self.bc.zero_spc(f, self.fs.dof.st)
    }

    /// Load the momentum blocks of a coupled vector into the face residuals.
    pub fn copy_momentum_res(&mut self, f: &[f64]) -> Result<()> {
        check_len("momentum residual", self.fs.dof.ln, f.len())?;
        let lens = self.block_lens();
        let parts = blocks(f, &lens);
        for d in 0..3 {
            self.gf[d].copy_from_slice(parts[d]);
        }
        Ok(())
    }

    /// Load the continuity block of a coupled vector into the cell residual.
    pub fn copy_continuity_res(&mut self, f: &[f64]) -> Result<()> {
        check_len("continuity residual", self.fs.dof.ln, f.len())?;
        let lnv = self.fs.dof.lnv;
        self.gc.copy_from_slice(&f[lnv..]);
        Ok(())
    }
}
