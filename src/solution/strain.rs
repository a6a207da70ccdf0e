//! Strain rate and vorticity on the staggered grid.
//!
//! Normal components live at cell centers and are first differences of the
//! face velocities across the cell. Every shear component lives on its edge
//! and combines the two cross derivatives through the edge:
//!
//! ```text
//! d_ab = 1/2 (dva/db + dvb/da)      (strain rate)
//! w_ab =      dvb/da - dva/db       (rotation rate)
//! ```

use crate::error::Result;
use crate::grid::{EdgeKind, StaggeredGrid, CENTER_KINDS};
use crate::parallel::Field3;

use super::assembler::{step, ResidualAssembler, Stage};
use super::rheology::Rheology;

/// Cross derivatives `(dva/db, dvb/da)` at edge point `p` spanned by axes `a`, `b`.
#[inline]
fn cross_derivatives(
    fs: &StaggeredGrid,
    lv: &[Field3; 3],
    a: usize,
    b: usize,
    p: [isize; 3],
) -> (f64, f64) {
    let dva_db = (lv[a][p] - lv[a][step(p, b, -1)]) / fs.ds[b].size_node(p[b]);
    let dvb_da = (lv[b][p] - lv[b][step(p, a, -1)]) / fs.ds[a].size_node(p[a]);
    (dva_db, dvb_da)
}

/// Sign turning `dvb/da - dva/db` into the right-handed rotation component.
fn vorticity_sign(edge: EdgeKind) -> f64 {
    match edge {
        EdgeKind::XY => 1.0,
        EdgeKind::XZ => -1.0,
        EdgeKind::YZ => 1.0,
    }
}

impl<R: Rheology> ResidualAssembler<R> {
    /// Deviatoric and effective strain rates at all points.
    ///
    /// The effective strain rate adds the elastic history term `h * I2Gdt`.
    /// Ghost points of all six components are refreshed on return.
    pub fn eff_strain_rate(&mut self) -> Result<()> {
        self.require(Stage::Solution, "strain rate requested before the solution was copied")?;

        let fs = &self.fs;
        let lv = &self.lv;

        for (n, p) in fs.points(CENTER_KINDS).enumerate() {
            let sv = &mut self.sv_cell[n];

            let d = [0, 1, 2].map(|a| (lv[a][step(p, a, 1)] - lv[a][p]) / fs.ds[a].size_cell(p[a]));

            // volumetric strain rate
            let theta = d[0] + d[1] + d[2];
            sv.bulk.theta = theta;

            let dev = d.map(|v| v - theta / 3.0);
            sv.dxx = dev[0];
            sv.dyy = dev[1];
            sv.dzz = dev[2];

            let h = [sv.hxx, sv.hyy, sv.hzz];
            for a in 0..3 {
                self.ldiag[a][p] = dev[a] + h[a] * sv.dev.i2gdt;
            }
        }
        for a in 0..3 {
            fs.da_cen.local_to_local(&mut self.ldiag[a]);
        }

        for e in EdgeKind::ALL {
            let (a, b) = e.axes();
            let ie = e.index();
            for (n, p) in fs.points(e.kinds()).enumerate() {
                let (dva_db, dvb_da) = cross_derivatives(fs, lv, a, b, p);
                let d = 0.5 * (dva_db + dvb_da);

                let sv = &mut self.sv_edge[ie][n];
                sv.d = d;
                self.ledge[ie][p] = d + sv.h * sv.dev.i2gdt;
            }
            fs.da_edge(e).local_to_local(&mut self.ledge[ie]);
        }

        self.stage = Stage::StrainRate;
        Ok(())
    }

    /// Rotation rates at all edges.
    ///
    /// `wz` is stored on XY edges, `wy` on XZ edges and `wx` on YZ edges.
    pub fn get_vorticity(&mut self) -> Result<()> {
        self.require(Stage::Solution, "vorticity requested before the solution was copied")?;

        let fs = &self.fs;
        for e in EdgeKind::ALL {
            let (a, b) = e.axes();
            let ie = e.index();
            let sign = vorticity_sign(e);
            for p in fs.points(e.kinds()) {
                let (dva_db, dvb_da) = cross_derivatives(fs, &self.lv, a, b, p);
                self.lvort[ie][p] = sign * (dvb_da - dva_db);
            }
            fs.da_edge(e).local_to_local(&mut self.lvort[ie]);
        }
        Ok(())
    }
}
