//! Momentum and continuity residuals.
//!
//! Cell centers contribute the normal stresses, gravity and the free surface
//! stabilization term to the two faces bounding the cell along every axis.
//! Every edge contributes its shear stress to the four faces sharing it.
//!
//! Only one shear component is stored per edge and only normal components
//! per center, so the second invariant at a point blends the neighboring
//! samples of the missing components:
//!
//! ```text
//! center:  J2 = 1/2 (xx² + yy² + zz²) + 1/4 Σ (4 samples of xy, xz, yz)
//! edge ab: J2 = ab² + 1/8 Σ (4 samples of xx, yy, zz) + 1/4 Σ (4 samples of ac, bc)
//! ```
//!
//! Center samples of an edge are clamped at the domain boundary
//! (one-sided stencil).

use crate::error::Result;
use crate::grid::{EdgeKind, StaggeredGrid, CENTER_KINDS};
use crate::parallel::Field3;

use super::assembler::{step, ResidualAssembler, Stage};
use super::rheology::Rheology;
use super::state::PointSet;

fn sum_sq<I>(a: &Field3, points: I) -> f64
where
    I: IntoIterator<Item = [isize; 3]>,
{
    points.into_iter().map(|q| a[q] * a[q]).sum()
}

/// Four points obtained by setting axes `a` and `b` of `p` to the given indices.
fn quad(p: [isize; 3], a: usize, ia: [isize; 2], b: usize, ib: [isize; 2]) -> [[isize; 3]; 4] {
    let set = |i: isize, j: isize| {
        let mut q = p;
        q[a] = i;
        q[b] = j;
        q
    };
    [
        set(ia[0], ib[0]),
        set(ia[1], ib[0]),
        set(ia[0], ib[1]),
        set(ia[1], ib[1]),
    ]
}

/// Cell indices on both sides of node `i`, clamped to `[0, tnods-2]`.
fn clamped_cells(fs: &StaggeredGrid, d: usize, i: isize) -> [isize; 2] {
    let mx = fs.ds[d].tnods as isize - 1;
    let i1 = if i == mx { i - 1 } else { i };
    let i2 = if i - 1 == -1 { i } else { i - 1 };
    [i1, i2]
}

/// Second invariant of the effective strain rate at cell center `p`.
pub(crate) fn center_invariant(ldiag: &[Field3; 3], ledge: &[Field3; 3], p: [isize; 3]) -> f64 {
    let mut j2 = 0.5 * ldiag.iter().map(|a| a[p] * a[p]).sum::<f64>();
    for e in EdgeKind::ALL {
        let (a, b) = e.axes();
        let pts = quad(p, a, [p[a], p[a] + 1], b, [p[b], p[b] + 1]);
        j2 += 0.25 * sum_sq(&ledge[e.index()], pts);
    }
    j2
}

/// Second invariant of the effective strain rate at point `p` of edge set `edge`.
pub(crate) fn edge_invariant(
    fs: &StaggeredGrid,
    ldiag: &[Field3; 3],
    ledge: &[Field3; 3],
    edge: EdgeKind,
    p: [isize; 3],
) -> f64 {
    let (a, b) = edge.axes();
    let c = edge.normal();
    let ca = clamped_cells(fs, a, p[a]);
    let cb = clamped_cells(fs, b, p[b]);
    let own = ledge[edge.index()][p];

    let mut j2 = own * own;

    let centers = quad(p, a, ca, b, cb);
    for diag in ldiag {
        j2 += 0.125 * sum_sq(diag, centers);
    }

    // shear components sharing axis a: own a index, clamped b
    let ac = EdgeKind::from_axes(a, c);
    j2 += 0.25 * sum_sq(&ledge[ac.index()], quad(p, b, cb, c, [p[c], p[c] + 1]));

    // shear components sharing axis b: clamped a, own b index
    let bc = EdgeKind::from_axes(b, c);
    j2 += 0.25 * sum_sq(&ledge[bc.index()], quad(p, a, ca, c, [p[c], p[c] + 1]));

    j2
}

impl<R: Rheology> ResidualAssembler<R> {
    /// Assemble the momentum and continuity residuals.
    ///
    /// Constitutive failures are returned unchanged; the residual is then incomplete.
    pub fn get_residual(&mut self) -> Result<()> {
        self.require(Stage::StrainRate, "residual requested before the strain rate")?;

        let dt = self.ts.dt;
        let grav = self.params.gravity;
        let fssa = self.params.fssa;
        let p_shift = self.p_shift;

        for lf in self.lf.iter_mut() {
            lf.fill(0.0);
        }

        let fs = &self.fs;
        let lv = &self.lv;
        let lp = &self.lp;
        let lt = &self.lt;

        //-------------
        // cell centers
        //-------------
        for (n, p) in fs.points(CENTER_KINDS).enumerate() {
            let sv = &mut self.sv_cell[n];

            sv.dev.dii = center_invariant(&self.ldiag, &self.ledge, p).sqrt();

            let pc = lp[p];
            let tc = lt[p];
            let phi = self.phases.ratios(PointSet::Center, n);

            sv.eta_creep = self
                .rheology
                .deviatoric(&mut sv.dev, phi, &self.limits, dt, pc - p_shift, tc)?;

            let d = [0, 1, 2].map(|a| self.ldiag[a][p]);
            self.rheology.stress_cell(sv, &self.limits, d[0], d[1], d[2])?;

            // total Cauchy stress
            let s = [sv.sxx - pc, sv.syy - pc, sv.szz - pc];

            self.rheology
                .volumetric(&mut sv.bulk, phi, &self.limits, dt, pc, tc)?;

            let rho = sv.bulk.rho;
            for a in 0..3 {
                let g = rho * grav[a];
                // free surface stabilization (lumped)
                let t = fssa * dt * g;

                let pf = step(p, a, 1);
                let bd = fs.ds[a].size_node(p[a]);
                let fd = fs.ds[a].size_node(p[a] + 1);

                self.lf[a][p] -= (s[a] + lv[a][p] * t) / bd + g / 2.0;
                self.lf[a][pf] += (s[a] + lv[a][pf] * t) / fd - g / 2.0;
            }

            let b = &sv.bulk;
            self.gc[n] = -b.ikdt * (pc - b.pn) - b.theta + b.alpha * (tc - b.tn) / dt;
        }

        //------
        // edges
        //------
        for e in EdgeKind::ALL {
            let (a, b) = e.axes();
            let ie = e.index();

            for (n, p) in fs.points(e.kinds()).enumerate() {
                let sv = &mut self.sv_edge[ie][n];

                sv.dev.dii = edge_invariant(fs, &self.ldiag, &self.ledge, e, p).sqrt();

                let cells = quad(p, a, [p[a], p[a] - 1], b, [p[b], p[b] - 1]);
                let pc = 0.25 * cells.iter().map(|&q| lp[q]).sum::<f64>();
                let tc = 0.25 * cells.iter().map(|&q| lt[q]).sum::<f64>();
                let phi = self.phases.ratios(PointSet::Edge(e), n);

                sv.eta_creep = self
                    .rheology
                    .deviatoric(&mut sv.dev, phi, &self.limits, dt, pc - p_shift, tc)?;

                self.rheology
                    .stress_edge(sv, &self.limits, self.ledge[ie][p])?;

                let s = sv.s;
                let bda = fs.ds[a].size_cell(p[a] - 1);
                let fda = fs.ds[a].size_cell(p[a]);
                let bdb = fs.ds[b].size_cell(p[b] - 1);
                let fdb = fs.ds[b].size_cell(p[b]);

                self.lf[a][step(p, b, -1)] -= s / bdb;
                self.lf[a][p] += s / fdb;
                self.lf[b][step(p, a, -1)] -= s / bda;
                self.lf[b][p] += s / fda;
            }
        }

        for d in 0..3 {
            fs.da_face(d).local_to_global_add(&self.lf[d], &mut self.gf[d]);
        }

        self.stage = Stage::Residual;

        if self.params.report_residual {
            self.view_residual();
        }
        Ok(())
    }
}
