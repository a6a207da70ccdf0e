//! Residual assembler of the staggered-grid Stokes system.
//!
//! One nonlinear iteration runs the stages
//!
//! ```text
//! copy_solution -> eff_strain_rate -> get_residual -> copy_residual
//! ```
//!
//! in this order. Every stage refreshes the ghost points that the next one
//! reads, so the order is enforced: calling a stage before its predecessor
//! returns [`Error::PhaseOrder`].

use nalgebra::{Point3, Vector3};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::grid::{EdgeKind, StaggeredGrid, CENTER_KINDS};
use crate::parallel::Field3;
use crate::timestepping::TimeStepState;

use super::boundary::{apply_two_point, BoundaryConstraints, NO_VALUE};
use super::rheology::{MatLimits, Rheology};
use super::state::{PhaseRatioArena, PointSet, SolVarCell, SolVarEdge};

/// Numerical parameters of the residual evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct ResidualParams {
    /// Gravity acceleration vector.
    pub gravity: [f64; 3],
    /// Free surface stabilization parameter, 0 disables it.
    pub fssa: f64,
    /// Subtract the mean pressure of the top cell layer before evaluating rheology.
    pub shift_pressure: bool,
    /// Geometric tolerance.
    pub geom_tol: f64,
    /// Log a residual summary after every evaluation.
    pub report_residual: bool,
}

impl Default for ResidualParams {
    fn default() -> Self {
        Self {
            gravity: [0.0; 3],
            fssa: 0.0,
            shift_pressure: false,
            geom_tol: 1e-15,
            report_residual: false,
        }
    }
}

impl ResidualParams {
    pub fn gravity(&self) -> Vector3<f64> {
        Vector3::from(self.gravity)
    }
}

/// Last completed stage of the current iteration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub(crate) enum Stage {
    Initial,
    Solution,
    StrainRate,
    Residual,
}

/// Residual assembler.
pub struct ResidualAssembler<R: Rheology> {
    pub(crate) fs: StaggeredGrid,
    pub bc: BoundaryConstraints,
    pub rheology: R,
    pub limits: MatLimits,
    pub params: ResidualParams,
    pub ts: TimeStepState,
    /// Pressure shift of the last evaluation.
    pub p_shift: f64,
    pub phases: PhaseRatioArena,

    // owned (global) parts
    pub(crate) gv: [Vec<f64>; 3],
    pub(crate) gp: Vec<f64>,
    pub(crate) gf: [Vec<f64>; 3],
    pub(crate) gc: Vec<f64>,

    // ghosted local arrays
    pub(crate) lv: [Field3; 3],
    pub(crate) lp: Field3,
    pub(crate) lt: Field3,
    pub(crate) lf: [Field3; 3],
    /// Effective normal strain rates at centers.
    pub(crate) ldiag: [Field3; 3],
    /// Effective shear strain rates, indexed by edge kind.
    pub(crate) ledge: [Field3; 3],
    /// Rotation rates, indexed by edge kind.
    pub(crate) lvort: [Field3; 3],

    pub sv_cell: Vec<SolVarCell>,
    pub sv_edge: [Vec<SolVarEdge>; 3],

    pub(crate) stage: Stage,
}

impl<R: Rheology> std::fmt::Debug for ResidualAssembler<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResidualAssembler")
            .field("grid", &self.fs)
            .field("params", &self.params)
            .field("ts", &self.ts)
            .field("p_shift", &self.p_shift)
            .field("stage", &self.stage)
            .finish()
    }
}

impl<R: Rheology> ResidualAssembler<R> {
    /// Allocate all arrays for the local part of `fs`.
    ///
    /// Constraints start empty (all ghosts mirrored), every point is in phase 0
    /// and the temperature is zero.
    pub fn new(fs: StaggeredGrid, rheology: R, params: ResidualParams) -> Self {
        let faces = [0, 1, 2].map(|d| fs.da_face(d).clone());
        let edges = EdgeKind::ALL.map(|e| fs.da_edge(e).clone());

        let phases = PhaseRatioArena::for_grid(&fs, rheology.num_phases());
        let limits = MatLimits::default();

        let sv_cell = vec![SolVarCell::default(); fs.n_cells];
        let sv_edge = EdgeKind::ALL.map(|e| vec![SolVarEdge::default(); fs.n_edges(e)]);

        Self {
            bc: BoundaryConstraints::new(&fs),
            rheology,
            limits,
            params,
            ts: TimeStepState::default(),
            p_shift: 0.0,
            phases,
            gv: faces.clone().map(|da| da.create_global()),
            gp: fs.da_cen.create_global(),
            gf: faces.clone().map(|da| da.create_global()),
            gc: fs.da_cen.create_global(),
            lv: faces.clone().map(|da| da.create_local()),
            lp: fs.da_cen.create_local(),
            lt: fs.da_cen.create_local(),
            lf: faces.map(|da| da.create_local()),
            ldiag: [(); 3].map(|_| fs.da_cen.create_local()),
            ledge: edges.clone().map(|da| da.create_local()),
            lvort: edges.map(|da| da.create_local()),
            sv_cell,
            sv_edge,
            stage: Stage::Initial,
            fs,
        }
    }

    pub fn with_constraints(mut self, bc: BoundaryConstraints) -> Self {
        self.bc = bc;
        self
    }

    pub fn with_limits(mut self, limits: MatLimits) -> Self {
        self.limits = limits;
        self
    }

    /// Set the time step state and refresh the inverse elastic viscosities.
    pub fn with_time_step(mut self, ts: TimeStepState) -> Self {
        self.ts = ts;
        self.get_i2gdt();
        self
    }

    pub fn grid(&self) -> &StaggeredGrid {
        &self.fs
    }

    /// Mutable grid access (stretching). Invalidates the current iteration.
    pub fn grid_mut(&mut self) -> &mut StaggeredGrid {
        self.stage = Stage::Initial;
        &mut self.fs
    }

    /// Release the grid.
    pub fn into_grid(self) -> StaggeredGrid {
        self.fs
    }

    /// Set the temperature of the owned cells; boundary ghosts mirror the interior.
    pub fn set_temperature(&mut self, t: &[f64]) -> Result<()> {
        check_len("temperature", self.fs.da_cen.owned_len(), t.len())?;
        self.fs.da_cen.global_to_local(t, &mut self.lt);
        let mirror = {
            let (lo, dims) = self.fs.da_cen.ghost_corners();
            Field3::filled(lo, dims, NO_VALUE)
        };
        apply_two_point(&self.fs.da_cen, &mirror, &mut self.lt, &[0, 1, 2]);
        Ok(())
    }

    /// Uniform temperature including all ghost points.
    pub fn set_uniform_temperature(&mut self, t: f64) {
        self.lt.fill(t);
    }

    /// Pressure and temperature history of the owned cells.
    pub fn set_history(&mut self, pn: &[f64], tn: &[f64]) -> Result<()> {
        check_len("pressure history", self.sv_cell.len(), pn.len())?;
        check_len("temperature history", self.sv_cell.len(), tn.len())?;
        for (sv, (&p, &t)) in self.sv_cell.iter_mut().zip(pn.iter().zip(tn)) {
            sv.bulk.pn = p;
            sv.bulk.tn = t;
        }
        Ok(())
    }

    /// Put every cell and edge entirely into the phase `phase_of` returns at its coordinate.
    pub fn set_phase_ratios<F>(&mut self, phase_of: F) -> Result<()>
    where
        F: Fn(&Point3<f64>) -> usize,
    {
        let np = self.phases.num_phases();
        let sets = std::iter::once((PointSet::Center, CENTER_KINDS))
            .chain(EdgeKind::ALL.map(|e| (PointSet::Edge(e), e.kinds())));
        for (set, kinds) in sets {
            for (n, p) in self.fs.points(kinds).enumerate() {
                let phase = phase_of(&self.fs.coord(kinds, p));
                if phase >= np {
                    return Err(Error::Config(format!(
                        "phase {} out of range (number of phases: {})",
                        phase, np
                    )));
                }
                let r = self.phases.ratios_mut(set, n);
                r.fill(0.0);
                r[phase] = 1.0;
            }
        }
        self.get_i2gdt();
        Ok(())
    }

    /// Fill the inverse elastic viscosity of every cell and edge.
    ///
    /// Called by [`with_time_step`](Self::with_time_step), `set_phase_ratios` and
    /// `courant_step`. Writing `ts.dt` directly requires calling it again.
    pub fn get_i2gdt(&mut self) {
        let dt = self.ts.dt;
        for (n, sv) in self.sv_cell.iter_mut().enumerate() {
            let phi = self.phases.ratios(PointSet::Center, n);
            sv.dev.i2gdt = self.rheology.inverse_elastic_viscosity(phi, dt);
        }
        for e in EdgeKind::ALL {
            for (n, sv) in self.sv_edge[e.index()].iter_mut().enumerate() {
                let phi = self.phases.ratios(PointSet::Edge(e), n);
                sv.dev.i2gdt = self.rheology.inverse_elastic_viscosity(phi, dt);
            }
        }
    }

    /// Run one full residual evaluation.
    ///
    /// Single-point constraints are written into `x`; `f` receives the coupled residual.
    /// The elastic history correction uses the `I2Gdt` of the last [`get_i2gdt`](Self::get_i2gdt).
    pub fn evaluate(&mut self, x: &mut [f64], f: &mut [f64]) -> Result<()> {
        self.copy_solution(x)?;
        self.press_shift()?;
        self.eff_strain_rate()?;
        self.get_residual()?;
        self.copy_residual(f)
    }

    pub(crate) fn require(&self, stage: Stage, what: &'static str) -> Result<()> {
        if self.stage < stage {
            return Err(Error::PhaseOrder(what));
        }
        Ok(())
    }

    /// Ghosted velocity component.
    pub fn velocity(&self, axis: usize) -> &Field3 {
        &self.lv[axis]
    }

    /// Ghosted pressure.
    pub fn pressure(&self) -> &Field3 {
        &self.lp
    }

    pub fn temperature(&self) -> &Field3 {
        &self.lt
    }

    /// Effective normal strain rate at centers.
    pub fn strain_rate_center(&self, axis: usize) -> &Field3 {
        &self.ldiag[axis]
    }

    /// Effective shear strain rate at an edge set.
    pub fn strain_rate_edge(&self, edge: EdgeKind) -> &Field3 {
        &self.ledge[edge.index()]
    }

    /// Rotation rate at an edge set (z on XY, y on XZ, x on YZ).
    pub fn vorticity(&self, edge: EdgeKind) -> &Field3 {
        &self.lvort[edge.index()]
    }

    /// Owned momentum residual of one velocity component.
    pub fn momentum_residual(&self, axis: usize) -> &[f64] {
        &self.gf[axis]
    }

    /// Owned continuity residual.
    pub fn continuity_residual(&self) -> &[f64] {
        &self.gc
    }

    /// Owned velocity component of the last copied solution.
    pub fn velocity_global(&self, axis: usize) -> &[f64] {
        &self.gv[axis]
    }

    /// Owned cell centers in state order.
    pub(crate) fn centers(&self) -> impl Iterator<Item = [isize; 3]> {
        self.fs.points(CENTER_KINDS)
    }
}

/// Point `p` moved by `off` along axis `d`.
#[inline]
pub(crate) fn step(p: [isize; 3], d: usize, off: isize) -> [isize; 3] {
    let mut q = p;
    q[d] += off;
    q
}

pub(crate) fn check_len(what: &'static str, expected: usize, found: usize) -> Result<()> {
    if expected != found {
        return Err(Error::Size {
            what,
            expected,
            found,
        });
    }
    Ok(())
}
