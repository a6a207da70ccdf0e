//! Time step state and the Courant time step.

use serde::{Deserialize, Serialize};

use crate::grid::StaggeredGrid;
use crate::parallel::ReduceOp;
use crate::solution::{ResidualAssembler, Rheology};

/// Maximum growth of the time step between two steps.
pub const DT_GROWTH: f64 = 1.1;

/// Time stepping state.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeStepState {
    /// Current time step.
    pub dt: f64,
    /// Previous time step.
    pub pdt: f64,
    /// Upper bound of the time step.
    pub dtmax: f64,
    /// Courant number.
    pub cmax: f64,
    /// Current time.
    pub time: f64,
    /// Step counter.
    pub istep: usize,
}

impl Default for TimeStepState {
    fn default() -> Self {
        Self {
            dt: 1.0,
            pdt: 1.0,
            dtmax: f64::MAX,
            cmax: 0.5,
            time: 0.0,
            istep: 0,
        }
    }
}

impl TimeStepState {
    pub fn new(dt: f64, dtmax: f64, cmax: f64) -> Self {
        Self {
            dt,
            pdt: dt,
            dtmax,
            cmax,
            ..Default::default()
        }
    }

    /// Apply the Courant bound for a globally reduced inverse time step.
    ///
    /// Returns the new time step; the previous one moves to `pdt`.
    pub fn update(&mut self, gidtmax: f64) -> f64 {
        let idt = gidtmax / self.cmax;

        let mut dt = self.dt * DT_GROWTH;
        if idt > 0.0 && dt > 1.0 / idt {
            dt = 1.0 / idt;
        }
        if dt > self.dtmax {
            dt = self.dtmax;
        }

        self.pdt = self.dt;
        self.dt = dt;
        dt
    }

    /// Compute the next time step from the owned face velocities. Collective.
    pub fn courant_step(&mut self, fs: &StaggeredGrid, v: [&[f64]; 3]) -> f64 {
        let lidtmax = (0..3)
            .map(|d| max_inverse_step(fs, d, v[d]))
            .fold(0.0, f64::max);
        let gidtmax = fs.comm().all_reduce(lidtmax, ReduceOp::Max);
        let dt = self.update(gidtmax);
        log::debug!("Courant time step: dt = {:e}, previous = {:e}", dt, self.pdt);
        dt
    }

    /// Advance the clock by the current time step.
    pub fn advance(&mut self) {
        self.time += self.dt;
        self.istep += 1;
    }
}

/// Largest local inverse time step `|v|/h` of velocity component `axis`.
///
/// `v` holds the owned values in owned point order. On a non-uniform axis
/// `h` is the width of the cell the point moves into, clamped to the domain.
pub fn max_inverse_step(fs: &StaggeredGrid, axis: usize, v: &[f64]) -> f64 {
    let ds = &fs.ds[axis];

    if ds.is_uniform() {
        let vmax = v.iter().fold(0.0_f64, |m, x| m.max(x.abs()));
        return vmax / ds.h_uni;
    }

    let last = ds.tcels as isize - 1;
    fs.da_face(axis)
        .owned_points()
        .zip(v)
        .map(|(p, &vel)| {
            let i = if vel >= 0.0 { p[axis] } else { p[axis] - 1 };
            vel.abs() / ds.size_cell(i.clamp(0, last))
        })
        .fold(0.0, f64::max)
}

impl<R: Rheology> ResidualAssembler<R> {
    /// Update `ts` from the velocity of the last copied solution and refresh
    /// `I2Gdt` for the new step. Collective.
    pub fn courant_step(&mut self) -> f64 {
        let v = [0, 1, 2].map(|d| self.velocity_global(d));
        let mut ts = self.ts;
        let dt = ts.courant_step(self.grid(), v);
        self.ts = ts;
        self.get_i2gdt();
        dt
    }
}
