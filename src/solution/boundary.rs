//! Boundary constraints consumed by the residual assembler.
//!
//! Two kinds of constraints are supported:
//! - Single-point constraints (SPC): a prescribed value for a global DOF.
//!   The solution entry is overwritten and the residual entry is zeroed.
//! - Two-point constraints (TPC): boundary ghost values tied to the adjacent
//!   interior value. A target of [`NO_VALUE`] mirrors the interior value
//!   (zero normal gradient); any other target `b` prescribes `b` at the
//!   boundary midpoint, so the ghost becomes `2b - interior`.
//!
//! Ghosts that need two or three constraints (edges and corners of the box)
//! are extrapolated from the already constrained face ghosts.

use nalgebra::Point3;

use crate::error::{Error, Result};
use crate::grid::{face_kinds, IndexMode, StaggeredGrid, CENTER_KINDS};
use crate::parallel::{box_points, DistArray, Field3, PointKind};

/// Two-point constraint target meaning "mirror the interior value".
pub const NO_VALUE: f64 = f64::MAX;

#[derive(Debug, Clone)]
pub struct BoundaryConstraints {
    /// Velocity SPC list: (global DOF id, value).
    pub vel_spc: Vec<(usize, f64)>,
    /// Pressure SPC list: (global DOF id, value).
    pub p_spc: Vec<(usize, f64)>,
    /// TPC targets of the velocity components (face arrays).
    pub bcv: [Field3; 3],
    /// TPC targets of the pressure (center array).
    pub bcp: Field3,
}

impl BoundaryConstraints {
    /// No SPC, every boundary ghost mirrors its interior value.
    pub fn new(fs: &StaggeredGrid) -> Self {
        let unset = |da: &DistArray| {
            let (lo, dims) = da.ghost_corners();
            Field3::filled(lo, dims, NO_VALUE)
        };
        Self {
            vel_spc: Vec::new(),
            p_spc: Vec::new(),
            bcv: [0, 1, 2].map(|d| unset(fs.da_face(d))),
            bcp: unset(&fs.da_cen),
        }
    }

    /// Zero normal velocity on every box face, tangential velocity mirrored.
    pub fn free_slip_box(fs: &StaggeredGrid) -> Result<Self> {
        let mut bc = Self::new(fs);
        bc.set_normal_velocity(fs, |_, _| 0.0)?;
        Ok(bc)
    }

    /// Zero velocity on every box face.
    pub fn no_slip_box(fs: &StaggeredGrid) -> Result<Self> {
        Self::dirichlet_box(fs, |_, _| 0.0)
    }

    /// Prescribe every velocity component on every box face from `velocity(axis, x)`.
    pub fn dirichlet_box<F>(fs: &StaggeredGrid, velocity: F) -> Result<Self>
    where
        F: Fn(usize, &Point3<f64>) -> f64,
    {
        let mut bc = Self::new(fs);
        bc.set_normal_velocity(fs, &velocity)?;
        bc.set_tangential_velocity(fs, &velocity);
        Ok(bc)
    }

    /// Add SPCs for the normal velocity of all owned boundary faces.
    ///
    /// Requires the coupled DOF numbering.
    pub fn set_normal_velocity<F>(&mut self, fs: &StaggeredGrid, velocity: F) -> Result<()>
    where
        F: Fn(usize, &Point3<f64>) -> f64,
    {
        if fs.dof.mode != IndexMode::Coupled {
            return Err(Error::Constraint(
                "single-point constraints require the coupled DOF index".into(),
            ));
        }
        for d in 0..3 {
            let last = fs.ds[d].tnods as isize - 1;
            for p in fs.da_face(d).owned_points() {
                if p[d] != 0 && p[d] != last {
                    continue;
                }
                let id = fs.dof.velocity_dof(d, p).ok_or_else(|| {
                    Error::Constraint(format!("no DOF for velocity {} at {:?}", d, p))
                })?;
                let x = fs.coord(face_kinds(d), p);
                self.vel_spc.push((id, velocity(d, &x)));
            }
        }
        Ok(())
    }

    /// Set TPC targets of the tangential velocities on the local boundary ghosts.
    ///
    /// The target is evaluated at the boundary, halfway between ghost and interior.
    pub fn set_tangential_velocity<F>(&mut self, fs: &StaggeredGrid, velocity: F)
    where
        F: Fn(usize, &Point3<f64>) -> f64,
    {
        for d in 0..3 {
            let kinds = face_kinds(d);
            let da = fs.da_face(d);
            let (lo, dims) = da.ghost_corners();
            let ranges = [0, 1, 2].map(|e| lo[e]..lo[e] + dims[e] as isize);
            for q in box_points(ranges) {
                let outside: Vec<usize> = (0..3).filter(|&e| !in_axis(da, e, q[e])).collect();
                if outside.len() != 1 || outside[0] == d {
                    continue;
                }
                let e = outside[0];
                let mut x = fs.coord(kinds, q);
                x[e] = boundary_coord(fs, e, q[e]);
                self.bcv[d][q] = velocity(d, &x);
            }
        }
    }

    /// Add a pressure SPC.
    pub fn fix_pressure(&mut self, id: usize, value: f64) {
        self.p_spc.push((id, value));
    }

    /// Overwrite constrained entries of a local coupled vector starting at global id `st`.
    pub fn apply_spc(&self, x: &mut [f64], st: usize) -> Result<()> {
        for &(id, value) in self.vel_spc.iter().chain(&self.p_spc) {
            let slot = local_slot(id, st, x.len())?;
            x[slot] = value;
        }
        Ok(())
    }

    /// Zero constrained entries of a local coupled residual starting at global id `st`.
    pub fn zero_spc(&self, f: &mut [f64], st: usize) -> Result<()> {
        for &(id, _) in self.vel_spc.iter().chain(&self.p_spc) {
            let slot = local_slot(id, st, f.len())?;
            f[slot] = 0.0;
        }
        Ok(())
    }

    /// Enforce two-point constraints on a ghosted velocity component.
    pub fn apply_velocity_tpc(&self, fs: &StaggeredGrid, axis: usize, v: &mut Field3) {
        let kinds = face_kinds(axis);
        apply_two_point(fs.da_face(axis), &self.bcv[axis], v, cell_axes(kinds).as_slice());
    }

    /// Enforce two-point constraints on the ghosted pressure.
    pub fn apply_pressure_tpc(&self, fs: &StaggeredGrid, p: &mut Field3) {
        apply_two_point(&fs.da_cen, &self.bcp, p, cell_axes(CENTER_KINDS).as_slice());
    }
}

fn cell_axes(kinds: [PointKind; 3]) -> Vec<usize> {
    (0..3).filter(|&d| kinds[d] == PointKind::Cell).collect()
}

fn in_axis(da: &DistArray, d: usize, i: isize) -> bool {
    i >= 0 && (i as usize) < da.axis(d).total
}

/// Coordinate of the boundary node next to an out-of-range cell index.
fn boundary_coord(fs: &StaggeredGrid, d: usize, i: isize) -> f64 {
    let ds = &fs.ds[d];
    if i < 0 {
        ds.ncoor(0)
    } else {
        ds.ncoor(ds.ncels as isize)
    }
}

fn local_slot(id: usize, st: usize, len: usize) -> Result<usize> {
    id.checked_sub(st)
        .filter(|&slot| slot < len)
        .ok_or_else(|| {
            Error::Constraint(format!(
                "constrained DOF {} outside local range {}..{}",
                id,
                st,
                st + len
            ))
        })
}

fn set_tpc(bc: &Field3, a: &mut Field3, q: [isize; 3], interior: f64) {
    let b = bc[q];
    a[q] = if b == NO_VALUE { interior } else { 2.0 * b - interior };
}

/// Constrain the boundary ghosts of `a` along `axes` (cell axes of the array).
///
/// Face ghosts first, then edge ghosts in the order (x,y), (x,z), (y,z),
/// then the corner ghost.
pub(crate) fn apply_two_point(da: &DistArray, bc: &Field3, a: &mut Field3, axes: &[usize]) {
    let last = [0, 1, 2].map(|d| da.axis(d).total as isize - 1);

    for p in da.domain_points() {
        let interior = a[p];
        let mut ghost = p;
        let mut hit = [false; 3];

        for &d in axes {
            if p[d] == 0 {
                hit[d] = true;
                ghost[d] = p[d] - 1;
                set_tpc(bc, a, shifted(p, &[(d, ghost[d])]), interior);
            }
            if p[d] == last[d] {
                hit[d] = true;
                ghost[d] = p[d] + 1;
                set_tpc(bc, a, shifted(p, &[(d, ghost[d])]), interior);
            }
        }

        // bilinear extrapolation for two constraints
        for (d1, d2) in [(0, 1), (0, 2), (1, 2)] {
            if hit[d1] && hit[d2] {
                let target = shifted(p, &[(d1, ghost[d1]), (d2, ghost[d2])]);
                a[target] = a[shifted(p, &[(d1, ghost[d1])])] + a[shifted(p, &[(d2, ghost[d2])])]
                    - interior;
            }
        }

        // trilinear extrapolation for three constraints
        if hit.iter().all(|&h| h) {
            let g = |ds: &[usize]| {
                let moves: Vec<(usize, isize)> = ds.iter().map(|&d| (d, ghost[d])).collect();
                shifted(p, &moves)
            };
            a[ghost] = a[g(&[0, 1])] + a[g(&[0, 2])] + a[g(&[1, 2])]
                - a[g(&[0])]
                - a[g(&[1])]
                - a[g(&[2])]
                + interior;
        }
    }
}

fn shifted(p: [isize; 3], moves: &[(usize, isize)]) -> [isize; 3] {
    let mut q = p;
    for &(d, i) in moves {
        q[d] = i;
    }
    q
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parallel::{Communicator, SerialComm};
    use approx::assert_relative_eq;
    use std::sync::Arc;

    fn grid(cells: [usize; 3]) -> StaggeredGrid {
        let comm: Arc<dyn Communicator> = Arc::new(SerialComm);
        let mut fs = StaggeredGrid::new(comm, cells, [0, 0, 0]).unwrap();
        fs.gen_coord([0.0; 3], [1.0; 3], &Default::default());
        fs.compute_dof_index(IndexMode::Coupled);
        fs
    }

    #[test]
    fn test_free_slip_counts() {
        let fs = grid([2, 3, 4]);
        let bc = BoundaryConstraints::free_slip_box(&fs).unwrap();
        // two boundary planes per component
        assert_eq!(bc.vel_spc.len(), 2 * (3 * 4) + 2 * (2 * 4) + 2 * (2 * 3));
        assert!(bc.vel_spc.iter().all(|&(_, v)| v == 0.0));
    }

    #[test]
    fn test_spc_requires_coupled_index() {
        let comm: Arc<dyn Communicator> = Arc::new(SerialComm);
        let fs = StaggeredGrid::new(comm, [2, 2, 2], [0, 0, 0]).unwrap();
        assert!(matches!(
            BoundaryConstraints::free_slip_box(&fs),
            Err(Error::Constraint(_))
        ));
    }

    #[test]
    fn test_spc_out_of_range() {
        let fs = grid([2, 2, 2]);
        let mut bc = BoundaryConstraints::new(&fs);
        bc.fix_pressure(100, 1.0);
        let mut x = vec![0.0; fs.dof.ln];
        assert!(bc.apply_spc(&mut x, fs.dof.st).is_err());
    }

    #[test]
    fn test_mirror_and_dirichlet_ghosts() {
        let fs = grid([2, 2, 2]);
        let mut bc = BoundaryConstraints::new(&fs);
        bc.bcp[[-1, 0, 0]] = 3.0;

        let mut p = fs.da_cen.create_local();
        for q in fs.da_cen.owned_points() {
            p[q] = 1.0 + q[0] as f64;
        }
        bc.apply_pressure_tpc(&fs, &mut p);

        // prescribed value on the left boundary
        assert_relative_eq!(p[[-1, 0, 0]], 5.0);
        assert_relative_eq!(p[[-1, 1, 0]], 1.0);
        // mirrored on the right
        assert_relative_eq!(p[[2, 0, 0]], 2.0);
        assert_relative_eq!(p[[0, -1, 0]], 1.0);
    }

    #[test]
    fn test_linear_field_extrapolation() {
        // a linear field with matching boundary values is reproduced exactly in all ghosts
        let fs = grid([3, 3, 3]);
        let f = |x: &Point3<f64>| 1.0 + 2.0 * x.x - x.y + 0.5 * x.z;
        let bc = BoundaryConstraints::dirichlet_box(&fs, |_, x| f(x)).unwrap();

        for axis in 0..3 {
            let kinds = face_kinds(axis);
            let da = fs.da_face(axis);
            let mut v = da.create_local();
            for q in da.owned_points() {
                v[q] = f(&fs.coord(kinds, q));
            }
            bc.apply_velocity_tpc(&fs, axis, &mut v);

            let (lo, dims) = da.ghost_corners();
            let ranges = [0, 1, 2].map(|e| lo[e]..lo[e] + dims[e] as isize);
            for q in box_points(ranges) {
                if q[axis] < 0 || q[axis] > fs.ds[axis].tcels as isize {
                    continue;
                }
                assert_relative_eq!(v[q], f(&fs.coord(kinds, q)), epsilon = 1e-12);
            }
        }
    }
}
