//! Per-point solution variables of the staggered grid.
//!
//! Cell centers carry the normal components of the deviatoric state together
//! with the volumetric state. Every edge carries one shear component.
//! Phase ratios of all points share one contiguous buffer.

use crate::grid::{EdgeKind, StaggeredGrid};

/// Deviatoric state variables.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SolVarDev {
    /// Square root of the second invariant of the effective strain rate.
    pub dii: f64,
    /// Effective (visco-elasto-plastic) viscosity.
    pub eta: f64,
    /// Inverse elastic viscosity, `1/(2*G*dt)`.
    pub i2gdt: f64,
    /// Shear heating term.
    pub hr: f64,
    /// Plastic strain rate.
    pub dii_pl: f64,
    /// Yield stress of the last evaluation.
    pub yield_stress: f64,
}

/// Volumetric state variables.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SolVarBulk {
    /// Volumetric strain rate.
    pub theta: f64,
    /// Effective density.
    pub rho: f64,
    /// Inverse bulk viscosity, `1/(K*dt)`.
    pub ikdt: f64,
    /// Effective thermal expansion.
    pub alpha: f64,
    /// Pressure history.
    pub pn: f64,
    /// Temperature history.
    pub tn: f64,
}

/// Cell center state.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SolVarCell {
    pub dev: SolVarDev,
    pub bulk: SolVarBulk,
    /// Deviatoric strain rate (without elastic correction).
    pub dxx: f64,
    pub dyy: f64,
    pub dzz: f64,
    /// Deviatoric stress.
    pub sxx: f64,
    pub syy: f64,
    pub szz: f64,
    /// Stress history.
    pub hxx: f64,
    pub hyy: f64,
    pub hzz: f64,
    /// Creep viscosity.
    pub eta_creep: f64,
}

/// Edge state (one shear component).
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SolVarEdge {
    pub dev: SolVarDev,
    /// Shear strain rate (without elastic correction).
    pub d: f64,
    /// Shear stress.
    pub s: f64,
    /// Stress history.
    pub h: f64,
    pub eta_creep: f64,
}

/// Point set a phase ratio slice belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PointSet {
    Center,
    Edge(EdgeKind),
}

impl PointSet {
    fn section(self) -> usize {
        match self {
            PointSet::Center => 0,
            PointSet::Edge(e) => 1 + e.index(),
        }
    }
}

/// Phase ratios of all cells and edges in one buffer.
///
/// Points are numbered in owned order (`i` fastest) within every set.
#[derive(Debug, Clone, PartialEq)]
pub struct PhaseRatioArena {
    num_phases: usize,
    /// First point of every section, `offsets[4]` is the total.
    offsets: [usize; 5],
    buf: Vec<f64>,
}

impl PhaseRatioArena {
    /// Allocate ratios for `counts` points (cells, XY, XZ, YZ edges), all in phase 0.
    pub fn new(num_phases: usize, counts: [usize; 4]) -> Self {
        let num_phases = num_phases.max(1);
        let mut offsets = [0; 5];
        for s in 0..4 {
            offsets[s + 1] = offsets[s] + counts[s];
        }
        let mut arena = Self {
            num_phases,
            offsets,
            buf: vec![0.0; num_phases * offsets[4]],
        };
        arena.set_uniform(0);
        arena
    }

    /// Arena sized for the local points of a grid.
    pub fn for_grid(fs: &StaggeredGrid, num_phases: usize) -> Self {
        Self::new(
            num_phases,
            [fs.n_cells, fs.n_xy_edges, fs.n_xz_edges, fs.n_yz_edges],
        )
    }

    pub fn num_phases(&self) -> usize {
        self.num_phases
    }

    /// Number of points in a set.
    pub fn len(&self, set: PointSet) -> usize {
        let s = set.section();
        self.offsets[s + 1] - self.offsets[s]
    }

    pub fn is_empty(&self) -> bool {
        self.offsets[4] == 0
    }

    pub fn ratios(&self, set: PointSet, idx: usize) -> &[f64] {
        let start = self.start(set, idx);
        &self.buf[start..start + self.num_phases]
    }

    pub fn ratios_mut(&mut self, set: PointSet, idx: usize) -> &mut [f64] {
        let start = self.start(set, idx);
        &mut self.buf[start..start + self.num_phases]
    }

    fn start(&self, set: PointSet, idx: usize) -> usize {
        debug_assert!(idx < self.len(set));
        (self.offsets[set.section()] + idx) * self.num_phases
    }

    /// Put every point entirely in `phase`.
    pub fn set_uniform(&mut self, phase: usize) {
        for r in self.buf.chunks_exact_mut(self.num_phases) {
            r.fill(0.0);
            r[phase] = 1.0;
        }
    }

    /// Scale every point's ratios to sum to one. Points without any phase are left as is.
    pub fn normalize(&mut self) {
        for r in self.buf.chunks_exact_mut(self.num_phases) {
            let sum: f64 = r.iter().sum();
            if sum > 0.0 {
                r.iter_mut().for_each(|v| *v /= sum);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_arena_sections() {
        let arena = PhaseRatioArena::new(3, [4, 2, 5, 1]);
        assert_eq!(arena.len(PointSet::Center), 4);
        assert_eq!(arena.len(PointSet::Edge(EdgeKind::XZ)), 5);
        assert_eq!(arena.ratios(PointSet::Edge(EdgeKind::YZ), 0), &[1.0, 0.0, 0.0]);
    }

    #[test]
    fn test_arena_slices_are_disjoint() {
        let mut arena = PhaseRatioArena::new(2, [2, 2, 2, 2]);
        arena.ratios_mut(PointSet::Edge(EdgeKind::XY), 1).copy_from_slice(&[0.0, 1.0]);
        assert_eq!(arena.ratios(PointSet::Edge(EdgeKind::XY), 0), &[1.0, 0.0]);
        assert_eq!(arena.ratios(PointSet::Edge(EdgeKind::XZ), 0), &[1.0, 0.0]);
        assert_eq!(arena.ratios(PointSet::Edge(EdgeKind::XY), 1), &[0.0, 1.0]);
    }

    #[test]
    fn test_normalize() {
        let mut arena = PhaseRatioArena::new(2, [1, 0, 0, 0]);
        arena.ratios_mut(PointSet::Center, 0).copy_from_slice(&[3.0, 1.0]);
        arena.normalize();
        let r = arena.ratios(PointSet::Center, 0);
        assert_relative_eq!(r[0], 0.75);
        assert_relative_eq!(r[1], 0.25);
    }
}
