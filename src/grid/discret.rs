//! Parallel decomposition of one axis.
//!
//! Every process stores the coordinates of its own nodes plus ghost layers:
//! one node to the left, and one (last process) or two (interior process)
//! to the right. Cell centers carry one ghost on each side.

use std::ops::Range;

use crate::error::{Error, Result};
use crate::parallel::{Communicator, ReduceOp};

use super::mesh_seg::MeshSeg1D;

/// Relative tolerance for detecting a uniform axis.
const UNIFORM_RTOL: f64 = 1e-8;

#[derive(Debug, Clone)]
pub struct Discret1D {
    /// Number of processes along the axis.
    pub nproc: usize,
    /// Position of this process along the axis.
    pub rank: usize,
    /// First node of every process, `starts[nproc]` is the index of the last node.
    pub starts: Vec<usize>,
    /// First node of this process.
    pub pstart: usize,
    pub tnods: usize,
    pub tcels: usize,
    /// Owned nodes.
    pub nnods: usize,
    /// Owned cells.
    pub ncels: usize,
    /// Uniform cell size, negative if the axis is not uniform.
    pub h_uni: f64,
    pub h_min: f64,
    pub h_max: f64,
    /// Column color: index of the process in the plane orthogonal to the axis.
    pub color: usize,
    /// Global rank of the previous process along the axis.
    pub grprev: Option<usize>,
    /// Global rank of the next process along the axis.
    pub grnext: Option<usize>,
    // node coordinates, index 0 holds local node -1
    nbuff: Vec<f64>,
    // cell center coordinates, index 0 holds local cell -1
    cbuff: Vec<f64>,
}

impl Discret1D {
    /// # Arguments
    /// * `nproc` - Number of processes along the axis
    /// * `rank` - Position of this process along the axis
    /// * `nnod_proc` - Number of nodes owned by every process
    /// * `color` - Column color
    /// * `grprev`, `grnext` - Global ranks of the neighbors, `None` at the boundary
    pub fn new(
        nproc: usize,
        rank: usize,
        nnod_proc: &[usize],
        color: usize,
        grprev: Option<usize>,
        grnext: Option<usize>,
    ) -> Self {
        let mut starts = Vec::with_capacity(nproc + 1);
        let mut cnt = 0;
        for &n in &nnod_proc[..nproc] {
            starts.push(cnt);
            cnt += n;
        }
        starts.push(cnt - 1);

        let nnods = nnod_proc[rank];
        let ncels = if grnext.is_some() { nnods } else { nnods - 1 };
        let bufsz = if grnext.is_some() { nnods + 3 } else { nnods + 2 };

        Self {
            nproc,
            rank,
            pstart: starts[rank],
            starts,
            tnods: cnt,
            tcels: cnt - 1,
            nnods,
            ncels,
            h_uni: 0.0,
            h_min: 0.0,
            h_max: 0.0,
            color,
            grprev,
            grnext,
            nbuff: vec![0.0; bufsz],
            cbuff: vec![0.0; ncels + 2],
        }
    }

    /// Node coordinate by local index (`-1` is the left ghost).
    #[inline]
    pub fn ncoor(&self, i: isize) -> f64 {
        self.nbuff[(i + 1) as usize]
    }

    /// Cell center coordinate by local index (`-1` is the left ghost).
    #[inline]
    pub fn ccoor(&self, i: isize) -> f64 {
        self.cbuff[(i + 1) as usize]
    }

    fn set_ncoor(&mut self, i: isize, x: f64) {
        self.nbuff[(i + 1) as usize] = x;
    }

    /// Coordinates of the owned nodes.
    pub fn owned_nodes(&self) -> &[f64] {
        &self.nbuff[1..1 + self.nnods]
    }

    /// Width of the cell with global index `i`.
    #[inline]
    pub fn size_cell(&self, i: isize) -> f64 {
        let l = i - self.pstart as isize;
        self.ncoor(l + 1) - self.ncoor(l)
    }

    /// Distance between the cell centers around the node with global index `i`.
    #[inline]
    pub fn size_node(&self, i: isize) -> f64 {
        let l = i - self.pstart as isize;
        self.ccoor(l) - self.ccoor(l - 1)
    }

    /// Global indices of the owned cells.
    pub fn cell_range(&self) -> Range<isize> {
        let s = self.pstart as isize;
        s..s + self.ncels as isize
    }

    /// Global indices of the owned nodes.
    pub fn node_range(&self) -> Range<isize> {
        let s = self.pstart as isize;
        s..s + self.nnods as isize
    }

    pub fn is_uniform(&self) -> bool {
        self.h_uni >= 0.0
    }

    /// First and last coordinate of the local subdomain.
    pub fn local_bounds(&self) -> (f64, f64) {
        (self.ncoor(0), self.ncoor(self.ncels as isize))
    }

    /// Generate local node and cell coordinates from the segment table.
    pub fn gen_coord(&mut self, ms: &MeshSeg1D, comm: &dyn Communicator) {
        let mut pstart = self.pstart as isize;
        let mut off = 1usize;
        let mut n = self.nnods;

        // include internal ghost points
        if self.grprev.is_some() {
            pstart -= 1;
            off -= 1;
            n += 1;
        }
        if self.grnext.is_some() {
            n += 2;
        }

        let istart = ms.istart();
        for iseg in 0..ms.nsegs() {
            if n == 0 {
                break;
            }
            // nodes of this segment still to be generated
            let nl = istart[iseg + 1] as isize - pstart + 1;
            if nl <= 0 {
                continue;
            }
            let nl = (nl as usize).min(n);
            let first = (pstart - istart[iseg] as isize) as usize;

            ms.gen_coord(iseg, first, &mut self.nbuff[off..off + nl]);

            pstart += nl as isize;
            off += nl;
            n -= nl;
        }

        // boundary ghosts by linear extrapolation
        if self.grprev.is_none() {
            let a = self.ncoor(0);
            let b = self.ncoor(1);
            self.set_ncoor(-1, a - (b - a));
        }
        if self.grnext.is_none() {
            let nn = self.nnods as isize;
            let a = self.ncoor(nn - 2);
            let b = self.ncoor(nn - 1);
            self.set_ncoor(nn, b + (b - a));
        }

        self.update_centers();
        self.min_max_cell_size(ms, comm);
    }

    fn update_centers(&mut self) {
        for i in -1..self.ncels as isize + 1 {
            self.cbuff[(i + 1) as usize] = 0.5 * (self.ncoor(i) + self.ncoor(i + 1));
        }
    }

    /// Compute the extreme cell sizes over the column and detect a uniform axis.
    pub fn min_max_cell_size(&mut self, ms: &MeshSeg1D, comm: &dyn Communicator) {
        let mut lmin = f64::MAX;
        let mut lmax = f64::MIN;
        for i in 0..self.ncels as isize {
            let sz = self.ncoor(i + 1) - self.ncoor(i);
            lmin = lmin.min(sz);
            lmax = lmax.max(sz);
        }

        let (gmin, gmax) = if self.nproc == 1 {
            (lmin, lmax)
        } else {
            (
                comm.all_reduce_colored(self.color, lmin, ReduceOp::Min),
                comm.all_reduce_colored(self.color, lmax, ReduceOp::Max),
            )
        };

        let h = ms.uniform_step();
        if (gmax - gmin).abs() < UNIFORM_RTOL * h {
            self.h_uni = h;
            self.h_min = h;
            self.h_max = h;
        } else {
            self.h_uni = -1.0;
            self.h_min = gmin;
            self.h_max = gmax;
        }
    }

    /// Stretch the axis about the origin: `x <- x*(1-eps)`.
    pub fn stretch(&mut self, ms: &mut MeshSeg1D, eps: f64) {
        ms.stretch(eps);

        for x in self.nbuff.iter_mut() {
            *x *= 1.0 - eps;
        }
        self.update_centers();

        if self.h_uni < 0.0 {
            self.h_min *= 1.0 - eps;
            self.h_max *= 1.0 - eps;
        } else {
            let h = ms.uniform_step();
            self.h_uni = h;
            self.h_min = h;
            self.h_max = h;
        }
    }

    /// Gather the global node coordinates. Only rank zero of `comm` receives them.
    pub fn gather_coords(&self, comm: &dyn Communicator) -> Option<Vec<f64>> {
        if self.nproc == 1 {
            return (comm.rank() == 0).then(|| self.owned_nodes().to_vec());
        }

        let mut buf = Vec::with_capacity(self.nnods + 2);
        buf.push(self.color as f64);
        buf.push(self.rank as f64);
        buf.extend_from_slice(self.owned_nodes());
        let all = comm.all_gather(&buf);

        if comm.rank() != 0 {
            return None;
        }

        // rank zero always sits in column zero
        let mut coords = vec![0.0; self.tnods];
        for part in all.iter().filter(|p| p[0] as usize == self.color) {
            let start = self.starts[part[1] as usize];
            let data = &part[2..];
            coords[start..start + data.len()].copy_from_slice(data);
        }
        Some(coords)
    }

    /// Check that the local grid can be coarsened by a multigrid hierarchy.
    ///
    /// # Returns
    /// Number of coarsening steps (halvings until the local size is odd).
    pub fn check_multigrid(&self, axis: char) -> Result<usize> {
        if self.ncels % 2 != 0 {
            return Err(Error::MultigridIncompatible {
                axis,
                reason: "local grid size is an odd number",
            });
        }
        if self.tcels % self.nproc != 0 {
            return Err(Error::MultigridIncompatible {
                axis,
                reason: "uniform local grid size doesn't exist",
            });
        }
        if self.tcels / self.nproc != self.ncels {
            return Err(Error::MultigridIncompatible {
                axis,
                reason: "local grid size is not constant on all processors",
            });
        }

        let mut sz = self.ncels;
        let mut ncors = 0;
        while sz % 2 == 0 {
            sz /= 2;
            ncors += 1;
        }
        Ok(ncors)
    }

    /// Neighbor slot (0 previous, 1 self, 2 next) owning coordinate `x`.
    ///
    /// The point must lie within one cell of the local subdomain.
    pub fn locate_point(&self, x: f64) -> usize {
        if self.grprev.is_some() && x < self.ncoor(0) {
            0
        } else if self.grnext.is_some() && x >= self.ncoor(self.ncels as isize) {
            2
        } else {
            1
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::mesh_seg::SegmentInput;
    use crate::parallel::SerialComm;
    use approx::assert_relative_eq;

    fn serial(tcels: usize, ms: &MeshSeg1D) -> Discret1D {
        let mut ds = Discret1D::new(1, 0, &[tcels + 1], 0, None, None);
        ds.gen_coord(ms, &SerialComm);
        ds
    }

    #[test]
    fn test_counts_and_buffers() {
        let ds = Discret1D::new(3, 1, &[3, 3, 4], 0, Some(0), Some(2));
        assert_eq!(ds.starts, vec![0, 3, 6, 9]);
        assert_eq!(ds.tnods, 10);
        assert_eq!(ds.tcels, 9);
        assert_eq!(ds.ncels, 3);
        assert_eq!(ds.nbuff.len(), 6);

        let last = Discret1D::new(3, 2, &[3, 3, 4], 0, Some(1), None);
        assert_eq!(last.ncels, 3);
        assert_eq!(last.nbuff.len(), 6);
    }

    #[test]
    fn test_serial_uniform() {
        let ms = MeshSeg1D::uniform(0.0, 1.0, 4);
        let ds = serial(4, &ms);
        assert!(ds.is_uniform());
        assert_relative_eq!(ds.h_uni, 0.25);
        assert_relative_eq!(ds.ncoor(-1), -0.25);
        assert_relative_eq!(ds.ncoor(5), 1.25);
        assert_relative_eq!(ds.ccoor(-1), -0.125);
        assert_relative_eq!(ds.ccoor(4), 1.125);
        assert_relative_eq!(ds.size_cell(0), 0.25);
        assert_relative_eq!(ds.size_node(0), 0.25);
        assert_eq!(ds.ncoor(0), 0.0);
        assert_eq!(ds.ncoor(4), 1.0);
    }

    #[test]
    fn test_non_uniform_detection() {
        let ms = MeshSeg1D::new(
            0.0,
            10.0,
            6,
            &SegmentInput {
                delims: vec![],
                ncells: vec![6],
                biases: vec![2.0],
            },
        );
        let ds = serial(6, &ms);
        assert!(!ds.is_uniform());
        assert!(ds.h_min < ds.h_max);
        assert_relative_eq!(ds.h_max / ds.h_min, 2.0, epsilon = 1e-12);
    }

    #[test]
    fn test_stretch_uniform() {
        let mut ms = MeshSeg1D::uniform(0.0, 2.0, 4);
        let mut ds = serial(4, &ms);
        ds.stretch(&mut ms, 0.5);
        assert_relative_eq!(ds.ncoor(4), 1.0);
        assert_relative_eq!(ds.ccoor(0), 0.125);
        assert_relative_eq!(ds.h_uni, 0.25);
    }

    #[test]
    fn test_check_multigrid() {
        let ms = MeshSeg1D::uniform(0.0, 1.0, 12);
        let ds = serial(12, &ms);
        assert_eq!(ds.check_multigrid('x').unwrap(), 2);

        let odd = serial(5, &MeshSeg1D::uniform(0.0, 1.0, 5));
        match odd.check_multigrid('y') {
            Err(Error::MultigridIncompatible { axis, .. }) => assert_eq!(axis, 'y'),
            other => panic!("unexpected result: {:?}", other),
        }

        // 10 cells over 3 processes: no uniform split
        let ds = Discret1D::new(3, 0, &[4, 3, 4], 0, None, Some(1));
        assert!(ds.check_multigrid('z').is_err());
    }

    #[test]
    fn test_locate_point() {
        let ms = MeshSeg1D::uniform(0.0, 9.0, 9);
        let mut ds = Discret1D::new(3, 1, &[3, 3, 4], 0, Some(0), Some(2));
        ds.gen_coord(&ms, &SerialComm);
        assert_eq!(ds.locate_point(2.5), 0);
        assert_eq!(ds.locate_point(4.0), 1);
        assert_eq!(ds.locate_point(6.5), 2);
    }
}
