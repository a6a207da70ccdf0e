//! Staggered finite-difference grid (FDSTAG).
//!
//! Three axis decompositions are combined into seven point sets:
//!
//! ```text
//! centers  (C,C,C)  pressure, xx/yy/zz strain rate and stress
//! corners  (N,N,N)
//! XY edges (N,N,C)  xy strain rate and stress
//! XZ edges (N,C,N)  xz
//! YZ edges (C,N,N)  yz
//! X faces  (N,C,C)  vx
//! Y faces  (C,N,C)  vy
//! Z faces  (C,C,N)  vz
//! ```
//!
//! Centers and faces carry a ghost layer beyond the physical boundary (used
//! by boundary stencils); corners and edges do not.

use std::sync::Arc;

use nalgebra::Point3;

use crate::error::{Error, Result};
use crate::parallel::{
    box_points, global_rank, rank_coords, split_even, AxisLayout, Communicator, DistArray,
    PointKind, ReduceOp,
};

use super::discret::Discret1D;
use super::dof::{DofIndex, IndexMode};
use super::mesh_seg::{MeshSeg1D, SegmentInput};

/// Aspect ratio above which precision deteriorates.
pub const ASPECT_RATIO_WARN: f64 = 2.0;
/// Aspect ratio above which the grid is rejected.
pub const ASPECT_RATIO_MAX: f64 = 5.0;

/// The three edge point sets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EdgeKind {
    XY,
    XZ,
    YZ,
}

impl EdgeKind {
    pub const ALL: [EdgeKind; 3] = [EdgeKind::XY, EdgeKind::XZ, EdgeKind::YZ];

    /// The two node axes of the edge, in increasing order.
    pub fn axes(self) -> (usize, usize) {
        match self {
            EdgeKind::XY => (0, 1),
            EdgeKind::XZ => (0, 2),
            EdgeKind::YZ => (1, 2),
        }
    }

    /// The cell axis of the edge.
    pub fn normal(self) -> usize {
        match self {
            EdgeKind::XY => 2,
            EdgeKind::XZ => 1,
            EdgeKind::YZ => 0,
        }
    }

    /// Edge spanned by two distinct axes (any order).
    pub fn from_axes(a: usize, b: usize) -> EdgeKind {
        match (a.min(b), a.max(b)) {
            (0, 1) => EdgeKind::XY,
            (0, 2) => EdgeKind::XZ,
            _ => EdgeKind::YZ,
        }
    }

    pub fn index(self) -> usize {
        match self {
            EdgeKind::XY => 0,
            EdgeKind::XZ => 1,
            EdgeKind::YZ => 2,
        }
    }

    pub fn kinds(self) -> [PointKind; 3] {
        let mut k = [PointKind::Node; 3];
        k[self.normal()] = PointKind::Cell;
        k
    }
}

/// Point kinds of the face set carrying velocity component `axis`.
pub fn face_kinds(axis: usize) -> [PointKind; 3] {
    let mut k = [PointKind::Cell; 3];
    k[axis] = PointKind::Node;
    k
}

pub const CENTER_KINDS: [PointKind; 3] = [PointKind::Cell; 3];
pub const CORNER_KINDS: [PointKind; 3] = [PointKind::Node; 3];

/// Choose the process grid.
///
/// Non-zero hints are honored; the remaining factors are chosen to minimize
/// the inter-process surface. Every process must own at least one cell.
pub fn decompose(nproc: usize, cells: [usize; 3], hint: [usize; 3]) -> Result<[usize; 3]> {
    let mut best: Option<([usize; 3], usize)> = None;
    for px in (1..=nproc).filter(|p| nproc % p == 0) {
        for py in (1..=nproc / px).filter(|p| (nproc / px) % p == 0) {
            let pz = nproc / (px * py);
            let p = [px, py, pz];
            if (0..3).any(|d| (hint[d] != 0 && hint[d] != p[d]) || p[d] > cells[d]) {
                continue;
            }
            let [nx, ny, nz] = cells;
            let surface = (px - 1) * ny * nz + (py - 1) * nx * nz + (pz - 1) * nx * ny;
            if best.map_or(true, |(_, s)| surface < s) {
                best = Some((p, surface));
            }
        }
    }
    best.map(|(p, _)| p).ok_or_else(|| {
        Error::Topology(format!(
            "cannot distribute {:?} cells over {} processes with hints {:?}",
            cells, nproc, hint
        ))
    })
}

/// Staggered grid decomposition owned by one process.
#[derive(Clone)]
pub struct StaggeredGrid {
    comm: Arc<dyn Communicator>,
    /// Number of processes along each axis.
    pub procs: [usize; 3],
    /// Position of this process in the process grid.
    pub pos: [usize; 3],

    pub da_cen: DistArray,
    pub da_cor: DistArray,
    da_edges: [DistArray; 3],
    da_faces: [DistArray; 3],

    /// Segment description of every axis.
    pub ms: [MeshSeg1D; 3],
    /// Decomposition of every axis.
    pub ds: [Discret1D; 3],
    pub dof: DofIndex,

    /// Global ranks of the 3x3x3 neighborhood (including self), `i` fastest.
    pub neighbours: [Option<usize>; 27],

    pub n_cells: usize,
    pub n_corners: usize,
    pub n_xy_edges: usize,
    pub n_xz_edges: usize,
    pub n_yz_edges: usize,
    pub n_x_faces: usize,
    pub n_y_faces: usize,
    pub n_z_faces: usize,
}

impl std::fmt::Debug for StaggeredGrid {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StaggeredGrid")
            .field("procs", &self.procs)
            .field("pos", &self.pos)
            .field("ds", &self.ds)
            .field("n_cells", &self.n_cells)
            .finish()
    }
}

impl StaggeredGrid {
    /// Create the decomposition of a grid with `cells` cells per axis.
    ///
    /// # Arguments
    /// * `comm` - Process group
    /// * `cells` - Global number of cells along x, y, z
    /// * `hint` - Processes per axis, `0` lets the grid decide
    pub fn new(comm: Arc<dyn Communicator>, cells: [usize; 3], hint: [usize; 3]) -> Result<Self> {
        if cells.iter().any(|&c| c == 0) {
            return Err(Error::Topology(format!("invalid number of cells {:?}", cells)));
        }
        let procs = decompose(comm.size(), cells, hint)?;
        let pos = rank_coords(comm.rank(), procs);

        // cell ownership; nodes add one point on the last process
        let lc = [0, 1, 2].map(|d| split_even(cells[d], procs[d]));
        let ln = [0, 1, 2].map(|d| {
            let mut n = lc[d].clone();
            n[procs[d] - 1] += 1;
            n
        });

        let make = |kinds: [PointKind; 3], ghosted: bool| {
            let axes = [0, 1, 2].map(|d| {
                let counts = match kinds[d] {
                    PointKind::Node => &ln[d],
                    PointKind::Cell => &lc[d],
                };
                AxisLayout::new(kinds[d], counts, pos[d], ghosted)
            });
            DistArray::new(Arc::clone(&comm), axes)
        };

        let da_cen = make(CENTER_KINDS, true);
        let da_cor = make(CORNER_KINDS, false);
        let da_edges = EdgeKind::ALL.map(|e| make(e.kinds(), false));
        let da_faces = [0, 1, 2].map(|d| make(face_kinds(d), true));

        let [rx, ry, rz] = pos.map(|r| r as isize);
        let [px, py, _] = procs;
        let colors = [
            pos[1] + pos[2] * py,
            pos[0] + pos[2] * px,
            pos[0] + pos[1] * px,
        ];
        let neighbor = |d: usize, off: isize| {
            let mut r = [rx, ry, rz];
            r[d] += off;
            global_rank(r[0], r[1], r[2], procs)
        };
        let ds = [0, 1, 2].map(|d| {
            Discret1D::new(
                procs[d],
                pos[d],
                &ln[d],
                colors[d],
                neighbor(d, -1),
                neighbor(d, 1),
            )
        });

        let mut neighbours = [None; 27];
        let mut cnt = 0;
        for k in -1..2 {
            for j in -1..2 {
                for i in -1..2 {
                    neighbours[cnt] = global_rank(rx + i, ry + j, rz + k, procs);
                    cnt += 1;
                }
            }
        }

        let nn = [0, 1, 2].map(|d| ds[d].nnods);
        let nc = [0, 1, 2].map(|d| ds[d].ncels);

        let dof = DofIndex::new(
            comm.as_ref(),
            &da_cen,
            [&da_faces[0], &da_faces[1], &da_faces[2]],
        );

        let ms = [0, 1, 2].map(|d| MeshSeg1D::uniform(0.0, 1.0, cells[d]));

        Ok(Self {
            comm,
            procs,
            pos,
            da_cen,
            da_cor,
            da_edges,
            da_faces,
            ms,
            ds,
            dof,
            neighbours,
            n_cells: nc[0] * nc[1] * nc[2],
            n_corners: nn[0] * nn[1] * nn[2],
            n_xy_edges: nn[0] * nn[1] * nc[2],
            n_xz_edges: nn[0] * nc[1] * nn[2],
            n_yz_edges: nc[0] * nn[1] * nn[2],
            n_x_faces: nn[0] * nc[1] * nc[2],
            n_y_faces: nc[0] * nn[1] * nc[2],
            n_z_faces: nc[0] * nc[1] * nn[2],
        })
    }

    pub fn comm(&self) -> &dyn Communicator {
        self.comm.as_ref()
    }

    pub fn comm_handle(&self) -> &Arc<dyn Communicator> {
        &self.comm
    }

    pub fn da_face(&self, axis: usize) -> &DistArray {
        &self.da_faces[axis]
    }

    pub fn da_edge(&self, edge: EdgeKind) -> &DistArray {
        &self.da_edges[edge.index()]
    }

    /// Number of owned points of an edge set.
    pub fn n_edges(&self, edge: EdgeKind) -> usize {
        match edge {
            EdgeKind::XY => self.n_xy_edges,
            EdgeKind::XZ => self.n_xz_edges,
            EdgeKind::YZ => self.n_yz_edges,
        }
    }

    /// Number of owned points of a face set.
    pub fn n_faces(&self, axis: usize) -> usize {
        [self.n_x_faces, self.n_y_faces, self.n_z_faces][axis]
    }

    /// Owned points of a point set, `i` fastest.
    pub fn points(&self, kinds: [PointKind; 3]) -> impl Iterator<Item = [isize; 3]> {
        box_points([0, 1, 2].map(|d| match kinds[d] {
            PointKind::Node => self.ds[d].node_range(),
            PointKind::Cell => self.ds[d].cell_range(),
        }))
    }

    /// Coordinates of point `p` (global indices, ghosts included) of a point set.
    pub fn coord(&self, kinds: [PointKind; 3], p: [isize; 3]) -> Point3<f64> {
        let c = [0, 1, 2].map(|d| {
            let l = p[d] - self.ds[d].pstart as isize;
            match kinds[d] {
                PointKind::Node => self.ds[d].ncoor(l),
                PointKind::Cell => self.ds[d].ccoor(l),
            }
        });
        Point3::new(c[0], c[1], c[2])
    }

    /// Build the segment tables from the domain box and generate coordinates.
    pub fn gen_coord(&mut self, beg: [f64; 3], end: [f64; 3], segs: &[SegmentInput; 3]) {
        for d in 0..3 {
            self.ms[d] = MeshSeg1D::new(beg[d], end[d], self.ds[d].tcels, &segs[d]);
            self.ds[d].gen_coord(&self.ms[d], self.comm.as_ref());
        }
    }

    /// Homogeneous box deformation about the origin over one time step.
    ///
    /// The vertical rate follows from incompressibility, `Ezz = -(Exx + Eyy)`.
    pub fn stretch(&mut self, exx: f64, eyy: f64, dt: f64) {
        let ezz = -(exx + eyy);
        for (d, rate) in [exx, eyy, ezz].into_iter().enumerate() {
            if rate != 0.0 {
                self.ds[d].stretch(&mut self.ms[d], rate * dt);
            }
        }
    }

    /// Local and global rank of the neighbor owning point `x`.
    ///
    /// Only adjacent processes are considered: the point must lie within one
    /// cell of the local subdomain.
    pub fn point_ranks(&self, x: &Point3<f64>) -> (usize, Option<usize>) {
        let rx = self.ds[0].locate_point(x.x);
        let ry = self.ds[1].locate_point(x.y);
        let rz = self.ds[2].locate_point(x.z);
        let lrank = rx + 3 * ry + 9 * rz;
        (lrank, self.neighbours[lrank])
    }

    /// Maximum ratio of cell edge lengths over the whole grid.
    pub fn aspect_ratio(&self) -> f64 {
        let ratio = |a: f64, b: f64| if a > b { a / b } else { b / a };
        let mut lrt: f64 = 0.0;
        for p in self.points(CENTER_KINDS) {
            let dx = self.ds[0].size_cell(p[0]);
            let dy = self.ds[1].size_cell(p[1]);
            let dz = self.ds[2].size_cell(p[2]);
            lrt = lrt.max(ratio(dx, dy)).max(ratio(dx, dz)).max(ratio(dy, dz));
        }
        self.comm.all_reduce(lrt, ReduceOp::Max)
    }

    /// Log the processor grid, the fine grid size and the number of unknowns.
    pub fn summary(&self) {
        if self.comm.rank() != 0 {
            return;
        }
        let tc = [0, 1, 2].map(|d| self.ds[d].tcels);
        let tn = [0, 1, 2].map(|d| self.ds[d].tnods);
        let n_cells = tc[0] * tc[1] * tc[2];
        let n_vel = tn[0] * tc[1] * tc[2] + tc[0] * tn[1] * tc[2] + tc[0] * tc[1] * tn[2];

        log::info!(
            "Processor grid  [nx, ny, nz]   : [{}, {}, {}]",
            self.procs[0],
            self.procs[1],
            self.procs[2]
        );
        log::info!("Fine grid cells [nx, ny, nz]   : [{}, {}, {}]", tc[0], tc[1], tc[2]);
        log::info!("Number of cells                :  {}", n_cells);
        log::info!("Number of velocity DOF         :  {}", n_vel);
    }

    /// Reject aspect ratios above [`ASPECT_RATIO_MAX`], warn above [`ASPECT_RATIO_WARN`].
    pub fn check_aspect_ratio(&self) -> Result<f64> {
        let asp = self.aspect_ratio();
        if self.comm.rank() == 0 {
            log::info!("Maximum cell aspect ratio      :  {:7.5}", asp);
        }
        if asp > ASPECT_RATIO_MAX {
            return Err(Error::AspectRatio(asp));
        }
        if asp > ASPECT_RATIO_WARN && self.comm.rank() == 0 {
            log::warn!("non-optimal aspect ratio {:.5}, expect precision deterioration", asp);
        }
        Ok(asp)
    }

    /// Log grid details and check the aspect ratio.
    ///
    /// # Returns
    /// Maximum cell aspect ratio
    pub fn view(&self) -> Result<f64> {
        self.summary();
        self.check_aspect_ratio()
    }

    /// Coordinates of the first and last local node along each axis.
    pub fn local_box(&self) -> ([f64; 3], [f64; 3]) {
        let b = [0, 1, 2].map(|d| self.ds[d].local_bounds());
        (b.map(|v| v.0), b.map(|v| v.1))
    }

    /// Coordinates of the domain corners.
    pub fn global_box(&self) -> ([f64; 3], [f64; 3]) {
        let b = [0, 1, 2].map(|d| self.ms[d].bounds());
        (b.map(|v| v.0), b.map(|v| v.1))
    }

    /// Number of multigrid coarsening steps supported along every axis.
    pub fn check_multigrid(&self) -> Result<[usize; 3]> {
        Ok([
            self.ds[0].check_multigrid('x')?,
            self.ds[1].check_multigrid('y')?,
            self.ds[2].check_multigrid('z')?,
        ])
    }

    /// Rebuild the DOF index in the requested numbering mode.
    pub fn compute_dof_index(&mut self, mode: IndexMode) {
        let faces = [&self.da_faces[0], &self.da_faces[1], &self.da_faces[2]];
        self.dof.compute(&self.da_cen, faces, mode);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parallel::SerialComm;
    use approx::assert_relative_eq;

    fn serial(cells: [usize; 3]) -> StaggeredGrid {
        let comm: Arc<dyn Communicator> = Arc::new(SerialComm);
        let mut fs = StaggeredGrid::new(comm, cells, [0, 0, 0]).unwrap();
        fs.gen_coord([0.0; 3], [1.0; 3], &Default::default());
        fs
    }

    #[test]
    fn test_decompose() {
        assert_eq!(decompose(1, [4, 4, 4], [0, 0, 0]).unwrap(), [1, 1, 1]);
        assert_eq!(decompose(4, [4, 4, 2], [0, 0, 1]).unwrap(), [2, 2, 1]);
        assert_eq!(decompose(2, [8, 2, 2], [0, 0, 0]).unwrap(), [2, 1, 1]);
        assert_eq!(decompose(6, [4, 4, 4], [3, 0, 0]).unwrap()[0], 3);
        assert!(decompose(5, [2, 2, 2], [0, 0, 0]).is_err());
    }

    #[test]
    fn test_point_counts() {
        let fs = serial([3, 4, 5]);
        assert_eq!(fs.n_cells, 60);
        assert_eq!(fs.n_corners, 4 * 5 * 6);
        assert_eq!(fs.n_xy_edges, 4 * 5 * 5);
        assert_eq!(fs.n_xz_edges, 4 * 4 * 6);
        assert_eq!(fs.n_yz_edges, 3 * 5 * 6);
        assert_eq!(fs.n_x_faces, 4 * 4 * 5);
        assert_eq!(fs.n_y_faces, 3 * 5 * 5);
        assert_eq!(fs.n_z_faces, 3 * 4 * 6);
        assert_eq!(fs.da_face(1).owned_len(), fs.n_y_faces);
        assert_eq!(fs.da_edge(EdgeKind::XZ).owned_len(), fs.n_xz_edges);
        assert_eq!(fs.points(EdgeKind::YZ.kinds()).count(), fs.n_yz_edges);
    }

    #[test]
    fn test_edge_kinds() {
        for e in EdgeKind::ALL {
            let (a, b) = e.axes();
            assert_eq!(EdgeKind::from_axes(b, a), e);
            assert!(a != e.normal() && b != e.normal());
        }
    }

    #[test]
    fn test_neighbours_serial() {
        let fs = serial([2, 2, 2]);
        for (n, r) in fs.neighbours.iter().enumerate() {
            if n == 13 {
                assert_eq!(*r, Some(0));
            } else {
                assert_eq!(*r, None);
            }
        }
        assert_eq!(fs.point_ranks(&Point3::new(0.5, 0.5, 0.5)), (13, Some(0)));
    }

    #[test]
    fn test_aspect_ratio_and_view() {
        let comm: Arc<dyn Communicator> = Arc::new(SerialComm);
        let mut fs = StaggeredGrid::new(comm, [2, 2, 2], [0, 0, 0]).unwrap();
        fs.gen_coord([0.0; 3], [3.0, 1.0, 1.0], &Default::default());
        assert_relative_eq!(fs.aspect_ratio(), 3.0, epsilon = 1e-12);
        assert_relative_eq!(fs.view().unwrap(), 3.0, epsilon = 1e-12);

        fs.gen_coord([0.0; 3], [6.0, 1.0, 1.0], &Default::default());
        assert!(matches!(fs.view(), Err(Error::AspectRatio(_))));
    }

    #[test]
    fn test_stretch_keeps_volume() {
        let mut fs = serial([2, 2, 2]);
        fs.stretch(0.1, 0.0, 1.0);
        let (_, end) = fs.global_box();
        assert_relative_eq!(end[0], 0.9);
        assert_relative_eq!(end[1], 1.0);
        assert_relative_eq!(end[2], 1.1);
        assert_relative_eq!(fs.ds[2].h_uni, 0.55);
    }

    #[test]
    fn test_boxes() {
        let fs = serial([2, 3, 4]);
        let (b, e) = fs.local_box();
        assert_eq!(b, [0.0; 3]);
        assert_eq!(e, [1.0; 3]);
        assert_eq!(fs.global_box(), ([0.0; 3], [1.0; 3]));
    }
}
