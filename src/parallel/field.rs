//! Distributed structured arrays with one layer of box-stencil ghost points.
//!
//! A [`DistArray`] describes how the points of one staggered point set are
//! owned by the processes of a 3D process grid. Values live either in a
//! global vector (owned points only, `i` fastest) or in a ghosted local
//! [`Field3`] addressed by signed global indices.

use std::ops::{Index, IndexMut, Range};
use std::sync::Arc;

use super::comm::{global_rank, Communicator};

/// Location of the points along one axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PointKind {
    /// Cell boundaries, `tcels + 1` points.
    Node,
    /// Cell centers, `tcels` points.
    Cell,
}

/// Ownership of the points along one axis.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AxisLayout {
    pub kind: PointKind,
    /// Global number of points.
    pub total: usize,
    /// First owned point per process, `starts[nproc] == total`.
    pub starts: Vec<usize>,
    /// Position of this process along the axis.
    pub rank: usize,
    /// Whether a ghost layer exists beyond the physical boundary.
    pub boundary_ghost: bool,
}

impl AxisLayout {
    /// Build the layout from the number of points owned by every process.
    pub fn new(kind: PointKind, counts: &[usize], rank: usize, boundary_ghost: bool) -> Self {
        let mut starts = Vec::with_capacity(counts.len() + 1);
        let mut cnt = 0;
        for &c in counts {
            starts.push(cnt);
            cnt += c;
        }
        starts.push(cnt);
        Self {
            kind,
            total: cnt,
            starts,
            rank,
            boundary_ghost,
        }
    }

    pub fn nproc(&self) -> usize {
        self.starts.len() - 1
    }

    pub fn start(&self) -> usize {
        self.starts[self.rank]
    }

    pub fn count(&self) -> usize {
        self.starts[self.rank + 1] - self.starts[self.rank]
    }

    /// Owned global index range.
    pub fn owned(&self) -> Range<isize> {
        self.owned_at(self.rank)
    }

    /// Owned global index range of the process at position `pos`.
    pub fn owned_at(&self, pos: usize) -> Range<isize> {
        self.starts[pos] as isize..self.starts[pos + 1] as isize
    }

    /// Ghosted range of the process at `pos` without points beyond the boundary.
    fn interior_ghosted_at(&self, pos: usize) -> Range<isize> {
        let r = self.owned_at(pos);
        (r.start - 1).max(0)..(r.end + 1).min(self.total as isize)
    }

    /// Ghosted global index range (owned plus one stencil layer).
    pub fn ghosted(&self) -> Range<isize> {
        let r = self.owned();
        let lo = if r.start > 0 || self.boundary_ghost {
            r.start - 1
        } else {
            r.start
        };
        let hi = if (r.end as usize) < self.total || self.boundary_ghost {
            r.end + 1
        } else {
            r.end
        };
        lo..hi
    }

    /// Process position owning global index `i` (must be inside the domain).
    pub fn owner(&self, i: usize) -> usize {
        self.starts[1..].partition_point(|&s| s <= i)
    }
}

/// Split `m` points over `p` processes, the first `m % p` getting one extra.
pub fn split_even(m: usize, p: usize) -> Vec<usize> {
    (0..p).map(|r| m / p + usize::from(r < m % p)).collect()
}

/// Dense ghosted local array addressed by signed global `[i, j, k]`.
#[derive(Debug, Clone, PartialEq)]
pub struct Field3 {
    lo: [isize; 3],
    dims: [usize; 3],
    data: Vec<f64>,
}

impl Field3 {
    pub fn new(lo: [isize; 3], dims: [usize; 3]) -> Self {
        Self::filled(lo, dims, 0.0)
    }

    pub fn filled(lo: [isize; 3], dims: [usize; 3], value: f64) -> Self {
        Self {
            lo,
            dims,
            data: vec![value; dims[0] * dims[1] * dims[2]],
        }
    }

    /// First index along each axis.
    pub fn lo(&self) -> [isize; 3] {
        self.lo
    }

    /// One past the last index along each axis.
    pub fn hi(&self) -> [isize; 3] {
        [0, 1, 2].map(|d| self.lo[d] + self.dims[d] as isize)
    }

    pub fn dims(&self) -> [usize; 3] {
        self.dims
    }

    pub fn contains(&self, p: [isize; 3]) -> bool {
        (0..3).all(|d| p[d] >= self.lo[d] && p[d] < self.lo[d] + self.dims[d] as isize)
    }

    pub fn fill(&mut self, value: f64) {
        self.data.iter_mut().for_each(|v| *v = value);
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.data
    }

    pub fn as_mut_slice(&mut self) -> &mut [f64] {
        &mut self.data
    }

    #[inline]
    fn offset(&self, p: [isize; 3]) -> usize {
        assert!(
            self.contains(p),
            "index {:?} outside local array [{:?}, {:?})",
            p,
            self.lo,
            self.hi()
        );
        let i = (p[0] - self.lo[0]) as usize;
        let j = (p[1] - self.lo[1]) as usize;
        let k = (p[2] - self.lo[2]) as usize;
        i + self.dims[0] * (j + self.dims[1] * k)
    }
}

impl Index<[isize; 3]> for Field3 {
    type Output = f64;

    #[inline]
    fn index(&self, p: [isize; 3]) -> &f64 {
        &self.data[self.offset(p)]
    }
}

impl IndexMut<[isize; 3]> for Field3 {
    #[inline]
    fn index_mut(&mut self, p: [isize; 3]) -> &mut f64 {
        let off = self.offset(p);
        &mut self.data[off]
    }
}

/// Iterate a box of points, `i` fastest.
pub fn box_points(r: [Range<isize>; 3]) -> impl Iterator<Item = [isize; 3]> {
    let [ri, rj, rk] = r;
    rk.flat_map(move |k| {
        let ri = ri.clone();
        rj.clone()
            .flat_map(move |j| ri.clone().map(move |i| [i, j, k]))
    })
}

/// Distributed array handle for one staggered point set.
#[derive(Clone)]
pub struct DistArray {
    axes: [AxisLayout; 3],
    procs: [usize; 3],
    comm: Arc<dyn Communicator>,
}

impl std::fmt::Debug for DistArray {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DistArray")
            .field("axes", &self.axes)
            .field("procs", &self.procs)
            .finish()
    }
}

impl DistArray {
    pub fn new(comm: Arc<dyn Communicator>, axes: [AxisLayout; 3]) -> Self {
        let procs = [0, 1, 2].map(|d| axes[d].nproc());
        Self { axes, procs, comm }
    }

    pub fn axis(&self, d: usize) -> &AxisLayout {
        &self.axes[d]
    }

    pub fn comm(&self) -> &Arc<dyn Communicator> {
        &self.comm
    }

    /// First owned point and number of owned points per axis.
    pub fn corners(&self) -> ([isize; 3], [usize; 3]) {
        (
            [0, 1, 2].map(|d| self.axes[d].start() as isize),
            [0, 1, 2].map(|d| self.axes[d].count()),
        )
    }

    /// First ghosted point and number of ghosted points per axis.
    pub fn ghost_corners(&self) -> ([isize; 3], [usize; 3]) {
        let g = [0, 1, 2].map(|d| self.axes[d].ghosted());
        (
            [0, 1, 2].map(|d| g[d].start),
            [0, 1, 2].map(|d| (g[d].end - g[d].start) as usize),
        )
    }

    pub fn owned_len(&self) -> usize {
        self.axes.iter().map(|a| a.count()).product()
    }

    pub fn global_len(&self) -> usize {
        self.axes.iter().map(|a| a.total).product()
    }

    pub fn create_global(&self) -> Vec<f64> {
        vec![0.0; self.owned_len()]
    }

    pub fn create_local(&self) -> Field3 {
        let (lo, dims) = self.ghost_corners();
        Field3::new(lo, dims)
    }

    pub fn owned_points(&self) -> impl Iterator<Item = [isize; 3]> {
        box_points([0, 1, 2].map(|d| self.axes[d].owned()))
    }

    /// Owned and interior ghost points: the ghosted box clipped to the domain.
    pub fn domain_points(&self) -> impl Iterator<Item = [isize; 3]> {
        box_points([0, 1, 2].map(|d| {
            let g = self.axes[d].ghosted();
            g.start.max(0)..g.end.min(self.axes[d].total as isize)
        }))
    }

    pub fn is_owned(&self, p: [isize; 3]) -> bool {
        (0..3).all(|d| self.axes[d].owned().contains(&p[d]))
    }

    pub fn in_domain(&self, p: [isize; 3]) -> bool {
        (0..3).all(|d| p[d] >= 0 && (p[d] as usize) < self.axes[d].total)
    }

    /// Position of an owned point in the global vector of this process.
    pub fn owned_offset(&self, p: [isize; 3]) -> usize {
        let (s, n) = self.corners();
        let i = (p[0] - s[0]) as usize;
        let j = (p[1] - s[1]) as usize;
        let k = (p[2] - s[2]) as usize;
        i + n[0] * (j + n[1] * k)
    }

    /// Boxes shared with every other process of the grid.
    fn halos(&self) -> Vec<Halo> {
        let me = [0, 1, 2].map(|d| self.axes[d].rank);
        let mut out = Vec::new();
        for pos in box_points(self.procs.map(|n| 0..n as isize)) {
            let pos = pos.map(|v| v as usize);
            if pos == me {
                continue;
            }
            let Some(rank) = global_rank(pos[0] as isize, pos[1] as isize, pos[2] as isize, self.procs)
            else {
                continue;
            };
            let send = [0, 1, 2].map(|d| {
                let a = &self.axes[d];
                intersect(a.owned_at(me[d]), a.interior_ghosted_at(pos[d]))
            });
            let recv = [0, 1, 2].map(|d| {
                let a = &self.axes[d];
                intersect(a.interior_ghosted_at(me[d]), a.owned_at(pos[d]))
            });
            if !(is_empty_box(&send) && is_empty_box(&recv)) {
                out.push(Halo { rank, send, recv });
            }
        }
        out
    }

    /// Copy owned values into the local array and refresh interior ghosts.
    /// Physical boundary ghosts are left untouched.
    pub fn global_to_local(&self, g: &[f64], l: &mut Field3) {
        debug_assert_eq!(g.len(), self.owned_len());
        for p in self.owned_points() {
            l[p] = g[self.owned_offset(p)];
        }
        self.local_to_local(l);
    }

    /// Refresh interior ghost points from their owners (owner to ghost only).
    pub fn local_to_local(&self, l: &mut Field3) {
        if self.comm.size() == 1 {
            return;
        }
        let halos = self.halos();
        let sends: Vec<(usize, Vec<f64>)> = halos
            .iter()
            .filter(|h| !is_empty_box(&h.send))
            .map(|h| (h.rank, box_points(h.send.clone()).map(|p| l[p]).collect()))
            .collect();
        for (src, data) in self.comm.exchange(&sends) {
            if let Some(h) = halos.iter().find(|h| h.rank == src) {
                for (p, v) in box_points(h.recv.clone()).zip(data) {
                    l[p] = v;
                }
            }
        }
    }

    /// Sum every local contribution (owned and interior ghost points) into the
    /// owner's global entry. The global vector is overwritten.
    pub fn local_to_global_add(&self, l: &Field3, g: &mut [f64]) {
        debug_assert_eq!(g.len(), self.owned_len());
        g.iter_mut().for_each(|v| *v = 0.0);
        for p in self.owned_points() {
            g[self.owned_offset(p)] += l[p];
        }
        if self.comm.size() == 1 {
            return;
        }
        // reverse of the ghost refresh: ghosts travel back to their owners
        let halos = self.halos();
        let sends: Vec<(usize, Vec<f64>)> = halos
            .iter()
            .filter(|h| !is_empty_box(&h.recv))
            .map(|h| (h.rank, box_points(h.recv.clone()).map(|p| l[p]).collect()))
            .collect();
        for (src, data) in self.comm.exchange(&sends) {
            if let Some(h) = halos.iter().find(|h| h.rank == src) {
                for (p, v) in box_points(h.send.clone()).zip(data) {
                    g[self.owned_offset(p)] += v;
                }
            }
        }
    }
}

/// Points exchanged with one neighbor.
///
/// `send` holds owned points that are ghosts of the neighbor, `recv` the local
/// ghosts it owns. Both sides enumerate a shared box in the same order.
#[derive(Debug, Clone)]
struct Halo {
    rank: usize,
    send: [Range<isize>; 3],
    recv: [Range<isize>; 3],
}

fn intersect(a: Range<isize>, b: Range<isize>) -> Range<isize> {
    a.start.max(b.start)..a.end.min(b.end)
}

fn is_empty_box(b: &[Range<isize>; 3]) -> bool {
    b.iter().any(|r| r.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parallel::comm::{rank_coords, SerialComm, ThreadComm};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn layout(comm: Arc<dyn Communicator>, procs: [usize; 3], kinds: [PointKind; 3], ghost: bool) -> DistArray {
        let pos = rank_coords(comm.rank(), procs);
        let cells = [5, 4, 3];
        let axes = [0, 1, 2].map(|d| {
            let mut counts = split_even(cells[d], procs[d]);
            if kinds[d] == PointKind::Node {
                counts[procs[d] - 1] += 1;
            }
            AxisLayout::new(kinds[d], &counts, pos[d], ghost)
        });
        DistArray::new(comm, axes)
    }

    #[test]
    fn test_split_even() {
        assert_eq!(split_even(10, 3), vec![4, 3, 3]);
        assert_eq!(split_even(4, 4), vec![1, 1, 1, 1]);
    }

    #[test]
    fn test_ghost_ranges() {
        let a = AxisLayout::new(PointKind::Cell, &[3, 3], 0, true);
        assert_eq!(a.ghosted(), -1..4);
        let b = AxisLayout::new(PointKind::Node, &[3, 4], 1, false);
        assert_eq!(b.ghosted(), 2..7);
        assert_eq!(b.owner(2), 0);
        assert_eq!(b.owner(3), 1);
        assert_eq!(b.owner(6), 1);
    }

    #[test]
    fn test_serial_local_global() {
        let comm: Arc<dyn Communicator> = Arc::new(SerialComm);
        let da = layout(comm, [1, 1, 1], [PointKind::Node, PointKind::Cell, PointKind::Cell], true);
        let mut g = da.create_global();
        for (n, v) in g.iter_mut().enumerate() {
            *v = n as f64;
        }
        let mut l = da.create_local();
        da.global_to_local(&g, &mut l);
        assert_eq!(l[[0, 0, 0]], 0.0);
        assert_eq!(l[[5, 3, 2]], (g.len() - 1) as f64);
        let mut back = da.create_global();
        da.local_to_global_add(&l, &mut back);
        assert_eq!(back, g);
    }

    /// Thread transport that counts the values it sends point-to-point.
    struct Counting {
        inner: ThreadComm,
        sent: AtomicUsize,
    }

    impl Communicator for Counting {
        fn rank(&self) -> usize {
            self.inner.rank()
        }

        fn size(&self) -> usize {
            self.inner.size()
        }

        fn all_gather(&self, data: &[f64]) -> Vec<Vec<f64>> {
            self.inner.all_gather(data)
        }

        fn exchange(&self, sends: &[(usize, Vec<f64>)]) -> Vec<(usize, Vec<f64>)> {
            let n: usize = sends.iter().map(|(_, d)| d.len()).sum();
            self.sent.fetch_add(n, Ordering::SeqCst);
            self.inner.exchange(sends)
        }
    }

    #[test]
    fn test_exchange_sends_only_halo() {
        ThreadComm::run_group(2, |inner| {
            let counting = Arc::new(Counting {
                inner,
                sent: AtomicUsize::new(0),
            });
            let comm: Arc<dyn Communicator> = counting.clone();
            let da = layout(comm, [2, 1, 1], [PointKind::Cell; 3], true);
            let mut l = da.create_local();
            for p in da.owned_points() {
                l[p] = (p[0] + 10 * p[1] + 100 * p[2]) as f64;
            }
            da.local_to_local(&mut l);

            // one x layer of 4 x 3 cells crosses the process boundary
            assert_eq!(counting.sent.load(Ordering::SeqCst), 12);
            let ghost_x = if da.axis(0).rank == 0 { 3 } else { 2 };
            for p in box_points([ghost_x..ghost_x + 1, 0..4, 0..3]) {
                assert_eq!(l[p], (p[0] + 10 * p[1] + 100 * p[2]) as f64);
            }

            let mut g = da.create_global();
            da.local_to_global_add(&l, &mut g);
            assert_eq!(counting.sent.load(Ordering::SeqCst), 24);
        });
    }

    #[test]
    fn test_parallel_ghost_refresh_matches_owner() {
        let procs = [2, 2, 1];
        ThreadComm::run_group(4, |comm| {
            let comm: Arc<dyn Communicator> = Arc::new(comm);
            let da = layout(comm, procs, [PointKind::Node, PointKind::Node, PointKind::Cell], false);
            let mut l = da.create_local();
            for p in da.owned_points() {
                l[p] = (p[0] + 10 * p[1] + 100 * p[2]) as f64;
            }
            da.local_to_local(&mut l);
            for p in da.domain_points() {
                assert_eq!(l[p], (p[0] + 10 * p[1] + 100 * p[2]) as f64);
            }

            // every domain point seen by a rank contributes once
            let mut ones = da.create_local();
            for p in da.domain_points() {
                ones[p] = 1.0;
            }
            let mut g = da.create_global();
            da.local_to_global_add(&ones, &mut g);
            for p in da.owned_points() {
                let mut expected = 1.0;
                for d in 0..2 {
                    let a = da.axis(d);
                    let i = p[d];
                    let owned = a.owned();
                    if i == owned.start && i > 0 {
                        expected *= 2.0;
                    } else if i == owned.end - 1 && (i as usize) < a.total - 1 {
                        expected *= 2.0;
                    }
                }
                assert_eq!(g[da.owned_offset(p)], expected);
            }
        });
    }
}
