//! Segmented description of one coordinate axis.
//!
//! An axis is a concatenation of segments, each with its own cell count and a
//! geometric bias (ratio of last to first cell width). Coordinates can be
//! generated for any sub-range of the nodes, so every process only builds
//! its own slice.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// User description of the segments along one axis.
///
/// With `n` segments, `delims` holds the `n-1` interior breakpoints,
/// `ncells` the cell count of each segment and `biases` the bias of each
/// segment. An empty description means one uniform segment.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct SegmentInput {
    #[serde(default)]
    pub delims: Vec<f64>,
    #[serde(default)]
    pub ncells: Vec<usize>,
    #[serde(default)]
    pub biases: Vec<f64>,
}

impl SegmentInput {
    pub fn nsegs(&self) -> usize {
        self.ncells.len()
    }

    /// Check the description against the axis `[beg, end]` with `tcels` cells.
    pub fn validate(&self, axis: char, beg: f64, end: f64, tcels: usize) -> Result<()> {
        let n = self.nsegs();
        if n == 0 {
            return Ok(());
        }
        let err = |msg: String| Err(Error::Config(format!("{}-segments: {}", axis, msg)));

        if self.delims.len() + 1 != n || self.biases.len() != n {
            return err(format!(
                "{} segments need {} delimiters and {} biases, got {} and {}",
                n,
                n - 1,
                n,
                self.delims.len(),
                self.biases.len()
            ));
        }
        if self.ncells.iter().any(|&c| c == 0) {
            return err("every segment needs at least one cell".into());
        }
        let total: usize = self.ncells.iter().sum();
        if total != tcels {
            return err(format!("cell counts sum to {}, expected {}", total, tcels));
        }
        if let Some(b) = self.biases.iter().find(|b| !(**b > 0.0)) {
            return err(format!("bias must be positive, got {}", b));
        }
        let mut prev = beg;
        for &x in self.delims.iter().chain(std::iter::once(&end)) {
            if !(x > prev) {
                return err("delimiters must increase strictly inside the domain".into());
            }
            prev = x;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MeshSeg1D {
    /// First cell index of every segment, `istart[nsegs] == tcels`.
    istart: Vec<usize>,
    /// First coordinate of every segment, `xstart[nsegs] == end`.
    xstart: Vec<f64>,
    biases: Vec<f64>,
}

impl MeshSeg1D {
    /// Build the segment table for `[beg, end]` with `tcels` cells in total.
    ///
    /// Breakpoint monotonicity is a caller contract; it is only checked in
    /// debug builds.
    pub fn new(beg: f64, end: f64, tcels: usize, input: &SegmentInput) -> Self {
        let nsegs = input.nsegs().max(1);

        let mut istart = vec![0; nsegs + 1];
        let mut xstart = vec![0.0; nsegs + 1];
        let mut biases = vec![1.0; nsegs];

        if input.nsegs() > 0 {
            let mut cnt = 0;
            for i in 0..nsegs - 1 {
                cnt += input.ncells[i];
                istart[i + 1] = cnt;
                xstart[i + 1] = input.delims[i];
            }
            biases.copy_from_slice(&input.biases[..nsegs]);
        }

        istart[0] = 0;
        istart[nsegs] = tcels;
        xstart[0] = beg;
        xstart[nsegs] = end;

        debug_assert!(istart.windows(2).all(|w| w[0] < w[1]));
        debug_assert!(xstart.windows(2).all(|w| w[0] < w[1]));

        Self {
            istart,
            xstart,
            biases,
        }
    }

    /// Single uniform segment.
    pub fn uniform(beg: f64, end: f64, tcels: usize) -> Self {
        Self::new(beg, end, tcels, &SegmentInput::default())
    }

    pub fn nsegs(&self) -> usize {
        self.biases.len()
    }

    /// Cell index breakpoints.
    pub fn istart(&self) -> &[usize] {
        &self.istart
    }

    /// Coordinate breakpoints.
    pub fn xstart(&self) -> &[f64] {
        &self.xstart
    }

    pub fn biases(&self) -> &[f64] {
        &self.biases
    }

    pub fn total_cells(&self) -> usize {
        self.istart[self.nsegs()]
    }

    /// First and last coordinate of the axis.
    pub fn bounds(&self) -> (f64, f64) {
        (self.xstart[0], self.xstart[self.nsegs()])
    }

    /// Cell width of a uniform mesh with the same extent and cell count.
    pub fn uniform_step(&self) -> f64 {
        let (beg, end) = self.bounds();
        (end - beg) / self.total_cells() as f64
    }

    /// Scale all breakpoints about the origin: `x <- x*(1-eps)`.
    pub fn stretch(&mut self, eps: f64) {
        for x in self.xstart.iter_mut() {
            *x *= 1.0 - eps;
        }
    }

    /// Generate the coordinates of `crd.len()` consecutive nodes of segment
    /// `iseg`, starting at node `istart` within the segment.
    ///
    /// The last node of the segment is set to the segment end exactly.
    pub fn gen_coord(&self, iseg: usize, istart: usize, crd: &mut [f64]) {
        let nl = crd.len();
        if nl == 0 {
            return;
        }

        // nodes in segment, including both ends
        let n = self.istart[iseg + 1] - self.istart[iseg] + 1;
        let m = n - 1;

        let xstart = self.xstart[iseg];
        let xclose = self.xstart[iseg + 1];
        let bias = self.biases[iseg];

        let avg = (xclose - xstart) / m as f64;

        if bias == 1.0 || m == 1 {
            for (i, c) in crd.iter_mut().enumerate() {
                *c = xstart + (istart + i) as f64 * avg;
            }
        } else {
            let beg_sz = 2.0 * avg / (1.0 + bias);
            let end_sz = bias * beg_sz;

            // cell size increment (negative for bias < 1)
            let dx = (end_sz - beg_sz) / (m - 1) as f64;

            // accumulated increments of the preceding cells
            let mut sum = istart * istart.saturating_sub(1) / 2;

            for (i, c) in crd.iter_mut().enumerate() {
                *c = xstart + (istart + i) as f64 * beg_sz + sum as f64 * dx;
                sum += istart + i;
            }
        }

        if istart + nl == n {
            crd[nl - 1] = xclose;
        }
    }
}
