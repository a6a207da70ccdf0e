//! Global numbering of the velocity and pressure unknowns.
//!
//! Handles DOF numbering for the coupled Stokes system: X-face, Y-face and
//! Z-face velocities followed by cell-center pressures. Index arrays are
//! ghosted, so stencils reaching into a neighbor process can read the global
//! id of the unknown they touch.

use crate::parallel::{Communicator, DistArray, Field3};

/// Numbering scheme.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexMode {
    /// Not computed yet; every id is `-1`.
    None,
    /// One contiguous range per process: velocities first, then pressure.
    Coupled,
    /// Separate velocity and pressure numberings.
    Uncoupled,
}

/// Degree of Freedom (DOF) index of the staggered grid.
#[derive(Debug, Clone)]
pub struct DofIndex {
    pub mode: IndexMode,
    /// Local number of velocity DOFs.
    pub lnv: usize,
    /// Local number of pressure DOFs.
    pub lnp: usize,
    /// Local number of DOFs.
    pub ln: usize,
    /// First velocity DOF of this process (uncoupled numbering).
    pub stv: usize,
    /// First pressure DOF of this process (uncoupled numbering).
    pub stp: usize,
    /// First DOF of this process (coupled numbering).
    pub st: usize,
    // ids are stored as floating point so that they travel through the
    // same ghost exchange as the fields
    ivx: Field3,
    ivy: Field3,
    ivz: Field3,
    ip: Field3,
}

impl DofIndex {
    /// Compute local counts and process offsets. Ids are left unset.
    pub fn new(comm: &dyn Communicator, da_cen: &DistArray, da_faces: [&DistArray; 3]) -> Self {
        let lnv: usize = da_faces.iter().map(|da| da.owned_len()).sum();
        let lnp = da_cen.owned_len();

        let start = comm.exclusive_scan(&[lnv, lnp]);
        let (stv, stp) = (start[0], start[1]);

        let unset = |da: &DistArray| {
            let (lo, dims) = da.ghost_corners();
            Field3::filled(lo, dims, -1.0)
        };

        Self {
            mode: IndexMode::None,
            lnv,
            lnp,
            ln: lnv + lnp,
            stv,
            stp,
            st: stv + stp,
            ivx: unset(da_faces[0]),
            ivy: unset(da_faces[1]),
            ivz: unset(da_faces[2]),
            ip: unset(da_cen),
        }
    }

    /// Assign global ids in the requested mode and refresh the ghost copies.
    ///
    /// Every previous id is discarded first, so the index is never partially stale.
    pub fn compute(&mut self, da_cen: &DistArray, da_faces: [&DistArray; 3], mode: IndexMode) {
        self.ivx.fill(-1.0);
        self.ivy.fill(-1.0);
        self.ivz.fill(-1.0);
        self.ip.fill(-1.0);

        let (mut stv, mut stp) = match mode {
            IndexMode::Coupled => (self.st, self.st + self.lnv),
            IndexMode::Uncoupled => (self.stv, self.stp),
            IndexMode::None => {
                self.mode = IndexMode::None;
                return;
            }
        };

        for (da, iv) in da_faces
            .iter()
            .zip([&mut self.ivx, &mut self.ivy, &mut self.ivz])
        {
            for p in da.owned_points() {
                iv[p] = stv as f64;
                stv += 1;
            }
        }
        for p in da_cen.owned_points() {
            self.ip[p] = stp as f64;
            stp += 1;
        }

        da_faces[0].local_to_local(&mut self.ivx);
        da_faces[1].local_to_local(&mut self.ivy);
        da_faces[2].local_to_local(&mut self.ivz);
        da_cen.local_to_local(&mut self.ip);

        self.mode = mode;
    }

    /// Global id of the velocity component `axis` at face point `p`.
    pub fn velocity_dof(&self, axis: usize, p: [isize; 3]) -> Option<usize> {
        let iv = match axis {
            0 => &self.ivx,
            1 => &self.ivy,
            _ => &self.ivz,
        };
        Self::read(iv, p)
    }

    /// Global id of the pressure at cell center `p`.
    pub fn pressure_dof(&self, p: [isize; 3]) -> Option<usize> {
        Self::read(&self.ip, p)
    }

    fn read(a: &Field3, p: [isize; 3]) -> Option<usize> {
        if !a.contains(p) {
            return None;
        }
        let id = a[p];
        (id >= 0.0).then_some(id as usize)
    }
}
