//! Staggered grid geometry, decomposition and DOF numbering.

pub mod discret;
pub mod dof;
pub mod mesh_seg;
pub mod partition;
pub mod staggered;

pub use discret::Discret1D;
pub use dof::{DofIndex, IndexMode};
pub use mesh_seg::{MeshSeg1D, SegmentInput};
pub use partition::{partition_file_name, read_partitioning, write_partitioning, Partitioning};
pub use staggered::{
    decompose, face_kinds, EdgeKind, StaggeredGrid, ASPECT_RATIO_MAX, ASPECT_RATIO_WARN,
    CENTER_KINDS, CORNER_KINDS,
};
