//! Distributed-memory plumbing: process groups, reductions and ghosted arrays.

pub mod comm;
pub mod field;

pub use comm::{global_rank, rank_coords, Communicator, ReduceOp, SerialComm, ThreadComm};
pub use field::{box_points, split_even, AxisLayout, DistArray, Field3, PointKind};
