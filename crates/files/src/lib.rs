//! BigFS Node Storage
//!
//! Everything a node does to its disk on behalf of a client. Client paths
//! pass through the [`PathGuard`] before any filesystem call; failures come
//! back as structured [`Fault`](bigfs_types::Fault)s.

pub mod guard;
pub mod ops;
pub mod storage;

pub use guard::{resolve, PathGuard, PathGuardError};
pub use storage::{NodeStorage, Upload};
