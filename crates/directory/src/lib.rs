//! BigFS Directory Service
//!
//! Central registry mapping node ids to addresses and liveness.
//!
//! ## Modules
//! - `registry`: the node table and its id/port counters under one lock
//! - `service`: TCP front end serving register, heartbeat and list requests

pub mod registry;
pub mod service;

pub use registry::{NodeRegistry, Registration, RegistryError};
pub use service::{handle_request, DirectoryServer};
