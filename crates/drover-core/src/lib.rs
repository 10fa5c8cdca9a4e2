//! Core types for the Drover orchestration framework.
//!
//! This is the leaf crate with zero internal dependencies. It defines
//! the strongly-typed identifiers and the error enums shared by the
//! rest of the workspace.

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

pub mod error;
pub mod id;

pub use error::{BackendError, ObsError, SpaceError};
pub use id::{GlobalIndex, LocalAgentId, ReplicaId, TickId};
