//! The Backend Contract for the Drover framework.
//!
//! A backend is one running simulation replica hosting one or more
//! agents. The orchestrator consumes exactly the five operations of
//! the [`Backend`] trait and nothing else; transport, process
//! management, and relay framing live entirely behind an implementor.
//!
//! Backends are selected by value at construction time through a
//! [`BackendFactory`] passed into the orchestrator — there is no
//! global registry.

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

mod data;
mod traits;

pub use data::{ObsColumns, ReplicaReset, ReplicaStep};
pub use traits::{Backend, BackendFactory};
