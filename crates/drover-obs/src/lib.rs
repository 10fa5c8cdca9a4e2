//! Observation aggregation for the Drover framework.
//!
//! Backends report observations component-major: one column per space
//! component, each column holding one [`Value`] per agent. The
//! [`ObsAggregator`] flattens those columns into a row-major
//! `[agent_count x width]` block of `f32` — the only place in the
//! workspace where observations are flattened.

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

mod aggregate;
mod rows;

pub use aggregate::ObsAggregator;
pub use rows::AgentRows;

pub use drover_space::Value;
