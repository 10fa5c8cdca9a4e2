//! Space descriptors and sampled values for the Drover framework.
//!
//! A [`SpaceDescriptor`] describes the structure of an observation or
//! action space; a [`Value`] is one sampled point of such a space.
//! Descriptors are immutable once constructed from a backend and are
//! the single source of truth for flattening values into the
//! fixed-width `f32` rows the learner consumes.

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

pub mod descriptor;
pub mod value;

pub use descriptor::SpaceDescriptor;
pub use value::Value;
