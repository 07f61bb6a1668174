//! Core trait abstractions for the insights pipeline.
//!
//! These traits define the interfaces that applications implement
//! to provide caching, page extraction, and index membership.

pub mod source;
pub mod store;
