//! Data types shared across the insights pipeline.

pub mod batch;
pub mod config;
pub mod job;
pub mod request;
pub mod result;
pub mod symbol;
