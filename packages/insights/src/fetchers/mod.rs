//! Network collaborators: page fetch + extraction, and index membership.

pub mod http;
pub mod nse;
pub mod table;

pub use http::HttpInsightSource;
pub use nse::NseIndexSource;
