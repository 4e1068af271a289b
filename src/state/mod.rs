//! Per-domain mutable state

mod domain_headers;

pub use domain_headers::HeaderStore;
