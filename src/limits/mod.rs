//! Admission control primitives
//!
//! [`Gate`] bounds how many fetches run at once; [`Pacer`] enforces a
//! minimum spacing between consecutive requests. They are independent so
//! a slow pacer never holds a concurrency slot hostage.

mod gate;
mod pacer;

pub use gate::{Gate, Slot};
pub use pacer::Pacer;
