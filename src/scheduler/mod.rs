//! Inter-slice scheduling policies.

pub mod inter;

pub use inter::{InterScheduler, SacPolicy};
