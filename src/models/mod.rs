//! Core data models for composition aggregation.

mod accumulator;
mod match_info;
mod report;

pub use accumulator::*;
pub use match_info::*;
pub use report::*;
