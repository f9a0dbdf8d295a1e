//! Core domain types
//!
//! These types are shared between the sink client (which ships them) and the
//! runner (which produces them from the workload's output).

pub mod log;
pub mod sink;
pub mod workload;
