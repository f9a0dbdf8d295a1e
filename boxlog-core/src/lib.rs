//! Boxlog Core
//!
//! Core types shared by the boxlog crates.
//!
//! This crate contains:
//! - Domain types: log events, ordering tokens, sink resources and workload descriptors

pub mod domain;
