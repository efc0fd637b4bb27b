//! Delegation instance generator and benchmark utilities.
//!
//! This crate provides deterministic generation of layered liquid-democracy
//! instances for benchmarking and testing `liquid-core`.

pub mod generator;

pub use generator::{GeneratorConfig, SizeTier, generate_instance};
