//! # Domain Layer
//!
//! Core definitions, types, and traits that define the engine's contract.
//! Independent of transports and the terminal, serving as the boundary for
//! the other layers.

pub mod config;
pub mod error;
pub mod traits;
pub mod types;
