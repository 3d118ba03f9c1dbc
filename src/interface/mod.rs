//! # Interface Layer
//!
//! Terminal-facing pieces: the console prompt surface.

pub mod console;
