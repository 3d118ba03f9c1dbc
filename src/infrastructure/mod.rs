//! # Infrastructure Layer
//!
//! Adapters to the outside world: the agent API, credential storage,
//! workspace tools, and structured file editing.

pub mod api;
pub mod auth;
pub mod editor;
pub mod tools;
