//! # Tools
//!
//! Local capabilities the agent can reach: workspace file operations,
//! shell command execution, and the built-in fetch tool.

pub mod executor;
pub mod fetch;
pub mod workspace;
