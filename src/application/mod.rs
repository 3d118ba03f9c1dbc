//! # Application Layer
//!
//! The orchestration logic: response parsing, action dispatch, the
//! turn loop, plan tracking, post-edit validation, prompt text, and
//! conversation persistence.

pub mod conversation;
pub mod dispatcher;
pub mod engine;
pub mod parsing;
pub mod prompts;
pub mod tasks;
pub mod validation;
