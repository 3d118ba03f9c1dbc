//! # API
//!
//! Agent chat transport: the streaming response reader and the
//! retrying session client built on top of it.

pub mod client;
pub mod stream;
