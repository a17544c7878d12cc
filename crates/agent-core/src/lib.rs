//! Core abstractions for agent-rs pipelines
//!
//! This crate defines the fundamental traits and types used throughout the
//! workspace: the [`Agent`] trait implemented by every pipeline stage, and the
//! shared [`Error`] type.

pub mod agent;
pub mod error;

pub use agent::Agent;
pub use error::{Error, Result};
