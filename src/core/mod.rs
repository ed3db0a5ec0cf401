//! Core domain models for conveyor
//!
//! This module defines the fundamental data structures that represent
//! workflows, triggers, jobs, and their configuration.

pub mod config;
pub mod context;
pub mod job;
pub mod matrix;
pub mod state;
pub mod trigger;
pub mod workflow;

pub use context::*;
pub use job::*;
pub use matrix::*;
pub use state::*;
pub use trigger::*;
pub use workflow::*;
