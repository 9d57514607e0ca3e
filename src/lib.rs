//! Backup job execution engine.
//!
//! Copies (or hands off to an external encryption tool) a directory tree per
//! job, reports progress after every step, and supports pausing, resuming and
//! stopping jobs while they run. Several jobs may run at once through
//! [`core::JobRegistry`].

pub mod config;
pub mod context;
pub mod core;
pub mod logging;
pub mod store;
