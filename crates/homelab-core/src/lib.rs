//! homelab-core: Core types for the homelab provisioner
//!
//! This crate provides the fundamental types used throughout the workspace:
//! - Step descriptors (export, mount, runtime, cluster, model)
//! - Step outputs and status values
//! - Configuration loading and validation
//! - Error handling

pub mod config;
pub mod error;
pub mod model;

pub use config::*;
pub use error::*;
pub use model::*;
