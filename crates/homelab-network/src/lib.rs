//! homelab-network: Readiness probing
//!
//! Bounded polling of local HTTP endpoints before a step proceeds.

pub mod health;

pub use health::{wait_until_ready, HttpProbe, PollPolicy, ReadinessProbe, StaticProbe};
