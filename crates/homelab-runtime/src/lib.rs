//! homelab-runtime: Command execution layer
//!
//! Every side effect of a provisioning step goes through a [`CommandRunner`]:
//! - [`LocalRunner`] spawns processes on the workstation
//! - [`SshRunner`] executes on a remote host over `ssh`
//! - [`ScriptedRunner`] records commands and replays scripted responses

pub mod command;
pub mod process;
pub mod scripted;
pub mod ssh;
pub mod traits;

pub use command::{shell_quote, CommandOutput, CommandSpec};
pub use process::{LocalRunner, LocalRunnerConfig};
pub use scripted::ScriptedRunner;
pub use ssh::SshRunner;
pub use traits::CommandRunner;
