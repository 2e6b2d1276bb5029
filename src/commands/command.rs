//! Command trait definition for CLI commands.
//!
//! Every fqflow subcommand implements [`Command`]; `enum_dispatch` wires
//! the trait across the subcommand enum in `main.rs` without dynamic
//! allocation.

use anyhow::Result;
use enum_dispatch::enum_dispatch;

/// Trait implemented by all fqflow CLI commands.
#[enum_dispatch]
pub trait Command {
    /// Runs the command's main logic.
    #[allow(clippy::missing_errors_doc)]
    fn execute(&self) -> Result<()>;
}
