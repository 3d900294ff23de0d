//! Blocking execution under a cancellable context.

mod command;
mod context;

pub use command::{ToolCommand, ToolOutput, tool_available};
pub use context::ExecContext;
