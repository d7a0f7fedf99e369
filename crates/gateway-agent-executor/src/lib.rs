//! Agents that drive gateway tools for a session attempt.
//!
//! Provides:
//! - `ToolName` - `{target}___{tool}` gateway naming convention
//! - `DirectToolAgent` - model-free agent that lists or invokes gateway tools

pub mod direct;
pub mod naming;

pub use direct::{DirectToolAgent, DirectToolAgentFactory};
pub use naming::ToolName;
