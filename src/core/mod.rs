//! Core module - Session, event routing, output capture and memory access
//!
//! The pieces that sit between a caller and the debugging engine. They only
//! route events and bytes; the engine does the actual debugging.

pub mod config;
pub mod debugger;
pub mod events;
pub mod memory;
pub mod output;

// Re-export common types
pub use config::DebuggerConfig;
pub use debugger::{Debugger, SessionError};
pub use events::{Dispatch, EventRouter, HandlerResult};
pub use memory::{AddressSpace, MemoryError, Region};
pub use output::{Capture, OutputSink};
