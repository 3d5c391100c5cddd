//! Tether - Event routing and memory access over a native debugging engine
//!
//! Drives a debuggee (live process or crash dump) through a small API:
//! execute engine commands and collect their output, set breakpoints and
//! watchpoints with per-breakpoint callbacks, react to engine events, and
//! read, write and search debuggee memory.
//!
//! The engine itself is supplied by the caller through the traits in
//! [`debug`].

pub mod core;
pub mod debug;

pub use crate::core::{
    AddressSpace, Capture, Debugger, DebuggerConfig, Dispatch, EventRouter, HandlerResult,
    MemoryError, OutputSink, Region, SessionError,
};
pub use crate::debug::types::{
    Breakpoint, BreakpointEvent, BreakpointId, BreakpointKind, BreakpointOptions, DebugEvent,
    DumpFormat, EventCategory, InterestMask, Outcome, OutputMask, WatchMode,
};
pub use crate::debug::{Client, Control, DataSpaces, Engine, EngineError, Registers};
