//! Debug module - Contract with the native debugging engine.
//!
//! The engine is split the same way its own interfaces are:
//! - `Client`: callback registration and process lifecycle
//! - `Control`: command execution, breakpoints, event waiting
//! - `DataSpaces`: raw debuggee memory
//! - `Registers`: register access
//!
//! The session only routes events and bytes; everything here is implemented
//! by whatever engine binding the caller brings.

pub mod process;
pub mod types;

use std::cell::RefCell;
use std::rc::Rc;

use thiserror::Error;

use types::{
    Breakpoint, BreakpointId, BreakpointOptions, DebugEvent, DumpFormat, InterestMask, Outcome,
    OutputMask, WatchMode,
};

/// Engine-level errors
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("{operation} failed: {reason}")]
    CallFailed {
        operation: &'static str,
        reason: String,
    },

    #[error("No process attached")]
    NoProcess,

    #[error("Operation not supported by this engine: {0}")]
    Unsupported(&'static str),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl EngineError {
    pub fn call_failed(operation: &'static str, reason: impl ToString) -> Self {
        EngineError::CallFailed {
            operation,
            reason: reason.to_string(),
        }
    }
}

/// Receives events from the engine
pub trait EventCallbacks {
    /// Categories the engine should report; queried on registration
    fn interest_mask(&self) -> InterestMask;

    /// Handle one event and tell the engine how to proceed
    fn handle_event(&mut self, event: &DebugEvent) -> Outcome;
}

/// Receives text the engine prints
pub trait OutputCallbacks {
    fn on_output(&mut self, mask: OutputMask, text: &str);
}

pub type SharedEventCallbacks = Rc<RefCell<dyn EventCallbacks>>;
pub type SharedOutputCallbacks = Rc<RefCell<dyn OutputCallbacks>>;

/// Raw access to the debuggee's virtual memory
pub trait DataSpaces {
    /// Read up to `count` bytes; the result may be shorter than requested
    fn read(&mut self, address: u64, count: usize) -> Result<Vec<u8>, EngineError>;

    /// Write `data`, returning how many bytes actually landed
    fn write(&mut self, address: u64, data: &[u8]) -> Result<usize, EngineError>;

    /// Search `count` bytes from `address` for `pattern` at offsets that are
    /// multiples of `alignment`
    fn search(
        &mut self,
        pattern: &[u8],
        address: u64,
        count: usize,
        alignment: usize,
    ) -> Result<Option<u64>, EngineError>;
}

/// Execution control
pub trait Control {
    /// Run an engine command; output arrives through the output callbacks
    fn execute(&mut self, command: &str) -> Result<(), EngineError>;

    fn set_breakpoint(
        &mut self,
        address: u64,
        options: &BreakpointOptions,
    ) -> Result<Breakpoint, EngineError>;

    fn set_watchpoint(
        &mut self,
        address: u64,
        size: usize,
        mode: WatchMode,
        options: &BreakpointOptions,
    ) -> Result<Breakpoint, EngineError>;

    fn remove_breakpoint(&mut self, id: BreakpointId) -> Result<(), EngineError>;

    /// Resume or step the target
    fn set_execution_status(&mut self, status: Outcome) -> Result<(), EngineError>;

    /// Block until the next event has been dispatched
    fn wait_for_event(&mut self) -> Result<(), EngineError>;

    /// The event most recently reported by `wait_for_event`
    fn last_event(&mut self) -> Result<Option<DebugEvent>, EngineError>;
}

/// Callback registration and process lifecycle
pub trait Client {
    /// Register event callbacks; the engine re-reads the interest mask
    fn set_event_callbacks(&mut self, callbacks: SharedEventCallbacks)
        -> Result<(), EngineError>;

    fn set_output_callbacks(
        &mut self,
        callbacks: SharedOutputCallbacks,
    ) -> Result<(), EngineError>;

    /// Deliver any buffered output to the output callbacks
    fn flush_output(&mut self) -> Result<(), EngineError>;

    fn create_process(&mut self, command_line: &str) -> Result<(), EngineError>;
    fn attach_process(&mut self, pid: u32) -> Result<(), EngineError>;
    fn detach_processes(&mut self) -> Result<(), EngineError>;
    fn terminate_processes(&mut self) -> Result<(), EngineError>;
    fn open_dump_file(&mut self, path: &str) -> Result<(), EngineError>;
    fn write_dump_file(&mut self, path: &str, format: DumpFormat) -> Result<(), EngineError>;
}

/// Register access
pub trait Registers {
    fn value(&mut self, name: &str) -> Result<u64, EngineError>;
    fn set_value(&mut self, name: &str, value: u64) -> Result<(), EngineError>;

    fn instruction_pointer(&mut self) -> Result<u64, EngineError> {
        self.value("$ip")
    }
}

/// A complete engine binding
pub trait Engine: Client + Control + DataSpaces + Registers {}

impl<T: Client + Control + DataSpaces + Registers> Engine for T {}
