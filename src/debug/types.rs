//! Common types shared between the session and the debugging engine.

use std::fmt;
use std::str::FromStr;

use bitflags::bitflags;
use thiserror::Error;

bitflags! {
    /// Event categories the engine should report to the session.
    ///
    /// Bit values follow the engine's `DEBUG_EVENT_*` constants.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct InterestMask: u32 {
        const BREAKPOINT = 0x0000_0001;
        const EXCEPTION = 0x0000_0002;
        const CREATE_THREAD = 0x0000_0004;
        const EXIT_THREAD = 0x0000_0008;
        const CREATE_PROCESS = 0x0000_0010;
        const EXIT_PROCESS = 0x0000_0020;
        const LOAD_MODULE = 0x0000_0040;
        const UNLOAD_MODULE = 0x0000_0080;
        const SYSTEM_ERROR = 0x0000_0100;
        const SESSION_STATUS = 0x0000_0200;
        const CHANGE_DEBUGGEE_STATE = 0x0000_0400;
        const CHANGE_ENGINE_STATE = 0x0000_0800;
        const CHANGE_SYMBOL_STATE = 0x0000_1000;
    }
}

impl Default for InterestMask {
    fn default() -> Self {
        Self::BREAKPOINT | Self::CREATE_PROCESS | Self::EXCEPTION
    }
}

bitflags! {
    /// Output channels the engine tags its text with.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct OutputMask: u32 {
        const NORMAL = 0x0000_0001;
        const ERROR = 0x0000_0002;
        const WARNING = 0x0000_0004;
        const VERBOSE = 0x0000_0008;
        const PROMPT = 0x0000_0010;
        const PROMPT_REGISTERS = 0x0000_0020;
        const EXTENSION_WARNING = 0x0000_0040;
        const DEBUGGEE = 0x0000_0080;
        const DEBUGGEE_PROMPT = 0x0000_0100;
        const SYMBOLS = 0x0000_0200;
    }
}

bitflags! {
    /// Access kinds a watchpoint triggers on.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct WatchMode: u32 {
        const READ = 0x1;
        const WRITE = 0x2;
        const EXECUTE = 0x4;
    }
}

impl Default for WatchMode {
    fn default() -> Self {
        Self::all()
    }
}

/// Invalid watch mode string
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Invalid watch mode {0:?}: expected a combination of 'r', 'w' and 'x'")]
pub struct ParseWatchModeError(pub String);

impl FromStr for WatchMode {
    type Err = ParseWatchModeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() {
            return Err(ParseWatchModeError(s.to_string()));
        }

        let mut mode = WatchMode::empty();
        for c in s.chars() {
            mode |= match c.to_ascii_lowercase() {
                'r' => WatchMode::READ,
                'w' => WatchMode::WRITE,
                'x' => WatchMode::EXECUTE,
                _ => return Err(ParseWatchModeError(s.to_string())),
            };
        }
        Ok(mode)
    }
}

/// Status returned to the engine after an event, and used to resume execution.
///
/// Mirrors the engine's `DEBUG_STATUS_*` values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Outcome {
    NoChange,
    Go,
    /// The event was dealt with; suppress the engine's default response
    #[default]
    Handled,
    /// Let the engine apply its default response
    Ignored,
    StepOver,
    StepInto,
    StepBranch,
    Break,
}

/// Engine-assigned breakpoint identity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BreakpointId(pub u32);

impl fmt::Display for BreakpointId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Breakpoint flavours
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakpointKind {
    /// Code breakpoint
    Code,
    /// Data breakpoint (watchpoint) over `size` bytes
    Data { size: usize, mode: WatchMode },
}

/// Handle to a breakpoint created by the engine
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Breakpoint {
    pub id: BreakpointId,
    pub address: u64,
    pub kind: BreakpointKind,
}

/// Creation flags shared by breakpoints and watchpoints
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BreakpointOptions {
    /// Remove the breakpoint after the first hit
    pub oneshot: bool,
    /// Hide the breakpoint from other engine clients
    pub private: bool,
    /// Engine command to run when the breakpoint fires
    pub command: Option<String>,
}

impl Default for BreakpointOptions {
    fn default() -> Self {
        Self {
            oneshot: false,
            private: true,
            command: None,
        }
    }
}

impl BreakpointOptions {
    pub fn oneshot(mut self) -> Self {
        self.oneshot = true;
        self
    }

    pub fn public(mut self) -> Self {
        self.private = false;
        self
    }

    pub fn with_command(mut self, command: impl Into<String>) -> Self {
        self.command = Some(command.into());
        self
    }
}

/// Crash dump flavours understood by the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DumpFormat {
    /// Engine default
    #[default]
    Default,
    Small,
    Full,
}

/// Details of a breakpoint hit
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BreakpointEvent {
    pub id: BreakpointId,
    pub address: u64,
    pub thread_id: u32,
}

/// Event reported by the engine
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DebugEvent {
    Breakpoint(BreakpointEvent),
    Exception {
        code: u32,
        address: u64,
        first_chance: bool,
    },
    ThreadCreated {
        thread_id: u32,
    },
    ThreadExited {
        thread_id: u32,
        exit_code: u32,
    },
    ProcessCreated {
        pid: u32,
        image_name: String,
        base_address: u64,
    },
    ProcessExited {
        exit_code: u32,
    },
    ModuleLoaded {
        name: String,
        base_address: u64,
    },
    ModuleUnloaded {
        name: String,
        base_address: u64,
    },
    SystemError {
        error: u32,
        level: u32,
    },
    SessionStatus {
        status: u32,
    },
    DebuggeeStateChanged {
        flags: u32,
        argument: u64,
    },
    EngineStateChanged {
        flags: u32,
        argument: u64,
    },
    SymbolStateChanged {
        flags: u32,
        argument: u64,
    },
}

impl DebugEvent {
    /// Category used to route this event
    pub fn category(&self) -> EventCategory {
        match self {
            DebugEvent::Breakpoint(_) => EventCategory::Breakpoint,
            DebugEvent::Exception { .. } => EventCategory::Exception,
            DebugEvent::ThreadCreated { .. } => EventCategory::CreateThread,
            DebugEvent::ThreadExited { .. } => EventCategory::ExitThread,
            DebugEvent::ProcessCreated { .. } => EventCategory::CreateProcess,
            DebugEvent::ProcessExited { .. } => EventCategory::ExitProcess,
            DebugEvent::ModuleLoaded { .. } => EventCategory::LoadModule,
            DebugEvent::ModuleUnloaded { .. } => EventCategory::UnloadModule,
            DebugEvent::SystemError { .. } => EventCategory::SystemError,
            DebugEvent::SessionStatus { .. } => EventCategory::SessionStatus,
            DebugEvent::DebuggeeStateChanged { .. } => EventCategory::ChangeDebuggeeState,
            DebugEvent::EngineStateChanged { .. } => EventCategory::ChangeEngineState,
            DebugEvent::SymbolStateChanged { .. } => EventCategory::ChangeSymbolState,
        }
    }
}

/// Routing key for engine events
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventCategory {
    Breakpoint,
    Exception,
    CreateThread,
    ExitThread,
    CreateProcess,
    ExitProcess,
    LoadModule,
    UnloadModule,
    SystemError,
    SessionStatus,
    ChangeDebuggeeState,
    ChangeEngineState,
    ChangeSymbolState,
}

impl EventCategory {
    /// Interest flag the engine needs before it reports this category
    pub fn interest(self) -> InterestMask {
        match self {
            EventCategory::Breakpoint => InterestMask::BREAKPOINT,
            EventCategory::Exception => InterestMask::EXCEPTION,
            EventCategory::CreateThread => InterestMask::CREATE_THREAD,
            EventCategory::ExitThread => InterestMask::EXIT_THREAD,
            EventCategory::CreateProcess => InterestMask::CREATE_PROCESS,
            EventCategory::ExitProcess => InterestMask::EXIT_PROCESS,
            EventCategory::LoadModule => InterestMask::LOAD_MODULE,
            EventCategory::UnloadModule => InterestMask::UNLOAD_MODULE,
            EventCategory::SystemError => InterestMask::SYSTEM_ERROR,
            EventCategory::SessionStatus => InterestMask::SESSION_STATUS,
            EventCategory::ChangeDebuggeeState => InterestMask::CHANGE_DEBUGGEE_STATE,
            EventCategory::ChangeEngineState => InterestMask::CHANGE_ENGINE_STATE,
            EventCategory::ChangeSymbolState => InterestMask::CHANGE_SYMBOL_STATE,
        }
    }
}

impl fmt::Display for EventCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EventCategory::Breakpoint => "BREAKPOINT",
            EventCategory::Exception => "EXCEPTION",
            EventCategory::CreateThread => "CREATE_THREAD",
            EventCategory::ExitThread => "EXIT_THREAD",
            EventCategory::CreateProcess => "CREATE_PROCESS",
            EventCategory::ExitProcess => "EXIT_PROCESS",
            EventCategory::LoadModule => "LOAD_MODULE",
            EventCategory::UnloadModule => "UNLOAD_MODULE",
            EventCategory::SystemError => "SYSTEM_ERROR",
            EventCategory::SessionStatus => "SESSION_STATUS",
            EventCategory::ChangeDebuggeeState => "CHANGE_DEBUGGEE_STATE",
            EventCategory::ChangeEngineState => "CHANGE_ENGINE_STATE",
            EventCategory::ChangeSymbolState => "CHANGE_SYMBOL_STATE",
        };
        f.write_str(name)
    }
}
