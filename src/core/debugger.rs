//! Debugger - Session over a native debugging engine
//!
//! Owns the output sink and the event router, registers both with the
//! engine, and composes them with the engine's control and memory
//! interfaces. Everything runs on the caller's thread: events are delivered
//! from inside `execute` and `wait_for_event`.

use std::cell::{Ref, RefCell};
use std::rc::Rc;

use thiserror::Error;

use super::config::DebuggerConfig;
use super::events::{EventRouter, HandlerResult};
use super::memory::{AddressSpace, MemoryError};
use super::output::{Capture, OutputSink, SharedOutput};
use crate::debug::types::{
    Breakpoint, BreakpointEvent, BreakpointId, BreakpointOptions, DebugEvent, DumpFormat,
    EventCategory, InterestMask, Outcome, WatchMode,
};
use crate::debug::{
    Control, Engine, EngineError, Registers, SharedEventCallbacks, SharedOutputCallbacks,
};

/// Session-level errors
#[derive(Error, Debug)]
pub enum SessionError {
    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error(transparent)]
    Memory(#[from] MemoryError),
}

/// Debugging session
pub struct Debugger<E: Engine> {
    engine: E,
    output: SharedOutput,
    events: Rc<RefCell<EventRouter>>,
    config: DebuggerConfig,
}

impl<E: Engine> Debugger<E> {
    /// Create a session with the default configuration
    pub fn new(engine: E) -> Result<Self, SessionError> {
        Self::with_config(engine, DebuggerConfig::default())
    }

    /// Create a session and register its callbacks with `engine`
    pub fn with_config(engine: E, config: DebuggerConfig) -> Result<Self, SessionError> {
        let router = EventRouter::new(config.interest_mask);
        Self::with_router(engine, config, router)
    }

    /// Create a session around a preconfigured router
    ///
    /// The router's interest mask wins over the one in `config`.
    pub fn with_router(
        mut engine: E,
        config: DebuggerConfig,
        router: EventRouter,
    ) -> Result<Self, SessionError> {
        let output: SharedOutput = Rc::new(RefCell::new(OutputSink::new()));
        let events = Rc::new(RefCell::new(router));

        let output_callbacks: SharedOutputCallbacks = output.clone();
        engine.set_output_callbacks(output_callbacks)?;

        let mut debugger = Self {
            engine,
            output,
            events,
            config,
        };
        debugger.register_events()?;

        log::info!(
            "Debugger initialized (interest mask {:?})",
            debugger.interest_mask()
        );
        Ok(debugger)
    }

    /// Hand the router to the engine again so it re-reads the interest mask
    fn register_events(&mut self) -> Result<(), EngineError> {
        let callbacks: SharedEventCallbacks = self.events.clone();
        self.engine.set_event_callbacks(callbacks)
    }

    /// Run an engine command and return the output it produced
    pub fn execute(&mut self, command: &str) -> Result<Vec<String>, SessionError> {
        log::debug!("Executing {:?}", command);

        let capture = Capture::begin(&self.output);
        self.engine.execute(command)?;
        if self.config.flush_output {
            self.engine.flush_output()?;
        }
        Ok(capture.finish())
    }

    /// Output of the most recent `execute`
    pub fn output(&self) -> Ref<'_, OutputSink> {
        self.output.borrow()
    }

    /// Set a code breakpoint and route its hits to `callback`
    pub fn breakpoint<F>(
        &mut self,
        address: u64,
        callback: F,
        options: BreakpointOptions,
    ) -> Result<Breakpoint, SessionError>
    where
        F: FnMut(&BreakpointEvent) -> HandlerResult + 'static,
    {
        let bp = self.engine.set_breakpoint(address, &options)?;
        log::debug!("Breakpoint {} set at {:#x}", bp.id, address);

        self.events
            .borrow_mut()
            .set_breakpoint_callback(bp.id, callback);
        Ok(bp)
    }

    /// Set a data breakpoint over `size` bytes and route its hits to `callback`
    pub fn watchpoint<F>(
        &mut self,
        address: u64,
        size: usize,
        callback: F,
        mode: WatchMode,
        options: BreakpointOptions,
    ) -> Result<Breakpoint, SessionError>
    where
        F: FnMut(&BreakpointEvent) -> HandlerResult + 'static,
    {
        let bp = self.engine.set_watchpoint(address, size, mode, &options)?;
        log::debug!(
            "Watchpoint {} set at {:#x} ({} bytes, {:?})",
            bp.id,
            address,
            size,
            mode
        );

        self.events
            .borrow_mut()
            .set_breakpoint_callback(bp.id, callback);
        Ok(bp)
    }

    /// Remove a breakpoint or watchpoint and forget its callback
    pub fn remove_breakpoint(&mut self, id: BreakpointId) -> Result<(), SessionError> {
        log::debug!("Removing breakpoint {}", id);
        self.engine.remove_breakpoint(id)?;
        self.events.borrow_mut().remove_breakpoint_callback(id);
        Ok(())
    }

    /// Install the handler for `category`, subscribing to it if needed
    pub fn set_event_handler<F>(
        &mut self,
        category: EventCategory,
        handler: F,
    ) -> Result<(), SessionError>
    where
        F: FnMut(&DebugEvent) -> HandlerResult + 'static,
    {
        self.events.borrow_mut().set_handler(category, handler);

        let interest = category.interest();
        if !self.events.borrow().has_interest(interest) {
            self.add_interest(interest)?;
        }
        Ok(())
    }

    /// Subscribe to more events; takes effect immediately
    pub fn add_interest(&mut self, interest: InterestMask) -> Result<(), SessionError> {
        self.events.borrow_mut().add_interest(interest);
        log::debug!("Interest mask now {:?}", self.interest_mask());
        self.register_events()?;
        Ok(())
    }

    /// Replace the interest mask; takes effect immediately
    pub fn set_interest_mask(&mut self, interest_mask: InterestMask) -> Result<(), SessionError> {
        self.events.borrow_mut().set_interest_mask(interest_mask);
        log::debug!("Interest mask set to {:?}", interest_mask);
        self.register_events()?;
        Ok(())
    }

    pub fn interest_mask(&self) -> InterestMask {
        self.events.borrow().interest_mask()
    }

    /// Read-only view of the router
    pub fn events(&self) -> Ref<'_, EventRouter> {
        self.events.borrow()
    }

    /// Block until the engine has dispatched the next event
    pub fn wait_for_event(&mut self) -> Result<(), SessionError> {
        self.engine.wait_for_event()?;
        Ok(())
    }

    /// Wait for the next event and return it
    pub fn next_event(&mut self) -> Result<Option<DebugEvent>, SessionError> {
        self.wait_for_event()?;
        Ok(self.engine.last_event()?)
    }

    fn resume(&mut self, status: Outcome) -> Result<(), SessionError> {
        self.engine.set_execution_status(status)?;
        self.wait_for_event()
    }

    pub fn go(&mut self) -> Result<(), SessionError> {
        self.resume(Outcome::Go)
    }

    pub fn step_into(&mut self) -> Result<(), SessionError> {
        self.resume(Outcome::StepInto)
    }

    pub fn step_over(&mut self) -> Result<(), SessionError> {
        self.resume(Outcome::StepOver)
    }

    /// Run to the next branch instruction
    pub fn step_branch(&mut self) -> Result<(), SessionError> {
        self.resume(Outcome::StepBranch)
    }

    /// Start a new process under the debugger
    pub fn spawn(&mut self, command_line: &str) -> Result<(), SessionError> {
        log::info!("Spawning {:?}", command_line);
        self.engine.create_process(command_line)?;
        Ok(())
    }

    /// Attach to an existing process by PID
    pub fn attach(&mut self, pid: u32) -> Result<(), SessionError> {
        log::info!("Attaching to process {}", pid);
        self.engine.attach_process(pid)?;
        Ok(())
    }

    pub fn detach(&mut self) -> Result<(), SessionError> {
        log::info!("Detaching from all processes");
        self.engine.detach_processes()?;
        Ok(())
    }

    pub fn terminate(&mut self) -> Result<(), SessionError> {
        log::info!("Terminating all processes");
        self.engine.terminate_processes()?;
        Ok(())
    }

    /// Open a crash dump as the debuggee
    pub fn open_dump(&mut self, path: &str) -> Result<(), SessionError> {
        log::info!("Opening dump {}", path);
        self.engine.open_dump_file(path)?;
        Ok(())
    }

    pub fn write_dump(&mut self, path: &str, format: DumpFormat) -> Result<(), SessionError> {
        log::info!("Writing {:?} dump to {}", format, path);
        self.engine.write_dump_file(path, format)?;
        Ok(())
    }

    /// Debuggee memory
    pub fn memory(&mut self) -> AddressSpace<'_, E> {
        AddressSpace::new(&mut self.engine)
    }

    pub fn registers(&mut self) -> &mut dyn Registers {
        &mut self.engine
    }

    pub fn control(&mut self) -> &mut dyn Control {
        &mut self.engine
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    pub fn engine_mut(&mut self) -> &mut E {
        &mut self.engine
    }

    pub fn config(&self) -> &DebuggerConfig {
        &self.config
    }
}
