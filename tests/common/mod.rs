//! Scripted in-memory engine for session tests

#![allow(dead_code)]

use std::collections::{BTreeMap, HashMap, VecDeque};

use tether::debug::{SharedEventCallbacks, SharedOutputCallbacks};
use tether::{
    Breakpoint, BreakpointId, BreakpointKind, BreakpointOptions, Client, Control, DataSpaces,
    DebugEvent, DumpFormat, EngineError, InterestMask, Outcome, OutputMask, Registers, WatchMode,
};

pub fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// What the engine does when a command runs
#[derive(Debug, Default, Clone)]
pub struct Script {
    /// Printed while the command runs
    pub output: Vec<String>,
    /// Held back until the next flush
    pub buffered: Vec<String>,
    /// Raised while the command runs
    pub events: Vec<DebugEvent>,
}

impl Script {
    pub fn output(chunks: &[&str]) -> Self {
        Self {
            output: chunks.iter().map(|s| s.to_string()).collect(),
            ..Default::default()
        }
    }

    pub fn buffered(mut self, chunks: &[&str]) -> Self {
        self.buffered = chunks.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn event(mut self, event: DebugEvent) -> Self {
        self.events.push(event);
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SetBreakpoint {
    pub address: u64,
    pub kind: BreakpointKind,
    pub options: BreakpointOptions,
}

pub struct MockEngine {
    event_callbacks: Option<SharedEventCallbacks>,
    output_callbacks: Option<SharedOutputCallbacks>,
    /// Mask read at registration; events outside it are never reported
    registered_mask: InterestMask,

    /// Interest mask seen at every registration
    pub registrations: Vec<InterestMask>,
    pub scripts: HashMap<String, Script>,
    pub executed: Vec<String>,
    pending_output: Vec<String>,

    /// Flat memory starting at address 0
    pub memory: Vec<u8>,
    /// Cap on bytes accepted per write
    pub write_limit: Option<usize>,
    pub write_calls: usize,

    pub breakpoints: BTreeMap<BreakpointId, SetBreakpoint>,
    next_breakpoint: u32,

    pub queued_events: VecDeque<DebugEvent>,
    last_event: Option<DebugEvent>,
    /// Status the callbacks returned for each delivered event
    pub outcomes: Vec<Outcome>,
    pub statuses: Vec<Outcome>,
    pub lifecycle: Vec<String>,
    pub registers: HashMap<String, u64>,
}

impl MockEngine {
    pub fn new() -> Self {
        Self {
            event_callbacks: None,
            output_callbacks: None,
            registered_mask: InterestMask::empty(),
            registrations: Vec::new(),
            scripts: HashMap::new(),
            executed: Vec::new(),
            pending_output: Vec::new(),
            memory: vec![0; 0x2000],
            write_limit: None,
            write_calls: 0,
            breakpoints: BTreeMap::new(),
            next_breakpoint: 0,
            queued_events: VecDeque::new(),
            last_event: None,
            outcomes: Vec::new(),
            statuses: Vec::new(),
            lifecycle: Vec::new(),
            registers: HashMap::new(),
        }
    }

    pub fn script(mut self, command: &str, script: Script) -> Self {
        self.scripts.insert(command.to_string(), script);
        self
    }

    pub fn queue(mut self, event: DebugEvent) -> Self {
        self.queued_events.push_back(event);
        self
    }

    /// Print text the way the engine does outside any command
    pub fn print(&mut self, text: &str) {
        if let Some(callbacks) = &self.output_callbacks {
            callbacks.borrow_mut().on_output(OutputMask::NORMAL, text);
        }
    }

    fn deliver(&mut self, event: DebugEvent) {
        let category = event.category();
        if self.registered_mask.contains(category.interest()) {
            if let Some(callbacks) = &self.event_callbacks {
                let outcome = callbacks.borrow_mut().handle_event(&event);
                self.outcomes.push(outcome);
            }
        }
        self.last_event = Some(event);
    }

    fn add_breakpoint(
        &mut self,
        address: u64,
        kind: BreakpointKind,
        options: &BreakpointOptions,
    ) -> Breakpoint {
        let id = BreakpointId(self.next_breakpoint);
        self.next_breakpoint += 1;
        self.breakpoints.insert(
            id,
            SetBreakpoint {
                address,
                kind,
                options: options.clone(),
            },
        );
        Breakpoint { id, address, kind }
    }
}

impl Client for MockEngine {
    fn set_event_callbacks(&mut self, callbacks: SharedEventCallbacks) -> Result<(), EngineError> {
        self.registered_mask = callbacks.borrow().interest_mask();
        self.registrations.push(self.registered_mask);
        self.event_callbacks = Some(callbacks);
        Ok(())
    }

    fn set_output_callbacks(
        &mut self,
        callbacks: SharedOutputCallbacks,
    ) -> Result<(), EngineError> {
        self.output_callbacks = Some(callbacks);
        Ok(())
    }

    fn flush_output(&mut self) -> Result<(), EngineError> {
        for text in std::mem::take(&mut self.pending_output) {
            self.print(&text);
        }
        Ok(())
    }

    fn create_process(&mut self, command_line: &str) -> Result<(), EngineError> {
        self.lifecycle.push(format!("create {}", command_line));
        Ok(())
    }

    fn attach_process(&mut self, pid: u32) -> Result<(), EngineError> {
        self.lifecycle.push(format!("attach {}", pid));
        Ok(())
    }

    fn detach_processes(&mut self) -> Result<(), EngineError> {
        self.lifecycle.push("detach".into());
        Ok(())
    }

    fn terminate_processes(&mut self) -> Result<(), EngineError> {
        self.lifecycle.push("terminate".into());
        Ok(())
    }

    fn open_dump_file(&mut self, path: &str) -> Result<(), EngineError> {
        self.lifecycle.push(format!("open {}", path));
        Ok(())
    }

    fn write_dump_file(&mut self, path: &str, format: DumpFormat) -> Result<(), EngineError> {
        self.lifecycle.push(format!("write {} {:?}", path, format));
        Ok(())
    }
}

impl Control for MockEngine {
    fn execute(&mut self, command: &str) -> Result<(), EngineError> {
        self.executed.push(command.to_string());
        let Some(script) = self.scripts.get(command).cloned() else {
            return Err(EngineError::call_failed("execute", format!("unknown command {:?}", command)));
        };

        for text in &script.output {
            self.print(text);
        }
        for event in script.events {
            self.deliver(event);
        }
        self.pending_output.extend(script.buffered);
        Ok(())
    }

    fn set_breakpoint(
        &mut self,
        address: u64,
        options: &BreakpointOptions,
    ) -> Result<Breakpoint, EngineError> {
        Ok(self.add_breakpoint(address, BreakpointKind::Code, options))
    }

    fn set_watchpoint(
        &mut self,
        address: u64,
        size: usize,
        mode: WatchMode,
        options: &BreakpointOptions,
    ) -> Result<Breakpoint, EngineError> {
        Ok(self.add_breakpoint(address, BreakpointKind::Data { size, mode }, options))
    }

    fn remove_breakpoint(&mut self, id: BreakpointId) -> Result<(), EngineError> {
        self.breakpoints
            .remove(&id)
            .map(|_| ())
            .ok_or_else(|| EngineError::call_failed("remove breakpoint", id))
    }

    fn set_execution_status(&mut self, status: Outcome) -> Result<(), EngineError> {
        self.statuses.push(status);
        Ok(())
    }

    fn wait_for_event(&mut self) -> Result<(), EngineError> {
        let event = self
            .queued_events
            .pop_front()
            .ok_or_else(|| EngineError::call_failed("wait for event", "no debuggee"))?;
        self.deliver(event);
        Ok(())
    }

    fn last_event(&mut self) -> Result<Option<DebugEvent>, EngineError> {
        Ok(self.last_event.clone())
    }
}

impl DataSpaces for MockEngine {
    fn read(&mut self, address: u64, count: usize) -> Result<Vec<u8>, EngineError> {
        let start = (address as usize).min(self.memory.len());
        let end = start.saturating_add(count).min(self.memory.len());
        Ok(self.memory[start..end].to_vec())
    }

    fn write(&mut self, address: u64, data: &[u8]) -> Result<usize, EngineError> {
        self.write_calls += 1;
        let start = (address as usize).min(self.memory.len());
        let len = self
            .write_limit
            .unwrap_or(data.len())
            .min(data.len())
            .min(self.memory.len().saturating_sub(start));
        self.memory[start..start + len].copy_from_slice(&data[..len]);
        Ok(len)
    }

    fn search(
        &mut self,
        pattern: &[u8],
        address: u64,
        count: usize,
        alignment: usize,
    ) -> Result<Option<u64>, EngineError> {
        let window = self.read(address, count)?;
        Ok(tether::core::memory::find_pattern(&window, pattern, 0, alignment)
            .map(|offset| address + offset as u64))
    }
}

impl Registers for MockEngine {
    fn value(&mut self, name: &str) -> Result<u64, EngineError> {
        self.registers
            .get(name)
            .copied()
            .ok_or_else(|| EngineError::call_failed("get register", name))
    }

    fn set_value(&mut self, name: &str, value: u64) -> Result<(), EngineError> {
        self.registers.insert(name.to_string(), value);
        Ok(())
    }
}
