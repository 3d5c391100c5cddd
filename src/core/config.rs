//! Session configuration

use crate::debug::types::InterestMask;

/// Settings applied when a [`Debugger`](super::debugger::Debugger) is created
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DebuggerConfig {
    /// Events the engine reports from the start
    pub interest_mask: InterestMask,
    /// Flush engine output before closing each `execute` capture
    pub flush_output: bool,
}

impl Default for DebuggerConfig {
    fn default() -> Self {
        Self {
            interest_mask: InterestMask::default(),
            flush_output: true,
        }
    }
}

impl DebuggerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_interest_mask(mut self, interest_mask: InterestMask) -> Self {
        self.interest_mask = interest_mask;
        self
    }

    pub fn with_flush_output(mut self, flush_output: bool) -> Self {
        self.flush_output = flush_output;
        self
    }
}
