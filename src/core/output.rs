//! Output - Scoped capture of engine output
//!
//! The sink only records text while a capture bracket is open, so a caller
//! gets exactly the output of the commands it ran inside the bracket.

use std::cell::RefCell;
use std::rc::Rc;

use crate::debug::types::OutputMask;
use crate::debug::OutputCallbacks;

/// Accumulates engine output while gathering
#[derive(Debug, Default)]
pub struct OutputSink {
    collection: Vec<String>,
    gathering: bool,
}

impl OutputSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Clear the buffer and begin gathering
    pub fn start(&mut self) {
        self.collection.clear();
        self.gathering = true;
    }

    /// Stop gathering; the buffer is kept
    pub fn stop(&mut self) {
        self.gathering = false;
    }

    pub fn get(&self) -> &[String] {
        &self.collection
    }

    /// Drain the buffer
    pub fn take(&mut self) -> Vec<String> {
        std::mem::take(&mut self.collection)
    }

    pub fn is_gathering(&self) -> bool {
        self.gathering
    }

    /// Captured text split into lines, ignoring how the engine chunked it
    pub fn lines(&self) -> Vec<String> {
        let text = self.collection.concat();
        text.lines().map(str::to_string).collect()
    }
}

impl OutputCallbacks for OutputSink {
    fn on_output(&mut self, _mask: OutputMask, text: &str) {
        if self.gathering {
            self.collection.push(text.to_string());
        }
    }
}

/// A sink shared with the engine
pub type SharedOutput = Rc<RefCell<OutputSink>>;

/// Open capture bracket
///
/// Gathering stops when the guard is finished or dropped, including on
/// early returns and unwinding.
#[must_use = "output is only gathered while the capture is alive"]
pub struct Capture {
    sink: SharedOutput,
}

impl Capture {
    pub fn begin(sink: &SharedOutput) -> Self {
        sink.borrow_mut().start();
        Self {
            sink: Rc::clone(sink),
        }
    }

    /// Close the bracket and return what was gathered
    pub fn finish(self) -> Vec<String> {
        let mut sink = self.sink.borrow_mut();
        sink.stop();
        sink.get().to_vec()
    }
}

impl Drop for Capture {
    fn drop(&mut self) {
        if let Ok(mut sink) = self.sink.try_borrow_mut() {
            sink.stop();
        }
    }
}
