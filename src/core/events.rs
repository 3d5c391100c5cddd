//! Events - Routing engine events to user handlers
//!
//! The router holds the interest mask the engine pulls on registration, a
//! handler per event category, and a callback per breakpoint. Breakpoint
//! events go through a built-in handler that looks the breakpoint up in the
//! callback registry.
//!
//! Nothing a handler does may unwind into the engine: errors and panics are
//! reported on the error stream and turned into [`Outcome::Ignored`].

use std::collections::HashMap;
use std::fmt;
use std::io::Write;
use std::panic::{self, AssertUnwindSafe};

use crate::debug::types::{
    BreakpointEvent, BreakpointId, DebugEvent, EventCategory, InterestMask, Outcome,
};
use crate::debug::EventCallbacks;

/// Result of a user handler; `Ok(None)` means "handled"
pub type HandlerResult = anyhow::Result<Option<Outcome>>;

/// Handler for one event category
pub type EventHandler = Box<dyn FnMut(&DebugEvent) -> HandlerResult>;

/// Callback attached to a single breakpoint or watchpoint
pub type BreakpointCallback = Box<dyn FnMut(&BreakpointEvent) -> HandlerResult>;

enum Handler {
    /// Dispatch into the breakpoint callback registry
    Breakpoints,
    User(EventHandler),
}

/// How a dispatch went
#[derive(Debug)]
pub enum Dispatch {
    /// No handler registered for the category
    Unhandled,
    /// A handler ran; `None` if it expressed no preference
    Completed(Option<Outcome>),
    /// The handler returned an error or panicked
    Failed(anyhow::Error),
}

impl Dispatch {
    /// Status handed back to the engine
    pub fn outcome(&self) -> Outcome {
        match self {
            Dispatch::Unhandled | Dispatch::Completed(None) => Outcome::Handled,
            Dispatch::Completed(Some(outcome)) => *outcome,
            Dispatch::Failed(_) => Outcome::Ignored,
        }
    }
}

/// Maps engine events to handlers
pub struct EventRouter {
    interest_mask: InterestMask,
    handlers: HashMap<EventCategory, Handler>,
    breakpoint_callbacks: HashMap<BreakpointId, BreakpointCallback>,
    /// Where handler failures are reported
    errors: Box<dyn Write>,
}

impl EventRouter {
    pub fn new(interest_mask: InterestMask) -> Self {
        let mut handlers = HashMap::new();
        handlers.insert(EventCategory::Breakpoint, Handler::Breakpoints);

        Self {
            interest_mask,
            handlers,
            breakpoint_callbacks: HashMap::new(),
            errors: Box::new(std::io::stderr()),
        }
    }

    /// Send handler diagnostics somewhere other than stderr
    pub fn with_error_stream(mut self, errors: impl Write + 'static) -> Self {
        self.errors = Box::new(errors);
        self
    }

    pub fn interest_mask(&self) -> InterestMask {
        self.interest_mask
    }

    pub fn set_interest_mask(&mut self, mask: InterestMask) {
        self.interest_mask = mask;
    }

    pub fn add_interest(&mut self, interest: InterestMask) {
        self.interest_mask |= interest;
    }

    /// True if any of `interest` is set
    pub fn has_interest(&self, interest: InterestMask) -> bool {
        self.interest_mask.intersects(interest)
    }

    /// Install the handler for `category`, replacing any previous one
    pub fn set_handler<F>(&mut self, category: EventCategory, handler: F)
    where
        F: FnMut(&DebugEvent) -> HandlerResult + 'static,
    {
        self.handlers
            .insert(category, Handler::User(Box::new(handler)));
    }

    pub fn has_handler(&self, category: EventCategory) -> bool {
        self.handlers.contains_key(&category)
    }

    pub fn set_breakpoint_callback<F>(&mut self, id: BreakpointId, callback: F)
    where
        F: FnMut(&BreakpointEvent) -> HandlerResult + 'static,
    {
        self.breakpoint_callbacks.insert(id, Box::new(callback));
    }

    /// Forget the callback for `id`; returns whether one was registered
    pub fn remove_breakpoint_callback(&mut self, id: BreakpointId) -> bool {
        self.breakpoint_callbacks.remove(&id).is_some()
    }

    pub fn has_breakpoint_callback(&self, id: BreakpointId) -> bool {
        self.breakpoint_callbacks.contains_key(&id)
    }

    /// Run the callback registered for this breakpoint, if any
    pub fn on_breakpoint_hit(&mut self, hit: &BreakpointEvent) -> Option<HandlerResult> {
        self.breakpoint_callbacks
            .get_mut(&hit.id)
            .map(|callback| callback(hit))
    }

    /// Route `event` to its handler without reducing the result
    pub fn dispatch(&mut self, event: &DebugEvent) -> Dispatch {
        let category = event.category();

        let result = match self.handlers.get_mut(&category) {
            None => return Dispatch::Unhandled,
            Some(Handler::User(handler)) => catch_handler_panic(|| handler(event)),
            Some(Handler::Breakpoints) => match event {
                DebugEvent::Breakpoint(hit) => {
                    let Some(callback) = self.breakpoint_callbacks.get_mut(&hit.id) else {
                        log::trace!("No callback for breakpoint {}", hit.id);
                        return Dispatch::Unhandled;
                    };
                    catch_handler_panic(|| callback(hit))
                }
                _ => return Dispatch::Unhandled,
            },
        };

        match result {
            Ok(outcome) => Dispatch::Completed(outcome),
            Err(e) => Dispatch::Failed(e),
        }
    }

    fn report_failure(&mut self, category: EventCategory, error: &anyhow::Error) {
        log::error!("{} handler failed: {:#}", category, error);
        let _ = writeln!(self.errors, "{} handler failed: {:?}", category, error);
    }
}

fn catch_handler_panic(f: impl FnOnce() -> HandlerResult) -> HandlerResult {
    match panic::catch_unwind(AssertUnwindSafe(f)) {
        Ok(result) => result,
        Err(payload) => {
            let message = payload
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            Err(anyhow::anyhow!("handler panicked: {}", message))
        }
    }
}

impl Default for EventRouter {
    fn default() -> Self {
        Self::new(InterestMask::default())
    }
}

impl fmt::Debug for EventRouter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut categories: Vec<_> = self.handlers.keys().map(|c| c.to_string()).collect();
        categories.sort();
        f.debug_struct("EventRouter")
            .field("interest_mask", &self.interest_mask)
            .field("handlers", &categories)
            .field("breakpoint_callbacks", &self.breakpoint_callbacks.len())
            .finish()
    }
}

impl EventCallbacks for EventRouter {
    fn interest_mask(&self) -> InterestMask {
        self.interest_mask
    }

    fn handle_event(&mut self, event: &DebugEvent) -> Outcome {
        let dispatch = self.dispatch(event);
        if let Dispatch::Failed(error) = &dispatch {
            self.report_failure(event.category(), error);
        }
        dispatch.outcome()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::{Cell, RefCell};
    use std::rc::Rc;

    /// Error stream the test can inspect afterwards
    #[derive(Clone, Default)]
    struct SharedBuf(Rc<RefCell<Vec<u8>>>);

    impl Write for SharedBuf {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.borrow_mut().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    impl SharedBuf {
        fn text(&self) -> String {
            String::from_utf8_lossy(&self.0.borrow()).into_owned()
        }
    }

    fn exception() -> DebugEvent {
        DebugEvent::Exception {
            code: 0xC000_0005,
            address: 0x4010_00,
            first_chance: true,
        }
    }

    fn hit(id: u32) -> DebugEvent {
        DebugEvent::Breakpoint(BreakpointEvent {
            id: BreakpointId(id),
            address: 0x1000,
            thread_id: 1,
        })
    }

    #[test]
    fn test_unknown_category_is_handled() {
        let errors = SharedBuf::default();
        let mut router = EventRouter::default().with_error_stream(errors.clone());
        assert!(matches!(router.dispatch(&exception()), Dispatch::Unhandled));
        assert_eq!(router.handle_event(&exception()), Outcome::Handled);
        assert!(errors.text().is_empty());
    }

    #[test]
    fn test_handler_outcome() {
        let mut router = EventRouter::default();
        router.set_handler(EventCategory::Exception, |_| {
            Ok(Some(Outcome::Break))
        });
        assert_eq!(router.handle_event(&exception()), Outcome::Break);

        router.set_handler(EventCategory::Exception, |_| Ok(None));
        assert_eq!(router.handle_event(&exception()), Outcome::Handled);
    }

    #[test]
    fn test_failing_handler_is_contained() {
        let errors = SharedBuf::default();
        let mut router = EventRouter::default().with_error_stream(errors.clone());
        router.set_handler(EventCategory::Exception, |_| {
            anyhow::bail!("access violation handler exploded")
        });

        assert_eq!(router.handle_event(&exception()), Outcome::Ignored);
        assert!(errors.text().contains("EXCEPTION handler failed"));
        assert!(errors.text().contains("exploded"));
        assert!(router.has_handler(EventCategory::Exception));
        assert!(matches!(router.dispatch(&exception()), Dispatch::Failed(_)));
    }

    #[test]
    fn test_panicking_handler_is_contained() {
        let errors = SharedBuf::default();
        let mut router = EventRouter::default().with_error_stream(errors.clone());
        router.set_handler(EventCategory::Exception, |_| {
            panic!("boom")
        });

        assert_eq!(router.handle_event(&exception()), Outcome::Ignored);
        assert!(errors.text().contains("handler panicked: boom"));
    }

    #[test]
    fn test_breakpoint_callback_dispatch() {
        let mut router = EventRouter::default();
        let hits = Rc::new(Cell::new(0));
        let counter = Rc::clone(&hits);
        router.set_breakpoint_callback(BreakpointId(3), move |hit| {
            assert_eq!(hit.address, 0x1000);
            counter.set(counter.get() + 1);
            Ok(Some(Outcome::Break))
        });

        assert_eq!(router.handle_event(&hit(3)), Outcome::Break);
        assert_eq!(hits.get(), 1);

        // Someone else's breakpoint
        assert!(matches!(router.dispatch(&hit(4)), Dispatch::Unhandled));
        assert_eq!(router.handle_event(&hit(4)), Outcome::Handled);
        assert_eq!(hits.get(), 1);
    }

    #[test]
    fn test_on_breakpoint_hit_lookup() {
        let mut router = EventRouter::default();
        router.set_breakpoint_callback(BreakpointId(1), |_| Ok(None));
        let DebugEvent::Breakpoint(event) = hit(1) else {
            unreachable!()
        };
        assert!(matches!(router.on_breakpoint_hit(&event), Some(Ok(None))));

        assert!(router.remove_breakpoint_callback(BreakpointId(1)));
        assert!(!router.remove_breakpoint_callback(BreakpointId(1)));
        assert!(router.on_breakpoint_hit(&event).is_none());
    }

    #[test]
    fn test_user_breakpoint_handler_replaces_registry() {
        let mut router = EventRouter::default();
        router.set_breakpoint_callback(BreakpointId(1), |_| {
            Ok(Some(Outcome::Break))
        });
        router.set_handler(EventCategory::Breakpoint, |_| {
            Ok(Some(Outcome::Go))
        });
        assert_eq!(router.handle_event(&hit(1)), Outcome::Go);
    }

    #[test]
    fn test_interest_mask() {
        let mut router = EventRouter::new(InterestMask::BREAKPOINT);
        assert!(!router.has_interest(InterestMask::LOAD_MODULE));

        router.add_interest(InterestMask::LOAD_MODULE);
        let once = router.interest_mask();
        router.add_interest(InterestMask::LOAD_MODULE);
        assert_eq!(router.interest_mask(), once);
        assert!(router.has_interest(InterestMask::LOAD_MODULE));
        assert!(router.has_interest(InterestMask::BREAKPOINT));

        router.set_interest_mask(InterestMask::EXCEPTION);
        assert_eq!(router.interest_mask(), InterestMask::EXCEPTION);
    }
}
