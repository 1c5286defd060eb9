//! Interrupt handling (SIGINT)
//!
//! While a debugger session owns the terminal, Ctrl-C belongs to the
//! debugger and is ignored here. At any other time an interrupt ends the
//! invocation with [`EXIT_CODE_INTERRUPTED`].

use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::Arc;

/// Exit code for interrupted invocations (128 + SIGINT)
pub const EXIT_CODE_INTERRUPTED: i32 = 130;

/// Interrupt state shared with the handler thread
#[derive(Debug, Default)]
pub struct SignalState {
    /// Nesting depth of active debugger sessions
    debug_sessions: AtomicUsize,
    /// Interrupts received so far
    signal_count: AtomicU32,
}

impl SignalState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn in_debug_session(&self) -> bool {
        self.debug_sessions.load(Ordering::SeqCst) > 0
    }

    pub fn signal_count(&self) -> u32 {
        self.signal_count.load(Ordering::SeqCst)
    }

    /// Record an interrupt and decide what to do with it
    pub fn handle_signal(&self) -> SignalAction {
        self.signal_count.fetch_add(1, Ordering::SeqCst);
        if self.in_debug_session() {
            SignalAction::Ignore
        } else {
            SignalAction::Exit
        }
    }

    /// Mark a debugger session active until the guard drops.
    pub fn debug_session(self: &Arc<Self>) -> DebugSessionGuard {
        self.debug_sessions.fetch_add(1, Ordering::SeqCst);
        DebugSessionGuard {
            state: Arc::clone(self),
        }
    }
}

/// Action to take after receiving a signal
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalAction {
    /// The debugger owns the interrupt
    Ignore,
    /// Terminate with [`EXIT_CODE_INTERRUPTED`]
    Exit,
}

/// Ends a debugger session on drop
#[derive(Debug)]
pub struct DebugSessionGuard {
    state: Arc<SignalState>,
}

impl Drop for DebugSessionGuard {
    fn drop(&mut self) {
        self.state.debug_sessions.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Installs the process-wide interrupt handler
pub struct SignalHandler {
    state: Arc<SignalState>,
}

impl SignalHandler {
    pub fn new() -> Self {
        Self {
            state: Arc::new(SignalState::new()),
        }
    }

    pub fn with_state(state: Arc<SignalState>) -> Self {
        Self { state }
    }

    pub fn state(&self) -> Arc<SignalState> {
        Arc::clone(&self.state)
    }

    /// Install the handler. `on_exit` runs on the handler thread for
    /// interrupts outside a debugger session.
    ///
    /// Must be called once at program startup.
    pub fn install<F>(&self, on_exit: F) -> Result<(), ctrlc::Error>
    where
        F: Fn() + Send + 'static,
    {
        let state = Arc::clone(&self.state);
        ctrlc::set_handler(move || match state.handle_signal() {
            SignalAction::Exit => {
                eprintln!("\nInterrupted");
                on_exit();
            }
            SignalAction::Ignore => {}
        })
    }
}

impl Default for SignalHandler {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_interrupt_outside_session_exits() {
        let state = SignalState::new();
        assert_eq!(state.handle_signal(), SignalAction::Exit);
        assert_eq!(state.signal_count(), 1);
    }

    #[test]
    fn test_interrupt_during_session_ignored() {
        let state = Arc::new(SignalState::new());
        let guard = state.debug_session();
        assert!(state.in_debug_session());
        assert_eq!(state.handle_signal(), SignalAction::Ignore);
        assert_eq!(state.handle_signal(), SignalAction::Ignore);

        drop(guard);
        assert!(!state.in_debug_session());
        assert_eq!(state.handle_signal(), SignalAction::Exit);
        assert_eq!(state.signal_count(), 3);
    }

    #[test]
    fn test_nested_sessions() {
        let state = Arc::new(SignalState::new());
        let outer = state.debug_session();
        let inner = state.debug_session();
        drop(inner);
        assert!(state.in_debug_session());
        drop(outer);
        assert!(!state.in_debug_session());
    }

    #[test]
    fn test_handler_shares_state() {
        let handler = SignalHandler::new();
        let state = handler.state();
        let _guard = state.debug_session();
        assert!(handler.state().in_debug_session());
    }
}
