//! What happens when the system cannot continue.

use std::thread;

use log::error;

/// Terminal error policy. Implementations never return.
pub trait FatalHandler: Send + Sync + 'static {
    fn fatal_error(&self, message: &str) -> !;
}

/// Logs the message and parks the calling task forever.
///
/// The engine is already halted when a handler runs, so any other task that
/// asks for the transition lock or starts a cycle parks here too. Readers keep
/// observing the last state until the watchdog or an operator reboots the
/// board.
#[derive(Debug, Clone, Copy, Default)]
pub struct HaltOnFatal;

impl FatalHandler for HaltOnFatal {
    fn fatal_error(&self, message: &str) -> ! {
        error!("fatal error: {message}");
        loop {
            thread::park();
        }
    }
}

/// Logs the message and panics, unwinding the calling task.
#[derive(Debug, Clone, Copy, Default)]
pub struct PanicOnFatal;

impl FatalHandler for PanicOnFatal {
    fn fatal_error(&self, message: &str) -> ! {
        error!("fatal error: {message}");
        panic!("fatal error: {message}");
    }
}
