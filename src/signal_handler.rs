use std::io::{self, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use nix::sys::signal::{sigaction, SaFlags, SigAction, SigHandler, SigSet, Signal};

static INTERRUPTED: AtomicBool = AtomicBool::new(false);

/// Held by tests that set or consume the interrupt flag.
#[cfg(test)]
pub(crate) static INTERRUPT_LOCK: Mutex<()> = Mutex::new(());

extern "C" fn on_sigint(_: libc::c_int) {
    INTERRUPTED.store(true, Ordering::SeqCst);
}

/// Turns SIGINT into a prompt redraw while the read-loop waits for input.
///
/// The handler only sets a flag; a watcher thread polls it and reprints the
/// prompt when one is registered. Foreground children are not signalled
/// from here.
pub struct SignalHandler {
    waiting_prompt: Arc<Mutex<Option<String>>>,
}

impl SignalHandler {
    pub fn new() -> Self {
        SignalHandler {
            waiting_prompt: Arc::new(Mutex::new(None)),
        }
    }

    /// Prompt to redraw on interrupt, or `None` while a pipeline runs.
    ///
    /// Registering a prompt discards any interrupt that arrived before it was
    /// printed.
    pub fn set_prompt(&self, prompt: Option<String>) {
        if prompt.is_some() {
            Self::take_interrupt();
        }
        if let Ok(mut waiting) = self.waiting_prompt.lock() {
            *waiting = prompt;
        }
    }

    /// Consume a pending interrupt.
    pub fn take_interrupt() -> bool {
        INTERRUPTED.swap(false, Ordering::SeqCst)
    }

    pub fn setup_handler(&self) -> nix::Result<()> {
        static HANDLER_SET: AtomicBool = AtomicBool::new(false);

        if HANDLER_SET.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        let action = SigAction::new(SigHandler::Handler(on_sigint), SaFlags::SA_RESTART, SigSet::empty());
        unsafe { sigaction(Signal::SIGINT, &action) }?;

        let waiting_prompt = Arc::clone(&self.waiting_prompt);
        thread::spawn(move || loop {
            thread::sleep(Duration::from_millis(100));

            if !Self::take_interrupt() {
                continue;
            }
            if let Ok(waiting) = waiting_prompt.lock() {
                if let Some(prompt) = waiting.as_deref() {
                    let mut stdout = io::stdout();
                    let _ = write!(stdout, "\n{}", prompt);
                    let _ = stdout.flush();
                }
            }
        });

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interrupt_flag_is_consumed_once() {
        let _guard = INTERRUPT_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        INTERRUPTED.store(true, Ordering::SeqCst);
        assert!(SignalHandler::take_interrupt());
        assert!(!SignalHandler::take_interrupt());
    }

    #[test]
    fn prompt_can_be_cleared() {
        let _guard = INTERRUPT_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        let handler = SignalHandler::new();
        handler.set_prompt(Some("$ ".to_string()));
        assert_eq!(handler.waiting_prompt.lock().unwrap().as_deref(), Some("$ "));
        handler.set_prompt(None);
        assert!(handler.waiting_prompt.lock().unwrap().is_none());
    }

    #[test]
    fn interrupt_before_prompt_is_discarded() {
        let _guard = INTERRUPT_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        let handler = SignalHandler::new();
        INTERRUPTED.store(true, Ordering::SeqCst);
        handler.set_prompt(Some("$ ".to_string()));
        assert!(!SignalHandler::take_interrupt());

        INTERRUPTED.store(true, Ordering::SeqCst);
        handler.set_prompt(None);
        assert!(SignalHandler::take_interrupt());
    }
}
