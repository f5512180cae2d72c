//! Process-wide fatal-exit callback
//!
//! Backends report unrecoverable errors through [`fatal_exit`], which by
//! default terminates the process. While a command runs under the
//! [`CommandRunner`](super::CommandRunner) the callback is swapped for one
//! that unwinds the backend call with a [`FatalExit`] payload instead.

use std::panic;
use std::sync::{Arc, Mutex, PoisonError, RwLock};

/// Callback invoked with the requested exit code
pub type ExitHandler = Arc<dyn Fn(i32) + Send + Sync>;

static EXIT_HANDLER: RwLock<Option<ExitHandler>> = RwLock::new(None);

/// Unwind payload carrying an intercepted exit code
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct FatalExit {
    pub code: i32,
}

/// Request abnormal termination of the process.
///
/// Runs the installed exit handler, falling back to `std::process::exit`
/// when none is installed or the handler returns.
pub fn fatal_exit(code: i32) -> ! {
    let handler = EXIT_HANDLER
        .read()
        .unwrap_or_else(PoisonError::into_inner)
        .clone();

    if let Some(handler) = handler {
        handler(code);
    }

    std::process::exit(code)
}

/// Swap the exit handler, returning the previous one
pub fn replace_exit_handler(handler: Option<ExitHandler>) -> Option<ExitHandler> {
    let mut slot = EXIT_HANDLER
        .write()
        .unwrap_or_else(PoisonError::into_inner);
    std::mem::replace(&mut *slot, handler)
}

/// Installs the unwinding handler and restores the previous one on drop.
///
/// The handler also records the requested code, so a fatal exit raised on
/// a task or thread other than the one `run` polls is still reported.
pub(crate) struct InterceptGuard {
    previous: Option<Option<ExitHandler>>,
    requested: Arc<Mutex<Option<i32>>>,
}

impl InterceptGuard {
    pub(crate) fn install() -> Self {
        let requested = Arc::new(Mutex::new(None));
        let slot = requested.clone();
        let handler: ExitHandler = Arc::new(move |code| {
            slot.lock()
                .unwrap_or_else(PoisonError::into_inner)
                .get_or_insert(code);
            // resume_unwind skips the panic hook, so nothing is printed
            panic::resume_unwind(Box::new(FatalExit { code }))
        });
        Self {
            previous: Some(replace_exit_handler(Some(handler))),
            requested,
        }
    }

    /// Reinstate the previous handler, returning the first exit code
    /// requested while the intercept was active
    pub(crate) fn restore(mut self) -> Option<i32> {
        self.restore_previous();
        *self
            .requested
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn restore_previous(&mut self) {
        if let Some(previous) = self.previous.take() {
            replace_exit_handler(previous);
        }
    }
}

impl Drop for InterceptGuard {
    fn drop(&mut self) {
        self.restore_previous();
    }
}

/// Inspect a caught unwind payload, returning the exit code when it came
/// from the intercepted callback and handing any other payload back.
pub(crate) fn classify(
    payload: Box<dyn std::any::Any + Send>,
) -> Result<FatalExit, Box<dyn std::any::Any + Send>> {
    payload.downcast::<FatalExit>().map(|exit| *exit)
}
