//! Process-wide log routing
//!
//! The process subscriber installed by [`crate::logging::init`] writes through
//! [`RoutedWriter`]. While a run is active its lines go to that run's stderr
//! capture instead of the console, so events from tasks and threads the
//! backend spawns are captured along with those of the calling task.

use std::io::{self, Write};
use std::sync::{PoisonError, RwLock};

use tracing_subscriber::fmt::MakeWriter;

use super::capture::CaptureWriter;
use crate::logging::{self, LogFormat};

static ACTIVE_CAPTURE: RwLock<Option<CaptureWriter>> = RwLock::new(None);

/// Log writer for the process subscriber: the active run's capture, else stdout
#[derive(Debug, Clone, Copy, Default)]
pub struct RoutedWriter;

/// Target chosen by [`RoutedWriter`] for one log line
pub enum RoutedTarget {
    Capture(CaptureWriter),
    Console(io::Stdout),
}

impl io::Write for RoutedTarget {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            RoutedTarget::Capture(capture) => capture.write(buf),
            RoutedTarget::Console(stdout) => stdout.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            RoutedTarget::Capture(capture) => capture.flush(),
            RoutedTarget::Console(stdout) => stdout.flush(),
        }
    }
}

impl<'a> MakeWriter<'a> for RoutedWriter {
    type Writer = RoutedTarget;

    fn make_writer(&'a self) -> Self::Writer {
        match ACTIVE_CAPTURE
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
        {
            Some(capture) => RoutedTarget::Capture(capture.clone()),
            None => RoutedTarget::Console(io::stdout()),
        }
    }
}

fn replace_capture(capture: Option<CaptureWriter>) -> Option<CaptureWriter> {
    let mut slot = ACTIVE_CAPTURE
        .write()
        .unwrap_or_else(PoisonError::into_inner);
    std::mem::replace(&mut *slot, capture)
}

/// Routes process-wide log output into a capture until restored or dropped
pub(crate) struct RouteGuard {
    previous: Option<Option<CaptureWriter>>,
}

impl RouteGuard {
    pub(crate) fn install(capture: CaptureWriter) -> Self {
        Self {
            previous: Some(replace_capture(Some(capture))),
        }
    }

    pub(crate) fn restore(mut self) {
        self.restore_previous();
    }

    fn restore_previous(&mut self) {
        if let Some(previous) = self.previous.take() {
            replace_capture(previous);
        }
    }
}

impl Drop for RouteGuard {
    fn drop(&mut self) {
        self.restore_previous();
    }
}

/// Install the routed process subscriber unless one is already set.
/// Losing the race to another initializer is fine.
pub(crate) fn ensure_process_logger() {
    if !tracing::dispatcher::has_been_set() {
        let _ = logging::init(LogFormat::default());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runner::capture::{CapturePipe, Stream};
    use std::io::Write;

    #[tokio::test]
    async fn test_route_follows_guard() {
        let _exclusive = super::super::RUN_LOCK.lock().await;
        let pipe = CapturePipe::open(Stream::Stderr, false);

        let guard = RouteGuard::install(pipe.writer());
        RoutedWriter.make_writer().write_all(b"routed").unwrap();
        guard.restore();

        assert!(matches!(RoutedWriter.make_writer(), RoutedTarget::Console(_)));
        assert_eq!(pipe.finish().await, "routed");
    }
}
