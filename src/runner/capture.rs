//! Capture pipes for backend output
//!
//! A capture pipe is an in-process stand-in for an OS pipe pair: the write
//! end is handed to backend code (and to the forwarding logger), the read
//! end is drained by a background task that mirrors every chunk to the real
//! console handle and keeps a copy for the caller.

use std::io;
use std::sync::{Arc, Mutex, PoisonError};

use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;
use tracing_subscriber::fmt::MakeWriter;

/// Console handle a capture pipe mirrors into
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stream {
    Stdout,
    Stderr,
}

/// Write end of a capture pipe.
///
/// Clones share the same pipe. Once the pipe is closed, further writes are
/// accepted and dropped so late writers never fail.
#[derive(Clone)]
pub struct CaptureWriter {
    tx: Arc<Mutex<Option<UnboundedSender<Vec<u8>>>>>,
}

impl CaptureWriter {
    fn close(&self) {
        self.tx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
    }
}

impl io::Write for CaptureWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if let Some(tx) = self
            .tx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
        {
            // A send only fails when the drain task is gone
            let _ = tx.send(buf.to_vec());
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<'a> MakeWriter<'a> for CaptureWriter {
    type Writer = CaptureWriter;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}

/// One capture pipe plus the task draining it
pub(crate) struct CapturePipe {
    writer: CaptureWriter,
    drain: JoinHandle<String>,
}

impl CapturePipe {
    /// Open a pipe and start draining it on the current runtime
    pub(crate) fn open(stream: Stream, mirror: bool) -> Self {
        let (tx, rx) = unbounded_channel();
        let writer = CaptureWriter {
            tx: Arc::new(Mutex::new(Some(tx))),
        };
        let drain = tokio::spawn(drain(rx, stream, mirror));
        Self { writer, drain }
    }

    pub(crate) fn writer(&self) -> CaptureWriter {
        self.writer.clone()
    }

    /// Close the write end and wait for the drain task to finish
    pub(crate) async fn finish(self) -> String {
        self.writer.close();
        self.drain.await.unwrap_or_default()
    }
}

async fn drain(mut rx: UnboundedReceiver<Vec<u8>>, stream: Stream, mirror: bool) -> String {
    let mut captured = Vec::new();
    let mut stdout = tokio::io::stdout();
    let mut stderr = tokio::io::stderr();

    while let Some(chunk) = rx.recv().await {
        if mirror {
            // Mirroring is best effort; a closed console must not lose the capture
            let _ = match stream {
                Stream::Stdout => write_through(&mut stdout, &chunk).await,
                Stream::Stderr => write_through(&mut stderr, &chunk).await,
            };
        }
        captured.extend_from_slice(&chunk);
    }

    String::from_utf8_lossy(&captured).into_owned()
}

async fn write_through<W>(out: &mut W, chunk: &[u8]) -> io::Result<()>
where
    W: tokio::io::AsyncWrite + Unpin,
{
    out.write_all(chunk).await?;
    out.flush().await
}
