//! One-shot shutdown channel between the content server and the lifecycle
//! controller.

use mv_core::ViewerError;
use mv_core::ViewerResult;
use std::sync::mpsc;
use std::time::Duration;

/// Why the viewer stopped serving.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownReason {
    /// The initial document reported that it finished loading.
    DoneSignal,
    /// The browser did not report back before the deadline.
    Timeout,
}

impl ShutdownReason {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::DoneSignal => "done-signal",
            Self::Timeout => "timeout",
        }
    }
}

/// Sending half; cheap to clone into request handlers.
#[derive(Debug, Clone)]
pub struct ShutdownTrigger {
    tx: mpsc::Sender<ShutdownReason>,
}

impl ShutdownTrigger {
    /// Requests shutdown. Returns false when nobody is waiting any more.
    pub fn fire(&self, reason: ShutdownReason) -> bool {
        self.tx.send(reason).is_ok()
    }
}

/// Receiving half, owned by the thread that waits for shutdown. Only the
/// first signal is ever observed.
#[derive(Debug)]
pub struct ShutdownSignal {
    rx: mpsc::Receiver<ShutdownReason>,
}

impl ShutdownSignal {
    /// Blocks until a shutdown is requested.
    pub fn wait(&self) -> ViewerResult<ShutdownReason> {
        self.rx.recv().map_err(|_| channel_closed())
    }

    /// Blocks until a shutdown is requested or `timeout` elapses, in which
    /// case the reason is [`ShutdownReason::Timeout`].
    pub fn wait_timeout(&self, timeout: Duration) -> ViewerResult<ShutdownReason> {
        match self.rx.recv_timeout(timeout) {
            Ok(reason) => Ok(reason),
            Err(mpsc::RecvTimeoutError::Timeout) => Ok(ShutdownReason::Timeout),
            Err(mpsc::RecvTimeoutError::Disconnected) => Err(channel_closed()),
        }
    }
}

pub fn shutdown_channel() -> (ShutdownTrigger, ShutdownSignal) {
    let (tx, rx) = mpsc::channel();
    (ShutdownTrigger { tx }, ShutdownSignal { rx })
}

fn channel_closed() -> ViewerError {
    ViewerError::new(
        "lifecycle.channel_closed",
        "every shutdown trigger was dropped before a signal arrived",
    )
}
