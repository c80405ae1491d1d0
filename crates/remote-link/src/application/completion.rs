//! Single-fire command completions.
//!
//! Every accepted (or synchronously rejected) command owns exactly one
//! [`Completion`].  Firing consumes it, and dropping it unfired reports
//! [`LinkError::ShutDown`], so a caller always hears back once and only once
//! no matter which path the command took.
//!
//! Completions are not run where they fire.  They are posted to a completion
//! pump: one Tokio task that invokes callbacks strictly one after another.
//! That task is the single callback context, so two callbacks never run at
//! the same time.  Once the pump has stopped (runtime teardown) a fired
//! callback is dropped unrun; a [`CommandReceipt`] then resolves to
//! [`LinkError::ShutDown`].
//!
//! ```text
//!  session task ──fire──┐
//!  session task ──fire──┼──► pump channel ──► pump task ──► callback(outcome)
//!  send_command ──fire──┘
//! ```

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::manage_devices::DeviceId;

/// Failure reported for a device operation.
///
/// Payloads are rendered text so an outcome can be cloned and compared.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum LinkError {
    /// No device with that id is known and no default is registered.
    #[error("device not found: {0}")]
    DeviceNotFound(String),

    /// The device could not be reached or the connection dropped.
    #[error("device {device} unreachable: {reason}")]
    DeviceUnreachable { device: DeviceId, reason: String },

    /// The discovery socket could not be bound or joined to its group.
    #[error("failed to open discovery socket: {0}")]
    SocketBindFailure(String),

    /// The command could not be written or its reply could not be read.
    #[error("command transmission failed: {0}")]
    CommandTransmissionFailure(String),

    /// No reply arrived within the command timeout.
    #[error("command timed out after {0} ms")]
    CommandTimeout(u64),

    /// The device answered with `busyIR` or an `ERR` line.
    #[error("command rejected by device: {0}")]
    CommandRejected(String),

    /// The link was shut down before the command finished.
    #[error("device link shut down")]
    ShutDown,

    /// The default-device selection could not be persisted.
    #[error("failed to persist configuration: {0}")]
    Config(String),
}

/// Final result of one command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutcome {
    /// The caller's correlation tag, unchanged.
    pub tag: u32,
    /// Device the command was addressed to, if one was resolved.
    pub device: Option<DeviceId>,
    /// The device's reply line on success.
    pub result: Result<String, LinkError>,
}

impl CommandOutcome {
    pub fn is_success(&self) -> bool {
        self.result.is_ok()
    }
}

/// Callback invoked with a command's outcome.
pub type CompletionCallback = Box<dyn FnOnce(CommandOutcome) + Send + 'static>;

/// A fired completion on its way to the pump.
pub struct Delivery {
    outcome: CommandOutcome,
    callback: CompletionCallback,
}

/// Sending side of the completion pump.
pub type PumpSender = mpsc::UnboundedSender<Delivery>;

/// Starts the completion pump on the current Tokio runtime.
///
/// The pump runs until every [`PumpSender`] has been dropped.
pub fn spawn_completion_pump() -> (PumpSender, JoinHandle<()>) {
    let (tx, mut rx) = mpsc::unbounded_channel::<Delivery>();
    let handle = tokio::spawn(async move {
        while let Some(delivery) = rx.recv().await {
            debug!(
                tag = delivery.outcome.tag,
                success = delivery.outcome.is_success(),
                "delivering command completion"
            );
            (delivery.callback)(delivery.outcome);
        }
        debug!("completion pump stopped");
    });
    (tx, handle)
}

/// The one-shot obligation to report a command's outcome.
pub struct Completion {
    tag: u32,
    device: Option<DeviceId>,
    callback: Option<CompletionCallback>,
    pump: PumpSender,
}

impl Completion {
    pub fn new(tag: u32, device: Option<DeviceId>, callback: CompletionCallback, pump: PumpSender) -> Self {
        Self {
            tag,
            device,
            callback: Some(callback),
            pump,
        }
    }

    pub fn tag(&self) -> u32 {
        self.tag
    }

    /// Reports the outcome.  Consumes the completion.
    pub fn fire(mut self, result: Result<String, LinkError>) {
        self.deliver(result);
    }

    fn deliver(&mut self, result: Result<String, LinkError>) {
        let Some(callback) = self.callback.take() else {
            return;
        };
        let delivery = Delivery {
            outcome: CommandOutcome {
                tag: self.tag,
                device: self.device.clone(),
                result,
            },
            callback,
        };
        if self.pump.send(delivery).is_err() {
            // Callbacks only ever run on the pump.
            warn!(tag = self.tag, "completion pump closed; dropping callback");
        }
    }
}

impl Drop for Completion {
    fn drop(&mut self) {
        if self.callback.is_some() {
            self.deliver(Err(LinkError::ShutDown));
        }
    }
}

/// Future resolving to the outcome of a dispatched command.
pub struct CommandReceipt {
    tag: u32,
    rx: oneshot::Receiver<CommandOutcome>,
}

impl CommandReceipt {
    /// Builds a callback that resolves the returned receipt.
    pub fn channel(tag: u32) -> (CompletionCallback, Self) {
        let (tx, rx) = oneshot::channel();
        let callback: CompletionCallback = Box::new(move |outcome| {
            let _ = tx.send(outcome);
        });
        (callback, Self { tag, rx })
    }

    pub fn tag(&self) -> u32 {
        self.tag
    }
}

impl Future for CommandReceipt {
    type Output = CommandOutcome;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let tag = self.tag;
        Pin::new(&mut self.rx).poll(cx).map(|received| {
            received.unwrap_or(CommandOutcome {
                tag,
                device: None,
                result: Err(LinkError::ShutDown),
            })
        })
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
