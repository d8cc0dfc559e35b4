//! Connection Controller
//!
//! Owns the single live channel bound to the active dialog. The backend puts
//! no dialog id on inbound frames, so at most one channel may exist at a time:
//! binding a new dialog always finishes closing the old channel before the
//! new one is opened.
//!
//! Channel I/O runs on a per-binding pump task. The pump reports back through
//! [`ChannelSignal`]s tagged with its [`BindingId`]; the controller turns
//! signals into [`ConnectionEvent`]s and drops any signal from a binding it has
//! already released.

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::{NotConnected, TransportError};
use crate::models::{ConnectionState, DialogId};

/// One open duplex text channel.
pub trait Channel: Send + 'static {
    fn send(&mut self, frame: String) -> impl Future<Output = Result<(), TransportError>> + Send;

    /// Next inbound text frame, or `None` once the peer has closed.
    /// Must be cancel-safe.
    fn recv(&mut self) -> impl Future<Output = Option<Result<String, TransportError>>> + Send;

    fn close(&mut self) -> impl Future<Output = ()> + Send;
}

/// Opens channels addressed by dialog.
pub trait Transport: Send + Sync + 'static {
    type Channel: Channel;

    fn open(
        &self,
        dialog: &DialogId,
    ) -> impl Future<Output = Result<Self::Channel, TransportError>> + Send;
}

#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq)]
pub struct BindingId(u64);

impl fmt::Display for BindingId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "binding-{}", self.0)
    }
}

/// Raw report from a pump task.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChannelSignal {
    pub binding: BindingId,
    pub kind: SignalKind,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SignalKind {
    Opened,
    Frame(String),
    /// Peer closed, network failed, or the channel never opened.
    Closed { reason: Option<String> },
}

/// What the controller reports upstream.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ConnectionEvent {
    Ready,
    MessageReceived(String),
    Disconnected { reason: Option<String> },
}

struct Binding {
    id: BindingId,
    dialog: DialogId,
    outbound: mpsc::UnboundedSender<String>,
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

pub struct ConnectionController<T: Transport> {
    transport: Arc<T>,
    signals: mpsc::UnboundedSender<ChannelSignal>,
    state: ConnectionState,
    binding: Option<Binding>,
    next_binding: u64,
    close_grace: Duration,
}

impl<T: Transport> ConnectionController<T> {
    /// Create a controller in `Closed`. The returned receiver carries every
    /// pump signal and must be fed back through [`handle_signal`](Self::handle_signal).
    pub fn new(
        transport: Arc<T>,
        close_grace: Duration,
    ) -> (Self, mpsc::UnboundedReceiver<ChannelSignal>) {
        let (signals, signal_rx) = mpsc::unbounded_channel();
        let controller = Self {
            transport,
            signals,
            state: ConnectionState::Closed,
            binding: None,
            next_binding: 1,
            close_grace,
        };
        (controller, signal_rx)
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Dialog of the current binding, if any.
    pub fn dialog(&self) -> Option<&DialogId> {
        self.binding.as_ref().map(|b| &b.dialog)
    }

    pub fn binding_id(&self) -> Option<BindingId> {
        self.binding.as_ref().map(|b| b.id)
    }

    /// Bind to `dialog`, closing any existing channel first.
    pub async fn bind(&mut self, dialog: DialogId) {
        if self.state.is_bound() {
            self.teardown().await;
        }

        let id = BindingId(self.next_binding);
        self.next_binding += 1;
        self.transition(ConnectionState::Connecting);
        info!(binding = %id, dialog_id = %dialog, "binding dialog channel");

        let (outbound, outbound_rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();
        let task = tokio::spawn(pump(
            self.transport.clone(),
            dialog.clone(),
            id,
            outbound_rx,
            cancel.clone(),
            self.signals.clone(),
        ));

        self.binding = Some(Binding {
            id,
            dialog,
            outbound,
            cancel,
            task,
        });
    }

    /// Close the current channel, if any.
    pub async fn unbind(&mut self) {
        if self.state.is_bound() {
            self.teardown().await;
        }
    }

    /// Write one frame. Only permitted while `Open`; never queued.
    pub fn send(&self, content: &str) -> Result<(), NotConnected> {
        match (&self.state, &self.binding) {
            (ConnectionState::Open, Some(binding)) => binding
                .outbound
                .send(content.to_string())
                .map_err(|_| NotConnected),
            _ => {
                debug!(state = %self.state, "send rejected");
                Err(NotConnected)
            }
        }
    }

    /// Apply a pump signal. Signals from released bindings are discarded.
    pub fn handle_signal(&mut self, signal: ChannelSignal) -> Option<ConnectionEvent> {
        if self.binding_id() != Some(signal.binding) {
            debug!(binding = %signal.binding, "discarding signal from released binding");
            return None;
        }

        match signal.kind {
            SignalKind::Opened if self.state == ConnectionState::Connecting => {
                self.transition(ConnectionState::Open);
                Some(ConnectionEvent::Ready)
            }
            SignalKind::Frame(content) if self.state == ConnectionState::Open => {
                Some(ConnectionEvent::MessageReceived(content))
            }
            SignalKind::Closed { reason } if self.state.is_bound() => {
                // The pump has already exited; nothing left to tear down.
                self.binding = None;
                self.transition(ConnectionState::Closed);
                info!(binding = %signal.binding, reason = ?reason, "dialog channel closed");
                Some(ConnectionEvent::Disconnected { reason })
            }
            kind => {
                warn!(binding = %signal.binding, state = %self.state, ?kind, "unexpected signal");
                None
            }
        }
    }

    async fn teardown(&mut self) {
        self.transition(ConnectionState::Closing);
        if let Some(binding) = self.binding.take() {
            binding.cancel.cancel();
            drop(binding.outbound);
            let mut task = binding.task;
            if tokio::time::timeout(self.close_grace, &mut task)
                .await
                .is_err()
            {
                warn!(binding = %binding.id, "channel did not close in time; dropping it");
                task.abort();
                let _ = task.await;
            }
            debug!(binding = %binding.id, dialog_id = %binding.dialog, "binding released");
        }
        self.transition(ConnectionState::Closed);
    }

    fn transition(&mut self, next: ConnectionState) {
        debug!(from = %self.state, to = %next, "connection state");
        self.state = next;
    }
}

impl<T: Transport> Drop for ConnectionController<T> {
    fn drop(&mut self) {
        if let Some(binding) = self.binding.take() {
            binding.cancel.cancel();
        }
    }
}

/// Per-binding channel I/O: open, then shuttle frames until closed or released.
async fn pump<T: Transport>(
    transport: Arc<T>,
    dialog: DialogId,
    binding: BindingId,
    mut outbound: mpsc::UnboundedReceiver<String>,
    cancel: CancellationToken,
    signals: mpsc::UnboundedSender<ChannelSignal>,
) {
    let emit = |kind: SignalKind| {
        let _ = signals.send(ChannelSignal { binding, kind });
    };

    let opened = tokio::select! {
        _ = cancel.cancelled() => return,
        result = transport.open(&dialog) => result,
    };
    let mut channel = match opened {
        Ok(channel) => channel,
        Err(e) => {
            warn!(binding = %binding, dialog_id = %dialog, error = %e, "failed to open channel");
            emit(SignalKind::Closed {
                reason: Some(e.to_string()),
            });
            return;
        }
    };
    emit(SignalKind::Opened);

    let reason = loop {
        tokio::select! {
            biased;

            _ = cancel.cancelled() => {
                channel.close().await;
                return;
            }

            frame = outbound.recv() => match frame {
                Some(text) => {
                    if let Err(e) = channel.send(text).await {
                        break Some(e.to_string());
                    }
                }
                None => {
                    channel.close().await;
                    return;
                }
            },

            inbound = channel.recv() => match inbound {
                Some(Ok(text)) => emit(SignalKind::Frame(text)),
                Some(Err(e)) => break Some(e.to_string()),
                None => break None,
            },
        }
    };

    debug!(binding = %binding, reason = ?reason, "channel ended");
    emit(SignalKind::Closed { reason });
}
