use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::models::{ConnectionState, Dialog, DialogId, Message};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NoticeKind {
    HistoryUnavailable,
    NotConnected,
    ConnectionClosed,
    ConnectionError,
    Info,
}

/// Inline, display-only notice. Never part of the message sequence.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Notice {
    pub kind: NoticeKind,
    pub text: String,
}

impl Notice {
    pub fn new(kind: NoticeKind, text: impl Into<String>) -> Self {
        Self {
            kind,
            text: text.into(),
        }
    }
}

/// Everything the render surface is told, in the order it must show it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DisplayEvent {
    /// Clear the message area; `dialog` is now active.
    Reset { dialog: DialogId },
    Message(Message),
    Status(ConnectionState),
    Notice(Notice),
    Input { enabled: bool },
    /// Refreshed dialog list view.
    Dialogs(Vec<Dialog>),
}

/// Ordered sink for display events.
pub trait RenderSink: Send {
    fn render(&mut self, event: DisplayEvent);
}

/// Forward events to another task (e.g. a terminal renderer).
impl RenderSink for mpsc::UnboundedSender<DisplayEvent> {
    fn render(&mut self, event: DisplayEvent) {
        if self.send(event).is_err() {
            debug!("render receiver dropped");
        }
    }
}

/// Append-only view of the active dialog's messages.
///
/// Also the single writer to the render sink, so notices and status changes
/// interleave with messages in exactly the order they were issued.
pub struct MessageLog {
    dialog: Option<DialogId>,
    messages: Vec<Message>,
    sink: Box<dyn RenderSink>,
}

impl MessageLog {
    pub fn new(sink: Box<dyn RenderSink>) -> Self {
        Self {
            dialog: None,
            messages: Vec::new(),
            sink,
        }
    }

    /// Clear the sequence for a newly active dialog.
    pub fn reset(&mut self, dialog: DialogId) {
        debug!(dialog_id = %dialog, dropped = self.messages.len(), "message log reset");
        self.messages.clear();
        self.dialog = Some(dialog.clone());
        self.sink.render(DisplayEvent::Reset { dialog });
    }

    /// Install a fetched history. A repeat of the current sequence is a no-op.
    pub fn load_history(&mut self, history: Vec<Message>) {
        if self.messages == history {
            debug!(count = history.len(), "history unchanged");
            return;
        }
        if !self.messages.is_empty() {
            warn!(
                replaced = self.messages.len(),
                "history loaded over a non-empty log; re-rendering"
            );
            self.messages.clear();
            if let Some(dialog) = self.dialog.clone() {
                self.sink.render(DisplayEvent::Reset { dialog });
            }
        }
        for message in history {
            self.push(message);
        }
    }

    /// Add one message at the tail.
    pub fn append(&mut self, message: Message) {
        self.push(message);
    }

    pub fn notice(&mut self, notice: Notice) {
        debug!(kind = ?notice.kind, text = %notice.text, "notice");
        self.sink.render(DisplayEvent::Notice(notice));
    }

    pub fn status(&mut self, state: ConnectionState) {
        self.sink.render(DisplayEvent::Status(state));
    }

    pub fn input(&mut self, enabled: bool) {
        self.sink.render(DisplayEvent::Input { enabled });
    }

    pub fn dialogs(&mut self, dialogs: &[Dialog]) {
        self.sink.render(DisplayEvent::Dialogs(dialogs.to_vec()));
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn dialog(&self) -> Option<&DialogId> {
        self.dialog.as_ref()
    }

    fn push(&mut self, message: Message) {
        self.messages.push(message.clone());
        self.sink.render(DisplayEvent::Message(message));
    }
}
