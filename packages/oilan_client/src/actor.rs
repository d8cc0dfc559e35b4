use std::ops::ControlFlow;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::api::ChatApi;
use crate::connection::{ChannelSignal, Transport};
use crate::error::SessionError;
use crate::models::{Dialog, DialogId};
use crate::session::{SessionManager, SessionSnapshot};

/// Commands that can be sent to a session actor
#[derive(Debug)]
pub enum SessionCommand {
    Start {
        dialog: Option<DialogId>,
        respond_to: oneshot::Sender<Result<(), SessionError>>,
    },
    SelectDialog {
        dialog: DialogId,
        respond_to: oneshot::Sender<Result<(), SessionError>>,
    },
    NewDialog {
        title: Option<String>,
        respond_to: oneshot::Sender<Result<Dialog, SessionError>>,
    },
    SendInput {
        content: String,
        respond_to: oneshot::Sender<Result<(), SessionError>>,
    },
    ListDialogs {
        respond_to: oneshot::Sender<Result<Vec<Dialog>, SessionError>>,
    },
    Snapshot {
        respond_to: oneshot::Sender<SessionSnapshot>,
    },
    Shutdown {
        respond_to: oneshot::Sender<()>,
    },
}

/// Handle to communicate with a session actor
#[derive(Clone)]
pub struct SessionHandle {
    sender: mpsc::Sender<SessionCommand>,
}

impl SessionHandle {
    pub async fn start(&self) -> Result<(), SessionError> {
        self.start_at(None).await
    }

    pub async fn start_at(&self, dialog: Option<DialogId>) -> Result<(), SessionError> {
        self.request(|respond_to| SessionCommand::Start { dialog, respond_to })
            .await?
    }

    pub async fn select_dialog(&self, dialog: DialogId) -> Result<(), SessionError> {
        self.request(|respond_to| SessionCommand::SelectDialog { dialog, respond_to })
            .await?
    }

    /// `None` or a blank title uses the configured default.
    pub async fn start_new_dialog(&self, title: Option<&str>) -> Result<Dialog, SessionError> {
        let title = title.map(str::to_string);
        self.request(|respond_to| SessionCommand::NewDialog { title, respond_to })
            .await?
    }

    pub async fn send_input(&self, content: &str) -> Result<(), SessionError> {
        let content = content.to_string();
        self.request(|respond_to| SessionCommand::SendInput {
            content,
            respond_to,
        })
        .await?
    }

    /// Refresh and return the dialog listing.
    pub async fn dialogs(&self) -> Result<Vec<Dialog>, SessionError> {
        self.request(|respond_to| SessionCommand::ListDialogs { respond_to })
            .await?
    }

    pub async fn snapshot(&self) -> Result<SessionSnapshot, SessionError> {
        self.request(|respond_to| SessionCommand::Snapshot { respond_to })
            .await
    }

    /// Release the channel and stop the actor.
    pub async fn shutdown(&self) -> Result<(), SessionError> {
        self.request(|respond_to| SessionCommand::Shutdown { respond_to })
            .await
    }

    async fn request<R>(
        &self,
        command: impl FnOnce(oneshot::Sender<R>) -> SessionCommand,
    ) -> Result<R, SessionError> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(command(tx))
            .await
            .map_err(|_| SessionError::ActorGone)?;
        rx.await.map_err(|_| SessionError::ActorGone)
    }
}

/// Owns a [`SessionManager`] and serializes every command and channel
/// signal through one task.
pub struct SessionActor<A: ChatApi, T: Transport> {
    manager: SessionManager<A, T>,
    receiver: mpsc::Receiver<SessionCommand>,
    signals: mpsc::UnboundedReceiver<ChannelSignal>,
}

impl<A: ChatApi, T: Transport> SessionActor<A, T> {
    /// Spawn the actor task and return its handle. The actor stops when
    /// every handle is dropped or on [`SessionHandle::shutdown`].
    pub fn spawn(
        manager: SessionManager<A, T>,
        signals: mpsc::UnboundedReceiver<ChannelSignal>,
    ) -> (SessionHandle, JoinHandle<()>) {
        let (sender, receiver) = mpsc::channel(32);
        let actor = SessionActor {
            manager,
            receiver,
            signals,
        };
        let task = tokio::spawn(actor.run());
        (SessionHandle { sender }, task)
    }

    async fn run(mut self) {
        debug!("session actor started");

        loop {
            tokio::select! {
                cmd = self.receiver.recv() => {
                    let Some(cmd) = cmd else { break };
                    if self.handle_command(cmd).await.is_break() {
                        break;
                    }
                }
                Some(signal) = self.signals.recv() => {
                    self.manager.handle_signal(signal);
                }
            }
        }

        self.manager.shutdown().await;
        debug!("session actor stopped");
    }

    async fn handle_command(&mut self, cmd: SessionCommand) -> ControlFlow<()> {
        match cmd {
            SessionCommand::Start { dialog, respond_to } => {
                let _ = respond_to.send(self.manager.start_at(dialog).await);
            }
            SessionCommand::SelectDialog { dialog, respond_to } => {
                let _ = respond_to.send(self.manager.select_dialog(dialog).await);
            }
            SessionCommand::NewDialog { title, respond_to } => {
                let title = title.unwrap_or_default();
                let _ = respond_to.send(self.manager.start_new_dialog(&title).await);
            }
            SessionCommand::SendInput {
                content,
                respond_to,
            } => {
                let _ = respond_to.send(self.manager.send_input(&content).await);
            }
            SessionCommand::ListDialogs { respond_to } => {
                let _ = respond_to.send(self.manager.list_dialogs().await);
            }
            SessionCommand::Snapshot { respond_to } => {
                let _ = respond_to.send(self.manager.snapshot());
            }
            SessionCommand::Shutdown { respond_to } => {
                info!("session shutting down");
                self.manager.shutdown().await;
                let _ = respond_to.send(());
                return ControlFlow::Break(());
            }
        }

        ControlFlow::Continue(())
    }
}
