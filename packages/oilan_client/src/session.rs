//! Session Manager
//!
//! Decides which dialog is active and keeps the other components in step:
//! the registry supplies dialogs and history, the connection controller holds
//! the live channel, and the message log renders everything in order.
//!
//! A `SessionManager` is not shared. All mutation happens through `&mut self`
//! on whichever task owns it (normally a [`SessionActor`](crate::SessionActor)),
//! so the active dialog, the connection state, and the log can never be
//! observed half-updated.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::api::ChatApi;
use crate::auth_gate::{AuthGate, AuthStatus, Navigator};
use crate::config::ClientConfig;
use crate::connection::{ChannelSignal, ConnectionController, ConnectionEvent, Transport};
use crate::error::{ApiError, SessionError};
use crate::message_log::{MessageLog, Notice, NoticeKind, RenderSink};
use crate::models::{ConnectionState, Dialog, DialogId, Message};
use crate::registry::DialogRegistry;

const CREATING_TEXT: &str = "Creating a new secure session...";
const GREETING_TEXT: &str = "Hello! I am ready. How can I help you today?";
const CLOSED_TEXT: &str = "Connection has been closed.";
const CONNECTION_ERROR_TEXT: &str = "A connection error occurred.";
const NOT_CONNECTED_TEXT: &str =
    "Not connected. Select a dialog or start a new chat to reconnect.";

#[derive(Clone, Debug)]
pub struct SessionOptions {
    /// Where the user is sent when the session is not authenticated.
    pub entry_url: String,
    /// Title for dialogs created without one.
    pub default_title: String,
    pub close_grace: Duration,
}

impl SessionOptions {
    pub fn from_config(config: &ClientConfig) -> Self {
        Self {
            entry_url: config.entry_url().to_string(),
            default_title: config.default_title.clone(),
            close_grace: config.close_grace,
        }
    }
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            entry_url: "/".to_string(),
            default_title: "New Web Chat".to_string(),
            close_grace: Duration::from_secs(2),
        }
    }
}

/// The one active dialog and the input surface's state.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ActiveSession {
    pub dialog: Option<DialogId>,
    pub input_enabled: bool,
    /// A message was sent and no reply or closure has arrived yet.
    pub awaiting_reply: bool,
}

/// Point-in-time copy of the session for callers outside the owning task.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SessionSnapshot {
    pub dialog: Option<DialogId>,
    pub state: ConnectionState,
    pub input_enabled: bool,
    pub awaiting_reply: bool,
    pub messages: Vec<Message>,
    pub redirected: bool,
}

pub struct SessionManager<A: ChatApi, T: Transport> {
    api: Arc<A>,
    gate: AuthGate,
    registry: DialogRegistry<A>,
    connection: ConnectionController<T>,
    log: MessageLog,
    session: ActiveSession,
    default_title: String,
}

impl<A: ChatApi, T: Transport> SessionManager<A, T> {
    /// Build a manager. The returned receiver carries channel signals and
    /// must be drained into [`handle_signal`](Self::handle_signal).
    pub fn new(
        api: Arc<A>,
        transport: Arc<T>,
        sink: Box<dyn RenderSink>,
        navigator: Box<dyn Navigator>,
        options: SessionOptions,
    ) -> (Self, mpsc::UnboundedReceiver<ChannelSignal>) {
        let (connection, signals) = ConnectionController::new(transport, options.close_grace);
        let manager = Self {
            registry: DialogRegistry::new(api.clone()),
            api,
            gate: AuthGate::new(options.entry_url, navigator),
            connection,
            log: MessageLog::new(sink),
            session: ActiveSession::default(),
            default_title: options.default_title,
        };
        (manager, signals)
    }

    /// Authenticate, then activate the most recent dialog or create one.
    pub async fn start(&mut self) -> Result<(), SessionError> {
        self.start_at(None).await
    }

    /// Like [`start`](Self::start), but activate `preferred` when given.
    pub async fn start_at(&mut self, preferred: Option<DialogId>) -> Result<(), SessionError> {
        self.ensure_active()?;
        if self.gate.check_session(self.api.as_ref()).await == AuthStatus::Unauthenticated {
            self.end_session().await;
            return Err(SessionError::Unauthorized);
        }

        let dialogs = match self.registry.list_dialogs().await {
            Ok(dialogs) => dialogs.to_vec(),
            Err(e) => return Err(self.fail(e, "Error: Could not load your dialogs.").await),
        };
        self.log.dialogs(&dialogs);

        match preferred.or_else(|| dialogs.first().map(|d| d.id.clone())) {
            Some(id) => self.select_dialog(id).await,
            None => {
                info!("no dialogs yet; creating one");
                let title = self.default_title.clone();
                self.start_new_dialog(&title).await.map(|_| ())
            }
        }
    }

    /// Make `id` the active dialog: clear the log, load its history, then
    /// bind the channel. Nothing is bound if the history cannot be loaded.
    pub async fn select_dialog(&mut self, id: DialogId) -> Result<(), SessionError> {
        self.ensure_active()?;
        info!(dialog_id = %id, "selecting dialog");

        self.session.dialog = Some(id.clone());
        self.session.awaiting_reply = false;
        self.set_input(false);
        self.log.reset(id.clone());

        match self.registry.fetch_history(&id).await {
            Ok(history) => {
                self.log.load_history(history);
                self.log.status(ConnectionState::Connecting);
                self.connection.bind(id).await;
                Ok(())
            }
            Err(e) => {
                // A channel left open here would deliver replies into the wrong log
                if self.connection.state().is_bound() {
                    self.connection.unbind().await;
                    self.log.status(ConnectionState::Closed);
                }
                Err(self.fail(e, "Error: Could not load this dialog.").await)
            }
        }
    }

    /// Create a dialog, refresh the listing, and select the new dialog.
    /// A blank title falls back to the configured default.
    pub async fn start_new_dialog(&mut self, title: &str) -> Result<Dialog, SessionError> {
        self.ensure_active()?;
        let title = match title.trim() {
            "" => self.default_title.clone(),
            t => t.to_string(),
        };

        self.log.notice(Notice::new(NoticeKind::Info, CREATING_TEXT));
        self.set_input(false);

        let dialog = match self.registry.create_dialog(&title).await {
            Ok(dialog) => dialog,
            Err(e) => {
                let err = self.fail(e, "Error: Could not start a new chat.").await;
                self.restore_input();
                return Err(err);
            }
        };

        match self.registry.list_dialogs().await {
            Ok(_) => {}
            Err(e @ ApiError::Unauthorized) => {
                return Err(self.fail(e, "Error: Could not load your dialogs.").await);
            }
            Err(e) => warn!(error = %e, "dialog list refresh failed; showing cached list"),
        }
        let listing = self.registry.cached().to_vec();
        self.log.dialogs(&listing);

        self.select_dialog(dialog.id.clone()).await?;
        Ok(dialog)
    }

    /// Send the user's message. The message is shown before the channel
    /// accepts it and stays shown even if sending fails.
    pub async fn send_input(&mut self, content: &str) -> Result<(), SessionError> {
        self.ensure_active()?;
        let content = content.trim();
        if content.is_empty() {
            return Err(SessionError::EmptyInput);
        }
        if self.session.awaiting_reply {
            debug!("send rejected while a reply is outstanding");
            return Err(SessionError::ExchangeInFlight);
        }

        self.log.append(Message::user(content));
        if let Err(e) = self.connection.send(content) {
            self.log
                .notice(Notice::new(NoticeKind::NotConnected, NOT_CONNECTED_TEXT));
            return Err(e.into());
        }

        self.session.awaiting_reply = true;
        self.set_input(false);
        Ok(())
    }

    /// Refresh the dialog listing and show it.
    pub async fn list_dialogs(&mut self) -> Result<Vec<Dialog>, SessionError> {
        self.ensure_active()?;
        match self.registry.list_dialogs().await {
            Ok(dialogs) => {
                let dialogs = dialogs.to_vec();
                self.log.dialogs(&dialogs);
                Ok(dialogs)
            }
            Err(e) => Err(self.fail(e, "Error: Could not load your dialogs.").await),
        }
    }

    /// React to a signal from the connection controller's pump.
    pub fn handle_signal(&mut self, signal: ChannelSignal) {
        if self.gate.is_redirected() {
            return;
        }
        let Some(event) = self.connection.handle_signal(signal) else {
            return;
        };

        match event {
            ConnectionEvent::Ready => {
                self.log.status(ConnectionState::Open);
                if self.log.messages().is_empty() {
                    self.log.notice(Notice::new(NoticeKind::Info, GREETING_TEXT));
                }
                self.set_input(true);
            }
            ConnectionEvent::MessageReceived(content) => {
                self.log.append(Message::assistant(content));
                self.session.awaiting_reply = false;
                self.set_input(true);
            }
            ConnectionEvent::Disconnected { reason } => {
                if let Some(reason) = reason {
                    warn!(%reason, "dialog channel failed");
                    self.log
                        .notice(Notice::new(NoticeKind::ConnectionError, CONNECTION_ERROR_TEXT));
                }
                self.log.status(ConnectionState::Closed);
                self.log
                    .notice(Notice::new(NoticeKind::ConnectionClosed, CLOSED_TEXT));
                self.session.awaiting_reply = false;
                self.set_input(false);
            }
        }
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            dialog: self.session.dialog.clone(),
            state: self.connection.state(),
            input_enabled: self.session.input_enabled,
            awaiting_reply: self.session.awaiting_reply,
            messages: self.log.messages().to_vec(),
            redirected: self.gate.is_redirected(),
        }
    }

    pub fn session(&self) -> &ActiveSession {
        &self.session
    }

    pub fn is_redirected(&self) -> bool {
        self.gate.is_redirected()
    }

    /// Release the channel. The manager stays usable.
    pub async fn shutdown(&mut self) {
        self.connection.unbind().await;
        self.set_input(false);
    }

    fn ensure_active(&self) -> Result<(), SessionError> {
        if self.gate.is_redirected() {
            Err(SessionError::Unauthorized)
        } else {
            Ok(())
        }
    }

    /// Surface a REST failure: end the session on `Unauthorized`, inline
    /// notice otherwise.
    async fn fail(&mut self, err: ApiError, context: &str) -> SessionError {
        match err {
            ApiError::Unauthorized => self.end_session().await,
            ApiError::HistoryUnavailable(ref detail) => self.log.notice(Notice::new(
                NoticeKind::HistoryUnavailable,
                format!("{context} {detail}"),
            )),
        }
        err.into()
    }

    /// Redirect to sign-in and release the channel. Nothing is bound again.
    async fn end_session(&mut self) {
        self.gate.redirect();
        if self.connection.state().is_bound() {
            info!("session redirected to sign-in; releasing channel");
            self.connection.unbind().await;
            self.log.status(ConnectionState::Closed);
        }
        self.session.awaiting_reply = false;
        self.set_input(false);
    }

    fn restore_input(&mut self) {
        let usable =
            self.connection.state() == ConnectionState::Open && !self.session.awaiting_reply;
        self.set_input(usable);
    }

    fn set_input(&mut self, enabled: bool) {
        if self.session.input_enabled != enabled {
            self.session.input_enabled = enabled;
            self.log.input(enabled);
        }
    }
}
