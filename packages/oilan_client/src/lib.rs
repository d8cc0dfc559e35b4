//! Oilan client core - session orchestration for the Oilan chat backend
//!
//! This crate keeps a user's dialogs, binds exactly one dialog at a time to a
//! live WebSocket channel, and merges fetched history with live replies into a
//! single ordered message log. It has no terminal or UI knowledge: display
//! output goes to a [`RenderSink`] and sign-in redirects go to a [`Navigator`].
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use oilan_client::{
//!     ClientConfig, DisplayEvent, FileConfig, HttpChatApi, SessionActor, SessionManager,
//!     SessionOptions, WsTransport,
//! };
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = ClientConfig::from_file(&FileConfig::default()).unwrap();
//!     let api = Arc::new(HttpChatApi::new(&config).unwrap());
//!     let transport = Arc::new(WsTransport::new(&config));
//!
//!     let (events_tx, mut events_rx) = tokio::sync::mpsc::unbounded_channel::<DisplayEvent>();
//!     let navigator = |url: &str| eprintln!("sign in at {url}");
//!
//!     let (manager, signals) = SessionManager::new(
//!         api,
//!         transport,
//!         Box::new(events_tx),
//!         Box::new(navigator),
//!         SessionOptions::from_config(&config),
//!     );
//!     let (handle, _task) = SessionActor::spawn(manager, signals);
//!
//!     handle.start().await.unwrap();
//!     handle.send_input("hello").await.unwrap();
//!     while let Some(event) = events_rx.recv().await {
//!         println!("{event:?}");
//!     }
//! }
//! ```

mod actor;
mod api;
mod auth_gate;
mod config;
mod connection;
mod error;
mod message_log;
mod models;
mod registry;
mod session;
mod transport;

#[cfg(test)]
mod test_support;

pub use actor::{SessionActor, SessionCommand, SessionHandle};
pub use api::{ChatApi, HttpChatApi};
pub use auth_gate::{AuthGate, AuthStatus, Navigator};
pub use config::{
    ChatFileConfig, ClientConfig, FileConfig, ServerFileConfig, SessionFileConfig, load_config,
};
pub use connection::{
    BindingId, Channel, ChannelSignal, ConnectionController, ConnectionEvent, SignalKind,
    Transport,
};
pub use error::{ApiError, ConfigError, NotConnected, SessionError, TransportError};
pub use message_log::{DisplayEvent, MessageLog, Notice, NoticeKind, RenderSink};
pub use models::{ConnectionState, Dialog, DialogId, Message, Role};
pub use registry::DialogRegistry;
pub use session::{ActiveSession, SessionManager, SessionOptions, SessionSnapshot};
pub use transport::{WsChannel, WsTransport};
