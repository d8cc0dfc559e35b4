use anyhow::{Context, Result, bail};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::{debug, info};

use oilan_client::{
    DialogId, DisplayEvent, HttpChatApi, SessionActor, SessionError, SessionHandle,
    SessionManager, SessionOptions, WsTransport,
};

use super::TerminalNavigator;
use super::render::format_event;
use crate::config::OilanConfig;

const HELP: &str = "\
Commands:
  /new [title]   start a new dialog
  /switch ID     switch to another dialog
  /list          show your dialogs
  /help          show this help
  /quit          leave
Anything else is sent as a message.";

/// One line typed at the chat prompt.
#[derive(Debug, PartialEq, Eq)]
pub enum Input {
    Send(String),
    New(Option<String>),
    Switch(String),
    List,
    Help,
    Quit,
    Empty,
    Unknown(String),
}

pub fn parse_input(line: &str) -> Input {
    let line = line.trim();
    if line.is_empty() {
        return Input::Empty;
    }
    let Some(command) = line.strip_prefix('/') else {
        return Input::Send(line.to_string());
    };

    let (name, rest) = match command.split_once(char::is_whitespace) {
        Some((name, rest)) => (name, rest.trim()),
        None => (command, ""),
    };
    match name {
        "new" => Input::New((!rest.is_empty()).then(|| rest.to_string())),
        "switch" if !rest.is_empty() => Input::Switch(rest.to_string()),
        "list" => Input::List,
        "help" => Input::Help,
        "quit" | "exit" => Input::Quit,
        _ => Input::Unknown(line.to_string()),
    }
}

/// Interactive chat: stdin lines in, rendered display events out.
pub async fn chat_command(config: &OilanConfig, dialog: Option<String>) -> Result<()> {
    let client = config.client_config()?;
    let api = Arc::new(HttpChatApi::new(&client)?);
    let transport = Arc::new(WsTransport::new(&client));

    let (events_tx, events_rx) = mpsc::unbounded_channel();
    let (manager, signals) = SessionManager::new(
        api,
        transport,
        Box::new(events_tx),
        Box::new(TerminalNavigator),
        SessionOptions::from_config(&client),
    );
    let (handle, actor) = SessionActor::spawn(manager, signals);
    let renderer = tokio::spawn(render_events(events_rx));

    let outcome = run_session(&handle, dialog.map(DialogId::from)).await;

    // Closing the channel ends the actor, which drops the sink and ends the renderer
    let _ = handle.shutdown().await;
    drop(handle);
    let _ = actor.await;
    let _ = renderer.await;
    info!("chat session ended");
    outcome
}

async fn render_events(mut events: mpsc::UnboundedReceiver<DisplayEvent>) {
    while let Some(event) = events.recv().await {
        if let Some(text) = format_event(&event) {
            println!("{text}");
        }
    }
}

async fn run_session(handle: &SessionHandle, dialog: Option<DialogId>) -> Result<()> {
    match handle.start_at(dialog).await {
        Ok(()) => {}
        Err(SessionError::Unauthorized) => bail!("not signed in"),
        // Shown as a notice; the user can still /new or /switch
        Err(e) => debug!(error = %e, "start did not activate a dialog"),
    }
    println!("Type a message and press Enter. /help for commands.");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let line = tokio::select! {
            line = lines.next_line() => line.context("Failed to read from stdin")?,
            _ = tokio::signal::ctrl_c() => None,
        };
        let Some(line) = line else { break };

        let result = match parse_input(&line) {
            Input::Empty => continue,
            Input::Quit => break,
            Input::Help => {
                println!("{HELP}");
                continue;
            }
            Input::Unknown(command) => {
                eprintln!("unknown command: {command} (try /help)");
                continue;
            }
            Input::Send(text) => handle.send_input(&text).await,
            Input::New(title) => handle.start_new_dialog(title.as_deref()).await.map(|_| ()),
            Input::Switch(id) => handle.select_dialog(DialogId::from(id)).await,
            Input::List => handle.dialogs().await.map(|_| ()),
        };

        match result {
            Ok(()) => {}
            Err(SessionError::Unauthorized) => bail!("session expired; sign in again"),
            Err(SessionError::ActorGone) => bail!("session ended unexpectedly"),
            Err(SessionError::ExchangeInFlight) => {
                eprintln!("[oilan: still waiting for a reply]");
            }
            Err(e) => debug!(error = %e, "command failed"),
        }
    }

    Ok(())
}
