mod chat;
mod render;

use anyhow::{Result, anyhow, bail};
use std::sync::Arc;

use oilan_client::{ApiError, AuthGate, AuthStatus, DialogRegistry, HttpChatApi, Navigator};

use crate::config::OilanConfig;

pub use chat::chat_command;

/// Tells the user where to sign in. A terminal cannot follow the redirect itself.
pub struct TerminalNavigator;

impl Navigator for TerminalNavigator {
    fn redirect_to_entry(&mut self, entry_url: &str) {
        eprintln!("You are not signed in. Sign in at {entry_url}");
        eprintln!(
            "then set the session token under [session] in config.toml or in OILAN_SESSION__TOKEN."
        );
    }
}

async fn ensure_signed_in(gate: &mut AuthGate, api: &HttpChatApi) -> Result<()> {
    match gate.check_session(api).await {
        AuthStatus::Authenticated => Ok(()),
        AuthStatus::Unauthenticated => bail!("not signed in"),
    }
}

/// A session can expire between the check and the request. Send the user to
/// sign in then, the same as when the check itself fails.
fn api_failure(gate: &mut AuthGate, err: ApiError, context: &str) -> anyhow::Error {
    match err {
        ApiError::Unauthorized => {
            gate.redirect();
            anyhow!("not signed in")
        }
        other => anyhow::Error::new(other).context(context.to_string()),
    }
}

pub async fn list_command(config: &OilanConfig, json: bool) -> Result<()> {
    let client = config.client_config()?;
    let api = Arc::new(HttpChatApi::new(&client)?);
    let mut gate = AuthGate::new(client.entry_url().as_str(), Box::new(TerminalNavigator));
    ensure_signed_in(&mut gate, &api).await?;

    let mut registry = DialogRegistry::new(api);
    let dialogs = registry
        .list_dialogs()
        .await
        .map_err(|e| api_failure(&mut gate, e, "Failed to list dialogs"))?;

    if json {
        println!("{}", serde_json::to_string_pretty(dialogs)?);
    } else {
        println!("{}", render::format_dialogs(dialogs));
        if !dialogs.is_empty() {
            println!("\n{} dialog(s)", dialogs.len());
        }
    }

    Ok(())
}

pub async fn new_command(config: &OilanConfig, title: Option<String>) -> Result<()> {
    let client = config.client_config()?;
    let api = Arc::new(HttpChatApi::new(&client)?);
    let mut gate = AuthGate::new(client.entry_url().as_str(), Box::new(TerminalNavigator));
    ensure_signed_in(&mut gate, &api).await?;

    let title = title
        .filter(|t| !t.trim().is_empty())
        .unwrap_or_else(|| client.default_title.clone());
    let mut registry = DialogRegistry::new(api);
    let dialog = registry
        .create_dialog(&title)
        .await
        .map_err(|e| api_failure(&mut gate, e, "Failed to create dialog"))?;

    println!("{}", dialog.id);
    Ok(())
}
