use std::sync::Arc;

use tracing::debug;

use crate::api::ChatApi;
use crate::error::ApiError;
use crate::models::{Dialog, DialogId, Message};

/// The user's dialogs, as of the most recent listing.
pub struct DialogRegistry<A> {
    api: Arc<A>,
    dialogs: Vec<Dialog>,
}

impl<A: ChatApi> DialogRegistry<A> {
    pub fn new(api: Arc<A>) -> Self {
        Self {
            api,
            dialogs: Vec::new(),
        }
    }

    /// Fetch the listing and replace the cached copy. On failure the cache is left as is.
    pub async fn list_dialogs(&mut self) -> Result<&[Dialog], ApiError> {
        let dialogs = self.api.list_dialogs().await?;
        debug!(count = dialogs.len(), "dialog listing refreshed");
        self.dialogs = dialogs;
        Ok(&self.dialogs)
    }

    /// Create a dialog and put it at the head of the cached listing.
    pub async fn create_dialog(&mut self, title: &str) -> Result<Dialog, ApiError> {
        let dialog = self.api.create_dialog(title).await?;
        debug!(dialog_id = %dialog.id, title = %dialog.title, "dialog created");
        self.dialogs.retain(|d| d.id != dialog.id);
        self.dialogs.insert(0, dialog.clone());
        Ok(dialog)
    }

    pub async fn fetch_history(&self, id: &DialogId) -> Result<Vec<Message>, ApiError> {
        let history = self.api.dialog_history(id).await?;
        debug!(dialog_id = %id, count = history.len(), "history fetched");
        Ok(history)
    }

    /// Last listing result. May be stale.
    pub fn cached(&self) -> &[Dialog] {
        &self.dialogs
    }
}
