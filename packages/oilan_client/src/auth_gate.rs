use tracing::{info, warn};

use crate::api::ChatApi;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AuthStatus {
    Authenticated,
    Unauthenticated,
}

/// Where an unauthenticated user is sent. A browser front end navigates;
/// a terminal front end tells the user where to sign in.
pub trait Navigator: Send {
    fn redirect_to_entry(&mut self, entry_url: &str);
}

impl<F> Navigator for F
where
    F: FnMut(&str) + Send,
{
    fn redirect_to_entry(&mut self, entry_url: &str) {
        self(entry_url)
    }
}

/// Pre-flight session check. Fails closed and redirects at most once.
pub struct AuthGate {
    entry_url: String,
    navigator: Box<dyn Navigator>,
    redirected: bool,
}

impl AuthGate {
    pub fn new(entry_url: impl Into<String>, navigator: Box<dyn Navigator>) -> Self {
        Self {
            entry_url: entry_url.into(),
            navigator,
            redirected: false,
        }
    }

    /// Ask the history service whether the ambient session is valid.
    /// Any failure, including an unreachable service, counts as unauthenticated.
    pub async fn check_session<A: ChatApi>(&mut self, api: &A) -> AuthStatus {
        match api.check_session().await {
            Ok(()) => {
                info!("session authenticated");
                AuthStatus::Authenticated
            }
            Err(e) => {
                warn!(error = %e, "session check failed");
                self.redirect();
                AuthStatus::Unauthenticated
            }
        }
    }

    /// Send the user to the entry page. Later calls are no-ops.
    pub fn redirect(&mut self) {
        if self.redirected {
            return;
        }
        self.redirected = true;
        info!(entry_url = %self.entry_url, "redirecting to entry page");
        self.navigator.redirect_to_entry(&self.entry_url);
    }

    pub fn is_redirected(&self) -> bool {
        self.redirected
    }
}
