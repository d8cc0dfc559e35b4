use reqwest::Url;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::error::ConfigError;
use crate::models::DialogId;

// =============================================================================
// File config (figment-deserialized from defaults / config.toml / env vars)
// =============================================================================
//
//   config.toml:     [session]
//                    token = "eyJhbGciOi..."
//
//   env var:         OILAN_SESSION__TOKEN=eyJhbGciOi...   (double underscore = nesting)

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct FileConfig {
    #[serde(default)]
    pub server: ServerFileConfig,
    #[serde(default)]
    pub session: SessionFileConfig,
    #[serde(default)]
    pub chat: ChatFileConfig,
}

/// Backend location (lives under `[server]` in config.toml).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServerFileConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

impl Default for ServerFileConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

/// Ambient credentials (lives under `[session]` in config.toml).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SessionFileConfig {
    #[serde(default = "default_cookie_name")]
    pub cookie_name: String,
    /// Value of the session cookie issued by the backend's sign-in flow.
    #[serde(default)]
    pub token: Option<String>,
}

impl Default for SessionFileConfig {
    fn default() -> Self {
        Self {
            cookie_name: default_cookie_name(),
            token: None,
        }
    }
}

/// Chat behaviour (lives under `[chat]` in config.toml).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ChatFileConfig {
    #[serde(default = "default_title")]
    pub default_title: String,
    #[serde(default = "default_close_grace_ms")]
    pub close_grace_ms: u64,
}

impl Default for ChatFileConfig {
    fn default() -> Self {
        Self {
            default_title: default_title(),
            close_grace_ms: default_close_grace_ms(),
        }
    }
}

fn default_base_url() -> String {
    "http://localhost:8080".to_string()
}
fn default_request_timeout_secs() -> u64 {
    15
}
fn default_cookie_name() -> String {
    "jwt_token".to_string()
}
fn default_title() -> String {
    "New Web Chat".to_string()
}
fn default_close_grace_ms() -> u64 {
    2000
}

/// Build a figment that layers: defaults → `<data_dir>/config.toml` → OILAN_* env vars.
///
/// Env vars use double-underscore for nesting into sections:
///   `OILAN_SERVER__BASE_URL=https://oilan.org`  →  `server.base_url`
pub fn load_config(data_dir: &Path) -> figment::Figment {
    use figment::{
        Figment,
        providers::{Env, Format, Serialized, Toml},
    };

    Figment::from(Serialized::defaults(FileConfig::default()))
        .merge(Toml::file(data_dir.join("config.toml")))
        .merge(Env::prefixed("OILAN_").split("__"))
}

// =============================================================================
// Runtime config (derived from FileConfig, validated once)
// =============================================================================

#[derive(Clone, Debug)]
pub struct ClientConfig {
    /// Backend root, always ending in `/`. Also the sign-in entry page.
    pub base_url: Url,
    pub request_timeout: Duration,
    pub cookie_name: String,
    pub session_token: Option<String>,
    pub default_title: String,
    /// Upper bound on waiting for a released channel to finish closing.
    pub close_grace: Duration,
    session_url: Url,
    dialogs_url: Url,
    chat_ws_url: Url,
}

impl ClientConfig {
    pub fn from_file(fc: &FileConfig) -> Result<Self, ConfigError> {
        let invalid = |reason: String| ConfigError::InvalidBaseUrl {
            url: fc.server.base_url.clone(),
            reason,
        };

        let mut base = Url::parse(fc.server.base_url.trim()).map_err(|e| invalid(e.to_string()))?;
        let ws_scheme = match base.scheme() {
            "http" => "ws",
            "https" => "wss",
            other => return Err(invalid(format!("unsupported scheme '{other}'"))),
        };
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        base.set_query(None);
        base.set_fragment(None);

        let join = |path: &str| base.join(path).map_err(|e| invalid(e.to_string()));
        let session_url = join("api/v1/session")?;
        let dialogs_url = join("api/v1/dialogs")?;
        let mut chat_ws_url = join("ws/chat")?;
        chat_ws_url
            .set_scheme(ws_scheme)
            .map_err(|_| invalid("cannot derive websocket url".to_string()))?;

        Ok(Self {
            base_url: base,
            request_timeout: Duration::from_secs(fc.server.request_timeout_secs),
            cookie_name: fc.session.cookie_name.clone(),
            session_token: fc.session.token.clone().filter(|t| !t.is_empty()),
            default_title: fc.chat.default_title.clone(),
            close_grace: Duration::from_millis(fc.chat.close_grace_ms),
            session_url,
            dialogs_url,
            chat_ws_url,
        })
    }

    /// Where unauthenticated users are sent to sign in.
    pub fn entry_url(&self) -> &Url {
        &self.base_url
    }

    pub fn session_url(&self) -> &Url {
        &self.session_url
    }

    pub fn dialogs_url(&self) -> &Url {
        &self.dialogs_url
    }

    pub fn dialog_url(&self, id: &DialogId) -> Url {
        let mut url = self.dialogs_url.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments.pop_if_empty().push(id.as_str());
        }
        url
    }

    /// WebSocket target for a dialog's live channel.
    pub fn chat_url(&self, id: &DialogId) -> Url {
        let mut url = self.chat_ws_url.clone();
        url.query_pairs_mut().append_pair("dialogID", id.as_str());
        url
    }

    /// `Cookie` header value carrying the session, if one is configured.
    pub fn cookie_header(&self) -> Option<String> {
        self.session_token
            .as_ref()
            .map(|token| format!("{}={}", self.cookie_name, token))
    }
}
