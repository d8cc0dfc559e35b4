use tokio_tungstenite::tungstenite;

/// Failures of a REST round trip against the history service.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ApiError {
    /// The session cookie is missing, invalid, or expired.
    #[error("session is not authorized")]
    Unauthorized,

    #[error("history service unavailable: {0}")]
    HistoryUnavailable(String),
}

impl ApiError {
    pub fn from_reqwest(err: reqwest::Error) -> Self {
        Self::HistoryUnavailable(err.to_string())
    }
}

/// Failures of the live dialog channel.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("invalid channel target: {0}")]
    InvalidTarget(String),

    #[error("websocket error: {0}")]
    WebSocket(#[from] tungstenite::Error),
}

/// `send` was attempted while no channel is open. Never queued.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("not connected")]
pub struct NotConnected;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid base url '{url}': {reason}")]
    InvalidBaseUrl { url: String, reason: String },

    #[error(transparent)]
    Figment(#[from] Box<figment::Error>),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Figment(Box::new(err))
    }
}

/// Errors returned by session operations.
///
/// By the time a caller sees one of these, the session has already rendered
/// it (inline notice or redirect); the value is informational.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    /// The user was sent to the entry page. The session is finished.
    #[error("session is not authorized")]
    Unauthorized,

    #[error("history service unavailable: {0}")]
    HistoryUnavailable(String),

    #[error("not connected")]
    NotConnected,

    #[error("message is empty")]
    EmptyInput,

    #[error("still waiting for a reply to the previous message")]
    ExchangeInFlight,

    #[error("session actor is gone")]
    ActorGone,
}

impl From<ApiError> for SessionError {
    fn from(err: ApiError) -> Self {
        match err {
            ApiError::Unauthorized => Self::Unauthorized,
            ApiError::HistoryUnavailable(msg) => Self::HistoryUnavailable(msg),
        }
    }
}

impl From<NotConnected> for SessionError {
    fn from(_: NotConnected) -> Self {
        Self::NotConnected
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn api_error_display() {
        assert_eq!(ApiError::Unauthorized.to_string(), "session is not authorized");
        assert_eq!(
            ApiError::HistoryUnavailable("500 Internal Server Error".into()).to_string(),
            "history service unavailable: 500 Internal Server Error"
        );
    }

    #[test]
    fn api_error_maps_into_session_error() {
        assert_eq!(
            SessionError::from(ApiError::Unauthorized),
            SessionError::Unauthorized
        );
        assert_eq!(
            SessionError::from(ApiError::HistoryUnavailable("down".into())),
            SessionError::HistoryUnavailable("down".into())
        );
    }

    #[test]
    fn not_connected_maps_into_session_error() {
        assert_eq!(SessionError::from(NotConnected), SessionError::NotConnected);
        assert_eq!(NotConnected.to_string(), "not connected");
    }

    #[tokio::test]
    async fn from_reqwest_connect_error_is_history_unavailable() {
        // Port 1 is reserved and nothing listens on it
        let err = reqwest::get("http://127.0.0.1:1/api/v1/dialogs")
            .await
            .unwrap_err();
        assert!(matches!(
            ApiError::from_reqwest(err),
            ApiError::HistoryUnavailable(_)
        ));
    }

    #[test]
    fn transport_error_wraps_tungstenite() {
        let err: TransportError = tungstenite::Error::ConnectionClosed.into();
        assert!(matches!(err, TransportError::WebSocket(_)));
        assert!(err.to_string().starts_with("websocket error"));
    }
}
