use std::future::Future;

use reqwest::header::{COOKIE, HeaderMap, HeaderValue};
use reqwest::{Response, StatusCode, Url};
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use crate::config::ClientConfig;
use crate::error::ApiError;
use crate::models::{ApiErrorBody, CreateDialogRequest, Dialog, DialogDetail, DialogId, Message};

/// REST contract of the history service.
pub trait ChatApi: Send + Sync + 'static {
    /// `GET /api/v1/session`: succeeds only for an authenticated session.
    fn check_session(&self) -> impl Future<Output = Result<(), ApiError>> + Send;

    /// `GET /api/v1/dialogs`, in server order (most recent first).
    fn list_dialogs(&self) -> impl Future<Output = Result<Vec<Dialog>, ApiError>> + Send;

    /// `POST /api/v1/dialogs`.
    fn create_dialog(&self, title: &str) -> impl Future<Output = Result<Dialog, ApiError>> + Send;

    /// `GET /api/v1/dialogs/{id}`, oldest message first.
    fn dialog_history(
        &self,
        id: &DialogId,
    ) -> impl Future<Output = Result<Vec<Message>, ApiError>> + Send;
}

/// [`ChatApi`] over HTTP, authenticated by the session cookie.
#[derive(Clone)]
pub struct HttpChatApi {
    client: reqwest::Client,
    config: ClientConfig,
}

impl HttpChatApi {
    pub fn new(config: &ClientConfig) -> Result<Self, ApiError> {
        let mut headers = HeaderMap::new();
        if let Some(cookie) = config.cookie_header() {
            let value = HeaderValue::from_str(&cookie).map_err(|_| {
                ApiError::HistoryUnavailable("session token is not a valid header value".into())
            })?;
            headers.insert(COOKIE, value);
        }

        // The backend answers unauthenticated requests with a redirect to the
        // entry page; following it would turn a sign-out into a 200.
        let client = reqwest::Client::builder()
            .default_headers(headers)
            .redirect(reqwest::redirect::Policy::none())
            .timeout(config.request_timeout)
            .build()
            .map_err(ApiError::from_reqwest)?;

        Ok(Self {
            client,
            config: config.clone(),
        })
    }

    async fn get(&self, url: &Url) -> Result<Option<Response>, ApiError> {
        debug!(%url, "GET");
        let resp = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(ApiError::from_reqwest)?;
        check_status(resp).await
    }
}

impl ChatApi for HttpChatApi {
    async fn check_session(&self) -> Result<(), ApiError> {
        let resp = self
            .client
            .get(self.config.session_url().clone())
            .send()
            .await
            .map_err(ApiError::from_reqwest)?;
        if resp.status().is_success() {
            Ok(())
        } else {
            debug!(status = %resp.status(), "session check rejected");
            Err(ApiError::Unauthorized)
        }
    }

    async fn list_dialogs(&self) -> Result<Vec<Dialog>, ApiError> {
        match self.get(self.config.dialogs_url()).await? {
            Some(resp) => decode(resp).await,
            None => Ok(Vec::new()),
        }
    }

    async fn create_dialog(&self, title: &str) -> Result<Dialog, ApiError> {
        let url = self.config.dialogs_url();
        debug!(%url, title, "POST");
        let resp = self
            .client
            .post(url.clone())
            .json(&CreateDialogRequest { title })
            .send()
            .await
            .map_err(ApiError::from_reqwest)?;
        match check_status(resp).await? {
            Some(resp) => decode(resp).await,
            None => Err(ApiError::HistoryUnavailable(
                "no dialog returned by create".into(),
            )),
        }
    }

    async fn dialog_history(&self, id: &DialogId) -> Result<Vec<Message>, ApiError> {
        match self.get(&self.config.dialog_url(id)).await? {
            Some(resp) => Ok(decode::<DialogDetail>(resp).await?.into_messages()),
            None => Ok(Vec::new()),
        }
    }
}

/// Map a response onto the error taxonomy. `Ok(None)` means 204 No Content.
async fn check_status(resp: Response) -> Result<Option<Response>, ApiError> {
    let status = resp.status();
    if status == StatusCode::UNAUTHORIZED || status.is_redirection() {
        return Err(ApiError::Unauthorized);
    }
    if status == StatusCode::NO_CONTENT {
        return Ok(None);
    }
    if status.is_success() {
        return Ok(Some(resp));
    }

    let text = resp.text().await.unwrap_or_default();
    let detail = serde_json::from_str::<ApiErrorBody>(&text)
        .map(|body| body.error)
        .unwrap_or(text);
    warn!(%status, %detail, "history request failed");
    if detail.is_empty() {
        Err(ApiError::HistoryUnavailable(status.to_string()))
    } else {
        Err(ApiError::HistoryUnavailable(format!("{status}: {detail}")))
    }
}

async fn decode<T: DeserializeOwned>(resp: Response) -> Result<T, ApiError> {
    resp.json().await.map_err(ApiError::from_reqwest)
}
