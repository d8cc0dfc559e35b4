//! In-memory stand-ins for the history service, the channel transport, and
//! the front end, shared by the unit tests.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite;

use crate::api::ChatApi;
use crate::auth_gate::Navigator;
use crate::connection::{Channel, ChannelSignal, Transport};
use crate::error::{ApiError, TransportError};
use crate::message_log::{DisplayEvent, Notice, RenderSink};
use crate::models::{Dialog, DialogId, Message};

pub fn dialog(id: i64, title: &str) -> Dialog {
    Dialog {
        id: DialogId::from(id),
        title: title.to_string(),
    }
}

/// Wait for the next pump signal, failing the test if none arrives.
pub async fn next_signal(signals: &mut mpsc::UnboundedReceiver<ChannelSignal>) -> ChannelSignal {
    tokio::time::timeout(Duration::from_secs(2), signals.recv())
        .await
        .expect("timed out waiting for a channel signal")
        .expect("signal channel closed")
}

// =============================================================================
// History service
// =============================================================================

struct FakeApiState {
    session: Result<(), ApiError>,
    dialogs: Vec<Dialog>,
    histories: HashMap<DialogId, Result<Vec<Message>, ApiError>>,
    list_error: Option<ApiError>,
    create_error: Option<ApiError>,
    next_id: i64,
    calls: Vec<String>,
}

pub struct FakeApi {
    state: Mutex<FakeApiState>,
}

impl FakeApi {
    /// Authenticated, no dialogs, every history empty.
    pub fn new() -> Self {
        Self {
            state: Mutex::new(FakeApiState {
                session: Ok(()),
                dialogs: Vec::new(),
                histories: HashMap::new(),
                list_error: None,
                create_error: None,
                next_id: 100,
                calls: Vec::new(),
            }),
        }
    }

    pub fn set_session(&self, result: Result<(), ApiError>) {
        self.state.lock().unwrap().session = result;
    }

    pub fn set_dialogs(&self, dialogs: Vec<Dialog>) {
        let mut state = self.state.lock().unwrap();
        state.dialogs = dialogs;
        state.list_error = None;
    }

    pub fn fail_list(&self, err: ApiError) {
        self.state.lock().unwrap().list_error = Some(err);
    }

    pub fn fail_create(&self, err: ApiError) {
        self.state.lock().unwrap().create_error = Some(err);
    }

    pub fn set_history(&self, id: i64, result: Result<Vec<Message>, ApiError>) {
        self.state
            .lock()
            .unwrap()
            .histories
            .insert(DialogId::from(id), result);
    }

    /// Every call made so far, e.g. `"list"`, `"create:Title"`, `"history:7"`.
    pub fn calls(&self) -> Vec<String> {
        self.state.lock().unwrap().calls.clone()
    }
}

impl ChatApi for FakeApi {
    async fn check_session(&self) -> Result<(), ApiError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push("session".into());
        state.session.clone()
    }

    async fn list_dialogs(&self) -> Result<Vec<Dialog>, ApiError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push("list".into());
        match &state.list_error {
            Some(err) => Err(err.clone()),
            None => Ok(state.dialogs.clone()),
        }
    }

    async fn create_dialog(&self, title: &str) -> Result<Dialog, ApiError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(format!("create:{title}"));
        if let Some(err) = &state.create_error {
            return Err(err.clone());
        }
        let created = dialog(state.next_id, title);
        state.next_id += 1;
        state.dialogs.insert(0, created.clone());
        Ok(created)
    }

    async fn dialog_history(&self, id: &DialogId) -> Result<Vec<Message>, ApiError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(format!("history:{id}"));
        state.histories.get(id).cloned().unwrap_or(Ok(Vec::new()))
    }
}

// =============================================================================
// Channel transport
// =============================================================================

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TransportLog {
    Opened(String),
    Sent(String, String),
    Closed(String),
}

enum PeerEvent {
    Frame(String),
    Close,
    Fail,
}

#[derive(Default)]
struct FakeTransportState {
    log: Vec<TransportLog>,
    peers: HashMap<String, mpsc::UnboundedSender<PeerEvent>>,
    open_now: usize,
    max_open: usize,
    opens: usize,
    fail_opens: bool,
}

/// Records every open, send, and close in order. The test plays the server
/// side through `push_frame`, `close_peer`, and `fail_peer`.
#[derive(Clone, Default)]
pub struct FakeTransport {
    state: Arc<Mutex<FakeTransportState>>,
}

impl FakeTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn log(&self) -> Vec<TransportLog> {
        self.state.lock().unwrap().log.clone()
    }

    pub fn sent(&self) -> Vec<String> {
        self.log()
            .into_iter()
            .filter_map(|entry| match entry {
                TransportLog::Sent(_, text) => Some(text),
                _ => None,
            })
            .collect()
    }

    /// Most channels ever open at the same moment.
    pub fn max_open(&self) -> usize {
        self.state.lock().unwrap().max_open
    }

    pub fn open_count(&self) -> usize {
        self.state.lock().unwrap().opens
    }

    pub fn fail_opens(&self, fail: bool) {
        self.state.lock().unwrap().fail_opens = fail;
    }

    pub fn push_frame(&self, dialog: &str, text: &str) {
        self.to_peer(dialog, PeerEvent::Frame(text.to_string()));
    }

    pub fn close_peer(&self, dialog: &str) {
        self.to_peer(dialog, PeerEvent::Close);
    }

    pub fn fail_peer(&self, dialog: &str) {
        self.to_peer(dialog, PeerEvent::Fail);
    }

    pub async fn wait_for_log_len(&self, len: usize) {
        let wait = async {
            while self.log().len() < len {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        };
        tokio::time::timeout(Duration::from_secs(2), wait)
            .await
            .unwrap_or_else(|_| panic!("transport log never reached {len}: {:?}", self.log()));
    }

    fn to_peer(&self, dialog: &str, event: PeerEvent) {
        let state = self.state.lock().unwrap();
        let peer = state
            .peers
            .get(dialog)
            .unwrap_or_else(|| panic!("no channel was opened for dialog {dialog}"));
        let _ = peer.send(event);
    }
}

impl Transport for FakeTransport {
    type Channel = FakeChannel;

    async fn open(&self, dialog: &DialogId) -> Result<FakeChannel, TransportError> {
        let mut state = self.state.lock().unwrap();
        if state.fail_opens {
            return Err(TransportError::InvalidTarget(format!(
                "refused dialog {dialog}"
            )));
        }
        let (peer_tx, peer_rx) = mpsc::unbounded_channel();
        state.peers.insert(dialog.to_string(), peer_tx);
        state.log.push(TransportLog::Opened(dialog.to_string()));
        state.opens += 1;
        state.open_now += 1;
        state.max_open = state.max_open.max(state.open_now);
        Ok(FakeChannel {
            dialog: dialog.to_string(),
            peer: peer_rx,
            state: self.state.clone(),
        })
    }
}

pub struct FakeChannel {
    dialog: String,
    peer: mpsc::UnboundedReceiver<PeerEvent>,
    state: Arc<Mutex<FakeTransportState>>,
}

impl Channel for FakeChannel {
    async fn send(&mut self, frame: String) -> Result<(), TransportError> {
        self.state
            .lock()
            .unwrap()
            .log
            .push(TransportLog::Sent(self.dialog.clone(), frame));
        Ok(())
    }

    async fn recv(&mut self) -> Option<Result<String, TransportError>> {
        match self.peer.recv().await? {
            PeerEvent::Frame(text) => Some(Ok(text)),
            PeerEvent::Close => None,
            PeerEvent::Fail => Some(Err(TransportError::WebSocket(
                tungstenite::Error::ConnectionClosed,
            ))),
        }
    }

    async fn close(&mut self) {
        self.state
            .lock()
            .unwrap()
            .log
            .push(TransportLog::Closed(self.dialog.clone()));
    }
}

impl Drop for FakeChannel {
    fn drop(&mut self) {
        if let Ok(mut state) = self.state.lock() {
            state.open_now = state.open_now.saturating_sub(1);
        }
    }
}

// =============================================================================
// Front end
// =============================================================================

#[derive(Clone, Default)]
pub struct RecordingSink {
    events: Arc<Mutex<Vec<DisplayEvent>>>,
}

impl RecordingSink {
    pub fn events(&self) -> Vec<DisplayEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn messages(&self) -> Vec<Message> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                DisplayEvent::Message(message) => Some(message),
                _ => None,
            })
            .collect()
    }

    pub fn notices(&self) -> Vec<Notice> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                DisplayEvent::Notice(notice) => Some(notice),
                _ => None,
            })
            .collect()
    }

    pub fn clear(&self) {
        self.events.lock().unwrap().clear();
    }
}

impl RenderSink for RecordingSink {
    fn render(&mut self, event: DisplayEvent) {
        self.events.lock().unwrap().push(event);
    }
}

#[derive(Clone, Default)]
pub struct RecordingNavigator {
    redirects: Arc<Mutex<Vec<String>>>,
}

impl RecordingNavigator {
    pub fn redirects(&self) -> Vec<String> {
        self.redirects.lock().unwrap().clone()
    }
}

impl Navigator for RecordingNavigator {
    fn redirect_to_entry(&mut self, entry_url: &str) {
        self.redirects.lock().unwrap().push(entry_url.to_string());
    }
}
