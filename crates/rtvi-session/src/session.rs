use crate::bus::{EventBus, SubscriptionHandle};
use crate::dispatcher::{self, Dispatcher};
use crate::helper::{Helper, HelperRegistry};
use crate::options::SessionOptions;
use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use rtvi_core::{
    EventKind, InboundEvent, OutboundAction, OutboundMessage, RtviError, RtviResult,
    ServiceConfig, ServiceConfigBuilder, SessionState,
};
use rtvi_transport::{
    codec, ConnectParams, HttpProvisioner, InboundFrame, ProvisionRequest, Provisioner, Transport,
    TransportEvent,
};
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Why a session ended in [`SessionState::Error`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// The service configuration was rejected before any I/O.
    Configuration,
    /// Provisioning or the transport failed, or the connection was lost.
    Transport,
    /// The bot did not become ready in time.
    Timeout {
        /// The timeout that elapsed.
        timeout_ms: u64,
    },
    /// The backend reported a fatal error event.
    Backend,
}

/// The terminal failure of a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionFailure {
    /// Failure category.
    pub kind: FailureKind,
    /// Human-readable detail.
    pub detail: String,
    /// When the session failed.
    pub at: DateTime<Utc>,
}

impl SessionFailure {
    fn new(kind: FailureKind, detail: impl Into<String>) -> Self {
        Self {
            kind,
            detail: detail.into(),
            at: Utc::now(),
        }
    }

    fn from_error(err: &RtviError) -> Self {
        match err {
            RtviError::Configuration(detail) => Self::new(FailureKind::Configuration, detail.clone()),
            RtviError::Timeout { timeout_ms } => Self::new(
                FailureKind::Timeout {
                    timeout_ms: *timeout_ms,
                },
                err.to_string(),
            ),
            RtviError::Backend { detail } => Self::new(FailureKind::Backend, detail.clone()),
            RtviError::Transport(detail) => Self::new(FailureKind::Transport, detail.clone()),
            other => Self::new(FailureKind::Transport, other.to_string()),
        }
    }

    /// The error a caller sees for this failure.
    pub fn to_error(&self) -> RtviError {
        match self.kind {
            FailureKind::Configuration => RtviError::Configuration(self.detail.clone()),
            FailureKind::Transport => RtviError::Transport(self.detail.clone()),
            FailureKind::Timeout { timeout_ms } => RtviError::Timeout { timeout_ms },
            FailureKind::Backend => RtviError::Backend {
                detail: self.detail.clone(),
            },
        }
    }
}

/// One state transition, as broadcast to [`Session::subscribe_state`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StateChange {
    /// State before the transition.
    pub from: SessionState,
    /// State after the transition.
    pub to: SessionState,
}

type PendingCalls = HashMap<String, oneshot::Sender<RtviResult<Value>>>;

/// State shared between a session, its dispatcher and its reader task.
pub(crate) struct SessionCore {
    pub(crate) id: Uuid,
    pub(crate) transport: Arc<dyn Transport>,
    pub(crate) pending: Mutex<PendingCalls>,
    bus: EventBus,
    helpers: RwLock<HelperRegistry>,
    state: watch::Sender<SessionState>,
    transitions: broadcast::Sender<StateChange>,
    failure: Mutex<Option<SessionFailure>>,
    rejected_frames: AtomicU64,
}

impl SessionCore {
    fn new(transport: Arc<dyn Transport>) -> Self {
        let (state, _) = watch::channel(SessionState::Idle);
        let (transitions, _) = broadcast::channel(32);
        Self {
            id: Uuid::new_v4(),
            transport,
            pending: Mutex::new(HashMap::new()),
            bus: EventBus::new(),
            helpers: RwLock::new(HelperRegistry::new()),
            state,
            transitions,
            failure: Mutex::new(None),
            rejected_frames: AtomicU64::new(0),
        }
    }

    pub(crate) fn state(&self) -> SessionState {
        *self.state.borrow()
    }

    pub(crate) fn ensure_ready(&self, operation: &'static str) -> RtviResult<()> {
        match self.state() {
            SessionState::Ready => Ok(()),
            state => Err(RtviError::InvalidState { state, operation }),
        }
    }

    /// Move to `next` if the state machine allows it from the current state.
    fn transition(&self, next: SessionState) -> bool {
        self.transition_with(next, None)
    }

    /// Move to `Error`, recording `failure`. No-op once terminal.
    fn fail(&self, failure: SessionFailure) -> bool {
        let detail = failure.detail.clone();
        let failed = self.transition_with(SessionState::Error, Some(failure));
        if failed {
            error!(session_id = %self.id, detail = %detail, "Session failed");
        }
        failed
    }

    fn transition_with(&self, next: SessionState, failure: Option<SessionFailure>) -> bool {
        let mut from = None;
        self.state.send_if_modified(|current| {
            if !current.can_transition_to(next) {
                return false;
            }
            // Recorded before waiters observe the new state.
            if let Some(failure) = failure {
                *self.failure.lock() = Some(failure);
            }
            from = Some(*current);
            *current = next;
            true
        });

        let Some(from) = from else {
            return false;
        };
        info!(session_id = %self.id, from = %from, to = %next, "Session state changed");
        let _ = self.transitions.send(StateChange { from, to: next });
        true
    }

    fn failure(&self) -> Option<SessionFailure> {
        self.failure.lock().clone()
    }

    /// Release everything the connection holds: the transport, in-flight
    /// calls and subscriptions.
    async fn release(&self) {
        if let Err(e) = self.transport.disconnect().await {
            warn!(session_id = %self.id, error = %e, "Transport disconnect failed");
        }
        let pending: Vec<_> = self.pending.lock().drain().collect();
        if !pending.is_empty() {
            debug!(session_id = %self.id, calls = pending.len(), "Cancelling pending calls");
        }
        for (_, tx) in pending {
            let _ = tx.send(Err(RtviError::Cancelled));
        }
        self.bus.clear();
    }

    /// Process one transport event. Returns `false` once the reader should stop.
    async fn on_transport_event(&self, event: TransportEvent) -> bool {
        match event {
            TransportEvent::Frame(frame) => self.on_frame(frame).await,
            TransportEvent::Closed(reason) => {
                let detail = match reason {
                    Some(reason) if !reason.is_empty() => format!("connection closed: {reason}"),
                    _ => "connection closed".to_string(),
                };
                self.transport_lost(detail).await;
                false
            }
            TransportEvent::Failed(detail) => {
                self.transport_lost(detail).await;
                false
            }
        }
    }

    async fn on_frame(&self, frame: Value) -> bool {
        match codec::decode(frame) {
            Ok(InboundFrame::Event(event)) => self.deliver(event).await,
            Ok(InboundFrame::ActionResponse { id, payload }) => {
                let tx = self.pending.lock().remove(&id);
                match tx {
                    Some(tx) => {
                        let _ = tx.send(dispatcher::call_result(payload));
                    }
                    None => debug!(session_id = %self.id, id = %id, "Response for unknown call"),
                }
                true
            }
            Err(e) => {
                self.rejected_frames.fetch_add(1, Ordering::Relaxed);
                warn!(session_id = %self.id, error = %e, "Rejected inbound frame");
                true
            }
        }
    }

    async fn deliver(&self, event: InboundEvent) -> bool {
        match &event {
            InboundEvent::Ready => {
                if !self.transition(SessionState::Ready) {
                    debug!(session_id = %self.id, state = %self.state(), "Ignoring ready signal");
                    return true;
                }
                self.bus.publish(&event);
            }
            InboundEvent::Error { detail } => {
                let failure = SessionFailure::new(FailureKind::Backend, detail.clone());
                if self.fail(failure) {
                    self.bus.publish(&event);
                    self.release().await;
                }
                return false;
            }
            InboundEvent::GenericMessage {
                service_label,
                payload,
            } => {
                self.route_to_helper(service_label, payload);
                self.bus.publish(&event);
            }
            InboundEvent::Transcript { .. } => {
                self.bus.publish(&event);
            }
        }
        true
    }

    fn route_to_helper(&self, service: &str, payload: &Value) {
        let helper = self.helpers.read().get(service);
        match helper {
            Ok(helper) => {
                if let Err(e) = helper.handle_message(payload) {
                    warn!(session_id = %self.id, service = %service, error = %e, "Helper rejected message");
                }
            }
            Err(e) => debug!(session_id = %self.id, error = %e, "Generic message not routed"),
        }
    }

    async fn transport_lost(&self, detail: String) {
        match self.state() {
            SessionState::Connecting | SessionState::Ready => {
                if self.fail(SessionFailure::new(FailureKind::Transport, detail)) {
                    self.release().await;
                }
            }
            state => debug!(session_id = %self.id, state = %state, detail = %detail, "Transport closed"),
        }
    }
}

/// Reads the connection until it ends or the session fails.
async fn read_loop(core: Arc<SessionCore>, mut events: mpsc::UnboundedReceiver<TransportEvent>) {
    while let Some(event) = events.recv().await {
        if !core.on_transport_event(event).await {
            return;
        }
    }
    core.transport_lost("transport stream ended".to_string()).await;
}

/// One voice/LLM conversation with a remote bot.
///
/// A session is driven once through `Idle → Initializing → Connecting →
/// Ready` by [`connect`](Self::connect) and ends in `Disconnected` or
/// `Error`. Terminal sessions are not reused; construct a new one to retry.
///
/// Call [`disconnect`](Self::disconnect) before dropping a live session:
/// `Drop` cannot await the transport close, so dropping a connected session
/// only stops reading and logs a warning.
pub struct Session {
    core: Arc<SessionCore>,
    dispatcher: Dispatcher,
    options: SessionOptions,
    provisioner: Arc<dyn Provisioner>,
    config: Mutex<Option<ServiceConfig>>,
    reader: Mutex<Option<JoinHandle<()>>>,
    created_at: DateTime<Utc>,
}

impl Session {
    /// Creates an idle session. Nothing is sent until [`connect`](Self::connect).
    pub fn new(
        options: SessionOptions,
        transport: Arc<dyn Transport>,
        provisioner: Arc<dyn Provisioner>,
    ) -> Self {
        let core = Arc::new(SessionCore::new(transport));
        let dispatcher = Dispatcher::new(Arc::clone(&core));
        info!(session_id = %core.id, base_url = %options.base_url, "Session created");
        Self {
            core,
            dispatcher,
            options,
            provisioner,
            config: Mutex::new(None),
            reader: Mutex::new(None),
            created_at: Utc::now(),
        }
    }

    /// Creates a session that provisions its bot by POSTing to `options.base_url`.
    pub fn with_transport(options: SessionOptions, transport: Arc<dyn Transport>) -> Self {
        let provisioner = Arc::new(HttpProvisioner::new(options.base_url.clone()));
        Self::new(options, transport, provisioner)
    }

    /// Unique id, also attached to every log line of this session.
    pub fn id(&self) -> Uuid {
        self.core.id
    }

    /// When the session was constructed.
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// The options the session was built from.
    pub fn options(&self) -> &SessionOptions {
        &self.options
    }

    /// Current lifecycle state.
    pub fn state(&self) -> SessionState {
        self.core.state()
    }

    /// Receives every transition made after this call.
    pub fn subscribe_state(&self) -> broadcast::Receiver<StateChange> {
        self.core.transitions.subscribe()
    }

    /// Watches the current state.
    pub fn watch_state(&self) -> watch::Receiver<SessionState> {
        self.core.state.subscribe()
    }

    /// The failure that put the session into `Error`, if any.
    pub fn failure(&self) -> Option<SessionFailure> {
        self.core.failure()
    }

    /// The merged service configuration sent when provisioning.
    pub fn config(&self) -> Option<ServiceConfig> {
        self.config.lock().clone()
    }

    /// Inbound frames dropped because they could not be decoded.
    pub fn rejected_frames(&self) -> u64 {
        self.core.rejected_frames.load(Ordering::Relaxed)
    }

    /// Connect and wait until the bot is ready.
    ///
    /// Fails with [`RtviError::Configuration`] before any I/O if the options
    /// do not build a valid config, with [`RtviError::Transport`] if
    /// provisioning or the transport fails, and with [`RtviError::Timeout`]
    /// if no readiness signal arrives within the configured timeout. Each of
    /// those leaves the session in `Error`. A concurrent
    /// [`disconnect`](Self::disconnect) makes it return [`RtviError::Cancelled`].
    pub async fn connect(&self) -> RtviResult<()> {
        if !self.core.transition(SessionState::Initializing) {
            return Err(RtviError::InvalidState {
                state: self.state(),
                operation: "connect",
            });
        }

        let built = ServiceConfigBuilder::new(Some(&self.options.base_url)).build(
            Some(&self.options.services),
            Some(&self.options.config),
            &self.options.system_prompt,
        );
        let config = match built {
            Ok(config) => config,
            Err(e) => {
                self.core.fail(SessionFailure::from_error(&e));
                return Err(e);
            }
        };
        *self.config.lock() = Some(config.clone());

        if !self.core.transition(SessionState::Connecting) {
            return Err(self.interrupted());
        }

        let request = ProvisionRequest {
            services: self.options.services.clone(),
            config,
        };
        let mut watcher = self.core.state.subscribe();
        let outcome = tokio::time::timeout(self.options.timeout(), async {
            tokio::select! {
                started = self.start(&request) => started?,
                _ = left_connecting(&mut watcher) => {}
            }
            Ok::<_, RtviError>(left_connecting(&mut watcher).await)
        })
        .await;

        match outcome {
            Ok(Ok(SessionState::Ready)) => {
                info!(session_id = %self.core.id, "Session ready");
                Ok(())
            }
            Ok(Ok(SessionState::Error)) => {
                // The reader failed the session and is releasing it.
                self.join_reader().await;
                Err(self.interrupted())
            }
            // A concurrent disconnect owns the teardown.
            Ok(Ok(_)) => Err(self.interrupted()),
            Ok(Err(e)) => {
                if self.core.fail(SessionFailure::from_error(&e)) {
                    self.stop_reader();
                    self.core.release().await;
                }
                Err(e)
            }
            Err(_) => {
                let e = RtviError::Timeout {
                    timeout_ms: self.options.timeout_ms,
                };
                if self.core.fail(SessionFailure::from_error(&e)) {
                    self.stop_reader();
                    self.core.release().await;
                    return Err(e);
                }
                // Lost the race against a concurrent transition.
                match self.state() {
                    SessionState::Ready => Ok(()),
                    _ => Err(self.interrupted()),
                }
            }
        }
    }

    async fn start(&self, request: &ProvisionRequest) -> RtviResult<()> {
        let response = self.provisioner.provision(request).await?;
        let params = ConnectParams::from_provision(response);
        let events = self.core.transport.connect(&params).await?;
        info!(
            session_id = %self.core.id,
            transport = %self.core.transport.name(),
            "Transport connected"
        );
        let reader = tokio::spawn(read_loop(Arc::clone(&self.core), events));
        *self.reader.lock() = Some(reader);
        Ok(())
    }

    fn interrupted(&self) -> RtviError {
        self.core
            .failure()
            .map(|f| f.to_error())
            .unwrap_or(RtviError::Cancelled)
    }

    /// Wait for a reader that is finishing on its own.
    async fn join_reader(&self) {
        let reader = self.reader.lock().take();
        if let Some(reader) = reader {
            if let Err(e) = reader.await {
                warn!(session_id = %self.core.id, error = %e, "Reader task ended abnormally");
                self.core.release().await;
            }
        }
    }

    fn stop_reader(&self) {
        if let Some(reader) = self.reader.lock().take() {
            reader.abort();
        }
    }

    /// Close the session. A no-op on a session that is already terminal or
    /// disconnecting.
    pub async fn disconnect(&self) -> RtviResult<()> {
        if !self.core.transition(SessionState::Disconnecting) {
            debug!(session_id = %self.core.id, state = %self.state(), "Disconnect ignored");
            return Ok(());
        }
        self.stop_reader();
        self.core.release().await;
        self.core.transition(SessionState::Disconnected);
        Ok(())
    }

    /// Register `helper` for `service`, replacing any previous one.
    pub fn register_helper(
        &self,
        service: impl Into<String>,
        helper: Arc<dyn Helper>,
    ) -> Option<Arc<dyn Helper>> {
        self.core.helpers.write().register(service, helper)
    }

    /// The helper registered for `service`.
    pub fn helper(&self, service: &str) -> RtviResult<Arc<dyn Helper>> {
        self.core.helpers.read().get(service)
    }

    /// See [`EventBus::subscribe`].
    pub fn subscribe<F>(&self, kind: EventKind, callback: F) -> SubscriptionHandle
    where
        F: Fn(&InboundEvent) + Send + Sync + 'static,
    {
        self.core.bus.subscribe(kind, callback)
    }

    /// See [`EventBus::subscribe_all`].
    pub fn subscribe_all<F>(&self, callback: F) -> SubscriptionHandle
    where
        F: Fn(&InboundEvent) + Send + Sync + 'static,
    {
        self.core.bus.subscribe_all(callback)
    }

    /// See [`EventBus::unsubscribe`].
    pub fn unsubscribe(&self, handle: SubscriptionHandle) -> bool {
        self.core.bus.unsubscribe(handle)
    }

    /// Number of live subscriptions.
    pub fn subscriber_count(&self) -> usize {
        self.core.bus.subscriber_count()
    }

    /// A handle for sending from other tasks.
    pub fn dispatcher(&self) -> Dispatcher {
        self.dispatcher.clone()
    }

    /// See [`Dispatcher::send`].
    pub async fn send(&self, message: OutboundMessage) -> RtviResult<()> {
        self.dispatcher.send(message).await
    }

    /// See [`Dispatcher::call`].
    pub async fn call(&self, action: OutboundAction) -> RtviResult<Value> {
        self.dispatcher.call(action).await
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        let state = self.state();
        if state.is_terminal() {
            // A reader still running after a failure exits once its
            // teardown is done.
            drop(self.reader.lock().take());
            return;
        }
        if state != SessionState::Idle {
            warn!(
                session_id = %self.core.id,
                state = %state,
                "Session dropped without disconnect, transport may still be open"
            );
        }
        self.stop_reader();
    }
}

async fn left_connecting(watcher: &mut watch::Receiver<SessionState>) -> SessionState {
    match watcher.wait_for(|s| *s != SessionState::Connecting).await {
        Ok(state) => *state,
        Err(_) => SessionState::Disconnected,
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use rtvi_transport::{MemoryTransport, StaticProvisioner};
    use serde_json::json;

    fn session(transport: &MemoryTransport) -> Session {
        Session::new(
            SessionOptions::new("http://localhost/api"),
            Arc::new(transport.clone()),
            Arc::new(StaticProvisioner::new(json!({"url": "memory://bot"}))),
        )
    }

    #[test]
    fn test_new_session_is_idle() {
        let s = session(&MemoryTransport::new());
        assert_eq!(s.state(), SessionState::Idle);
        assert!(s.failure().is_none());
        assert!(s.config().is_none());
    }

    #[test]
    fn test_transition_rules() {
        let core = SessionCore::new(Arc::new(MemoryTransport::new()));
        assert!(!core.transition(SessionState::Ready));
        assert!(core.transition(SessionState::Initializing));
        assert!(core.transition(SessionState::Connecting));
        assert!(core.fail(SessionFailure::new(FailureKind::Transport, "x")));
        assert!(!core.fail(SessionFailure::new(FailureKind::Backend, "y")));
        assert_eq!(core.failure().unwrap().kind, FailureKind::Transport);
    }

    #[test]
    fn test_failure_round_trips_to_error() {
        let f = SessionFailure::from_error(&RtviError::Timeout { timeout_ms: 5 });
        assert!(matches!(f.to_error(), RtviError::Timeout { timeout_ms: 5 }));
        let f = SessionFailure::from_error(&RtviError::Backend { detail: "d".into() });
        assert!(matches!(f.to_error(), RtviError::Backend { ref detail } if detail == "d"));
    }

    #[tokio::test]
    async fn test_config_error_moves_to_error_without_io() {
        let transport = MemoryTransport::new();
        let s = Session::new(
            SessionOptions::new("http://localhost/api").with_config(ServiceConfig::new()),
            Arc::new(transport.clone()),
            Arc::new(StaticProvisioner::new(json!({}))),
        );
        let err = s.connect().await.unwrap_err();
        assert!(matches!(err, RtviError::Configuration(_)));
        assert_eq!(s.state(), SessionState::Error);
        assert_eq!(s.failure().unwrap().kind, FailureKind::Configuration);
        assert_eq!(transport.connect_count(), 0);
    }

    #[tokio::test]
    async fn test_connect_twice_is_invalid_state() {
        let transport = MemoryTransport::new();
        transport.push_frame(json!({"type": "bot-ready"}));
        let s = session(&transport);
        s.connect().await.unwrap();
        let err = s.connect().await.unwrap_err();
        assert!(matches!(
            err,
            RtviError::InvalidState {
                state: SessionState::Ready,
                operation: "connect"
            }
        ));
    }

    #[tokio::test]
    async fn test_transitions_are_broadcast() {
        let transport = MemoryTransport::new();
        transport.push_frame(json!({"type": "bot-ready"}));
        let s = session(&transport);
        let mut changes = s.subscribe_state();
        s.connect().await.unwrap();
        s.disconnect().await.unwrap();

        let mut seen = Vec::new();
        while let Ok(change) = changes.try_recv() {
            seen.push(change.to);
        }
        assert_eq!(
            seen,
            vec![
                SessionState::Initializing,
                SessionState::Connecting,
                SessionState::Ready,
                SessionState::Disconnecting,
                SessionState::Disconnected,
            ]
        );
    }
}
