//! Stratum mining client
//!
//! Keeps one persistent TCP or TLS connection to the node's stratum port.
//! After the socket opens the client logs in with its API key, then receives
//! `job` pushes and submits solutions. Replies are matched to requests by
//! correlation id.
//!
//! When the connection goes away every disconnect listener sees a
//! [`ReconnectEvent`]. If none of them asks for a reconnect the client stays
//! disconnected and every pending request fails with [`Error::Disconnected`].
//! Otherwise a single reconnect attempt runs after the longest requested
//! delay, and pending requests stay queued for the new connection.

mod connection;
mod correlator;
pub mod messages;
pub mod reconnect;

pub use messages::{LOGIN_ID, LOGIN_SUCCESS, SOLUTION_ACCEPTED};
pub use reconnect::{DisconnectListener, ReconnectCallback, ReconnectDecision, ReconnectEvent};

use crate::config::MiningEndpointConfig;
use crate::context::MiningContext;
use crate::difficulty;
use crate::events::Listeners;
use crate::{Error, Result};
use connection::{ConnectionHandle, ConnectionHandler};
use correlator::Correlator;
use messages::{correlation_id, JobMessage, LoginRequest, ResultMessage, SolutionRequest};
use parking_lot::Mutex;
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

/// Lifecycle of the stratum connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Authenticating,
    Ready,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Authenticating => "authenticating",
            ConnectionState::Ready => "ready",
        };
        f.write_str(name)
    }
}

/// Most recent job pushed by the node
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MiningJob {
    pub id: String,
    /// Hex-encoded block header input
    pub input: String,
    pub height: u64,
    /// Decoded from the compact encoding on the wire
    pub difficulty: f64,
}

/// Node verdict on a submitted solution
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SolutionOutcome {
    pub accepted: bool,
    /// Hash of the mined block when accepted
    pub block_hash: Option<String>,
    /// Rejection reason reported by the node
    pub description: Option<String>,
}

pub type JobListener = dyn Fn(&MiningJob) + Send + Sync;

/// Listener for raw inbound messages
pub type MessageListener = dyn Fn(&Value) + Send + Sync;

pub type SocketErrorListener = dyn Fn(&Error, &MiningContext) + Send + Sync;

/// Persistent stratum client
pub struct MiningClient {
    inner: Arc<Inner>,
}

struct Inner {
    defaults: MiningContext,
    state: Mutex<ClientState>,
    replies: Correlator,
    job_listeners: Listeners<JobListener>,
    result_listeners: Listeners<MessageListener>,
    unknown_method_listeners: Listeners<MessageListener>,
    socket_error_listeners: Listeners<SocketErrorListener>,
    disconnect_listeners: Listeners<DisconnectListener>,
}

struct ClientState {
    status: ConnectionState,
    context: MiningContext,
    /// Bumped for every connect attempt; callbacks from older connections
    /// carry a stale value and are ignored.
    generation: u64,
    shutdown: Option<CancellationToken>,
    connection: Option<ConnectionHandle>,
    current_job: Option<MiningJob>,
    fork_heights: BTreeMap<String, u64>,
}

impl MiningClient {
    /// Create a disconnected client for `config`, validating it first
    pub fn new(config: MiningEndpointConfig) -> Result<Self> {
        config.validate()?;
        let defaults = MiningContext::new(config.endpoint(), config.api_key.clone());

        Ok(Self {
            inner: Arc::new(Inner {
                state: Mutex::new(ClientState {
                    status: ConnectionState::Disconnected,
                    context: defaults.clone(),
                    generation: 0,
                    shutdown: None,
                    connection: None,
                    current_job: None,
                    fork_heights: BTreeMap::new(),
                }),
                defaults,
                replies: Correlator::new(),
                job_listeners: Listeners::new(),
                result_listeners: Listeners::new(),
                unknown_method_listeners: Listeners::new(),
                socket_error_listeners: Listeners::new(),
                disconnect_listeners: Listeners::new(),
            }),
        })
    }

    pub fn default_host(&self) -> &str {
        self.inner.defaults.host()
    }

    pub fn default_port(&self) -> u16 {
        self.inner.defaults.port()
    }

    pub fn default_api_key(&self) -> &str {
        self.inner.defaults.api_key()
    }

    pub fn default_is_secure(&self) -> bool {
        self.inner.defaults.is_secure()
    }

    /// Context of the current (or most recent) connection
    pub fn context(&self) -> MiningContext {
        self.inner.state.lock().context.clone()
    }

    pub fn host(&self) -> String {
        self.inner.state.lock().context.host().to_string()
    }

    pub fn port(&self) -> u16 {
        self.inner.state.lock().context.port()
    }

    pub fn api_key(&self) -> String {
        self.inner.state.lock().context.api_key().to_string()
    }

    pub fn is_secure(&self) -> bool {
        self.inner.state.lock().context.is_secure()
    }

    /// Reconnects since the last successful login
    pub fn reconnect_count(&self) -> u32 {
        self.inner.state.lock().context.reconnect_count()
    }

    pub fn state(&self) -> ConnectionState {
        self.inner.state.lock().status
    }

    /// True while connecting or connected
    pub fn is_connected(&self) -> bool {
        self.state() != ConnectionState::Disconnected
    }

    pub fn current_job(&self) -> Option<MiningJob> {
        self.inner.state.lock().current_job.clone()
    }

    /// `forkheight*` values reported by the last successful login
    pub fn fork_heights(&self) -> BTreeMap<String, u64> {
        self.inner.state.lock().fork_heights.clone()
    }

    /// Requests still waiting for a `result`
    pub fn pending_requests(&self) -> usize {
        self.inner.replies.pending()
    }

    pub fn on_job<F>(&self, listener: F)
    where
        F: Fn(&MiningJob) + Send + Sync + 'static,
    {
        self.inner.job_listeners.add(Arc::new(listener));
    }

    /// Sees every `result` message before it is matched to its request
    pub fn on_result<F>(&self, listener: F)
    where
        F: Fn(&Value) + Send + Sync + 'static,
    {
        self.inner.result_listeners.add(Arc::new(listener));
    }

    pub fn on_unknown_method<F>(&self, listener: F)
    where
        F: Fn(&Value) + Send + Sync + 'static,
    {
        self.inner.unknown_method_listeners.add(Arc::new(listener));
    }

    /// Transport errors, including failed connect attempts
    pub fn on_socket_error<F>(&self, listener: F)
    where
        F: Fn(&Error, &MiningContext) + Send + Sync + 'static,
    {
        self.inner.socket_error_listeners.add(Arc::new(listener));
    }

    pub fn on_disconnect<F>(&self, listener: F)
    where
        F: Fn(&mut ReconnectEvent<'_>) + Send + Sync + 'static,
    {
        self.inner.disconnect_listeners.add(Arc::new(listener));
    }

    /// Open the connection and log in.
    ///
    /// Fails with [`Error::AlreadyConnected`] unless the client is
    /// disconnected. A failed login leaves the socket open; call
    /// [`disconnect`](Self::disconnect) before trying again.
    #[instrument(skip(self))]
    pub async fn connect(&self) -> Result<()> {
        let (generation, shutdown) = {
            let mut state = self.inner.state.lock();
            if state.status != ConnectionState::Disconnected {
                return Err(Error::AlreadyConnected);
            }
            state.status = ConnectionState::Connecting;
            state.context = self.inner.defaults.clone();
            begin_attempt(&mut state)
        };

        self.inner.establish(generation, shutdown).await
    }

    /// Close the connection.
    ///
    /// Takes effect before returning: when a connection was open the
    /// disconnect listeners have run (and may have asked for a reconnect),
    /// otherwise pending requests have failed with [`Error::Disconnected`].
    /// A reconnect still waiting out its delay is cancelled without an event.
    pub fn disconnect(&self) {
        self.inner.close();
    }

    /// Submit a solution for `job_id`. `nonce` and `output` are hex strings.
    #[instrument(skip(self, output))]
    pub async fn submit_solution(&self, job_id: &str, nonce: &str, output: &str) -> Result<SolutionOutcome> {
        if job_id.is_empty() {
            return Err(Error::validation("job_id", "must not be empty"));
        }
        hex::decode(nonce).map_err(|e| Error::validation("nonce", e.to_string()))?;
        hex::decode(output).map_err(|e| Error::validation("output", e.to_string()))?;

        let line = serde_json::to_string(&SolutionRequest::new(job_id, nonce, output))?;
        let reply = self.inner.request(job_id, line)?;
        let reply = reply.await.map_err(|_| Error::Disconnected)??;

        let result: ResultMessage = serde_json::from_value(reply)?;
        let accepted = result.code == Some(SOLUTION_ACCEPTED);
        if accepted {
            info!(job_id, blockhash = ?result.blockhash, "Solution accepted");
        } else {
            info!(job_id, code = ?result.code, description = ?result.description, "Solution rejected");
        }

        Ok(SolutionOutcome {
            accepted,
            block_hash: result.blockhash,
            description: result.description,
        })
    }
}

impl Drop for MiningClient {
    fn drop(&mut self) {
        self.inner.disconnect_listeners.clear();
        self.disconnect();
    }
}

impl fmt::Debug for MiningClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.inner.state.lock();
        f.debug_struct("MiningClient")
            .field("state", &state.status)
            .field("context", &state.context)
            .field("pending", &self.inner.replies.pending())
            .finish()
    }
}

fn begin_attempt(state: &mut ClientState) -> (u64, CancellationToken) {
    state.generation += 1;
    state.connection = None;
    let shutdown = CancellationToken::new();
    state.shutdown = Some(shutdown.clone());
    (state.generation, shutdown)
}

impl Inner {
    /// Open the socket for `generation` and log in
    async fn establish(self: &Arc<Self>, generation: u64, shutdown: CancellationToken) -> Result<()> {
        let context = self.state.lock().context.clone();
        info!(
            host = %context.host(),
            port = context.port(),
            secure = context.is_secure(),
            reconnect_count = context.reconnect_count(),
            "Connecting to stratum node"
        );

        let opened = tokio::select! {
            _ = shutdown.cancelled() => Err(Error::Disconnected),
            stream = connection::open(&context) => stream,
        };

        let stream = match opened {
            Ok(stream) => stream,
            Err(e) => {
                if !matches!(e, Error::Disconnected) {
                    warn!(error = %e, "Failed to connect to stratum node");
                    self.emit_socket_error(&e, &context);
                }
                Arc::clone(self).on_closed(generation);
                return Err(e);
            }
        };

        // Held while spawning so the connection tasks cannot report before
        // the handle is stored.
        let closed = {
            let mut state = self.state.lock();
            if state.generation != generation {
                return Err(Error::Disconnected);
            }
            let handle = connection::spawn(stream, generation, shutdown, Arc::clone(self));
            let closed = handle.closed();
            state.connection = Some(handle);
            state.status = ConnectionState::Authenticating;
            closed
        };

        self.login(generation, &context, closed).await
    }

    async fn login(&self, generation: u64, context: &MiningContext, closed: CancellationToken) -> Result<()> {
        let line = serde_json::to_string(&LoginRequest::new(context.api_key()))?;
        let reply = self.request(LOGIN_ID, line)?;

        let reply = tokio::select! {
            biased;
            reply = reply => reply.map_err(|_| Error::Disconnected)??,
            _ = closed.cancelled() => return Err(Error::Disconnected),
        };

        let result: ResultMessage = serde_json::from_value(reply)?;
        match result.code {
            Some(LOGIN_SUCCESS) => {
                let mut state = self.state.lock();
                if state.generation == generation {
                    state.status = ConnectionState::Ready;
                    state.context.reset_reconnect_count();
                    state.fork_heights = result.fork_heights();
                }
                info!(host = %context.host(), port = context.port(), "Logged in to stratum node");
                Ok(())
            }
            code => {
                let description = result.description.unwrap_or_default();
                warn!(code = ?code, %description, "Login rejected");
                Err(Error::login_failed(code.unwrap_or(-1), description))
            }
        }
    }

    /// Send `line` on the open connection and queue a reply slot for `id`.
    ///
    /// The state lock is held throughout; the reader cannot dispatch the
    /// reply before the slot exists because `on_message` takes it too.
    fn request(&self, id: &str, line: String) -> Result<oneshot::Receiver<Result<Value>>> {
        let state = self.state.lock();
        let connection = state.connection.as_ref().ok_or(Error::NotConnected)?;
        connection.send(line)?;
        Ok(self.replies.register(id))
    }

    /// Retire the current attempt and handle the close in place.
    ///
    /// Bumping the generation makes the connection tasks' own close report
    /// stale, so the disconnect event fires once, from here.
    fn close(self: &Arc<Self>) {
        let dropped = {
            let mut state = self.state.lock();
            state.generation += 1;
            state.status = ConnectionState::Disconnected;
            if let Some(shutdown) = state.shutdown.take() {
                debug!(generation = state.generation, "Closing stratum connection");
                shutdown.cancel();
            }
            if state.connection.take().is_some() {
                Some((state.context.clone(), state.generation))
            } else {
                None
            }
        };

        match dropped {
            Some((dropped, generation)) => self.connection_lost(&dropped, generation),
            None => self.fail_pending(),
        }
    }

    /// Run the disconnect listeners for a lost connection and act on their
    /// decision. `generation` is the attempt current when the loss was seen.
    fn connection_lost(self: &Arc<Self>, dropped: &MiningContext, generation: u64) {
        info!(host = %dropped.host(), port = dropped.port(), "Disconnected from stratum node");

        let mut event = ReconnectEvent::new(dropped);
        for listener in self.disconnect_listeners.snapshot() {
            listener(&mut event);
        }
        let decision = event.into_decision();

        if decision.wants_reconnect {
            self.schedule_reconnect(decision, dropped);
            return;
        }

        {
            let mut state = self.state.lock();
            if state.generation != generation {
                return;
            }
            state.status = ConnectionState::Disconnected;
        }
        self.fail_pending();
    }

    fn fail_pending(&self) {
        let failed = self.replies.fail_all();
        if failed > 0 {
            debug!(failed, "Failed pending requests after disconnect");
        }
    }

    fn is_current(&self, generation: u64) -> bool {
        self.state.lock().generation == generation
    }

    fn dispatch(&self, message: Value) {
        match message.get("method").and_then(Value::as_str) {
            Some("result") => self.handle_result(message),
            Some("job") => self.handle_job(message),
            _ => {
                debug!(method = ?message.get("method"), "Unknown stratum method");
                for listener in self.unknown_method_listeners.snapshot() {
                    listener(&message);
                }
            }
        }
    }

    fn handle_result(&self, message: Value) {
        for listener in self.result_listeners.snapshot() {
            listener(&message);
        }

        let Some(id) = correlation_id(message.get("id")) else {
            warn!("Result without id");
            return;
        };
        if self.replies.resolve(&id, message).is_err() {
            warn!(id = %id, "No handler for reply found");
        }
    }

    fn handle_job(&self, message: Value) {
        let job: JobMessage = match serde_json::from_value(message) {
            Ok(job) => job,
            Err(e) => {
                warn!(error = %e, "Discarding malformed job");
                return;
            }
        };

        let job = MiningJob {
            id: correlation_id(Some(&job.id)).unwrap_or_else(|| job.id.to_string()),
            input: job.input,
            height: job.height,
            difficulty: difficulty::unpack(job.difficulty),
        };
        debug!(id = %job.id, height = job.height, difficulty = job.difficulty, "New job");

        self.state.lock().current_job = Some(job.clone());
        for listener in self.job_listeners.snapshot() {
            listener(&job);
        }
    }

    fn emit_socket_error(&self, error: &Error, context: &MiningContext) {
        for listener in self.socket_error_listeners.snapshot() {
            listener(error, context);
        }
    }

    fn schedule_reconnect(self: &Arc<Self>, decision: ReconnectDecision, dropped: &MiningContext) {
        let (generation, shutdown) = {
            let mut state = self.state.lock();
            state.context = dropped.derive(&decision.overrides);
            state.status = ConnectionState::Connecting;
            begin_attempt(&mut state)
        };
        info!(
            delay_ms = decision.delay.as_millis() as u64,
            reconnect_count = dropped.reconnect_count() + 1,
            "Reconnecting to stratum node"
        );

        let inner = Arc::clone(self);
        let delay = decision.delay;
        let callbacks = decision.callbacks;
        tokio::spawn(async move {
            let outcome = tokio::select! {
                _ = shutdown.cancelled() => {
                    debug!(generation, "Reconnect cancelled");
                    Err(Error::Disconnected)
                }
                _ = tokio::time::sleep(delay) => inner.establish(generation, shutdown.clone()).await,
            };

            for callback in callbacks {
                callback(&outcome);
            }
        });
    }
}

impl ConnectionHandler for Inner {
    fn on_message(&self, generation: u64, message: Value) {
        if self.is_current(generation) {
            self.dispatch(message);
        }
    }

    fn on_error(&self, generation: u64, error: Error) {
        let context = {
            let state = self.state.lock();
            if state.generation != generation {
                return;
            }
            state.context.clone()
        };
        warn!(error = %error, "Stratum socket error");
        self.emit_socket_error(&error, &context);
    }

    fn on_closed(self: Arc<Self>, generation: u64) {
        let dropped = {
            let mut state = self.state.lock();
            if state.generation != generation {
                return;
            }
            state.connection = None;
            state.shutdown = None;
            state.context.clone()
        };
        self.connection_lost(&dropped, generation);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    fn client() -> MiningClient {
        MiningClient::new(MiningEndpointConfig::new("127.0.0.1", 10002, "secret")).unwrap()
    }

    #[test]
    fn test_new_client_is_disconnected() {
        let client = client();
        assert_eq!(client.state(), ConnectionState::Disconnected);
        assert!(!client.is_connected());
        assert_eq!(client.default_host(), "127.0.0.1");
        assert_eq!(client.port(), 10002);
        assert_eq!(client.api_key(), "secret");
        assert_eq!(client.reconnect_count(), 0);
        assert!(client.current_job().is_none());
        assert!(client.fork_heights().is_empty());
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let result = MiningClient::new(MiningEndpointConfig::new("", 10002, "secret"));
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_submit_requires_connection() {
        let client = client();
        assert_matches!(
            client.submit_solution("job", "00ff", "beef").await,
            Err(Error::NotConnected)
        );
        assert_eq!(client.pending_requests(), 0);
    }

    #[tokio::test]
    async fn test_submit_validates_hex() {
        let client = client();
        assert_matches!(
            client.submit_solution("", "00", "00").await,
            Err(Error::Validation { .. })
        );
        assert_matches!(
            client.submit_solution("job", "xyz", "00").await,
            Err(Error::Validation { .. })
        );
        assert_matches!(
            client.submit_solution("job", "00", "0").await,
            Err(Error::Validation { .. })
        );
    }

    #[test]
    fn test_request_without_sent_line_leaves_no_slot() {
        let client = client();
        let (handle, mut sent) = ConnectionHandle::detached();
        client.inner.state.lock().connection = Some(handle);

        let _reply = client.inner.request("7", "first".to_string()).unwrap();
        assert_eq!(sent.try_recv().unwrap(), "first");
        assert_eq!(client.pending_requests(), 1);

        drop(sent);
        assert_matches!(
            client.inner.request("7", "second".to_string()),
            Err(Error::NotConnected)
        );
        assert_eq!(client.pending_requests(), 1);
    }

    #[test]
    fn test_disconnect_fails_pending_and_reports_once() {
        let client = client();
        let (handle, _sent) = ConnectionHandle::detached();
        {
            let mut state = client.inner.state.lock();
            state.status = ConnectionState::Ready;
            state.connection = Some(handle);
        }
        let mut reply = client.inner.request("7", "line".to_string()).unwrap();

        let events = Arc::new(Mutex::new(0));
        let counter = Arc::clone(&events);
        client.on_disconnect(move |_| *counter.lock() += 1);

        client.disconnect();
        assert_eq!(*events.lock(), 1);
        assert_eq!(client.state(), ConnectionState::Disconnected);
        assert_matches!(reply.try_recv(), Ok(Err(Error::Disconnected)));
        assert_eq!(client.pending_requests(), 0);

        client.disconnect();
        assert_eq!(*events.lock(), 1);
    }

    #[test]
    fn test_dispatch_job_updates_current_job() {
        let client = client();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        client.on_job(move |job| sink.lock().push(job.difficulty));

        client.inner.dispatch(serde_json::json!({
            "method": "job",
            "id": "42",
            "input": "00ff",
            "height": 1000,
            "difficulty": 16777216u32
        }));

        let job = client.current_job().unwrap();
        assert_eq!(job.id, "42");
        assert_eq!(job.difficulty, 2.0);
        assert_eq!(*seen.lock(), vec![2.0]);
    }

    #[test]
    fn test_dispatch_unknown_method() {
        let client = client();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        client.on_unknown_method(move |message| sink.lock().push(message.clone()));

        client.inner.dispatch(serde_json::json!({ "method": "ping" }));
        assert_eq!(seen.lock().len(), 1);
        assert!(client.current_job().is_none());
    }
}
