//! Listener registries and the events the HTTP clients emit
//!
//! Emission is synchronous: the emitter takes a snapshot of the registered
//! listeners, hands each one the same `&mut` event in registration order and
//! then acts on the decision accumulated inside the event. Listeners added
//! while an emission is running only see later events.

use crate::context::{ConnectionContext, ConnectionOverrides};
use crate::Error;
use parking_lot::RwLock;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Append-only registry of listeners of one kind
pub struct Listeners<H: ?Sized> {
    handlers: RwLock<Vec<Arc<H>>>,
}

impl<H: ?Sized> Listeners<H> {
    pub fn new() -> Self {
        Self {
            handlers: RwLock::new(Vec::new()),
        }
    }

    pub fn add(&self, handler: Arc<H>) {
        self.handlers.write().push(handler);
    }

    /// Listeners registered at this instant, in registration order
    pub fn snapshot(&self) -> Vec<Arc<H>> {
        self.handlers.read().clone()
    }

    pub fn len(&self) -> usize {
        self.handlers.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.read().is_empty()
    }

    pub fn clear(&self) {
        self.handlers.write().clear();
    }
}

impl<H: ?Sized> Default for Listeners<H> {
    fn default() -> Self {
        Self::new()
    }
}

impl<H: ?Sized> fmt::Debug for Listeners<H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Listeners").field("count", &self.len()).finish()
    }
}

/// Which failure class produced a [`FailureEvent`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// Server answered with a non-success status
    Api,
    /// Transport failed before a response was read
    Socket,
}

/// Accumulated retry requests of all listeners for one failed attempt
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RetryDecision {
    pub wants_retry: bool,
    pub delay: Duration,
    pub overrides: ConnectionOverrides,
}

impl RetryDecision {
    /// Record one retry request. Delays merge by maximum, overrides by
    /// request order with later fields winning.
    pub fn request(&mut self, overrides: Option<ConnectionOverrides>, delay: Option<Duration>) {
        self.wants_retry = true;
        if let Some(delay) = delay {
            self.delay = self.delay.max(delay);
        }
        if let Some(overrides) = overrides {
            self.overrides.merge(overrides);
        }
    }
}

/// Emitted once per failed HTTP attempt
pub struct FailureEvent<'a> {
    kind: FailureKind,
    error: &'a Error,
    context: &'a ConnectionContext,
    path: &'a str,
    request: Option<&'a Value>,
    decision: RetryDecision,
}

impl<'a> FailureEvent<'a> {
    pub(crate) fn new(
        kind: FailureKind,
        error: &'a Error,
        context: &'a ConnectionContext,
        path: &'a str,
        request: Option<&'a Value>,
    ) -> Self {
        Self {
            kind,
            error,
            context,
            path,
            request,
            decision: RetryDecision::default(),
        }
    }

    pub fn kind(&self) -> FailureKind {
        self.kind
    }

    pub fn error(&self) -> &Error {
        self.error
    }

    /// HTTP status for API failures
    pub fn status_code(&self) -> Option<u16> {
        self.error.status_code()
    }

    pub fn context(&self) -> &ConnectionContext {
        self.context
    }

    /// Shorthand for `context().attempt()`
    pub fn attempt(&self) -> u32 {
        self.context.attempt()
    }

    /// Request path, relative to the endpoint root
    pub fn path(&self) -> &str {
        self.path
    }

    /// JSON body sent with the request, if any
    pub fn request(&self) -> Option<&Value> {
        self.request
    }

    /// Retry against the same endpoint without delay
    pub fn retry(&mut self) {
        self.decision.request(None, None);
    }

    pub fn retry_with(&mut self, overrides: ConnectionOverrides) {
        self.decision.request(Some(overrides), None);
    }

    pub fn retry_after(&mut self, delay: Duration) {
        self.decision.request(None, Some(delay));
    }

    pub fn retry_with_delay(&mut self, overrides: ConnectionOverrides, delay: Duration) {
        self.decision.request(Some(overrides), Some(delay));
    }

    pub fn decision(&self) -> &RetryDecision {
        &self.decision
    }

    pub(crate) fn into_decision(self) -> RetryDecision {
        self.decision
    }
}

/// Listener for [`FailureEvent`]s
pub type FailureListener = dyn Fn(&mut FailureEvent<'_>) + Send + Sync;

/// What an interception listener asked for
#[derive(Debug)]
pub(crate) enum Interception {
    Proceed,
    Cancel,
    Fail(Error),
    Respond(Value),
}

/// Emitted before every explorer request is sent
pub struct RequestEvent<'a> {
    path: String,
    context: &'a ConnectionContext,
    cancelled: bool,
    error: Option<Error>,
    result: Option<Value>,
}

impl<'a> RequestEvent<'a> {
    pub(crate) fn new(path: String, context: &'a ConnectionContext) -> Self {
        Self {
            path,
            context,
            cancelled: false,
            error: None,
            result: None,
        }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// Replace the path that will be requested (and retried)
    pub fn set_path(&mut self, path: impl Into<String>) {
        self.path = path.into();
    }

    pub fn context(&self) -> &ConnectionContext {
        self.context
    }

    /// Skip the request and fail the attempt with `Error::Cancelled`
    pub fn cancel(&mut self) {
        self.cancelled = true;
    }

    /// Skip the request and treat the attempt as a socket failure
    pub fn set_error(&mut self, error: Error) {
        self.error = Some(error);
    }

    /// Skip the request and complete it with `result`
    pub fn set_result(&mut self, result: Value) {
        self.result = Some(result);
    }

    /// Resolve the listener actions. Cancel beats error beats result.
    pub(crate) fn into_parts(self) -> (String, Interception) {
        let interception = if self.cancelled {
            Interception::Cancel
        } else if let Some(error) = self.error {
            Interception::Fail(error)
        } else if let Some(result) = self.result {
            Interception::Respond(result)
        } else {
            Interception::Proceed
        };
        (self.path, interception)
    }
}

/// Listener for [`RequestEvent`]s
pub type RequestListener = dyn Fn(&mut RequestEvent<'_>) + Send + Sync;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{Endpoint, Operation};
    use assert_matches::assert_matches;
    use serde_json::json;

    fn context() -> ConnectionContext {
        ConnectionContext::new(
            Endpoint::new("localhost", 8888, false),
            Duration::from_secs(15),
            Operation::new("get_status", Value::Null),
        )
    }

    #[test]
    fn test_retry_decision_merges() {
        let mut decision = RetryDecision::default();
        assert!(!decision.wants_retry);

        decision.request(Some(ConnectionOverrides::new().with_port(1)), Some(Duration::from_millis(300)));
        decision.request(None, Some(Duration::from_millis(100)));
        decision.request(Some(ConnectionOverrides::new().with_port(2)), None);

        assert!(decision.wants_retry);
        assert_eq!(decision.delay, Duration::from_millis(300));
        assert_eq!(decision.overrides.port, Some(2));
    }

    #[test]
    fn test_listeners_snapshot_in_order() {
        let listeners: Listeners<FailureListener> = Listeners::new();
        listeners.add(Arc::new(|ev: &mut FailureEvent<'_>| ev.retry_after(Duration::from_millis(5))));
        listeners.add(Arc::new(|ev: &mut FailureEvent<'_>| {
            ev.retry_with(ConnectionOverrides::new().with_host("backup"))
        }));
        assert_eq!(listeners.len(), 2);

        let error = Error::api(404, "Not Found");
        let ctx = context();
        let mut event = FailureEvent::new(FailureKind::Api, &error, &ctx, "status", None);
        for listener in listeners.snapshot() {
            listener(&mut event);
        }

        assert_eq!(event.status_code(), Some(404));
        assert_eq!(event.attempt(), 0);
        let decision = event.into_decision();
        assert!(decision.wants_retry);
        assert_eq!(decision.delay, Duration::from_millis(5));
        assert_eq!(decision.overrides.host.as_deref(), Some("backup"));
    }

    #[test]
    fn test_listener_added_during_emission_is_not_called() {
        let listeners: Arc<Listeners<FailureListener>> = Arc::new(Listeners::new());
        let registry = Arc::clone(&listeners);
        listeners.add(Arc::new(move |_ev: &mut FailureEvent<'_>| {
            registry.add(Arc::new(|ev: &mut FailureEvent<'_>| ev.retry()));
        }));

        let error = Error::api(500, "Internal Server Error");
        let ctx = context();
        let mut event = FailureEvent::new(FailureKind::Api, &error, &ctx, "status", None);
        for listener in listeners.snapshot() {
            listener(&mut event);
        }

        assert!(!event.decision().wants_retry);
        assert_eq!(listeners.len(), 2);
    }

    #[test]
    fn test_request_event_priority() {
        let ctx = context();

        let mut event = RequestEvent::new("status".into(), &ctx);
        event.set_result(json!({ "height": 1 }));
        event.set_error(Error::protocol("injected"));
        event.cancel();
        assert_matches!(event.into_parts(), (_, Interception::Cancel));

        let mut event = RequestEvent::new("status".into(), &ctx);
        event.set_result(json!({ "height": 1 }));
        event.set_error(Error::protocol("injected"));
        assert_matches!(event.into_parts(), (_, Interception::Fail(Error::Protocol { .. })));

        let mut event = RequestEvent::new("status".into(), &ctx);
        event.set_path("block?height=2");
        event.set_result(json!({ "height": 2 }));
        let (path, interception) = event.into_parts();
        assert_eq!(path, "block?height=2");
        assert_matches!(interception, Interception::Respond(v) if v["height"] == 2);

        let event = RequestEvent::new("status".into(), &ctx);
        assert_matches!(event.into_parts(), (_, Interception::Proceed));
    }
}
