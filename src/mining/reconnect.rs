//! Disconnect event and the reconnect decision it accumulates

use crate::context::{ConnectionOverrides, MiningContext};
use crate::Result;
use std::fmt;
use std::time::Duration;

/// Completion callback attached to a reconnect request. Receives the outcome
/// of the connect sequence the request triggered.
pub type ReconnectCallback = Box<dyn FnOnce(&Result<()>) + Send>;

/// Accumulated reconnect requests of all disconnect listeners
#[derive(Default)]
pub struct ReconnectDecision {
    pub wants_reconnect: bool,
    pub delay: Duration,
    pub overrides: ConnectionOverrides,
    pub callbacks: Vec<ReconnectCallback>,
}

impl ReconnectDecision {
    fn request(
        &mut self,
        overrides: Option<ConnectionOverrides>,
        delay: Option<Duration>,
        callback: Option<ReconnectCallback>,
    ) {
        self.wants_reconnect = true;
        if let Some(delay) = delay {
            self.delay = self.delay.max(delay);
        }
        if let Some(overrides) = overrides {
            self.overrides.merge(overrides);
        }
        if let Some(callback) = callback {
            self.callbacks.push(callback);
        }
    }
}

impl fmt::Debug for ReconnectDecision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReconnectDecision")
            .field("wants_reconnect", &self.wants_reconnect)
            .field("delay", &self.delay)
            .field("overrides", &self.overrides)
            .field("callbacks", &self.callbacks.len())
            .finish()
    }
}

/// Emitted once each time the stratum connection goes away, including when a
/// connect attempt fails before the socket opened.
pub struct ReconnectEvent<'a> {
    context: &'a MiningContext,
    decision: ReconnectDecision,
}

impl<'a> ReconnectEvent<'a> {
    pub(crate) fn new(context: &'a MiningContext) -> Self {
        Self {
            context,
            decision: ReconnectDecision::default(),
        }
    }

    /// Context of the connection that was lost
    pub fn context(&self) -> &MiningContext {
        self.context
    }

    pub fn reconnect_count(&self) -> u32 {
        self.context.reconnect_count()
    }

    pub fn reconnect(&mut self) {
        self.decision.request(None, None, None);
    }

    pub fn reconnect_after(&mut self, delay: Duration) {
        self.decision.request(None, Some(delay), None);
    }

    pub fn reconnect_with(&mut self, overrides: ConnectionOverrides) {
        self.decision.request(Some(overrides), None, None);
    }

    /// Request a reconnect and get told how it went. Every callback attached
    /// to the same event fires once, after the single resulting attempt.
    pub fn reconnect_and_notify<F>(
        &mut self,
        overrides: Option<ConnectionOverrides>,
        delay: Option<Duration>,
        callback: F,
    ) where
        F: FnOnce(&Result<()>) + Send + 'static,
    {
        self.decision.request(overrides, delay, Some(Box::new(callback)));
    }

    pub fn decision(&self) -> &ReconnectDecision {
        &self.decision
    }

    pub(crate) fn into_decision(self) -> ReconnectDecision {
        self.decision
    }
}

/// Listener for [`ReconnectEvent`]s
pub type DisconnectListener = dyn Fn(&mut ReconnectEvent<'_>) + Send + Sync;
