//! Request dispatch shared by the explorer and wallet clients
//!
//! Every attempt of a logical operation runs through [`HttpDispatcher::dispatch`].
//! Failed attempts emit a [`FailureEvent`]; when a listener asks for a retry
//! the loop sleeps for the merged delay and re-dispatches with a derived
//! [`ConnectionContext`]. Nothing is retried unless a listener asks for it.

use crate::context::{ConnectionContext, Endpoint, Operation};
use crate::events::{FailureEvent, FailureKind, FailureListener, Interception, Listeners, RequestEvent, RequestListener};
use crate::{Error, Result};
use reqwest::{Client, ClientBuilder, StatusCode};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Outbound request shape
#[derive(Debug, Clone)]
pub(crate) enum HttpRequest {
    Get { path: String },
    Post { path: String, body: Value },
}

impl HttpRequest {
    fn path(&self) -> &str {
        match self {
            HttpRequest::Get { path } | HttpRequest::Post { path, .. } => path,
        }
    }

    fn set_path(&mut self, new_path: String) {
        match self {
            HttpRequest::Get { path } | HttpRequest::Post { path, .. } => *path = new_path,
        }
    }

    fn body(&self) -> Option<&Value> {
        match self {
            HttpRequest::Get { .. } => None,
            HttpRequest::Post { body, .. } => Some(body),
        }
    }
}

/// Endpoint defaults, failure listeners and the underlying HTTP client
pub(crate) struct HttpDispatcher {
    client: Client,
    endpoint: Endpoint,
    timeout: Duration,
    api_error: Listeners<FailureListener>,
    socket_error: Listeners<FailureListener>,
}

impl HttpDispatcher {
    pub(crate) fn new(endpoint: Endpoint, timeout: Duration) -> Result<Self> {
        // One connection per call; idle connections are never reused.
        let client = ClientBuilder::new()
            .user_agent(format!("beam-node-client/{}", env!("CARGO_PKG_VERSION")))
            .pool_max_idle_per_host(0)
            .build()?;

        Ok(Self {
            client,
            endpoint,
            timeout,
            api_error: Listeners::new(),
            socket_error: Listeners::new(),
        })
    }

    pub(crate) fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    pub(crate) fn timeout(&self) -> Duration {
        self.timeout
    }

    pub(crate) fn on_api_error(&self, listener: Arc<FailureListener>) {
        self.api_error.add(listener);
    }

    pub(crate) fn on_socket_error(&self, listener: Arc<FailureListener>) {
        self.socket_error.add(listener);
    }

    /// Run `request` until it succeeds or fails without a retry request.
    ///
    /// `interceptors` are consulted before each attempt; a path they set is
    /// kept for every later attempt. Returns the body together with the
    /// context of the attempt that produced it.
    pub(crate) async fn dispatch(
        &self,
        operation: Operation,
        mut request: HttpRequest,
        interceptors: Option<&Listeners<RequestListener>>,
    ) -> Result<(Value, ConnectionContext)> {
        let mut context = ConnectionContext::new(self.endpoint.clone(), self.timeout, operation);

        loop {
            let (outcome, injected) = match interceptors {
                Some(listeners) => {
                    let mut event = RequestEvent::new(request.path().to_string(), &context);
                    for listener in listeners.snapshot() {
                        listener(&mut event);
                    }
                    let (path, interception) = event.into_parts();
                    request.set_path(path);

                    match interception {
                        Interception::Cancel => {
                            debug!(path = %request.path(), "Request cancelled by listener");
                            return Err(Error::cancelled(format!("request {}", request.path())));
                        }
                        Interception::Respond(value) => return Ok((value, context)),
                        Interception::Fail(error) => (Err(error), true),
                        Interception::Proceed => (self.send(&context, &request).await, false),
                    }
                }
                None => (self.send(&context, &request).await, false),
            };

            let error = match outcome {
                Ok(value) => return Ok((value, context)),
                Err(error) => error,
            };

            // Errors injected by a listener count as socket failures.
            let kind = match &error {
                _ if injected => FailureKind::Socket,
                Error::Api { .. } => FailureKind::Api,
                e if e.is_recoverable() => FailureKind::Socket,
                _ => return Err(error),
            };

            let listeners = match kind {
                FailureKind::Api => self.api_error.snapshot(),
                FailureKind::Socket => self.socket_error.snapshot(),
            };

            let decision = {
                let mut event = FailureEvent::new(kind, &error, &context, request.path(), request.body());
                for listener in &listeners {
                    listener(&mut event);
                }
                event.into_decision()
            };

            if !decision.wants_retry {
                debug!(
                    operation = %context.operation().name,
                    attempt = context.attempt(),
                    category = error.category(),
                    "Request failed without retry"
                );
                return Err(error);
            }

            debug!(
                operation = %context.operation().name,
                attempt = context.attempt(),
                delay_ms = decision.delay.as_millis() as u64,
                "Retrying request"
            );

            if !decision.delay.is_zero() {
                tokio::time::sleep(decision.delay).await;
            }
            context = context.derive(&decision.overrides);
        }
    }

    async fn send(&self, context: &ConnectionContext, request: &HttpRequest) -> Result<Value> {
        let url = context.endpoint().url(request.path())?;

        debug!(
            url = %url,
            attempt = context.attempt(),
            operation = %context.operation().name,
            "Sending request"
        );

        let builder = match request {
            HttpRequest::Get { .. } => self.client.get(url),
            HttpRequest::Post { body, .. } => self.client.post(url).json(body),
        };

        let response = builder.timeout(context.timeout()).send().await?;

        let status = response.status();
        if status != StatusCode::OK {
            return Err(Error::api(
                status.as_u16(),
                status.canonical_reason().unwrap_or("Unknown Status"),
            ));
        }

        let body = response.bytes().await?;
        Ok(serde_json::from_slice(&body)?)
    }
}
