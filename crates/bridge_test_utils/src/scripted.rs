//! Scripted agent transport.
//!
//! Replies are consumed in order; once the script runs dry every call gets
//! the default reply. Every call is recorded with its variables, and the
//! transport tracks how many calls were in flight at once.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bridge_core::error::TransportError;
use bridge_core::transport::{AgentTransport, TransportFactory, STEP_OPERATION};
use parking_lot::Mutex;
use serde_json::{json, Value};
use url::Url;

/// One scripted reply.
#[derive(Debug, Clone)]
pub enum Reply {
    /// Answer immediately.
    Value(Value),
    /// Fail immediately.
    Fail(TransportError),
    /// Answer after a delay.
    Delayed(Duration, Value),
}

/// A call received by a [`ScriptedTransport`].
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedCall {
    /// Operation name.
    pub operation: String,
    /// Variables object.
    pub variables: Value,
}

impl RecordedCall {
    /// Observation payload of a step call.
    pub fn observation(&self) -> &Value {
        &self.variables["observation"]
    }
}

struct InFlight<'a>(&'a AtomicUsize);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Agent transport answering from a script.
pub struct ScriptedTransport {
    endpoint: String,
    replies: Mutex<VecDeque<Reply>>,
    default_reply: Mutex<Value>,
    calls: Mutex<Vec<RecordedCall>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl ScriptedTransport {
    /// Transport whose default reply is a no-op with no context.
    #[must_use]
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            replies: Mutex::new(VecDeque::new()),
            default_reply: Mutex::new(no_op_reply(None)),
            calls: Mutex::new(Vec::new()),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    /// Queue a reply.
    pub fn push(&self, reply: Reply) {
        self.replies.lock().push_back(reply);
    }

    /// Queue an immediate value.
    pub fn push_value(&self, value: Value) {
        self.push(Reply::Value(value));
    }

    /// Queue an immediate failure.
    pub fn push_failure(&self, error: TransportError) {
        self.push(Reply::Fail(error));
    }

    /// Queue a delayed value.
    pub fn push_delayed(&self, delay: Duration, value: Value) {
        self.push(Reply::Delayed(delay, value));
    }

    /// Reply used once the script is exhausted.
    pub fn set_default_reply(&self, value: Value) {
        *self.default_reply.lock() = value;
    }

    /// Every call received so far.
    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().clone()
    }

    /// Step calls received so far.
    pub fn step_calls(&self) -> Vec<RecordedCall> {
        self.calls
            .lock()
            .iter()
            .filter(|call| call.operation == STEP_OPERATION)
            .cloned()
            .collect()
    }

    /// Highest number of calls that were in flight at the same time.
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AgentTransport for ScriptedTransport {
    async fn call(&self, operation: &str, variables: Value) -> Result<Value, TransportError> {
        self.calls.lock().push(RecordedCall {
            operation: operation.to_string(),
            variables,
        });

        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(current, Ordering::SeqCst);
        let _guard = InFlight(&self.in_flight);

        let next = self.replies.lock().pop_front();
        let reply = next.unwrap_or_else(|| Reply::Value(self.default_reply.lock().clone()));
        match reply {
            Reply::Value(value) => Ok(value),
            Reply::Fail(error) => Err(error),
            Reply::Delayed(delay, value) => {
                tokio::time::sleep(delay).await;
                Ok(value)
            }
        }
    }

    fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

/// Step result carrying a no-op action and `context`.
#[must_use]
pub fn no_op_reply(context: Option<&str>) -> Value {
    json!({ "action": { "abilityId": "NO_OP" }, "context": context })
}

/// Step result carrying a move of `tags` to `(x, y)` and `context`.
#[must_use]
pub fn move_reply(tags: &[u64], x: f32, y: f32, context: Option<&str>) -> Value {
    let tags: Vec<String> = tags.iter().map(u64::to_string).collect();
    json!({
        "action": {
            "abilityId": "16",
            "unitTags": tags,
            "targetWorldSpacePos": { "x": x, "y": y },
        },
        "context": context,
    })
}

/// Factory handing out one [`ScriptedTransport`] per endpoint.
#[derive(Default)]
pub struct ScriptedFactory {
    transports: Mutex<HashMap<String, Arc<ScriptedTransport>>>,
    opened: Mutex<Vec<(String, Option<String>)>>,
}

impl ScriptedFactory {
    /// Empty factory; transports are created on first open.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Transport for `endpoint`, created if it was never opened.
    ///
    /// `endpoint` is normalized the same way the orchestrator normalizes
    /// configured endpoints.
    pub fn transport(&self, endpoint: &str) -> Arc<ScriptedTransport> {
        let key = normalize(endpoint);
        Arc::clone(
            self.transports
                .lock()
                .entry(key.clone())
                .or_insert_with(|| Arc::new(ScriptedTransport::new(key))),
        )
    }

    /// `(endpoint, token)` of every open, in order.
    pub fn opened(&self) -> Vec<(String, Option<String>)> {
        self.opened.lock().clone()
    }
}

impl TransportFactory for ScriptedFactory {
    fn open(
        &self,
        endpoint: &Url,
        token: Option<&str>,
    ) -> Result<Arc<dyn AgentTransport>, TransportError> {
        self.opened
            .lock()
            .push((endpoint.to_string(), token.map(str::to_string)));
        Ok(self.transport(endpoint.as_str()))
    }
}

fn normalize(endpoint: &str) -> String {
    Url::parse(endpoint).map_or_else(|_| endpoint.to_string(), |url| url.to_string())
}
