//! Remote agent boundary.
//!
//! An agent is reached through a request/response call carrying an
//! operation name and a JSON variables object. How the call travels (HTTP,
//! GraphQL, in-process) is the transport's business.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use url::Url;

use crate::error::TransportError;

/// Operation sent once per frame.
pub const STEP_OPERATION: &str = "step";

/// Operation returning the agent's identity.
pub const INFO_OPERATION: &str = "info";

/// Request/response client bound to one agent endpoint.
#[async_trait]
pub trait AgentTransport: Send + Sync {
    /// Invoke `operation` with `variables` and return its structured result.
    async fn call(&self, operation: &str, variables: Value) -> Result<Value, TransportError>;

    /// Endpoint this transport is bound to.
    fn endpoint(&self) -> &str;
}

/// Opens transports for validated agent endpoints.
pub trait TransportFactory: Send + Sync {
    /// Open a transport bound to `(endpoint, token)`.
    fn open(
        &self,
        endpoint: &Url,
        token: Option<&str>,
    ) -> Result<Arc<dyn AgentTransport>, TransportError>;
}

/// Call `transport`, failing with [`TransportError::Timeout`] after `timeout`.
pub async fn call_with_timeout(
    transport: &dyn AgentTransport,
    operation: &str,
    variables: Value,
    timeout: Duration,
) -> Result<Value, TransportError> {
    match tokio::time::timeout(timeout, transport.call(operation, variables)).await {
        Ok(result) => result,
        Err(_) => Err(TransportError::Timeout(
            u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
        )),
    }
}
