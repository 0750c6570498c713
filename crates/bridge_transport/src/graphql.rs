//! GraphQL client and transport factory.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bridge_core::error::TransportError;
use bridge_core::transport::{AgentTransport, TransportFactory};
use reqwest::Client;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, trace};
use url::Url;

use crate::documents;

/// Body of a GraphQL request.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GraphQlRequest<'a> {
    operation_name: &'a str,
    query: &'a str,
    variables: Value,
}

/// Transport bound to one agent endpoint.
#[derive(Debug, Clone)]
pub struct GraphQlTransport {
    client: Client,
    endpoint: Url,
    token: Option<String>,
    timeout: Duration,
}

impl GraphQlTransport {
    /// Create a transport with its own HTTP client.
    ///
    /// # Errors
    /// Returns [`TransportError::InvalidEndpoint`] for non-HTTP endpoints
    /// or when the HTTP client cannot be built.
    pub fn new(
        endpoint: Url,
        token: Option<String>,
        timeout: Duration,
    ) -> Result<Self, TransportError> {
        let client = build_client(&endpoint, timeout)?;
        Self::with_client(client, endpoint, token, timeout)
    }

    /// Create a transport sharing an existing HTTP client.
    ///
    /// # Errors
    /// Returns [`TransportError::InvalidEndpoint`] for non-HTTP endpoints.
    pub fn with_client(
        client: Client,
        endpoint: Url,
        token: Option<String>,
        timeout: Duration,
    ) -> Result<Self, TransportError> {
        if !matches!(endpoint.scheme(), "http" | "https") {
            return Err(TransportError::InvalidEndpoint {
                endpoint: endpoint.to_string(),
                message: format!("unsupported scheme '{}'", endpoint.scheme()),
            });
        }
        Ok(Self {
            client,
            endpoint,
            token: token.filter(|t| !t.is_empty()),
            timeout,
        })
    }

    /// Build the HTTP request for `operation` without sending it.
    ///
    /// # Errors
    /// Returns [`TransportError::Request`] for operations without a
    /// document or if the request cannot be built.
    pub fn build_request(
        &self,
        operation: &str,
        variables: Value,
    ) -> Result<reqwest::Request, TransportError> {
        let query = documents::for_operation(operation).ok_or_else(|| {
            TransportError::Request(format!("no GraphQL document for operation '{operation}'"))
        })?;

        let mut request = self.client.post(self.endpoint.clone()).json(&GraphQlRequest {
            operation_name: operation,
            query,
            variables,
        });
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }
        request.build().map_err(|e| self.map_error(&e))
    }

    fn map_error(&self, err: &reqwest::Error) -> TransportError {
        if err.is_timeout() {
            TransportError::Timeout(u64::try_from(self.timeout.as_millis()).unwrap_or(u64::MAX))
        } else {
            TransportError::Request(err.to_string())
        }
    }
}

#[async_trait]
impl AgentTransport for GraphQlTransport {
    async fn call(&self, operation: &str, variables: Value) -> Result<Value, TransportError> {
        let request = self.build_request(operation, variables)?;
        trace!(endpoint = %self.endpoint, operation, "Sending GraphQL request");

        let payload = self
            .client
            .execute(request)
            .await
            .map_err(|e| self.map_error(&e))?
            .error_for_status()
            .map_err(|e| self.map_error(&e))?
            .json::<Value>()
            .await
            .map_err(|e| TransportError::Malformed(e.to_string()))?;

        parse_graphql_response(operation, payload)
    }

    fn endpoint(&self) -> &str {
        self.endpoint.as_str()
    }
}

/// Extract `data.<operation>` from a GraphQL response body.
///
/// # Errors
/// Returns [`TransportError::Malformed`] if the response carries GraphQL
/// errors or has no result for `operation`.
pub fn parse_graphql_response(operation: &str, payload: Value) -> Result<Value, TransportError> {
    if let Some(errors) = payload.get("errors").and_then(Value::as_array) {
        if !errors.is_empty() {
            let messages: Vec<String> = errors
                .iter()
                .map(|e| {
                    e.get("message")
                        .and_then(Value::as_str)
                        .map_or_else(|| e.to_string(), str::to_string)
                })
                .collect();
            return Err(TransportError::Malformed(messages.join("; ")));
        }
    }

    match payload.get("data").and_then(|data| data.get(operation)) {
        Some(value) if !value.is_null() => Ok(value.clone()),
        _ => Err(TransportError::Malformed(format!(
            "response has no data.{operation}"
        ))),
    }
}

fn build_client(endpoint: &Url, timeout: Duration) -> Result<Client, TransportError> {
    Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| TransportError::InvalidEndpoint {
            endpoint: endpoint.to_string(),
            message: e.to_string(),
        })
}

/// Opens [`GraphQlTransport`]s sharing one HTTP client.
#[derive(Debug, Clone)]
pub struct GraphQlTransportFactory {
    client: Client,
    timeout: Duration,
}

impl GraphQlTransportFactory {
    /// Factory whose transports give up after `timeout`.
    ///
    /// # Errors
    /// Returns [`TransportError::Request`] if the HTTP client cannot be built.
    pub fn new(timeout: Duration) -> Result<Self, TransportError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| TransportError::Request(e.to_string()))?;
        Ok(Self { client, timeout })
    }
}

impl TransportFactory for GraphQlTransportFactory {
    fn open(
        &self,
        endpoint: &Url,
        token: Option<&str>,
    ) -> Result<Arc<dyn AgentTransport>, TransportError> {
        let transport = GraphQlTransport::with_client(
            self.client.clone(),
            endpoint.clone(),
            token.map(str::to_string),
            self.timeout,
        )?;
        debug!(endpoint = %endpoint, authenticated = transport.token.is_some(), "Opened agent transport");
        Ok(Arc::new(transport))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bridge_core::transport::{INFO_OPERATION, STEP_OPERATION};
    use serde_json::json;

    fn transport(token: Option<&str>) -> GraphQlTransport {
        GraphQlTransport::new(
            Url::parse("https://agent1/graphql").unwrap(),
            token.map(str::to_string),
            Duration::from_millis(500),
        )
        .unwrap()
    }

    #[test]
    fn test_extracts_operation_result() {
        let payload = json!({ "data": { "step": { "action": null, "context": "c" } } });
        let value = parse_graphql_response(STEP_OPERATION, payload).unwrap();
        assert_eq!(value["context"], "c");
    }

    #[test]
    fn test_graphql_errors_are_malformed() {
        let payload = json!({
            "data": null,
            "errors": [{ "message": "boom" }, { "message": "bang" }],
        });
        let err = parse_graphql_response(STEP_OPERATION, payload).unwrap_err();
        assert_eq!(err, TransportError::Malformed("boom; bang".into()));
    }

    #[test]
    fn test_missing_data_is_malformed() {
        let err = parse_graphql_response(INFO_OPERATION, json!({ "data": {} })).unwrap_err();
        assert!(err.to_string().contains("data.info"));

        let err = parse_graphql_response(INFO_OPERATION, json!({ "data": { "info": null } }))
            .unwrap_err();
        assert!(matches!(err, TransportError::Malformed(_)));
    }

    #[test]
    fn test_request_carries_operation_and_bearer() {
        let request = transport(Some("t0k"))
            .build_request(STEP_OPERATION, json!({ "observation": { "step": 3 } }))
            .unwrap();

        assert_eq!(request.method(), reqwest::Method::POST);
        assert_eq!(request.url().as_str(), "https://agent1/graphql");
        assert_eq!(
            request.headers().get(reqwest::header::AUTHORIZATION).unwrap(),
            "Bearer t0k"
        );

        let body: Value =
            serde_json::from_slice(request.body().unwrap().as_bytes().unwrap()).unwrap();
        assert_eq!(body["operationName"], "step");
        assert_eq!(body["variables"]["observation"]["step"], 3);
        assert!(body["query"].as_str().unwrap().contains("step(observation"));
    }

    #[test]
    fn test_no_token_no_header() {
        for token in [None, Some("")] {
            let request = transport(token)
                .build_request(INFO_OPERATION, json!({}))
                .unwrap();
            assert!(request.headers().get(reqwest::header::AUTHORIZATION).is_none());
        }
    }

    #[test]
    fn test_unknown_operation() {
        let err = transport(None).build_request("subscribe", json!({})).unwrap_err();
        assert!(matches!(err, TransportError::Request(_)));
    }

    #[test]
    fn test_factory_rejects_non_http_scheme() {
        let factory = GraphQlTransportFactory::new(Duration::from_secs(1)).unwrap();
        let result = factory.open(&Url::parse("ftp://agent1").unwrap(), None);
        assert!(matches!(result, Err(TransportError::InvalidEndpoint { .. })));
    }

    #[tokio::test]
    async fn test_unreachable_agent_is_request_error() {
        let transport = GraphQlTransport::new(
            Url::parse("http://127.0.0.1:9/graphql").unwrap(),
            None,
            Duration::from_millis(500),
        )
        .unwrap();
        let err = transport.call(INFO_OPERATION, json!({})).await.unwrap_err();
        assert!(matches!(
            err,
            TransportError::Request(_) | TransportError::Timeout(_)
        ));
    }
}
