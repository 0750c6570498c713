//! # Bridge Transport
//!
//! Reaches remote agents over GraphQL on HTTP.
//!
//! Each agent endpoint gets one [`GraphQlTransport`]. Operations are sent as
//! a JSON `POST` of `{operationName, query, variables}`, with an
//! `authorization: Bearer <token>` header when the agent requires one. The
//! structured result is `data.<operation>` of the GraphQL response.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic)]

pub mod documents;
pub mod graphql;

pub use graphql::{parse_graphql_response, GraphQlTransport, GraphQlTransportFactory};
