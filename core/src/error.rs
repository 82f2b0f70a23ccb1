//! Error types for request construction, response decoding and contexts.
//!
//! # Design
//! Builder calls never fail on the spot. Anything that goes wrong while a
//! request is being configured becomes a `BuildError` that is held until
//! dispatch, the single point where failing the test is meaningful. Decode
//! failures are returned to the caller as `DecodeError` and never reported
//! through the test reporter.

use thiserror::Error;

/// Failures that prevent a request from being synthesized.
#[derive(Debug, Error)]
pub enum BuildError {
    /// The value given to `with_json_body` could not be serialized.
    #[error("failed to marshal json object: {0}")]
    JsonBody(#[source] serde_json::Error),

    /// The configured method is not a valid HTTP token.
    #[error("invalid method {method:?}: {source}")]
    InvalidMethod {
        method: String,
        #[source]
        source: http::method::InvalidMethod,
    },

    /// The configured path is not a valid request target.
    #[error("invalid request target {target:?}: {source}")]
    InvalidTarget {
        target: String,
        #[source]
        source: http::Error,
    },

    /// The recorded `Host` value is not a valid URI authority.
    #[error("invalid host {host:?}: {source}")]
    InvalidHost {
        host: String,
        #[source]
        source: http::uri::InvalidUri,
    },

    #[error("invalid header name {name:?}")]
    InvalidHeaderName { name: String },

    #[error("invalid value for header {name:?}")]
    InvalidHeaderValue { name: String },
}

/// Failures returned by `CompletedRequest::decode` and `decode_json`.
#[derive(Debug, Error)]
pub enum DecodeError {
    /// No decoder is registered for the response's media type.
    #[error("unhandled content type: {0}")]
    UnhandledContentType(String),

    /// Malformed JSON or a shape mismatch with the target type.
    #[error("json decode failed: {0}")]
    Json(#[from] serde_json::Error),

    /// Strict mode rejected fields the target type does not declare.
    #[error("unknown fields in strict mode: {}", .0.join(", "))]
    UnknownFields(Vec<String>),

    #[error("body is not valid utf-8")]
    InvalidUtf8(#[from] std::str::Utf8Error),

    /// Escape hatch for decoders registered by callers.
    #[error("{0}")]
    Custom(String),
}

/// Why a `RequestContext` is done.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ContextError {
    #[error("context canceled")]
    Canceled,

    #[error("context deadline exceeded")]
    DeadlineExceeded,
}
