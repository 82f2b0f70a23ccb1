//! The outcome of a dispatched request.

use std::sync::Arc;

use http::header::{HeaderMap, CONTENT_TYPE};
use http::StatusCode;
use serde::de::DeserializeOwned;

use crate::decode::{DecoderRegistry, Slot};
use crate::error::DecodeError;
use crate::recorder::ResponseRecorder;

/// A recorded response plus helpers to decode its body.
#[derive(Debug, Clone)]
pub struct CompletedRequest {
    recorder: ResponseRecorder,
    registry: Arc<DecoderRegistry>,
    // When set, decoders reject fields the target type does not declare.
    strict: bool,
}

impl CompletedRequest {
    pub(crate) fn new(recorder: ResponseRecorder, registry: Arc<DecoderRegistry>) -> Self {
        Self {
            recorder,
            registry,
            strict: false,
        }
    }

    pub fn status(&self) -> StatusCode {
        self.recorder.status()
    }

    /// Shortcut for the numeric status code.
    pub fn code(&self) -> u16 {
        self.recorder.status().as_u16()
    }

    pub fn headers(&self) -> &HeaderMap {
        self.recorder.headers()
    }

    pub fn body(&self) -> &[u8] {
        self.recorder.body()
    }

    pub fn recorder(&self) -> &ResponseRecorder {
        &self.recorder
    }

    /// Make later decodes fail on unknown fields. There is no way back.
    pub fn disallow_unknown_fields(&mut self) -> &mut Self {
        self.strict = true;
        self
    }

    pub fn is_strict(&self) -> bool {
        self.strict
    }

    /// Decode the body with the decoder registered for the response's
    /// `Content-Type`.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, DecodeError> {
        let content_type = self
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default();
        let mut slot = Slot::<T>::new();
        self.registry
            .decode_into(content_type, self.body(), &mut slot, self.strict)?;
        slot.into_inner()
            .ok_or_else(|| DecodeError::Custom(format!("decoder for {content_type:?} produced no value")))
    }

    /// Decode the body as JSON regardless of `Content-Type`.
    pub fn decode_json<T: DeserializeOwned>(&self) -> Result<T, DecodeError> {
        Ok(serde_json::from_slice(self.body())?)
    }
}
