//! Content-type driven response decoding.
//!
//! # Design
//! A `DecoderRegistry` maps a bare, lowercase media type to a `Decoder`.
//! Decoders turn raw body bytes into a `serde_json::Value` document and hand
//! it to a `Destination`, the type-erased target of the decode. Keeping the
//! destination behind a trait object lets one registry serve every target
//! type while each decoder stays a plain function.
//!
//! The registry is built mutably and then shared behind an `Arc` by the
//! dispatcher, so registration always happens before the first decode.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::DecodeError;

pub const APPLICATION_JSON: &str = "application/json";
pub const APPLICATION_PROBLEM_JSON: &str = "application/problem+json";
pub const TEXT_PLAIN: &str = "text/plain";

/// The target of a decode, with its concrete type erased.
pub trait Destination {
    /// Deserialize `document` into the target. With `strict`, fields the
    /// target does not declare are an error instead of being dropped.
    fn fill(&mut self, document: Value, strict: bool) -> Result<(), DecodeError>;
}

/// Holds the decoded value of `T` once `fill` succeeds.
#[derive(Debug)]
pub struct Slot<T>(Option<T>);

impl<T> Slot<T> {
    pub fn new() -> Self {
        Self(None)
    }

    pub fn into_inner(self) -> Option<T> {
        self.0
    }
}

impl<T> Default for Slot<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: DeserializeOwned> Destination for Slot<T> {
    fn fill(&mut self, document: Value, strict: bool) -> Result<(), DecodeError> {
        let mut unknown = Vec::new();
        let value: T = serde_ignored::deserialize(document, |path| unknown.push(path.to_string()))?;
        if strict && !unknown.is_empty() {
            return Err(DecodeError::UnknownFields(unknown));
        }
        self.0 = Some(value);
        Ok(())
    }
}

/// Turns a response body into a document for a `Destination`.
///
/// `content_type` is the full header value, parameters included, so a
/// decoder can honour e.g. a `charset`.
pub trait Decoder: Send + Sync {
    fn decode(
        &self,
        content_type: &str,
        body: &[u8],
        destination: &mut dyn Destination,
        strict: bool,
    ) -> Result<(), DecodeError>;
}

impl<F> Decoder for F
where
    F: Fn(&str, &[u8], &mut dyn Destination, bool) -> Result<(), DecodeError> + Send + Sync,
{
    fn decode(
        &self,
        content_type: &str,
        body: &[u8],
        destination: &mut dyn Destination,
        strict: bool,
    ) -> Result<(), DecodeError> {
        self(content_type, body, destination, strict)
    }
}

/// Decodes the body as JSON.
pub fn json_decoder(
    _content_type: &str,
    body: &[u8],
    destination: &mut dyn Destination,
    strict: bool,
) -> Result<(), DecodeError> {
    let document: Value = serde_json::from_slice(body)?;
    destination.fill(document, strict)
}

/// Decodes a UTF-8 body as a single JSON string, so it lands in a `String`.
pub fn text_decoder(
    _content_type: &str,
    body: &[u8],
    destination: &mut dyn Destination,
    strict: bool,
) -> Result<(), DecodeError> {
    let text = std::str::from_utf8(body)?;
    destination.fill(Value::String(text.to_owned()), strict)
}

/// Media type to decoder lookup table.
#[derive(Clone)]
pub struct DecoderRegistry {
    decoders: HashMap<String, Arc<dyn Decoder>>,
}

impl DecoderRegistry {
    /// An empty registry. Most callers want `DecoderRegistry::default()`.
    pub fn new() -> Self {
        Self {
            decoders: HashMap::new(),
        }
    }

    /// Register `decoder` for `media_type`, replacing any previous entry.
    pub fn register(&mut self, media_type: &str, decoder: impl Decoder + 'static) -> &mut Self {
        self.decoders
            .insert(media_type.trim().to_ascii_lowercase(), Arc::new(decoder));
        self
    }

    pub fn get(&self, media_type: &str) -> Option<&Arc<dyn Decoder>> {
        self.decoders.get(&media_type.to_ascii_lowercase())
    }

    pub fn contains(&self, media_type: &str) -> bool {
        self.get(media_type).is_some()
    }

    /// Pick the decoder for a full `Content-Type` header value and run it.
    pub fn decode_into(
        &self,
        content_type: &str,
        body: &[u8],
        destination: &mut dyn Destination,
        strict: bool,
    ) -> Result<(), DecodeError> {
        let media_type = media_type(content_type);
        let Some(decoder) = self.get(media_type) else {
            return Err(DecodeError::UnhandledContentType(media_type.to_owned()));
        };
        tracing::trace!(media_type, strict, "decoding response body");
        decoder.decode(content_type, body, destination, strict)
    }
}

impl Default for DecoderRegistry {
    fn default() -> Self {
        let mut registry = Self::new();
        registry
            .register(APPLICATION_JSON, json_decoder)
            .register(APPLICATION_PROBLEM_JSON, json_decoder)
            .register(TEXT_PLAIN, text_decoder);
        registry
    }
}

impl fmt::Debug for DecoderRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut media_types: Vec<&str> = self.decoders.keys().map(String::as_str).collect();
        media_types.sort_unstable();
        f.debug_struct("DecoderRegistry")
            .field("media_types", &media_types)
            .finish()
    }
}

/// The bare media type of a `Content-Type` value: parameters after the
/// first `;` are dropped and surrounding whitespace trimmed.
pub fn media_type(content_type: &str) -> &str {
    content_type.split(';').next().unwrap_or_default().trim()
}
