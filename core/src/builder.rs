//! Fluent request builder for handler tests.
//!
//! # Design
//! `RequestBuilder` only caches settings. It performs no validation and
//! every configuration call returns the builder, so a chain never has to be
//! broken up to handle an error. The first failure (a body that cannot be
//! serialized, say) is parked in the builder and surfaced by `dispatch`.
//!
//! ```ignore
//! let completed = RequestBuilder::new()
//!     .post("/items")
//!     .with_json_body(&NewItem { name: "a".into() })
//!     .dispatch(&mut PanicReporter, &handler)
//!     .unwrap();
//! let item: Item = completed.decode()?;
//! ```

use std::collections::HashMap;

use bytes::Bytes;
use cookie::Cookie;
use serde::Serialize;

use crate::context::RequestContext;
use crate::dispatch::{Dispatcher, Handler, TestReporter};
use crate::error::BuildError;
use crate::CompletedRequest;

pub const AUTHORIZATION: &str = "Authorization";
pub const HOST: &str = "Host";
pub const CONTENT_TYPE: &str = "Content-Type";
pub const ACCEPT: &str = "Accept";

const JSON: &str = "application/json";

/// Caches request settings until the request is dispatched.
#[derive(Debug, Default)]
pub struct RequestBuilder {
    method: String,
    path: String,
    headers: HashMap<String, String>,
    body: Option<Bytes>,
    error: Option<BuildError>,
    cookies: Vec<Cookie<'static>>,
    context: Option<RequestContext>,
}

impl RequestBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the method and request target. Both are stored verbatim.
    pub fn with_method(mut self, method: impl Into<String>, path: impl Into<String>) -> Self {
        self.method = method.into();
        self.path = path.into();
        self
    }

    pub fn get(self, path: impl Into<String>) -> Self {
        self.with_method("GET", path)
    }

    pub fn post(self, path: impl Into<String>) -> Self {
        self.with_method("POST", path)
    }

    pub fn put(self, path: impl Into<String>) -> Self {
        self.with_method("PUT", path)
    }

    pub fn patch(self, path: impl Into<String>) -> Self {
        self.with_method("PATCH", path)
    }

    pub fn delete(self, path: impl Into<String>) -> Self {
        self.with_method("DELETE", path)
    }

    /// Set a header, overwriting any value previously set under the exact
    /// same name.
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    pub fn with_bearer_auth(self, token: &str) -> Self {
        self.with_header(AUTHORIZATION, format!("Bearer {token}"))
    }

    /// Override the host of the synthesized request.
    pub fn with_host(self, host: impl Into<String>) -> Self {
        self.with_header(HOST, host)
    }

    pub fn with_content_type(self, value: impl Into<String>) -> Self {
        self.with_header(CONTENT_TYPE, value)
    }

    pub fn with_json_content_type(self) -> Self {
        self.with_content_type(JSON)
    }

    pub fn with_accept(self, value: impl Into<String>) -> Self {
        self.with_header(ACCEPT, value)
    }

    pub fn with_accept_json(self) -> Self {
        self.with_accept(JSON)
    }

    /// Set the raw body. `None` clears it.
    pub fn with_body(mut self, body: Option<impl Into<Bytes>>) -> Self {
        self.body = body.map(Into::into);
        self
    }

    /// Serialize `value` as the JSON body and set `Content-Type:
    /// application/json`. A serialization failure clears the body and is
    /// reported when the request is dispatched.
    pub fn with_json_body<T: Serialize + ?Sized>(mut self, value: &T) -> Self {
        match serde_json::to_vec(value) {
            Ok(encoded) => self.body = Some(Bytes::from(encoded)),
            Err(err) => {
                self.body = None;
                self.defer(BuildError::JsonBody(err));
            }
        }
        self.with_json_content_type()
    }

    /// Append a cookie. Duplicates are kept and order is preserved.
    pub fn with_cookie(mut self, cookie: Cookie<'static>) -> Self {
        self.cookies.push(cookie);
        self
    }

    pub fn with_cookie_name_value(self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.with_cookie(Cookie::new(name.into(), value.into()))
    }

    pub fn with_context(mut self, context: RequestContext) -> Self {
        self.context = Some(context);
        self
    }

    /// Dispatch with a default `Dispatcher`.
    pub fn dispatch<R, H>(self, reporter: &mut R, handler: &H) -> Option<CompletedRequest>
    where
        R: TestReporter + ?Sized,
        H: Handler + ?Sized,
    {
        Dispatcher::default().dispatch(self, reporter, handler)
    }

    pub fn method(&self) -> &str {
        &self.method
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn headers(&self) -> &HashMap<String, String> {
        &self.headers
    }

    pub fn body(&self) -> Option<&Bytes> {
        self.body.as_ref()
    }

    pub fn cookies(&self) -> &[Cookie<'static>] {
        &self.cookies
    }

    pub fn context(&self) -> Option<&RequestContext> {
        self.context.as_ref()
    }

    /// The deferred construction error, if any call in the chain failed.
    pub fn error(&self) -> Option<&BuildError> {
        self.error.as_ref()
    }

    // First error wins; later failures are dropped.
    fn defer(&mut self, err: BuildError) {
        if self.error.is_none() {
            self.error = Some(err);
        }
    }

    pub(crate) fn into_parts(self) -> RequestParts {
        RequestParts {
            method: self.method,
            path: self.path,
            headers: self.headers,
            body: self.body,
            error: self.error,
            cookies: self.cookies,
            context: self.context,
        }
    }
}

/// Owned builder state handed to the dispatcher.
pub(crate) struct RequestParts {
    pub method: String,
    pub path: String,
    pub headers: HashMap<String, String>,
    pub body: Option<Bytes>,
    pub error: Option<BuildError>,
    pub cookies: Vec<Cookie<'static>>,
    pub context: Option<RequestContext>,
}
