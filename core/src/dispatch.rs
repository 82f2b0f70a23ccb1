//! Synchronous in-process dispatch of a built request to a handler.
//!
//! # Design
//! The dispatcher turns a `RequestBuilder` into an `http::Request<Bytes>`,
//! calls the handler once on the current thread and wraps the recorder it
//! wrote to in a `CompletedRequest`. Nothing goes over a socket and no
//! timeout is imposed here; any deadline comes from the attached
//! `RequestContext`.
//!
//! Failures that make the request impossible to build (a deferred builder
//! error, an unparsable method or target) are sent to the `TestReporter`
//! and produce no result, so the handler is never called with a request
//! that differs from what the test configured.

use std::fmt;
use std::sync::Arc;

use bytes::Bytes;
use http::header::{HeaderName, HeaderValue, COOKIE};
use http::uri::{Authority, Parts, Scheme};
use http::{Method, Request, Uri};
use http_body_util::BodyExt;
use tower::{Service, ServiceExt};

use crate::builder::{RequestBuilder, RequestParts, HOST};
use crate::context::RequestContext;
use crate::decode::DecoderRegistry;
use crate::error::BuildError;
use crate::recorder::ResponseRecorder;
use crate::CompletedRequest;

/// Host used when the test does not set one.
pub const DEFAULT_HOST: &str = "example.com";

/// Environment variable read by `DispatcherConfig::from_env`.
pub const DEFAULT_HOST_ENV: &str = "REQUEST_HELPERS_DEFAULT_HOST";

/// Receives construction failures at dispatch time.
pub trait TestReporter {
    fn errorf(&mut self, args: fmt::Arguments<'_>);
}

/// Fails the running test by panicking with the reported message.
#[derive(Debug, Default, Clone, Copy)]
pub struct PanicReporter;

impl TestReporter for PanicReporter {
    fn errorf(&mut self, args: fmt::Arguments<'_>) {
        panic!("{args}");
    }
}

/// Collects reported messages, for tests that assert on reporting itself.
impl TestReporter for Vec<String> {
    fn errorf(&mut self, args: fmt::Arguments<'_>) {
        self.push(args.to_string());
    }
}

/// Anything that can answer a request by writing into a recorder.
pub trait Handler {
    fn serve(&self, recorder: &mut ResponseRecorder, request: Request<Bytes>);
}

impl<F> Handler for F
where
    F: Fn(&mut ResponseRecorder, Request<Bytes>),
{
    fn serve(&self, recorder: &mut ResponseRecorder, request: Request<Bytes>) {
        self(recorder, request)
    }
}

/// Adapts a `tower::Service`, e.g. an `axum::Router`, to `Handler`.
///
/// Each call drives the service to completion on a private current-thread
/// runtime. When called from inside a tokio runtime (a `#[tokio::test]`,
/// say) that private runtime runs on a scoped helper thread, since a
/// runtime cannot be blocked on from one of its own workers.
#[derive(Debug, Clone)]
pub struct ServiceHandler<S> {
    service: S,
}

impl<S> ServiceHandler<S> {
    pub fn new(service: S) -> Self {
        Self { service }
    }
}

impl<S> Handler for ServiceHandler<S>
where
    S: Service<Request<axum::body::Body>, Response = axum::response::Response> + Clone + Send,
    S::Error: fmt::Display,
{
    fn serve(&self, recorder: &mut ResponseRecorder, request: Request<Bytes>) {
        let request = request.map(axum::body::Body::from);
        let service = self.service.clone();
        let drive = move || drive_service(service, request);

        let outcome = if tokio::runtime::Handle::try_current().is_ok() {
            tracing::debug!("inside a runtime, driving service on a helper thread");
            std::thread::scope(|scope| match scope.spawn(drive).join() {
                Ok(outcome) => outcome,
                Err(panic) => std::panic::resume_unwind(panic),
            })
        } else {
            drive()
        };

        match outcome {
            Ok(response) => recorder.record(response),
            Err(err) => {
                tracing::warn!(error = %err, "service handler failed");
                record_failure(recorder, err);
            }
        }
    }
}

fn drive_service<S>(service: S, request: Request<axum::body::Body>) -> Result<http::Response<Bytes>, String>
where
    S: Service<Request<axum::body::Body>, Response = axum::response::Response>,
    S::Error: fmt::Display,
{
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|e| format!("failed to start runtime for service handler: {e}"))?;
    runtime.block_on(async move {
        let response = service.oneshot(request).await.map_err(|e| e.to_string())?;
        let (parts, body) = response.into_parts();
        let body = body.collect().await.map_err(|e| e.to_string())?.to_bytes();
        Ok(http::Response::from_parts(parts, body))
    })
}

fn record_failure(recorder: &mut ResponseRecorder, err: impl fmt::Display) {
    recorder.write_header(http::StatusCode::INTERNAL_SERVER_ERROR);
    recorder.write(err.to_string().as_bytes());
}

/// Dispatcher settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatcherConfig {
    /// Host given to requests that carry no `Host` header and no authority.
    pub default_host: String,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            default_host: DEFAULT_HOST.to_string(),
        }
    }
}

impl DispatcherConfig {
    /// Defaults, with `default_host` taken from
    /// `REQUEST_HELPERS_DEFAULT_HOST` when it is set and non-empty.
    pub fn from_env() -> Self {
        let default_host = std::env::var(DEFAULT_HOST_ENV)
            .ok()
            .filter(|host| !host.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_HOST.to_string());
        Self { default_host }
    }
}

/// Synthesizes requests and runs them against handlers.
#[derive(Debug, Clone, Default)]
pub struct Dispatcher {
    config: DispatcherConfig,
    registry: Arc<DecoderRegistry>,
}

impl Dispatcher {
    pub fn builder() -> DispatcherBuilder {
        DispatcherBuilder::default()
    }

    pub fn config(&self) -> &DispatcherConfig {
        &self.config
    }

    pub fn registry(&self) -> &Arc<DecoderRegistry> {
        &self.registry
    }

    /// Build the request described by `builder`, run `handler` on it and
    /// return what the handler wrote. Returns `None`, after telling
    /// `reporter`, when the request cannot be built.
    pub fn dispatch<R, H>(
        &self,
        builder: RequestBuilder,
        reporter: &mut R,
        handler: &H,
    ) -> Option<CompletedRequest>
    where
        R: TestReporter + ?Sized,
        H: Handler + ?Sized,
    {
        let request = match self.synthesize(builder.into_parts()) {
            Ok(request) => request,
            Err(err) => {
                tracing::warn!(error = %err, "request not dispatched");
                reporter.errorf(format_args!("error constructing request: {err}"));
                return None;
            }
        };

        tracing::debug!(
            method = %request.method(),
            uri = %request.uri(),
            headers = request.headers().len(),
            "dispatching synthetic request"
        );
        let mut recorder = ResponseRecorder::new();
        handler.serve(&mut recorder, request);
        tracing::debug!(status = %recorder.status(), bytes = recorder.body().len(), "handler returned");

        Some(CompletedRequest::new(recorder, Arc::clone(&self.registry)))
    }

    fn synthesize(&self, parts: RequestParts) -> Result<Request<Bytes>, BuildError> {
        let RequestParts {
            method,
            path,
            headers,
            body,
            error,
            cookies,
            context,
        } = parts;
        if let Some(err) = error {
            return Err(err);
        }

        // An unset method means GET.
        let parsed_method = if method.is_empty() {
            Method::GET
        } else {
            Method::from_bytes(method.as_bytes())
                .map_err(|source| BuildError::InvalidMethod { method, source })?
        };
        let host = headers.get(HOST).map(String::as_str);
        let uri = self.target_uri(&path, host)?;

        let mut request = Request::new(body.unwrap_or_default());
        *request.method_mut() = parsed_method;
        *request.uri_mut() = uri;

        let header_map = request.headers_mut();
        for (name, value) in &headers {
            if name == HOST {
                continue;
            }
            let header_name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|_| BuildError::InvalidHeaderName { name: name.clone() })?;
            let header_value = HeaderValue::from_str(value)
                .map_err(|_| BuildError::InvalidHeaderValue { name: name.clone() })?;
            header_map.append(header_name, header_value);
        }

        if !cookies.is_empty() {
            // Every explicitly set Cookie value survives, whatever its spelling.
            let mut cookie_line = header_map
                .get_all(COOKIE)
                .iter()
                .filter_map(|v| v.to_str().ok())
                .collect::<Vec<_>>()
                .join("; ");
            for cookie in &cookies {
                if !cookie_line.is_empty() {
                    cookie_line.push_str("; ");
                }
                cookie_line.push_str(&cookie.stripped().to_string());
            }
            let value = HeaderValue::from_str(&cookie_line).map_err(|_| BuildError::InvalidHeaderValue {
                name: COOKIE.to_string(),
            })?;
            header_map.insert(COOKIE, value);
        }

        request
            .extensions_mut()
            .insert(context.unwrap_or_else(RequestContext::background));
        Ok(request)
    }

    // The host goes into the URI authority. An explicit Host header wins over
    // an authority already present in the target, which wins over the
    // configured default.
    fn target_uri(&self, target: &str, host: Option<&str>) -> Result<Uri, BuildError> {
        let invalid = |source: http::Error| BuildError::InvalidTarget {
            target: target.to_string(),
            source,
        };
        let uri: Uri = target.parse().map_err(|e: http::uri::InvalidUri| invalid(e.into()))?;
        let authority = match host {
            Some(host) => host,
            None if uri.authority().is_some() => return Ok(uri),
            None => self.config.default_host.as_str(),
        };
        let authority: Authority = authority
            .parse()
            .map_err(|source| BuildError::InvalidHost {
                host: authority.to_string(),
                source,
            })?;

        let mut parts = Parts::from(uri);
        if parts.scheme.is_none() {
            parts.scheme = Some(Scheme::HTTP);
        }
        parts.authority = Some(authority);
        Uri::from_parts(parts).map_err(|e| invalid(e.into()))
    }
}

/// Builds a `Dispatcher`. The registry is frozen when `build` is called.
#[derive(Debug, Default)]
pub struct DispatcherBuilder {
    config: DispatcherConfig,
    registry: Option<DecoderRegistry>,
}

impl DispatcherBuilder {
    pub fn config(mut self, config: DispatcherConfig) -> Self {
        self.config = config;
        self
    }

    pub fn default_host(mut self, host: impl Into<String>) -> Self {
        self.config.default_host = host.into();
        self
    }

    pub fn registry(mut self, registry: DecoderRegistry) -> Self {
        self.registry = Some(registry);
        self
    }

    pub fn build(self) -> Dispatcher {
        Dispatcher {
            config: self.config,
            registry: Arc::new(self.registry.unwrap_or_default()),
        }
    }
}
