//! End-to-end tests: build, dispatch and decode against real handlers.
//!
//! # Design
//! The mock-server axum app is driven in-process through `ServiceHandler`,
//! so these tests cover the full path from builder to decoded body without
//! binding a port. A couple of plain closure handlers cover the behaviour
//! that needs a specific status or content type.

use std::sync::Once;

use bytes::Bytes;
use http::{Request, StatusCode};
use mock_server::{Echo, Item};
use request_helpers::{
    DecodeError, Dispatcher, DecoderRegistry, PanicReporter, RequestBuilder, RequestContext,
    ResponseRecorder, ServiceHandler,
};
use serde::{Deserialize, Serialize};

static TRACING: Once = Once::new();

fn init_tracing() {
    TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

#[derive(Debug, Serialize, Deserialize, PartialEq)]
struct Named {
    name: String,
}

/// Writes the request body back with `201 Created`.
fn echo_created(recorder: &mut ResponseRecorder, request: Request<Bytes>) {
    recorder
        .headers_mut()
        .insert(http::header::CONTENT_TYPE, "application/json".parse().unwrap());
    recorder.write_header(StatusCode::CREATED);
    recorder.write(request.body());
}

#[test]
fn post_json_is_echoed_with_201() {
    init_tracing();
    let done = RequestBuilder::new()
        .post("/items")
        .with_json_body(&Named { name: "a".to_string() })
        .dispatch(&mut PanicReporter, &echo_created)
        .expect("request should dispatch");

    assert_eq!(done.code(), 201);
    let named: Named = done.decode_json().unwrap();
    assert_eq!(named, Named { name: "a".to_string() });
}

#[test]
fn deferred_marshal_error_skips_handler() {
    init_tracing();
    let called = std::cell::Cell::new(false);
    let handler = |_: &mut ResponseRecorder, _: Request<Bytes>| called.set(true);
    let mut reports: Vec<String> = Vec::new();

    let done = RequestBuilder::new()
        .get("/items")
        .with_json_body(&std::collections::BTreeMap::from([(vec![1u8], "bytes are not keys")]))
        .dispatch(&mut reports, &handler);

    assert!(done.is_none());
    assert!(!called.get());
    assert_eq!(reports.len(), 1);
    assert!(reports[0].contains("failed to marshal json object"), "{}", reports[0]);
}

#[test]
fn create_item_through_router() {
    init_tracing();
    let handler = ServiceHandler::new(mock_server::app());
    let mut done = RequestBuilder::new()
        .post("/items")
        .with_json_body(&Named { name: "lamp".to_string() })
        .with_accept_json()
        .dispatch(&mut PanicReporter, &handler)
        .unwrap();

    assert_eq!(done.status(), StatusCode::CREATED);
    let item: Item = done.disallow_unknown_fields().decode().unwrap();
    assert_eq!(item.name, "lamp");
}

#[test]
fn strict_decode_rejects_fields_missing_from_target() {
    init_tracing();
    let handler = ServiceHandler::new(mock_server::app());
    let mut done = RequestBuilder::new()
        .post("/items")
        .with_json_body(&Named { name: "chair".to_string() })
        .dispatch(&mut PanicReporter, &handler)
        .unwrap();

    // `Named` has no `id`, which the router always returns.
    let lenient: Named = done.decode().unwrap();
    assert_eq!(lenient.name, "chair");

    done.disallow_unknown_fields();
    match done.decode::<Named>() {
        Err(DecodeError::UnknownFields(paths)) => assert_eq!(paths, vec!["id".to_string()]),
        other => panic!("expected UnknownFields, got {other:?}"),
    }
}

#[test]
fn echo_sees_everything_that_was_configured() {
    init_tracing();
    let handler = ServiceHandler::new(mock_server::app());
    let done = RequestBuilder::new()
        .put("/echo")
        .with_host("tenant.example.org")
        .with_bearer_auth("jws-token")
        .with_header("X-Request-Id", "r-1")
        .with_cookie_name_value("session", "s1")
        .with_cookie_name_value("flag", "on")
        .with_cookie_name_value("session", "s2")
        .with_body(Some(Bytes::from_static(b"raw body")))
        .dispatch(&mut PanicReporter, &handler)
        .unwrap();

    let echo: Echo = done.decode().unwrap();
    assert_eq!(echo.method, "PUT");
    assert_eq!(echo.path, "/echo");
    assert_eq!(echo.host.as_deref(), Some("tenant.example.org"));
    assert!(!echo.headers.contains_key("host"));
    assert_eq!(echo.headers["authorization"], "Bearer jws-token");
    assert_eq!(echo.headers["x-request-id"], "r-1");
    let cookies: Vec<(&str, &str)> = echo
        .cookies
        .iter()
        .map(|(k, v)| (k.as_str(), v.as_str()))
        .collect();
    assert_eq!(cookies, vec![("session", "s1"), ("flag", "on"), ("session", "s2")]);
    assert_eq!(echo.body, "raw body");
}

#[test]
fn delete_needs_bearer_and_empties_the_list() {
    init_tracing();
    let handler = ServiceHandler::new(mock_server::app());
    let created: Item = RequestBuilder::new()
        .post("/items")
        .with_json_body(&Named { name: "desk".to_string() })
        .dispatch(&mut PanicReporter, &handler)
        .unwrap()
        .decode()
        .unwrap();
    let path = format!("/items/{}", created.id);

    let anonymous = RequestBuilder::new()
        .delete(path.as_str())
        .dispatch(&mut PanicReporter, &handler)
        .unwrap();
    assert_eq!(anonymous.status(), StatusCode::UNAUTHORIZED);

    let authorized = RequestBuilder::new()
        .delete(path.as_str())
        .with_bearer_auth("jws-token")
        .dispatch(&mut PanicReporter, &handler)
        .unwrap();
    assert_eq!(authorized.status(), StatusCode::NO_CONTENT);

    let items: Vec<Item> = RequestBuilder::new()
        .get("/items")
        .with_accept_json()
        .dispatch(&mut PanicReporter, &handler)
        .unwrap()
        .decode()
        .unwrap();
    assert!(items.is_empty());
}

#[tokio::test]
async fn service_handler_works_inside_a_tokio_test() {
    init_tracing();
    let handler = ServiceHandler::new(mock_server::app());
    let done = RequestBuilder::new()
        .get("/items")
        .dispatch(&mut PanicReporter, &handler)
        .unwrap();

    assert_eq!(done.status(), StatusCode::OK);
    let items: Vec<Item> = done.decode().unwrap();
    assert!(items.is_empty());
}

#[tokio::test(flavor = "current_thread")]
#[should_panic(expected = "handler exploded")]
async fn service_panics_inside_a_runtime_reach_the_test() {
    async fn boom() -> StatusCode {
        panic!("handler exploded")
    }
    let router = axum::Router::new().route("/boom", axum::routing::get(boom));
    RequestBuilder::new()
        .get("/boom")
        .dispatch(&mut PanicReporter, &ServiceHandler::new(router));
}

#[test]
fn missing_item_is_404() {
    init_tracing();
    let handler = ServiceHandler::new(mock_server::app());
    let id = uuid::Uuid::nil();
    let done = RequestBuilder::new()
        .get(format!("/items/{id}"))
        .dispatch(&mut PanicReporter, &handler)
        .unwrap();
    assert_eq!(done.status(), StatusCode::NOT_FOUND);
    assert!(done.body().is_empty());
}

#[test]
fn plain_text_errors_decode_as_strings() {
    init_tracing();
    let handler = ServiceHandler::new(mock_server::app());
    let done = RequestBuilder::new()
        .get("/items/not-a-uuid")
        .dispatch(&mut PanicReporter, &handler)
        .unwrap();
    assert_eq!(done.code(), 400);
    let message: String = done.decode().unwrap();
    assert!(!message.is_empty());
}

#[test]
fn unregistered_response_type_is_unhandled() {
    init_tracing();
    let handler = |recorder: &mut ResponseRecorder, _: Request<Bytes>| {
        recorder
            .headers_mut()
            .insert(http::header::CONTENT_TYPE, "text/xml; charset=utf-8".parse().unwrap());
        recorder.write(b"<name>a</name>");
    };
    let done = RequestBuilder::new()
        .get("/feed")
        .with_accept("text/xml")
        .dispatch(&mut PanicReporter, &handler)
        .unwrap();

    let err = done.decode::<Named>().unwrap_err();
    assert!(matches!(err, DecodeError::UnhandledContentType(_)));
    assert!(err.to_string().contains("text/xml"));
}

#[test]
fn custom_registry_extends_decoding() {
    init_tracing();
    let mut registry = DecoderRegistry::default();
    registry.register("application/vnd.item+json", request_helpers::decode::json_decoder);
    let dispatcher = Dispatcher::builder().registry(registry).build();
    let handler = |recorder: &mut ResponseRecorder, _: Request<Bytes>| {
        recorder.headers_mut().insert(
            http::header::CONTENT_TYPE,
            "application/vnd.item+json; version=2".parse().unwrap(),
        );
        recorder.write(br#"{"name":"vendor"}"#);
    };

    let done = dispatcher
        .dispatch(RequestBuilder::new().get("/v"), &mut PanicReporter, &handler)
        .unwrap();
    let named: Named = done.decode().unwrap();
    assert_eq!(named.name, "vendor");
}

#[test]
fn handler_observes_attached_context() {
    init_tracing();
    let (ctx, cancel) = RequestContext::with_cancel();
    cancel.cancel();
    let handler = |recorder: &mut ResponseRecorder, request: Request<Bytes>| {
        let cancelled = RequestContext::from_request(&request).is_some_and(RequestContext::is_cancelled);
        let status = if cancelled {
            StatusCode::SERVICE_UNAVAILABLE
        } else {
            StatusCode::OK
        };
        recorder.write_header(status);
    };

    let done = RequestBuilder::new()
        .get("/slow")
        .with_context(ctx)
        .dispatch(&mut PanicReporter, &handler)
        .unwrap();
    assert_eq!(done.status(), StatusCode::SERVICE_UNAVAILABLE);
}
