//! Fluent request builders for HTTP handler tests.
//!
//! # Overview
//! Build a synthetic request, run it against a handler in-process and decode
//! what the handler wrote:
//!
//! ```ignore
//! let mut done = RequestBuilder::new()
//!     .post("/items")
//!     .with_json_body(&body)
//!     .dispatch(&mut PanicReporter, &ServiceHandler::new(app()))
//!     .expect("request was built");
//! assert_eq!(done.code(), 201);
//! let item: Item = done.disallow_unknown_fields().decode()?;
//! ```
//!
//! # Design
//! - `RequestBuilder` never fails mid-chain. The first construction error
//!   is kept and reported once, at dispatch, through a `TestReporter`.
//! - `Dispatcher` calls the `Handler` synchronously; there is no socket and
//!   no timeout. Cancellation and deadlines travel in a `RequestContext`
//!   stored in the request extensions.
//! - `CompletedRequest::decode` picks a decoder from a `DecoderRegistry` by
//!   the bare media type of the response's `Content-Type`.

pub mod builder;
pub mod completed;
pub mod context;
pub mod decode;
pub mod dispatch;
pub mod error;
pub mod recorder;

pub use builder::RequestBuilder;
pub use completed::CompletedRequest;
pub use context::RequestContext;
pub use decode::{Decoder, DecoderRegistry, Destination, Slot};
pub use dispatch::{Dispatcher, DispatcherBuilder, DispatcherConfig, Handler, PanicReporter, ServiceHandler, TestReporter};
pub use error::{BuildError, ContextError, DecodeError};
pub use recorder::ResponseRecorder;
