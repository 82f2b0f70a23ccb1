//! In-memory response capture.
//!
//! # Design
//! `ResponseRecorder` plays the part of the response writer a handler would
//! normally stream to a socket. It follows the usual writer rules: the
//! status line is written once, a body write without an explicit status
//! implies `200 OK`, and a missing `Content-Type` is sniffed from the first
//! body chunk. After dispatch the recorder is only reachable through a
//! shared reference, so the captured response cannot change under a test.

use std::io;

use bytes::{Bytes, BytesMut};
use http::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use http::{Response, StatusCode};

/// Captures status, headers and body written by a handler.
#[derive(Debug, Clone)]
pub struct ResponseRecorder {
    status: StatusCode,
    headers: HeaderMap,
    body: BytesMut,
    wrote_header: bool,
}

impl Default for ResponseRecorder {
    fn default() -> Self {
        Self::new()
    }
}

impl ResponseRecorder {
    pub fn new() -> Self {
        Self {
            status: StatusCode::OK,
            headers: HeaderMap::new(),
            body: BytesMut::new(),
            wrote_header: false,
        }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }

    pub fn wrote_header(&self) -> bool {
        self.wrote_header
    }

    /// Record the status line. Only the first call has any effect.
    pub fn write_header(&mut self, status: StatusCode) {
        if self.wrote_header {
            tracing::debug!(%status, kept = %self.status, "superfluous write_header ignored");
            return;
        }
        self.status = status;
        self.wrote_header = true;
    }

    /// Append to the body, writing an implicit `200 OK` first if needed.
    pub fn write(&mut self, chunk: &[u8]) {
        if !self.wrote_header {
            if !self.headers.contains_key(CONTENT_TYPE) {
                self.headers.insert(CONTENT_TYPE, sniff_content_type(chunk));
            }
            self.write_header(StatusCode::OK);
        }
        self.body.extend_from_slice(chunk);
    }

    /// Copy a complete response into the recorder.
    pub fn record(&mut self, response: Response<Bytes>) {
        let (parts, body) = response.into_parts();
        for (name, value) in &parts.headers {
            self.headers.append(name, value.clone());
        }
        self.write_header(parts.status);
        self.body.extend_from_slice(&body);
    }
}

impl io::Write for ResponseRecorder {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        ResponseRecorder::write(self, buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

fn sniff_content_type(chunk: &[u8]) -> HeaderValue {
    if std::str::from_utf8(chunk).is_ok() {
        HeaderValue::from_static("text/plain; charset=utf-8")
    } else {
        HeaderValue::from_static("application/octet-stream")
    }
}
