use crate::body::{BodySink, CompressionBody, EncodedBody};
use crate::compress_writer::CompressWriter;
use crate::config::Config;
use crate::prefer::Candidate;
use http::response::Parts;
use http::{Response, header};
use http_body::Body;
use pin_project_lite::pin_project;
use std::future::Future;
use std::mem;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll, ready};

/// What the request negotiated, carried until the response arrives.
pub(crate) struct Negotiation {
    pub(crate) config: Arc<Config>,
    pub(crate) candidates: Vec<Candidate>,
}

/// A response whose head waits for the writer to commit.
struct Head<B> {
    parts: Parts,
    body: EncodedBody<B>,
}

impl<B> Head<B>
where
    B: Body,
    B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    fn new(mut parts: Parts, body: B, negotiation: Negotiation) -> Self {
        let always_flush = is_always_flush(&parts.headers);

        let sink = BodySink::new(mem::take(&mut parts.headers));
        let mut writer = CompressWriter::new(sink, negotiation.config, negotiation.candidates);
        writer.write_header(parts.status);

        Self {
            parts,
            body: EncodedBody::new(body, writer, always_flush),
        }
    }

    fn into_response(mut self) -> Response<CompressionBody<B>> {
        let sink = self.body.sink_mut();
        if let Some(status) = sink.status {
            self.parts.status = status;
        }
        self.parts.headers = mem::take(&mut sink.headers);
        Response::from_parts(self.parts, CompressionBody::negotiated(self.body))
    }
}

pin_project! {
    /// Future for compression service responses.
    ///
    /// Once the inner service responds, the body is read until the
    /// compression decision is made; the response is released with the
    /// headers that decision implies.
    pub struct ResponseFuture<F, B> {
        #[pin]
        inner: F,
        negotiation: Option<Negotiation>,
        head: Option<Head<B>>,
    }
}

impl<F, B> ResponseFuture<F, B> {
    pub(crate) fn new(inner: F, negotiation: Option<Negotiation>) -> Self {
        Self {
            inner,
            negotiation,
            head: None,
        }
    }
}

impl<F, B, E> Future for ResponseFuture<F, B>
where
    F: Future<Output = Result<Response<B>, E>>,
    B: Body,
    B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    type Output = Result<Response<CompressionBody<B>>, E>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.project();

        let mut head = match this.head.take() {
            Some(head) => head,
            None => {
                let response = ready!(this.inner.poll(cx))?;
                let (mut parts, body) = response.into_parts();
                add_vary_accept_encoding(&mut parts.headers);

                let negotiation = this.negotiation.take().filter(|_| {
                    !has_content_encoding(&parts.headers) && !has_content_range(&parts.headers)
                });
                let Some(negotiation) = negotiation else {
                    return Poll::Ready(Ok(Response::from_parts(
                        parts,
                        CompressionBody::passthrough(body),
                    )));
                };
                Head::new(parts, body, negotiation)
            }
        };

        if head.body.poll_commit(cx).is_pending() {
            *this.head = Some(head);
            return Poll::Pending;
        }
        Poll::Ready(Ok(head.into_response()))
    }
}

/// Checks if Content-Encoding header is already present.
fn has_content_encoding(headers: &header::HeaderMap) -> bool {
    headers.contains_key(header::CONTENT_ENCODING)
}

/// Checks if Content-Range header is present (range response).
fn has_content_range(headers: &header::HeaderMap) -> bool {
    headers.contains_key(header::CONTENT_RANGE)
}

/// Adds Accept-Encoding to the Vary header if not already present.
pub(crate) fn add_vary_accept_encoding(headers: &mut header::HeaderMap) {
    // Check all Vary headers to see if Accept-Encoding is already present
    for vary in headers.get_all(header::VARY) {
        if let Ok(vary_str) = vary.to_str() {
            let covered = vary_str.split(',').any(|v| {
                let v = v.trim();
                v.eq_ignore_ascii_case("*") || v.eq_ignore_ascii_case("accept-encoding")
            });
            if covered {
                return;
            }
        }
    }

    headers.append(
        header::VARY,
        header::HeaderValue::from_static("accept-encoding"),
    );
}

/// Checks whether every body frame must be flushed as it arrives.
fn is_always_flush(headers: &header::HeaderMap) -> bool {
    headers
        .get("x-accel-buffering")
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.eq_ignore_ascii_case("no"))
        || is_streaming_content_type(headers)
}

/// Checks if the content type requires always flushing (e.g., streaming).
fn is_streaming_content_type(headers: &header::HeaderMap) -> bool {
    headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|ct| {
            ct.starts_with("text/event-stream") || ct.starts_with("application/grpc-web")
        })
}
