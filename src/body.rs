use crate::compress_writer::{CompressWriter, Phase};
use crate::writer::ResponseWriter;
use bytes::{Buf, Bytes, BytesMut};
use http::{HeaderMap, StatusCode};
use http_body::{Body, Frame, SizeHint};
use pin_project_lite::pin_project;
use std::io;
use std::pin::Pin;
use std::task::{Context, Poll, ready};

pin_project! {
    /// A response body that may be compressed.
    ///
    /// This type either feeds the inner body through a [`CompressWriter`]
    /// or passes it through unchanged.
    #[project = CompressionBodyProj]
    #[allow(missing_docs)]
    pub enum CompressionBody<B> {
        /// Body fed through the compressing writer.
        Negotiated {
            state: EncodedBody<B>,
        },
        /// Passthrough body without compression.
        Passthrough {
            #[pin]
            inner: B,
        },
    }
}

impl<B> CompressionBody<B> {
    pub(crate) fn negotiated(state: EncodedBody<B>) -> Self {
        Self::Negotiated { state }
    }

    /// Creates a passthrough body without compression.
    pub fn passthrough(inner: B) -> Self {
        Self::Passthrough { inner }
    }
}

/// The in-memory transport a [`CompressWriter`] writes a Tower body into.
#[derive(Debug, Default)]
pub(crate) struct BodySink {
    pub(crate) headers: HeaderMap,
    pub(crate) status: Option<StatusCode>,
    output: BytesMut,
}

impl BodySink {
    pub(crate) fn new(headers: HeaderMap) -> Self {
        Self {
            headers,
            ..Self::default()
        }
    }

    fn take_output(&mut self) -> Option<Bytes> {
        (!self.output.is_empty()).then(|| self.output.split().freeze())
    }
}

impl ResponseWriter for BodySink {
    fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    fn write_header(&mut self, status: StatusCode) {
        self.status.get_or_insert(status);
    }

    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.status.get_or_insert(StatusCode::OK);
        self.output.extend_from_slice(buf);
        Ok(buf.len())
    }
}

/// State of a body fed through a [`CompressWriter`].
///
/// The inner body is boxed so the state can move from the response future
/// into the response body after it has been polled.
pub(crate) struct EncodedBody<B> {
    inner: Option<Pin<Box<B>>>,
    writer: CompressWriter<BodySink>,
    always_flush: bool,
    trailers: Option<HeaderMap>,
    error: Option<io::Error>,
}

impl<B> EncodedBody<B>
where
    B: Body,
    B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    pub(crate) fn new(inner: B, writer: CompressWriter<BodySink>, always_flush: bool) -> Self {
        Self {
            inner: Some(Box::pin(inner)),
            writer,
            always_flush,
            trailers: None,
            error: None,
        }
    }

    pub(crate) fn sink_mut(&mut self) -> &mut BodySink {
        self.writer.get_mut()
    }

    /// Polls the inner body until the writer has committed or the body ended.
    pub(crate) fn poll_commit(&mut self, cx: &mut Context<'_>) -> Poll<()> {
        while self.inner.is_some()
            && matches!(self.writer.phase(), Phase::Undecided | Phase::Buffering)
        {
            ready!(self.poll_step(cx));
        }
        Poll::Ready(())
    }

    fn poll_data(&mut self, cx: &mut Context<'_>) -> Poll<Option<Result<Frame<Bytes>, io::Error>>> {
        loop {
            if let Some(data) = self.writer.get_mut().take_output() {
                return Poll::Ready(Some(Ok(Frame::data(data))));
            }
            if let Some(err) = self.error.take() {
                return Poll::Ready(Some(Err(err)));
            }
            if self.inner.is_none() {
                return Poll::Ready(self.trailers.take().map(|t| Ok(Frame::trailers(t))));
            }
            ready!(self.poll_step(cx));
        }
    }

    /// Feeds one frame of the inner body to the writer.
    fn poll_step(&mut self, cx: &mut Context<'_>) -> Poll<()> {
        let Some(inner) = self.inner.as_mut() else {
            return Poll::Ready(());
        };

        match ready!(inner.as_mut().poll_frame(cx)) {
            None => self.finish(None),
            Some(Ok(frame)) => match frame.into_data() {
                Ok(data) => {
                    if let Err(err) = self.write(data) {
                        self.fail(err);
                    }
                }
                Err(frame) => {
                    if let Ok(trailers) = frame.into_trailers() {
                        // trailers end the body; they follow the encoded data
                        self.finish(Some(trailers));
                    }
                }
            },
            Some(Err(err)) => self.fail(io::Error::other(err.into())),
        }
        Poll::Ready(())
    }

    fn write<D: Buf>(&mut self, mut data: D) -> io::Result<()> {
        while data.has_remaining() {
            let n = self.writer.write(data.chunk())?;
            if n == 0 {
                return Err(io::Error::new(io::ErrorKind::WriteZero, "short write"));
            }
            data.advance(n);
        }

        if self.always_flush {
            self.writer.commit()?;
            self.writer.flush()?;
        }
        Ok(())
    }

    fn finish(&mut self, trailers: Option<HeaderMap>) {
        self.inner = None;
        self.trailers = trailers;
        if let Err(err) = self.writer.close() {
            self.error = Some(err);
        }
    }

    fn fail(&mut self, err: io::Error) {
        tracing::debug!(error = %err, "response body failed");
        self.inner = None;
        // the head still has to be released
        if let Err(err) = self.writer.commit() {
            tracing::debug!(error = %err, "failed to commit response");
        }
        self.error = Some(err);
    }
}

impl<B> Body for CompressionBody<B>
where
    B: Body,
    B::Data: Buf,
    B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    type Data = Bytes;
    type Error = io::Error;

    fn poll_frame(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        match self.project() {
            CompressionBodyProj::Passthrough { inner } => {
                // Pass through frames, converting data to Bytes
                match inner.poll_frame(cx) {
                    Poll::Pending => Poll::Pending,
                    Poll::Ready(None) => Poll::Ready(None),
                    Poll::Ready(Some(Ok(frame))) => {
                        let frame = frame.map_data(|mut data| data.copy_to_bytes(data.remaining()));
                        Poll::Ready(Some(Ok(frame)))
                    }
                    Poll::Ready(Some(Err(e))) => Poll::Ready(Some(Err(io::Error::other(e.into())))),
                }
            }
            CompressionBodyProj::Negotiated { state } => state.poll_data(cx),
        }
    }

    fn is_end_stream(&self) -> bool {
        match self {
            CompressionBody::Passthrough { inner } => inner.is_end_stream(),
            CompressionBody::Negotiated { state } => {
                state.inner.is_none()
                    && state.error.is_none()
                    && state.trailers.is_none()
                    && state.writer.get_ref().output.is_empty()
            }
        }
    }

    fn size_hint(&self) -> SizeHint {
        match self {
            CompressionBody::Passthrough { inner } => inner.size_hint(),
            // exact once everything has been encoded
            CompressionBody::Negotiated { state } if state.inner.is_none() => {
                SizeHint::with_exact(state.writer.get_ref().output.len() as u64)
            }
            CompressionBody::Negotiated { .. } => SizeHint::default(),
        }
    }
}
