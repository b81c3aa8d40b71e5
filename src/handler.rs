use crate::compress_writer::CompressWriter;
use crate::config::Config;
use crate::future::add_vary_accept_encoding;
use crate::writer::ResponseWriter;
use http::Request;
use std::sync::Arc;

/// Serves a request by writing the response into a [`ResponseWriter`].
///
/// Implemented for every `Fn(&mut dyn ResponseWriter, &Request<B>)`.
pub trait Handler<B> {
    /// Writes the response to `request`.
    fn serve(&self, writer: &mut dyn ResponseWriter, request: &Request<B>);
}

impl<B, F> Handler<B> for F
where
    F: Fn(&mut dyn ResponseWriter, &Request<B>),
{
    fn serve(&self, writer: &mut dyn ResponseWriter, request: &Request<B>) {
        self(writer, request)
    }
}

/// A [`Handler`] whose responses are compressed.
///
/// Created by [`CompressionLayer::handler`](crate::CompressionLayer::handler).
#[derive(Debug, Clone)]
pub struct CompressHandler<H> {
    inner: H,
    config: Arc<Config>,
}

impl<H> CompressHandler<H> {
    pub(crate) fn new(inner: H, config: Arc<Config>) -> Self {
        Self { inner, config }
    }

    /// Returns a reference to the wrapped handler.
    pub fn inner(&self) -> &H {
        &self.inner
    }
}

impl<B, H: Handler<B>> Handler<B> for CompressHandler<H> {
    fn serve(&self, writer: &mut dyn ResponseWriter, request: &Request<B>) {
        add_vary_accept_encoding(writer.headers_mut());

        let candidates = self.config.negotiate(request.headers());
        if candidates.is_empty() {
            self.inner.serve(writer, request);
            return;
        }

        let mut compressing = CompressWriter::new(writer, Arc::clone(&self.config), candidates);
        self.inner.serve(&mut compressing, request);
        if let Err(err) = compressing.close() {
            tracing::debug!(error = %err, "failed to finish compressed response");
        }
    }
}
