use crate::compress_writer::CompressWriter;
use crate::config::{Builder, Config};
use crate::future::add_vary_accept_encoding;
use crate::handler::CompressHandler;
use crate::service::CompressionService;
use crate::writer::ResponseWriter;
use http::HeaderMap;
use std::sync::Arc;
use tower::Layer;

/// A Tower layer that compresses HTTP response bodies.
///
/// This layer wraps services and automatically compresses response bodies
/// based on the client's Accept-Encoding header. The same configuration
/// also decorates [`Handler`](crate::Handler)s and single writers.
#[derive(Debug, Clone)]
pub struct CompressionLayer {
    config: Arc<Config>,
}

impl CompressionLayer {
    /// Creates a new compression layer with default settings.
    ///
    /// Every built-in codec is offered, preferring zstd, then brotli, gzip
    /// and deflate. The minimum size is [`DEFAULT_MIN_SIZE`](crate::DEFAULT_MIN_SIZE).
    pub fn new() -> Self {
        Builder::new().must_build()
    }

    /// Starts configuring a layer.
    pub fn builder() -> Builder {
        Builder::new()
    }

    /// Decorates `handler` so its responses are compressed.
    pub fn handler<H>(&self, handler: H) -> CompressHandler<H> {
        CompressHandler::new(handler, Arc::clone(&self.config))
    }

    /// Wraps one response writer for a request with the given headers.
    ///
    /// Adds `Vary: Accept-Encoding` to the response right away. The caller
    /// must [`close`](CompressWriter::close) the returned writer, or drop it.
    pub fn wrap<W: ResponseWriter>(&self, mut writer: W, request: &HeaderMap) -> CompressWriter<W> {
        add_vary_accept_encoding(writer.headers_mut());
        let candidates = self.config.negotiate(request);
        CompressWriter::new(writer, Arc::clone(&self.config), candidates)
    }

    pub(crate) fn from_config(config: Config) -> Self {
        Self {
            config: Arc::new(config),
        }
    }

    pub(crate) fn config(&self) -> &Arc<Config> {
        &self.config
    }
}

impl Default for CompressionLayer {
    fn default() -> Self {
        Self::new()
    }
}

impl<S> Layer<S> for CompressionLayer {
    type Service = CompressionService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        CompressionService::new(inner, Arc::clone(&self.config))
    }
}
