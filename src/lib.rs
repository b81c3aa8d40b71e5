//! Content-negotiated HTTP response compression.
//!
//! The crate decorates a response writer so the body it is given reaches
//! the client compressed with the best encoding both sides support. The
//! decision is made once per response, after enough of the body is known
//! to tell whether compressing is worth it.
//!
//! Three surfaces share one [`CompressionLayer`] configuration:
//! - [`CompressionLayer`] as a Tower layer over `http::Response` services
//! - [`CompressionLayer::handler`] around a synchronous [`Handler`]
//! - [`CompressionLayer::wrap`] around a single [`ResponseWriter`]
//!
//! # Example
//!
//! ```ignore
//! use negotiated_compression::{CompressionLayer, Prefer};
//! use tower::ServiceBuilder;
//!
//! let layer = CompressionLayer::builder()
//!     .min_size(256)
//!     .content_types(["text/html", "text/css", "application/json"], false)
//!     .prefer(Prefer::Client)
//!     .build()?;
//!
//! let service = ServiceBuilder::new()
//!     .layer(layer)
//!     .service(my_service);
//! ```
//!
//! # Compression Rules
//!
//! A response is sent uncompressed when:
//! - The request shares no registered encoding with quality above zero
//! - `Content-Encoding` header is already set
//! - `Content-Range` header is present (range responses)
//! - The content type is rejected by the configured rules
//! - The body, or its declared `Content-Length`, is below the minimum size
//!   (default: [`DEFAULT_MIN_SIZE`] bytes)
//!
//! A missing `Content-Type` is sniffed from the first body bytes.
//!
//! The Tower surface flushes after each chunk when:
//! - `X-Accel-Buffering: no` header is present
//! - `Content-Type` is `text/event-stream`
//! - `Content-Type` starts with `application/grpc-web`
//!
//! # Response Modifications
//!
//! When compression is applied:
//! - `Content-Encoding` header is set to the encoding used
//! - `Content-Length` header is removed (compressed size is unknown)
//! - `Accept-Ranges` header is removed
//!
//! `Vary` includes `Accept-Encoding` on every response that passed
//! through the middleware.

#![deny(missing_docs)]

mod accept;
mod body;
mod codec;
mod compress_writer;
mod config;
mod content_type;
mod error;
mod future;
mod handler;
mod layer;
mod pool;
mod prefer;
mod service;
mod sniff;
#[cfg(test)]
mod test_util;
mod writer;

pub use accept::{CodingQualities, accept_encoding_from_headers, common_encodings, parse_accept_encoding};
pub use body::CompressionBody;
pub use codec::{Codec, CodecCompressor, Compressor, EncodeWriter};
pub use compress_writer::{CompressWriter, Phase};
pub use compression_core::Level;
pub use config::{Builder, DEFAULT_MIN_SIZE, Registration, Registry};
pub use content_type::{ContentTypeGate, ContentTypeRule};
pub use error::ConfigError;
pub use future::ResponseFuture;
pub use handler::{CompressHandler, Handler};
pub use layer::CompressionLayer;
pub use pool::{Pool, Reset};
pub use prefer::{Candidate, Prefer, preferred};
pub use service::CompressionService;
pub use sniff::detect_content_type;
pub use writer::{CloseNotifier, Connection, Flusher, Hijacker, ResponseWriter};
