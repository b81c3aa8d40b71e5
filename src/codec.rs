use crate::error::ConfigError;
use crate::pool::Pool;
use compression_codecs::EncodeV2;
#[cfg(feature = "brotli")]
use compression_codecs::brotli::{BrotliEncoder, params::EncoderParams as BrotliParams};
#[cfg(feature = "deflate")]
use compression_codecs::deflate::DeflateEncoder;
#[cfg(feature = "gzip")]
use compression_codecs::gzip::GzipEncoder;
#[cfg(feature = "zstd")]
use compression_codecs::zstd::ZstdEncoder;
use compression_core::Level;
use compression_core::util::{PartialBuffer, WriteBuffer};
use std::io;
use std::sync::Arc;

const OUTPUT_BUFFER_SIZE: usize = 8 * 1024; // 8KB output buffer

/// A source of encoders for one content coding.
///
/// Implementations are shared by every request and must be safe to call
/// concurrently; per-request state lives in the returned [`EncodeWriter`].
pub trait Compressor: Send + Sync + 'static {
    /// Returns a fresh encoder ready to accept the start of a body.
    fn get(&self) -> Box<dyn EncodeWriter>;
}

/// A streaming encoder writing its output into a parent writer.
///
/// The parent is passed on every call rather than stored, so the encoder
/// never holds on to the response it writes into.
pub trait EncodeWriter: Send {
    /// Encodes `buf`, writing whatever output is ready to `parent`.
    ///
    /// Returns how many bytes of `buf` were consumed.
    fn write(&mut self, parent: &mut dyn io::Write, buf: &[u8]) -> io::Result<usize>;

    /// Pushes internally buffered output to `parent`.
    ///
    /// Does not flush `parent` itself. The default does nothing, for encoders
    /// that cannot flush mid-stream.
    fn flush(&mut self, parent: &mut dyn io::Write) -> io::Result<()> {
        let _ = parent;
        Ok(())
    }

    /// Finishes the stream, writing all remaining output to `parent`.
    ///
    /// The encoder is consumed; implementations may recycle its resources.
    fn close(self: Box<Self>, parent: &mut dyn io::Write) -> io::Result<()>;
}

/// Built-in compression codecs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Codec {
    /// Zstd compression.
    #[cfg(feature = "zstd")]
    Zstd,
    /// Brotli compression.
    #[cfg(feature = "brotli")]
    Brotli,
    /// Gzip compression.
    #[cfg(feature = "gzip")]
    Gzip,
    /// Deflate compression.
    #[cfg(feature = "deflate")]
    Deflate,
}

impl Codec {
    /// Every codec enabled at compile time.
    pub const ALL: &'static [Codec] = &[
        #[cfg(feature = "zstd")]
        Codec::Zstd,
        #[cfg(feature = "brotli")]
        Codec::Brotli,
        #[cfg(feature = "gzip")]
        Codec::Gzip,
        #[cfg(feature = "deflate")]
        Codec::Deflate,
    ];

    /// Returns the Content-Encoding header value for this codec.
    pub fn content_encoding(&self) -> &'static str {
        match self {
            #[cfg(feature = "zstd")]
            Codec::Zstd => "zstd",
            #[cfg(feature = "brotli")]
            Codec::Brotli => "br",
            #[cfg(feature = "gzip")]
            Codec::Gzip => "gzip",
            #[cfg(feature = "deflate")]
            Codec::Deflate => "deflate",
        }
    }

    /// Server priority used by the default configuration.
    ///
    /// Prefers zstd > brotli > gzip > deflate.
    pub fn default_priority(&self) -> i32 {
        match self {
            #[cfg(feature = "zstd")]
            Codec::Zstd => 3,
            #[cfg(feature = "brotli")]
            Codec::Brotli => 2,
            #[cfg(feature = "gzip")]
            Codec::Gzip => 1,
            #[cfg(feature = "deflate")]
            Codec::Deflate => 0,
        }
    }

    /// Creates a pooled compressor for this codec at `level`.
    pub fn compressor(self, level: Level) -> Result<CodecCompressor, ConfigError> {
        self.check_level(level)?;
        Ok(CodecCompressor {
            codec: self,
            level,
            scratch: Arc::new(Pool::default()),
        })
    }

    fn check_level(self, level: Level) -> Result<(), ConfigError> {
        let valid = match (self, level) {
            (_, Level::Default) => true,
            #[cfg(feature = "brotli")]
            (Codec::Brotli, _) => false,
            #[cfg(feature = "zstd")]
            (Codec::Zstd, Level::Precise(n)) => (1..=22).contains(&n),
            (_, Level::Precise(n)) => (0..=9).contains(&n),
            _ => true,
        };

        if valid {
            Ok(())
        } else {
            Err(ConfigError::InvalidLevel {
                encoding: self.content_encoding(),
                level: format!("{level:?}"),
            })
        }
    }
}

/// A [`Compressor`] backed by one of the built-in codecs.
///
/// Output scratch buffers are pooled per compressor and returned when an
/// encoder is closed or dropped.
#[derive(Debug)]
pub struct CodecCompressor {
    codec: Codec,
    level: Level,
    scratch: Arc<Pool<Vec<u8>>>,
}

impl CodecCompressor {
    /// The codec this compressor encodes with.
    pub fn codec(&self) -> Codec {
        self.codec
    }

    /// Creates a new encoder for this codec.
    fn encoder(&self) -> Box<dyn EncodeV2 + Send> {
        match self.codec {
            #[cfg(feature = "zstd")]
            Codec::Zstd => Box::new(ZstdEncoder::new(zstd_level(self.level))),
            #[cfg(feature = "brotli")]
            Codec::Brotli => Box::new(BrotliEncoder::new(BrotliParams::default())),
            #[cfg(feature = "gzip")]
            Codec::Gzip => Box::new(GzipEncoder::new(self.level.into())),
            #[cfg(feature = "deflate")]
            Codec::Deflate => Box::new(DeflateEncoder::new(self.level.into())),
        }
    }
}

impl Compressor for CodecCompressor {
    fn get(&self) -> Box<dyn EncodeWriter> {
        let mut scratch = self.scratch.acquire();
        scratch.resize(OUTPUT_BUFFER_SIZE, 0);
        Box::new(CodecWriter {
            encoder: self.encoder(),
            scratch,
            pool: Arc::clone(&self.scratch),
        })
    }
}

#[cfg(feature = "zstd")]
fn zstd_level(level: Level) -> i32 {
    match level {
        Level::Fastest => 1,
        Level::Best => 19,
        Level::Precise(n) => n,
        _ => 3, // level 3 is a good default
    }
}

/// Drives an [`EncodeV2`] encoder through a pooled scratch buffer.
struct CodecWriter {
    encoder: Box<dyn EncodeV2 + Send>,
    scratch: Vec<u8>,
    pool: Arc<Pool<Vec<u8>>>,
}

impl CodecWriter {
    /// Runs `step` until it reports completion, copying output to `parent`.
    fn drain(
        &mut self,
        parent: &mut dyn io::Write,
        step: fn(&mut Box<dyn EncodeV2 + Send>, &mut WriteBuffer<'_>) -> io::Result<bool>,
    ) -> io::Result<()> {
        loop {
            let mut output = WriteBuffer::new_initialized(self.scratch.as_mut_slice());
            let done = step(&mut self.encoder, &mut output)?;
            let written = output.written_len();
            if written > 0 {
                parent.write_all(&self.scratch[..written])?;
            }
            if done {
                return Ok(());
            }
        }
    }
}

impl EncodeWriter for CodecWriter {
    fn write(&mut self, parent: &mut dyn io::Write, buf: &[u8]) -> io::Result<usize> {
        let mut input = PartialBuffer::new(buf);

        // Keep encoding until all input is consumed
        while input.written_len() < buf.len() {
            let consumed = input.written_len();
            let mut output = WriteBuffer::new_initialized(self.scratch.as_mut_slice());
            self.encoder
                .encode(&mut input, &mut output)
                .map_err(io::Error::other)?;

            let written = output.written_len();
            if written > 0 {
                parent.write_all(&self.scratch[..written])?;
            }

            // no progress at all: report what was consumed so far
            if written == 0 && input.written_len() == consumed {
                break;
            }
        }

        Ok(input.written_len())
    }

    fn flush(&mut self, parent: &mut dyn io::Write) -> io::Result<()> {
        self.drain(parent, |encoder, output| {
            encoder.flush(output).map_err(io::Error::other)
        })
    }

    fn close(mut self: Box<Self>, parent: &mut dyn io::Write) -> io::Result<()> {
        self.drain(parent, |encoder, output| {
            encoder.finish(output).map_err(io::Error::other)
        })
    }
}

impl Drop for CodecWriter {
    fn drop(&mut self) {
        self.pool.release(std::mem::take(&mut self.scratch));
    }
}
