use crate::accept::{accept_encoding_from_headers, common_encodings};
use crate::codec::{Codec, Compressor};
use crate::content_type::ContentTypeGate;
use crate::error::ConfigError;
use crate::layer::CompressionLayer;
use crate::pool::Pool;
use crate::prefer::{Candidate, Prefer};
use bytes::BytesMut;
use compression_core::Level;
use http::{HeaderMap, HeaderValue};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Default minimum body size for compression.
///
/// Bodies this small rarely shrink once the codec framing is added.
pub const DEFAULT_MIN_SIZE: usize = 20;

/// A compressor registered under an encoding token.
#[derive(Clone)]
pub struct Registration {
    pub(crate) compressor: Arc<dyn Compressor>,
    pub(crate) priority: i32,
    pub(crate) header: HeaderValue,
}

impl Registration {
    /// Server priority of this encoding; higher wins.
    pub fn priority(&self) -> i32 {
        self.priority
    }
}

impl fmt::Debug for Registration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registration")
            .field("priority", &self.priority)
            .field("header", &self.header)
            .finish_non_exhaustive()
    }
}

/// Encoding tokens offered by the server, with their compressors.
///
/// Tokens are matched exactly against the lowercased codings sent by
/// clients, so they should be registered in lowercase.
#[derive(Debug, Clone, Default)]
pub struct Registry {
    entries: HashMap<String, Registration>,
}

impl Registry {
    /// Registers `compressor` for `encoding`, replacing any previous entry.
    ///
    /// The token must be a valid HTTP token, since it ends up verbatim in
    /// `Content-Encoding`.
    pub fn insert(
        &mut self,
        encoding: &str,
        priority: i32,
        compressor: Arc<dyn Compressor>,
    ) -> Result<(), ConfigError> {
        if encoding.is_empty() || !encoding.bytes().all(is_token_byte) {
            return Err(ConfigError::InvalidEncoding(encoding.to_owned()));
        }
        let header = HeaderValue::from_str(encoding)
            .map_err(|_| ConfigError::InvalidEncoding(encoding.to_owned()))?;

        self.entries.insert(
            encoding.to_owned(),
            Registration {
                compressor,
                priority,
                header,
            },
        );
        Ok(())
    }

    /// Removes the entry for `encoding`, returning it.
    pub fn remove(&mut self, encoding: &str) -> Option<Registration> {
        self.entries.remove(encoding)
    }

    /// Looks up the entry for `encoding`.
    pub fn get(&self, encoding: &str) -> Option<&Registration> {
        self.entries.get(encoding)
    }

    /// Number of registered encodings.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterates over `(token, registration)` pairs in no particular order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Registration)> {
        self.entries.iter().map(|(token, reg)| (token.as_str(), reg))
    }
}

// RFC 9110 tchar
fn is_token_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b"!#$%&'*+-.^_`|~".contains(&b)
}

/// Settings shared by every exchange handled by one layer.
#[derive(Debug)]
pub(crate) struct Config {
    pub(crate) min_size: usize,
    pub(crate) gate: ContentTypeGate,
    pub(crate) prefer: Prefer,
    pub(crate) registry: Registry,
    pub(crate) buffers: Pool<BytesMut>,
}

impl Config {
    /// Encodings both acceptable to the request and offered here.
    pub(crate) fn negotiate(&self, request: &HeaderMap) -> Vec<Candidate> {
        common_encodings(&accept_encoding_from_headers(request), &self.registry)
    }
}

/// Builder for a [`CompressionLayer`].
///
/// Starts out with every built-in codec enabled at its default level.
/// Options are validated when [`build`](Builder::build) is called; the first
/// invalid option is reported.
#[derive(Debug)]
pub struct Builder {
    min_size: usize,
    gate: ContentTypeGate,
    prefer: Prefer,
    registry: Registry,
    error: Option<ConfigError>,
}

impl Builder {
    pub(crate) fn new() -> Self {
        let builder = Self {
            min_size: DEFAULT_MIN_SIZE,
            gate: ContentTypeGate::default(),
            prefer: Prefer::default(),
            registry: Registry::default(),
            error: None,
        };

        Codec::ALL.iter().fold(builder, |builder, &codec| {
            builder.codec(codec, codec.default_priority(), Level::Default)
        })
    }

    /// Sets the minimum body size required for compression.
    ///
    /// Responses with a declared Content-Length below this value are never
    /// compressed; undeclared bodies are buffered until this many bytes
    /// have been written.
    pub fn min_size(mut self, size: usize) -> Self {
        self.min_size = size;
        self
    }

    /// Restricts compression by content type.
    ///
    /// With `blacklist` unset only the listed types are compressed, with it
    /// set the listed types are excluded. An empty list admits everything.
    pub fn content_types<I, S>(mut self, rules: I, blacklist: bool) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        match ContentTypeGate::new(rules, blacklist) {
            Ok(gate) => self.gate = gate,
            Err(err) => self.record(err),
        }
        self
    }

    /// Registers a compressor for `encoding`, or removes it when `None`.
    pub fn compressor(
        mut self,
        encoding: &str,
        priority: i32,
        compressor: Option<Arc<dyn Compressor>>,
    ) -> Self {
        match compressor {
            Some(compressor) => {
                if let Err(err) = self.registry.insert(encoding, priority, compressor) {
                    self.record(err);
                }
            }
            None => {
                self.registry.remove(encoding);
            }
        }
        self
    }

    /// Registers a built-in codec under its standard token.
    pub fn codec(mut self, codec: Codec, priority: i32, level: Level) -> Self {
        match codec.compressor(level) {
            Ok(compressor) => {
                self.compressor(codec.content_encoding(), priority, Some(Arc::new(compressor)))
            }
            Err(err) => {
                self.record(err);
                self
            }
        }
    }

    /// Sets which side wins when several encodings are acceptable.
    pub fn prefer(mut self, prefer: Prefer) -> Self {
        self.prefer = prefer;
        self
    }

    /// Builds the layer, failing on the first invalid option.
    pub fn build(self) -> Result<CompressionLayer, ConfigError> {
        if let Some(err) = self.error {
            return Err(err);
        }

        tracing::trace!(
            min_size = self.min_size,
            encodings = self.registry.len(),
            prefer = ?self.prefer,
            "built compression config"
        );

        Ok(CompressionLayer::from_config(Config {
            min_size: self.min_size,
            gate: self.gate,
            prefer: self.prefer,
            registry: self.registry,
            buffers: Pool::default(),
        }))
    }

    /// Builds the layer.
    ///
    /// # Panics
    ///
    /// Panics if any option is invalid.
    pub fn must_build(self) -> CompressionLayer {
        match self.build() {
            Ok(layer) => layer,
            Err(err) => panic!("invalid compression config: {err}"),
        }
    }

    fn record(&mut self, err: ConfigError) {
        self.error.get_or_insert(err);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_util::FixedCompressor;

    #[test]
    fn test_default_registry_has_all_codecs() {
        let builder = Builder::new();
        assert!(builder.error.is_none());
        assert_eq!(builder.registry.len(), Codec::ALL.len());
        #[cfg(feature = "zstd")]
        assert_eq!(builder.registry.get("zstd").unwrap().priority(), 3);
        #[cfg(feature = "deflate")]
        assert_eq!(builder.registry.get("deflate").unwrap().priority(), 0);
    }

    #[test]
    fn test_compressor_none_removes() {
        let builder = Builder::new()
            .compressor("gzip", 0, None)
            .compressor("x-custom", 7, Some(FixedCompressor::shared()));
        assert!(builder.registry.get("gzip").is_none());
        assert_eq!(builder.registry.get("x-custom").unwrap().priority(), 7);
    }

    #[test]
    fn test_invalid_token_rejected() {
        let mut registry = Registry::default();
        for token in ["", "has space", "a,b", "new\nline"] {
            assert!(matches!(
                registry.insert(token, 0, FixedCompressor::shared()),
                Err(ConfigError::InvalidEncoding(_))
            ));
        }
        assert!(registry.is_empty());
    }

    #[test]
    fn test_build_reports_first_error() {
        let err = Builder::new()
            .content_types(["text/html", "???"], false)
            .compressor("bad token", 0, Some(FixedCompressor::shared()))
            .build()
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidContentType { .. }));
    }

    #[test]
    #[cfg(feature = "gzip")]
    fn test_build_rejects_invalid_level() {
        let err = Builder::new()
            .codec(Codec::Gzip, 1, Level::Precise(42))
            .build()
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidLevel { encoding: "gzip", .. }));
    }

    #[test]
    #[should_panic(expected = "invalid compression config")]
    fn test_must_build_panics() {
        Builder::new()
            .compressor("", 0, Some(FixedCompressor::shared()))
            .must_build();
    }

    #[test]
    fn test_negotiate_uses_registry() {
        let layer = Builder::new()
            .compressor("x-custom", 0, Some(FixedCompressor::shared()))
            .build()
            .unwrap();
        let mut request = HeaderMap::new();
        request.insert(http::header::ACCEPT_ENCODING, "x-custom, unknown".parse().unwrap());

        let candidates = layer.config().negotiate(&request);
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].encoding(), "x-custom");
    }
}
