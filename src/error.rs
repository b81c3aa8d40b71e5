use thiserror::Error;

/// Errors reported while building a [`CompressionLayer`](crate::CompressionLayer).
///
/// Every configuration problem is reported here, before any request is served.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The preference mode is not one of `server` or `client`.
    #[error("invalid prefer mode: {0:?} (expected \"server\" or \"client\")")]
    InvalidPrefer(String),

    /// A content-type rule could not be parsed as a media type.
    #[error("invalid content type rule {rule:?}: {reason}")]
    InvalidContentType {
        /// The rule as given.
        rule: String,
        /// Parser message.
        reason: String,
    },

    /// An encoding token cannot be used as a `Content-Encoding` value.
    #[error("invalid content encoding token {0:?}")]
    InvalidEncoding(String),

    /// A compression level is outside the range supported by the codec.
    #[error("invalid compression level {level} for {encoding}")]
    InvalidLevel {
        /// Encoding token of the codec.
        encoding: &'static str,
        /// The rejected level, as given.
        level: String,
    },
}
