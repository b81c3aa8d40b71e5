use crate::codec::Compressor;
use crate::config::Registration;
use crate::error::ConfigError;
use http::HeaderValue;
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

/// Which side wins when several encodings are acceptable to both parties.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Prefer {
    /// Highest server priority first, client quality breaks ties.
    #[default]
    Server,
    /// Highest client quality first, server priority breaks ties.
    Client,
}

impl FromStr for Prefer {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.eq_ignore_ascii_case("server") {
            Ok(Prefer::Server)
        } else if s.eq_ignore_ascii_case("client") {
            Ok(Prefer::Client)
        } else {
            Err(ConfigError::InvalidPrefer(s.to_owned()))
        }
    }
}

/// An encoding both accepted by the client and offered by the server.
#[derive(Clone)]
pub struct Candidate {
    encoding: Arc<str>,
    quality: f32,
    priority: i32,
    header: HeaderValue,
    compressor: Arc<dyn Compressor>,
}

impl Candidate {
    pub(crate) fn new(encoding: &str, quality: f32, registration: &Registration) -> Self {
        Self {
            encoding: Arc::from(encoding),
            quality,
            priority: registration.priority,
            header: registration.header.clone(),
            compressor: Arc::clone(&registration.compressor),
        }
    }

    /// The encoding token.
    pub fn encoding(&self) -> &str {
        &self.encoding
    }

    /// Quality the client assigned to this encoding.
    pub fn quality(&self) -> f32 {
        self.quality
    }

    /// Priority the server registered this encoding with.
    pub fn priority(&self) -> i32 {
        self.priority
    }

    pub(crate) fn header_value(&self) -> &HeaderValue {
        &self.header
    }

    pub(crate) fn compressor(&self) -> &dyn Compressor {
        &*self.compressor
    }
}

impl fmt::Debug for Candidate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Candidate")
            .field("encoding", &self.encoding)
            .field("quality", &self.quality)
            .field("priority", &self.priority)
            .finish_non_exhaustive()
    }
}

/// Orders `candidates` by preference and returns the winner.
///
/// The order is total: after the two keys selected by `prefer`, the token
/// itself (ascending) breaks any remaining tie.
///
/// # Panics
///
/// Panics if `candidates` is empty. Callers skip compression entirely when
/// there is nothing in common.
pub fn preferred(candidates: &mut [Candidate], prefer: Prefer) -> &Candidate {
    assert!(
        !candidates.is_empty(),
        "preferred() called without candidate encodings"
    );

    candidates.sort_by(|a, b| compare(a, b, prefer));
    &candidates[0]
}

fn compare(a: &Candidate, b: &Candidate, prefer: Prefer) -> Ordering {
    let by_priority = b.priority.cmp(&a.priority);
    let by_quality = b.quality.total_cmp(&a.quality);
    let by_token = a.encoding.cmp(&b.encoding);

    match prefer {
        Prefer::Server => by_priority.then(by_quality),
        Prefer::Client => by_quality.then(by_priority),
    }
    .then(by_token)
}
