use crate::error::ConfigError;
use mime::Mime;

/// A media type with an optional, exact set of parameters.
///
/// `text/html` matches `text/html` with any parameters, while
/// `text/html; charset=utf-8` only matches a content type carrying exactly
/// that parameter set. Comparison ignores case and whitespace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentTypeRule {
    media_type: String,
    params: Vec<(String, String)>,
}

impl ContentTypeRule {
    /// Parses a rule such as `"application/json; charset=utf-8"`.
    pub fn parse(rule: &str) -> Result<Self, ConfigError> {
        parse_media_type(rule).map_err(|err| ConfigError::InvalidContentType {
            rule: rule.to_owned(),
            reason: err.to_string(),
        })
    }

    fn matches(&self, other: &ContentTypeRule) -> bool {
        if self.media_type != other.media_type {
            return false;
        }
        // without params, don't care about the other's params
        self.params.is_empty() || self.params == other.params
    }
}

fn parse_media_type(s: &str) -> Result<ContentTypeRule, mime::FromStrError> {
    let mime: Mime = s.trim().parse()?;
    let mut params: Vec<(String, String)> = mime
        .params()
        .map(|(name, value)| {
            (
                name.as_str().to_ascii_lowercase(),
                value.as_str().to_ascii_lowercase(),
            )
        })
        .collect();
    params.sort();
    params.dedup_by(|a, b| a.0 == b.0);

    Ok(ContentTypeRule {
        media_type: mime.essence_str().to_ascii_lowercase(),
        params,
    })
}

/// Decides whether a response content type may be compressed.
#[derive(Debug, Clone, Default)]
pub struct ContentTypeGate {
    rules: Vec<ContentTypeRule>,
    blacklist: bool,
}

impl ContentTypeGate {
    /// Builds a gate from textual rules.
    ///
    /// With `blacklist` unset only matching content types are compressed;
    /// with it set, matching content types are excluded.
    pub fn new<I, S>(rules: I, blacklist: bool) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let rules = rules
            .into_iter()
            .map(|rule| ContentTypeRule::parse(rule.as_ref()))
            .collect::<Result<_, _>>()?;
        Ok(Self { rules, blacklist })
    }

    /// Returns `true` if no rule was configured.
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Returns whether `content_type` is eligible for compression.
    ///
    /// An empty gate admits everything. Otherwise an unparsable content type
    /// never matches any rule.
    pub fn permits(&self, content_type: &str) -> bool {
        if self.rules.is_empty() {
            return true;
        }

        let matched = match parse_media_type(content_type) {
            Ok(parsed) => self.rules.iter().any(|rule| rule.matches(&parsed)),
            Err(_) => false,
        };
        matched != self.blacklist
    }
}
